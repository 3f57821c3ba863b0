//! Deployment naming schemes.
//!
//! The catalog keeps one canonical name per table (`rev`). Deployments refer
//! to the same tables under a schema qualifier (`perforce.rev`) or a dotted
//! file-style prefix (`db.rev`); a [`NamingStrategy`] maps between the two.

/// How table names are spelled outside the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// Names are used as registered.
    #[default]
    Canonical,
    /// Names carry a database schema qualifier, `{schema}.{table}`.
    SchemaQualified {
        /// Schema name, e.g. `perforce`.
        schema: String,
    },
    /// Names carry a dotted prefix, `{prefix}.{table}`.
    DottedPrefix {
        /// Prefix, e.g. `db`.
        prefix: String,
    },
}

impl NamingStrategy {
    /// Schema-qualified naming.
    pub fn schema_qualified(schema: impl Into<String>) -> Self {
        Self::SchemaQualified {
            schema: schema.into(),
        }
    }

    /// Dotted-prefix naming.
    pub fn dotted_prefix(prefix: impl Into<String>) -> Self {
        Self::DottedPrefix {
            prefix: prefix.into(),
        }
    }

    fn qualifier(&self) -> Option<&str> {
        match self {
            Self::Canonical => None,
            Self::SchemaQualified { schema } => Some(schema),
            Self::DottedPrefix { prefix } => Some(prefix),
        }
    }

    /// Spells a canonical table name under this strategy.
    #[must_use]
    pub fn qualify(&self, table: &str) -> String {
        match self.qualifier() {
            None => table.to_owned(),
            Some(q) => format!("{q}.{table}"),
        }
    }

    /// Recovers the canonical name, or `None` if `name` is not spelled
    /// under this strategy.
    #[must_use]
    pub fn canonicalize<'a>(&self, name: &'a str) -> Option<&'a str> {
        match self.qualifier() {
            None => Some(name),
            Some(q) => name
                .strip_prefix(q)
                .and_then(|rest| rest.strip_prefix('.'))
                .filter(|rest| !rest.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(NamingStrategy::Canonical.qualify("rev"), "rev");
        assert_eq!(NamingStrategy::schema_qualified("perforce").qualify("rev"), "perforce.rev");
        assert_eq!(NamingStrategy::dotted_prefix("db").qualify("rev"), "db.rev");
    }

    #[test]
    fn test_canonicalize() {
        let db = NamingStrategy::dotted_prefix("db");
        assert_eq!(db.canonicalize("db.rev"), Some("rev"));
        assert_eq!(db.canonicalize("rev"), None);
        assert_eq!(db.canonicalize("dbx.rev"), None);
        assert_eq!(db.canonicalize("db."), None);
        assert_eq!(NamingStrategy::Canonical.canonicalize("db.rev"), Some("db.rev"));

        let perforce = NamingStrategy::schema_qualified("perforce");
        assert_eq!(perforce.canonicalize(&perforce.qualify("integed")), Some("integed"));
    }
}
