//! Column declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive column type.
///
/// Manifest spellings accept the catalog's historical names as aliases
/// (`int`/`integer`, `bigint`, `text`, `binary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 32-bit signed integer.
    #[serde(alias = "int", alias = "integer")]
    Int32,
    /// 64-bit signed integer.
    #[serde(alias = "bigint")]
    Int64,
    /// UTF-8 string.
    #[serde(alias = "text")]
    String,
    /// Opaque bytes.
    #[serde(alias = "binary")]
    Bytes,
}

impl ColumnType {
    /// Returns the stable one-byte tag used by the codec and fingerprint.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Int32 => 1,
            Self::Int64 => 2,
            Self::String => 3,
            Self::Bytes => 4,
        }
    }

    /// Resolves a tag produced by [`ColumnType::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::String),
            4 => Some(Self::Bytes),
            _ => None,
        }
    }

    /// Returns the manifest name of the type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether the column is part of the row identifier.
    pub key: bool,
}

impl ColumnDef {
    /// Creates a non-key column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            key: false,
        }
    }

    /// Creates a key column.
    pub fn key(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            key: true,
        }
    }
}
