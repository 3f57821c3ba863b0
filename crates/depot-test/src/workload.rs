//! Randomized workloads over the `rev` table.
//!
//! A [`Workload`] produces a reproducible stream of puts and deletes over a
//! small key space, so rows are overwritten and deleted often. A [`Model`]
//! tracks what the table should contain after the same operations.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use depot_common::DepotResult;
use depot_engine::Txn;
use depot_schema::Value;

use crate::utils::rev;

/// One table operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Upsert a revision.
    Put {
        /// Depot path.
        file: String,
        /// Revision number.
        rev: i32,
        /// Change number.
        change: i32,
    },
    /// Delete a revision if present.
    Delete {
        /// Depot path.
        file: String,
        /// Revision number.
        rev: i32,
    },
}

impl Op {
    /// Applies the operation through a transaction.
    pub fn apply(&self, txn: &mut Txn<'_>) -> DepotResult<()> {
        match self {
            Op::Put { file, rev: r, change } => txn.put("rev", rev(file, *r, *change)).map(|_| ()),
            Op::Delete { file, rev: r } => txn
                .delete_if_exists("rev", &[Value::from(file.as_str()), Value::from(*r)])
                .map(|_| ()),
        }
    }
}

/// Seeded generator of [`Op`]s.
#[derive(Debug)]
pub struct Workload {
    rng: StdRng,
    files: usize,
    revs: i32,
    changes: i32,
}

impl Workload {
    /// Creates a workload over `files` paths, each with up to `revs`
    /// revisions, drawing change numbers from `0..changes`.
    pub fn new(seed: u64, files: usize, revs: i32, changes: i32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            files,
            revs,
            changes,
        }
    }

    /// Next operation; roughly one in four is a delete.
    pub fn next_op(&mut self) -> Op {
        let file = format!("//depot/w/f{}", self.rng.gen_range(0..self.files));
        let rev = self.rng.gen_range(1..=self.revs);
        if self.rng.gen_ratio(1, 4) {
            Op::Delete { file, rev }
        } else {
            Op::Put {
                file,
                rev,
                change: self.rng.gen_range(0..self.changes),
            }
        }
    }

    /// The next `n` operations.
    pub fn batch(&mut self, n: usize) -> Vec<Op> {
        (0..n).map(|_| self.next_op()).collect()
    }
}

/// Expected table contents: (file, rev) → change.
#[derive(Debug, Clone, Default)]
pub struct Model {
    rows: BTreeMap<(String, i32), i32>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the effect of `op`.
    pub fn apply(&mut self, op: &Op) {
        match op {
            Op::Put { file, rev, change } => {
                self.rows.insert((file.clone(), *rev), *change);
            }
            Op::Delete { file, rev } => {
                self.rows.remove(&(file.clone(), *rev));
            }
        }
    }

    /// Expected rows, in key order.
    pub fn rows(&self) -> &BTreeMap<(String, i32), i32> {
        &self.rows
    }

    /// Expected rows filed under `change`, in key order.
    pub fn with_change(&self, change: i32) -> Vec<(String, i32)> {
        self.rows
            .iter()
            .filter(|(_, c)| **c == change)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
