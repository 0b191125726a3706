//! Persistent stack store.
//!
//! All tables live in one JSON document. `Store::open` only loads it;
//! `Store::migrate` brings it to the current schema and must run before any
//! read or transaction. Every mutation goes through `Store::transaction`,
//! which validates the tables and writes the whole document atomically, or
//! restores the previous tables on failure.

pub mod migrations;
pub mod schema;

pub use schema::{
    BranchRecord, BranchStatus, CommitRecord, RepositoryRecord, StackRecord, StackSummary,
    Tables, TrackedBranch,
};

use crate::errors::{GrapheneError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version written by this build
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Serialize)]
struct DocumentRef<'a> {
    schema_version: u32,
    #[serde(flatten)]
    tables: &'a Tables,
}

#[derive(Deserialize)]
struct Document {
    schema_version: u32,
    #[serde(flatten)]
    tables: Tables,
}

pub struct Store {
    path: PathBuf,
    schema_version: u32,
    tables: Tables,
    /// Raw document kept for migration when it is older than `SCHEMA_VERSION`
    pending: Option<serde_json::Value>,
}

impl Store {
    /// Load the document at `path` without migrating it
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No store at {}, starting empty", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                schema_version: 0,
                tables: Tables::default(),
                pending: Some(serde_json::Value::Object(Default::default())),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| {
            GrapheneError::store(format!("Failed to read store {}: {e}", path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            GrapheneError::store(format!("Failed to parse store {}: {e}", path.display()))
        })?;

        let version = migrations::document_version(&value)?;
        if version > SCHEMA_VERSION {
            return Err(GrapheneError::store(format!(
                "Store schema version {version} is newer than this build supports ({SCHEMA_VERSION})"
            )));
        }

        if version == SCHEMA_VERSION {
            let document: Document = serde_json::from_value(value)?;
            tracing::debug!("Opened store {} (schema {})", path.display(), version);
            return Ok(Self {
                path: path.to_path_buf(),
                schema_version: document.schema_version,
                tables: document.tables,
                pending: None,
            });
        }

        tracing::debug!(
            "Opened store {} at schema {}, migration required",
            path.display(),
            version
        );
        Ok(Self {
            path: path.to_path_buf(),
            schema_version: version,
            tables: Tables::default(),
            pending: Some(value),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn is_migrated(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    /// Apply pending migrations and persist the result. Returns how many ran.
    pub fn migrate(&mut self) -> Result<u32> {
        let Some(mut value) = self.pending.take() else {
            return Ok(0);
        };

        let from = self.schema_version;
        let applied = match migrations::apply(&mut value, from) {
            Ok(applied) => applied,
            Err(e) => {
                self.pending = Some(value);
                return Err(e);
            }
        };

        let document: Document = match serde_json::from_value(value.clone()) {
            Ok(document) => document,
            Err(e) => {
                self.pending = Some(value);
                return Err(GrapheneError::store(format!(
                    "Migrated store does not match schema {SCHEMA_VERSION}: {e}"
                )));
            }
        };

        if let Err(e) = document
            .tables
            .validate()
            .and_then(|_| Self::persist(&self.path, &document.tables))
        {
            self.pending = Some(value);
            return Err(e);
        }

        self.schema_version = document.schema_version;
        self.tables = document.tables;
        tracing::info!(
            "Migrated store {} from schema {} to {}",
            self.path.display(),
            from,
            self.schema_version
        );
        Ok(applied)
    }

    fn ensure_migrated(&self) -> Result<()> {
        if self.is_migrated() {
            Ok(())
        } else {
            Err(GrapheneError::NotMigrated {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            })
        }
    }

    /// Read-only access to the tables
    pub fn tables(&self) -> Result<&Tables> {
        self.ensure_migrated()?;
        Ok(&self.tables)
    }

    /// Run `operation` against the tables as one all-or-nothing unit.
    ///
    /// The tables are validated and written after `operation` succeeds. If the
    /// closure, validation or the write fails, the in-memory tables are put
    /// back exactly as they were and nothing on disk changes.
    pub fn transaction<R, F>(&mut self, operation: F) -> Result<R>
    where
        F: FnOnce(&mut Tables) -> Result<R>,
    {
        self.ensure_migrated()?;
        let snapshot = self.tables.clone();

        let outcome = operation(&mut self.tables).and_then(|value| {
            self.tables.validate()?;
            Self::persist(&self.path, &self.tables)?;
            Ok(value)
        });

        if outcome.is_err() {
            tracing::debug!("Rolling back store transaction");
            self.tables = snapshot;
        }
        outcome
    }

    fn persist(path: &Path, tables: &Tables) -> Result<()> {
        crate::utils::atomic_file::write_json(
            path,
            &DocumentRef {
                schema_version: SCHEMA_VERSION,
                tables,
            },
        )
    }
}
