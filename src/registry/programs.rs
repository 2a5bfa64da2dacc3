//! Registry of programs currently attached on this node.
//!
//! Entries are ephemeral and die with the process; a node restart requires
//! the controller to re-reconcile. A load call creates the entry, the
//! following register call completes it with the pinned-map path and metric
//! kind, and unregister removes it.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use ahash::AHashMap as HashMap;

use crate::deployment::MetricKind;
use crate::error::{Error, Result};

/// Descriptor of one attached program.
///
/// `path` and `kind` stay empty until the register round arrives; the poll
/// scheduler skips entries that are not yet complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MetricKind>,
}

impl ProgramEntry {
    pub fn loaded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            kind: None,
        }
    }
}

#[derive(Default)]
pub struct ProgramRegistry {
    inner: RwLock<HashMap<String, ProgramEntry>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry; a duplicate name is a failure.
    pub fn add(&self, entry: ProgramEntry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.contains_key(&entry.name) {
            return Err(Error::already_exists("program", entry.name));
        }
        inner.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Inserts or replaces an entry. Used by the register handler to
    /// complete the path/kind of a previously loaded program.
    pub fn upsert(&self, entry: ProgramEntry) {
        let mut inner = self.inner.write().unwrap();
        inner.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<ProgramEntry> {
        let inner = self.inner.read().unwrap();
        inner.get(name).cloned()
    }

    /// Snapshot of all entries. Iteration order is unspecified.
    pub fn list(&self) -> Vec<ProgramEntry> {
        let inner = self.inner.read().unwrap();
        inner.values().cloned().collect()
    }

    /// Removes an entry. Absent names are fine.
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.remove(name);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_add_fails() {
        let registry = ProgramRegistry::new();
        registry.add(ProgramEntry::loaded("execve")).unwrap();
        let err = registry.add(ProgramEntry::loaded("execve")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ProgramRegistry::new();
        registry.add(ProgramEntry::loaded("execve")).unwrap();
        registry.remove("execve");
        registry.remove("execve");
        assert!(registry.get("execve").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn upsert_completes_a_loaded_entry() {
        let registry = ProgramRegistry::new();
        registry.add(ProgramEntry::loaded("execve")).unwrap();

        registry.upsert(ProgramEntry {
            name: "execve".into(),
            path: Some("/sys/fs/bpf/execve/calls".into()),
            kind: Some(MetricKind::Counter),
        });

        let entry = registry.get("execve").unwrap();
        assert_eq!(entry.path.as_deref(), Some("/sys/fs/bpf/execve/calls"));
        assert_eq!(entry.kind, Some(MetricKind::Counter));
        assert_eq!(registry.len(), 1);
    }
}
