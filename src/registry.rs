//! In-process name and id registries.
//!
//! [`NameRegistrar`] and [`TruncIndex`] are the default implementations of
//! [`NameRegistry`] and [`IdIndex`]. Both are internally synchronised, so
//! callers need no further locking.

use crate::error::{Error, Result};
use crate::services::{IdIndex, NameRegistry};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::debug;

fn poisoned() -> Error {
    Error::Internal("registry lock poisoned".to_string())
}

// =============================================================================
// Name Registrar
// =============================================================================

/// Exclusive name → id reservations.
#[derive(Debug, Default)]
pub struct NameRegistrar {
    names: RwLock<HashMap<String, String>>,
}

impl NameRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id holding `name`, if any.
    pub fn get(&self, name: &str) -> Option<String> {
        self.names.read().ok()?.get(name).cloned()
    }
}

impl NameRegistry for NameRegistrar {
    fn reserve(&self, name: &str, id: &str) -> Result<()> {
        if name.is_empty() || id.is_empty() {
            return Err(Error::Validation(
                "name and id must not be empty".to_string(),
            ));
        }
        let mut names = self.names.write().map_err(|_| poisoned())?;
        match names.get(name) {
            Some(holder) if holder == id => Ok(()),
            Some(holder) => Err(Error::Reconstruction {
                id: id.to_string(),
                reason: format!("the container name {name:?} is already in use by {holder:?}"),
            }),
            None => {
                names.insert(name.to_string(), id.to_string());
                debug!(name, id, "Reserved container name");
                Ok(())
            }
        }
    }

    fn release(&self, name: &str) {
        if let Ok(mut names) = self.names.write() {
            if names.remove(name).is_some() {
                debug!(name, "Released container name");
            }
        }
    }
}

// =============================================================================
// Truncated Id Index
// =============================================================================

/// Set of full ids, resolvable by any unique prefix.
#[derive(Debug, Default)]
pub struct TruncIndex {
    ids: RwLock<BTreeSet<String>>,
}

impl TruncIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the full id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.read().map(|ids| ids.contains(id)).unwrap_or(false)
    }
}

impl IdIndex for TruncIndex {
    fn add(&self, id: &str) -> Result<()> {
        if id.is_empty() || id.contains(' ') {
            return Err(Error::Validation(format!("illegal character in id {id:?}")));
        }
        let mut ids = self.ids.write().map_err(|_| poisoned())?;
        if !ids.insert(id.to_string()) {
            return Err(Error::Reconstruction {
                id: id.to_string(),
                reason: "id already exists in the id index".to_string(),
            });
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut ids = self.ids.write().map_err(|_| poisoned())?;
        if !ids.remove(id) {
            return Err(Error::container_not_found(id, "no such id in the id index"));
        }
        Ok(())
    }

    fn get(&self, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            return Err(Error::Validation("prefix can't be empty".to_string()));
        }
        let ids = self.ids.read().map_err(|_| poisoned())?;
        let mut matches = ids
            .range(prefix.to_string()..)
            .take_while(|id| id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(Error::Validation(format!(
                "multiple ids found with provided prefix: {prefix}"
            ))),
            (None, _) => Err(Error::container_not_found(prefix, "ID does not exist")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_reserve_is_exclusive() {
        let names = NameRegistrar::new();
        names.reserve("web", "id-1").unwrap();
        names.reserve("web", "id-1").unwrap();
        let err = names.reserve("web", "id-2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Reconstruction);

        names.release("web");
        names.release("web");
        names.reserve("web", "id-2").unwrap();
        assert_eq!(names.get("web").as_deref(), Some("id-2"));
    }

    #[test]
    fn test_prefix_lookup() {
        let index = TruncIndex::new();
        index.add("abc123").unwrap();
        index.add("abd456").unwrap();

        assert_eq!(index.get("abc").unwrap(), "abc123");
        assert_eq!(index.get("abd4").unwrap(), "abd456");
        assert_eq!(index.get("ab").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(index.get("zz").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_delete() {
        let index = TruncIndex::new();
        index.add("abc").unwrap();
        assert!(index.add("abc").is_err());
        index.delete("abc").unwrap();
        assert!(!index.contains("abc"));
        assert_eq!(index.delete("abc").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
