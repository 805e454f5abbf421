//! Naming directory
//!
//! Process-wide registry mapping names to remote endpoints. A name can only be
//! bound once; replacing a binding requires the rebind to have been announced
//! first, which only the bounce path does.

use shared::Endpoint;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FleetError, FleetResult};

#[derive(Default)]
struct DirectoryState {
    entries: BTreeMap<String, Endpoint>,
    /// Names whose next bind may replace an existing entry
    rebinds: HashSet<String>,
}

/// Name → endpoint registry
#[derive(Default)]
pub struct NamingDirectory {
    state: Mutex<DirectoryState>,
}

impl NamingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        // A poisoned lock only means a panic elsewhere; the map itself is intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind `name` to `endpoint`
    ///
    /// Fails with [`FleetError::DuplicateName`] if the name is taken, unless a
    /// rebind was announced through [`NamingDirectory::expect_rebind`].
    /// Re-binding the identical endpoint is accepted.
    pub fn bind(&self, name: &str, endpoint: Endpoint) -> FleetResult<()> {
        let mut state = self.state();

        if let Some(existing) = state.entries.get(name) {
            if *existing != endpoint && !state.rebinds.contains(name) {
                return Err(FleetError::DuplicateName { name: name.to_string() });
            }
        }

        state.rebinds.remove(name);
        state.entries.insert(name.to_string(), endpoint);
        Ok(())
    }

    /// Allow the next bind of `name` to replace the current entry
    pub fn expect_rebind(&self, name: &str) {
        self.state().rebinds.insert(name.to_string());
    }

    /// Resolve a name; fails immediately on a miss
    pub fn lookup(&self, name: &str) -> FleetResult<Endpoint> {
        self.state()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::NotBound { name: name.to_string() })
    }

    /// Drop a binding, returning whether it existed
    pub fn unbind(&self, name: &str) -> bool {
        self.state().entries.remove(name).is_some()
    }

    /// Snapshot of the bound names
    pub fn list(&self) -> NameList {
        NameList {
            names: Arc::new(self.state().entries.keys().cloned().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bound names at the moment of listing
///
/// Iterating does not consume the list, so it can be walked any number of
/// times, and clones share the same snapshot.
#[derive(Debug, Clone)]
pub struct NameList {
    names: Arc<Vec<String>>,
}

impl NameList {
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.as_ref().clone()
    }
}

impl<'a> IntoIterator for &'a NameList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
