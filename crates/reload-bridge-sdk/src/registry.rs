//! The namespace registry
//!
//! Stands in for the global object compiled units write into. Symbols are
//! addressed by dotted names (`app.core.main`) and stored as nested
//! namespaces. A registry handle is cheap to clone; clones share storage, and
//! separate registries never see each other's symbols.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::HostError;
use crate::value::Value;

/// Munge a namespace identifier into the form compiled output uses
///
/// `my-app.core` is emitted as `my_app.core`.
pub fn munge(name: &str) -> String {
    name.replace('-', "_")
}

/// Shared, dotted-name addressed symbol table
#[derive(Clone, Default)]
pub struct Registry {
    root: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Registry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.root.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.root.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Define `value` at `dotted`, creating intermediate namespaces
    ///
    /// Fails if an intermediate segment already holds a non-namespace value.
    pub fn define(&self, dotted: &str, value: impl Into<Value>) -> Result<(), HostError> {
        let segments = split(dotted)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| HostError::InvalidArgument("empty name".to_string()))?;

        let mut root = self.write();
        let mut current = &mut *root;
        for (depth, segment) in parents.iter().enumerate() {
            let slot = current
                .entry((*segment).to_string())
                .or_insert_with(Value::namespace);
            current = match slot {
                Value::Namespace(members) => members,
                other => {
                    return Err(HostError::InvalidArgument(format!(
                        "{} is a {}, not a namespace",
                        segments[..=depth].join("."),
                        other.kind()
                    )))
                }
            };
        }
        current.insert((*last).to_string(), value.into());
        Ok(())
    }

    /// Resolve a dotted name to a copy of its value
    ///
    /// Returns `None` when any segment along the path is missing.
    pub fn resolve(&self, dotted: &str) -> Option<Value> {
        let segments = split(dotted).ok()?;
        let root = self.read();
        let (first, rest) = segments.split_first()?;
        let mut current = root.get(*first)?;
        for segment in rest {
            current = current.member(segment)?;
        }
        Some(current.clone())
    }

    /// Whether a dotted name resolves to anything
    pub fn contains(&self, dotted: &str) -> bool {
        self.resolve(dotted).is_some()
    }

    /// Resolve and call a function
    ///
    /// The registry lock is released before the call, so the function may
    /// define or resolve symbols itself.
    pub fn call(&self, dotted: &str, args: &[Value]) -> Result<Value, HostError> {
        let target = self
            .resolve(dotted)
            .ok_or_else(|| HostError::NotCallable(format!("{} is not defined", dotted)))?;
        target.call(args)
    }

    /// Remove a symbol, returning its previous value
    pub fn remove(&self, dotted: &str) -> Option<Value> {
        let segments = split(dotted).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut root = self.write();
        let mut current = &mut *root;
        for segment in parents {
            current = match current.get_mut(*segment)? {
                Value::Namespace(members) => members,
                _ => return None,
            };
        }
        current.remove(*last)
    }

    /// Top-level names currently defined
    pub fn roots(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("roots", &self.roots())
            .finish()
    }
}

fn split(dotted: &str) -> Result<Vec<&str>, HostError> {
    if dotted.is_empty() {
        return Err(HostError::InvalidArgument("empty name".to_string()));
    }
    let segments: Vec<&str> = dotted.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(HostError::InvalidArgument(format!("malformed name: {}", dotted)));
    }
    Ok(segments)
}
