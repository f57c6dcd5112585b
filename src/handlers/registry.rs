use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

use super::traits::{Handler, HandlerNotFound};
use super::types::Target;
use crate::router::path;

/// Registration conflicts. These indicate broken wiring, not a bad request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("builtin target already exists: {0}")]
    BuiltinExists(String),

    #[error("registered target with same name already exists: {0}")]
    TargetExists(String),

    #[error("builtin targets cannot be default: {0}")]
    BuiltinDefault(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),
}

/// A registered route: optional target metadata plus the handler.
#[derive(Clone)]
pub struct HandlerEntry {
    name: String,
    // group the entry is indexed under, set on registration
    group: String,
    target: Option<Target>,
    handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    /// Entry for a self-describing target
    pub fn new(target: Target, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: target.name.clone(),
            group: String::new(),
            target: Some(target),
            handler,
        }
    }

    /// Entry without metadata, typically a nested router
    pub fn route(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            group: String::new(),
            target: None,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group this entry was registered under
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn is_default(&self) -> bool {
        self.target.as_ref().is_some_and(|t| t.default)
    }

    fn rename(&mut self, name: String) {
        if let Some(t) = &mut self.target {
            t.name.clone_from(&name);
        }
        self.name = name;
    }

    fn set_default(&mut self, default: bool) {
        if let Some(t) = &mut self.target {
            t.default = default;
        }
    }

    fn alias(&self, group: &str, description: String) -> Self {
        Self {
            name: group.to_string(),
            group: group.to_string(),
            target: Some(Target {
                name: group.to_string(),
                description,
                default: false,
            }),
            handler: Arc::clone(&self.handler),
        }
    }

    /// Place the entry in `group`, qualifying `name` unless it already lives under it
    fn qualify(&mut self, group: &str) {
        self.group = group.to_string();
        if group.is_empty() || self.name.starts_with(&format!("{group}/")) {
            return;
        }
        let name = path::join(group, &self.name);
        self.rename(name);
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving a requested target
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The part of the requested target consumed by the match
    pub matched: String,
    pub entry: Arc<HandlerEntry>,
}

#[derive(Default)]
struct Inner {
    ls: BTreeMap<String, Arc<HandlerEntry>>,
    group_idx: BTreeMap<String, Vec<Arc<HandlerEntry>>>,
    default_target: Option<Arc<HandlerEntry>>,
    last_target: Option<Arc<HandlerEntry>>,
    builtins: BTreeMap<String, Arc<HandlerEntry>>,
}

impl Inner {
    /// Insert into `ls` and the group index, replacing an entry with the same name.
    ///
    /// A replaced entry keeps its slot when it stays in the same group and
    /// is dropped from its old group otherwise.
    fn insert(&mut self, entry: Arc<HandlerEntry>) {
        let prev = self.ls.insert(entry.name().to_string(), Arc::clone(&entry));

        let mut placed = false;
        if let Some(prev) = &prev {
            debug!(name = prev.name(), group = prev.group(), "Replacing registered target");

            if let Some(members) = self.group_idx.get_mut(prev.group()) {
                if prev.group() == entry.group() {
                    if let Some(slot) = members.iter_mut().find(|e| Arc::ptr_eq(e, prev)) {
                        *slot = Arc::clone(&entry);
                        placed = true;
                    }
                } else {
                    members.retain(|e| !Arc::ptr_eq(e, prev));
                    if members.is_empty() {
                        self.group_idx.remove(prev.group());
                    }
                }
            }

            for e in [&mut self.default_target, &mut self.last_target]
                .into_iter()
                .flatten()
            {
                if Arc::ptr_eq(e, prev) {
                    *e = Arc::clone(&entry);
                }
            }
        }

        if !placed {
            self.group_idx
                .entry(entry.group().to_string())
                .or_default()
                .push(entry);
        }
    }
}

/// Table of registered routes.
///
/// `ls` holds overridable targets and is the only table consulted during
/// resolution. `builtins` holds targets that can never be overridden and only
/// show up in [`Registry::all`].
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `entry` under `group`.
    ///
    /// The first default entry becomes the registry default and gets an alias
    /// at the bare group path. An entry with an existing name replaces it.
    pub fn add(&self, group: &str, mut entry: HandlerEntry) -> Result<(), RegistryError> {
        entry.qualify(group);

        let mut inner = self.lock();
        if inner.builtins.contains_key(entry.name()) {
            return Err(RegistryError::BuiltinExists(entry.name().to_string()));
        }

        let entry = Arc::new(entry);
        inner.insert(Arc::clone(&entry));

        if entry.is_default() {
            if !group.is_empty() && !inner.ls.contains_key(group) {
                let alias = entry.alias(group, format!("Alias for target {}", entry.name()));
                inner.insert(Arc::new(alias));
            }
            if inner.default_target.is_none() {
                inner.default_target = Some(Arc::clone(&entry));
            }
        }
        inner.last_target = Some(Arc::clone(&entry));

        debug!(name = entry.name(), group, "Registered target");
        Ok(())
    }

    /// Register a target that cannot be overridden or made default
    pub fn add_builtin(&self, group: &str, mut entry: HandlerEntry) -> Result<(), RegistryError> {
        entry.qualify(group);
        let name = entry.name().to_string();
        if entry.is_default() {
            return Err(RegistryError::BuiltinDefault(name));
        }

        let mut inner = self.lock();
        if inner.builtins.contains_key(&name) {
            return Err(RegistryError::BuiltinExists(name));
        }
        if inner.ls.contains_key(&name) {
            return Err(RegistryError::TargetExists(name));
        }

        debug!(%name, "Registered builtin target");
        inner.builtins.insert(name, Arc::new(entry));
        Ok(())
    }

    /// Make `group/name` the registry default and point the group alias at it
    pub fn set_default(&self, group: &str, name: &str) -> Result<(), RegistryError> {
        let key = path::join(group, name);

        let mut inner = self.lock();
        let current = inner
            .ls
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistryError::TargetNotFound(key.clone()))?;

        if let Some(prev) = inner.default_target.clone() {
            if !Arc::ptr_eq(&prev, &current) && inner.ls.contains_key(prev.name()) {
                let mut demoted = (*prev).clone();
                demoted.set_default(false);
                inner.insert(Arc::new(demoted));
            }
        }

        let mut promoted = (*current).clone();
        promoted.set_default(true);
        let promoted = Arc::new(promoted);
        inner.insert(Arc::clone(&promoted));

        if !group.is_empty() {
            let alias = promoted.alias(group, format!("Alias for target {key}"));
            inner.insert(Arc::new(alias));
        }
        inner.default_target = Some(promoted);
        Ok(())
    }

    /// Exact lookup among overridable targets
    pub fn get(&self, name: &str) -> Option<Arc<HandlerEntry>> {
        self.lock().ls.get(name).cloned()
    }

    /// Every entry, builtins included, sorted by name
    pub fn all(&self) -> Vec<Arc<HandlerEntry>> {
        let inner = self.lock();
        let mut ls: Vec<_> = inner
            .ls
            .values()
            .chain(inner.builtins.values())
            .cloned()
            .collect();
        ls.sort_by(|a, b| a.name().cmp(b.name()));
        ls
    }

    /// Entries registered under exactly `group`, in registration order
    pub fn get_group(&self, group: &str) -> Vec<Arc<HandlerEntry>> {
        self.lock().group_idx.get(group).cloned().unwrap_or_default()
    }

    /// The tracked default, else the most recently registered entry
    pub fn default_entry(&self) -> Option<Arc<HandlerEntry>> {
        let inner = self.lock();
        inner
            .default_target
            .clone()
            .or_else(|| inner.last_target.clone())
    }

    /// Sorted names of the overridable targets
    pub fn names(&self) -> Vec<String> {
        self.lock().ls.keys().cloned().collect()
    }

    /// Resolve a requested target.
    ///
    /// Exact match first, then the default for an empty target, then the
    /// longest registered prefix.
    pub fn lookup(&self, target: &str) -> Result<Lookup, HandlerNotFound> {
        let inner = self.lock();

        if let Some(entry) = inner.ls.get(target) {
            return Ok(Lookup {
                matched: target.to_string(),
                entry: Arc::clone(entry),
            });
        }

        if target.is_empty() {
            if let Some(entry) = inner
                .default_target
                .as_ref()
                .or(inner.last_target.as_ref())
            {
                debug!(default = entry.name(), "Using default target");
                return Ok(Lookup {
                    matched: String::new(),
                    entry: Arc::clone(entry),
                });
            }
        }

        for prefix in path::prefixes(target) {
            if let Some(entry) = inner.ls.get(prefix) {
                debug!(prefix, request = target, "Using prefix match for target");
                return Ok(Lookup {
                    matched: prefix.to_string(),
                    entry: Arc::clone(entry),
                });
            }
        }

        Err(HandlerNotFound {
            target: target.to_string(),
            available: inner.ls.keys().cloned().collect(),
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Registry")
            .field("targets", &inner.ls.keys().collect::<Vec<_>>())
            .field("builtins", &inner.builtins.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
