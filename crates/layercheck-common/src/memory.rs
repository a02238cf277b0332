//! In-memory versioned resource store
//!
//! Behaves like a control plane for one resource kind: every commit bumps a
//! monotonically increasing version, updates against a stale version fail
//! with `Conflict`, and missing or duplicate names fail the way a real API
//! server would. Hooks let callers stand in for the controller under test
//! (a reconciler run on every read) and for competing writers.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::resources::Named;
use crate::store::{ResourceStore, Versioned};
use crate::{Error, Result};

type Reconciler<T> = Box<dyn Fn(&mut T) -> bool + Send + Sync>;

struct Entry<T> {
    object: T,
    version: u64,
}

struct Inner<T> {
    objects: BTreeMap<String, Entry<T>>,
    next_version: u64,
    reconciler: Option<Reconciler<T>>,
    pending_foreign_writes: usize,
    failing_deletes: Vec<String>,
    gets: usize,
    update_attempts: u32,
    created: Vec<String>,
    deleted: Vec<String>,
}

impl<T> Inner<T> {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Let the reconciler observe every object, bumping versions it changed
    fn reconcile(&mut self) {
        let Some(reconciler) = self.reconciler.take() else {
            return;
        };
        let names: Vec<String> = self.objects.keys().cloned().collect();
        for name in names {
            let changed = match self.objects.get_mut(&name) {
                Some(entry) => reconciler(&mut entry.object),
                None => false,
            };
            if changed {
                let version = self.bump();
                if let Some(entry) = self.objects.get_mut(&name) {
                    entry.version = version;
                }
            }
        }
        self.reconciler = Some(reconciler);
    }
}

/// Versioned store for one resource kind, held entirely in memory
pub struct MemoryStore<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Named + Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Named + Clone> MemoryStore<T> {
    /// Empty store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                objects: BTreeMap::new(),
                next_version: 0,
                reconciler: None,
                pending_foreign_writes: 0,
                failing_deletes: Vec::new(),
                gets: 0,
                update_attempts: 0,
                created: Vec::new(),
                deleted: Vec::new(),
            }),
        }
    }

    /// Store seeded with existing objects
    pub fn with_objects(objects: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for object in objects {
                let version = inner.bump();
                inner
                    .objects
                    .insert(object.name().to_string(), Entry { object, version });
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panicking test body must not wedge teardown that runs afterward
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `reconciler` against every object before each read.
    ///
    /// Returning `true` means the object changed and gets a new version.
    pub fn set_reconciler(&self, reconciler: impl Fn(&mut T) -> bool + Send + Sync + 'static) {
        self.lock().reconciler = Some(Box::new(reconciler));
    }

    /// Make the next `n` reads race a competing writer.
    ///
    /// After each such read the object's version moves on, so an update based
    /// on that read conflicts.
    pub fn simulate_concurrent_writes(&self, n: usize) {
        self.lock().pending_foreign_writes = n;
    }

    /// Make every delete of `name` fail with a permanent control-plane error
    pub fn fail_deletes_of(&self, name: impl Into<String>) {
        self.lock().failing_deletes.push(name.into());
    }

    /// Synchronous snapshot, bypassing hooks and counters
    pub fn get_now(&self, name: &str) -> Option<Versioned<T>> {
        self.lock()
            .objects
            .get(name)
            .map(|e| Versioned::new(e.object.clone(), e.version.to_string()))
    }

    /// Insert or overwrite an object as an outside writer would
    pub fn put(&self, object: T) {
        let mut inner = self.lock();
        let version = inner.bump();
        inner
            .objects
            .insert(object.name().to_string(), Entry { object, version });
    }

    /// Number of `get` calls served, including failed ones
    pub fn get_count(&self) -> usize {
        self.lock().gets
    }

    /// Number of `update` calls received, including conflicting ones
    pub fn update_attempts(&self) -> u32 {
        self.lock().update_attempts
    }

    /// Names created through the store, in order
    pub fn created(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    /// Names deleted through the store, in order
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Names currently stored
    pub fn names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }
}

#[async_trait]
impl<T> ResourceStore<T> for MemoryStore<T>
where
    T: Named + Clone + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Versioned<T>> {
        let mut inner = self.lock();
        inner.gets += 1;
        inner.reconcile();

        let snapshot = inner
            .objects
            .get(name)
            .map(|e| Versioned::new(e.object.clone(), e.version.to_string()))
            .ok_or_else(|| Error::not_found(T::KIND, name))?;

        if inner.pending_foreign_writes > 0 {
            inner.pending_foreign_writes -= 1;
            let version = inner.bump();
            if let Some(entry) = inner.objects.get_mut(name) {
                entry.version = version;
            }
        }

        Ok(snapshot)
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        let mut inner = self.lock();
        inner.reconcile();
        Ok(inner
            .objects
            .values()
            .map(|e| Versioned::new(e.object.clone(), e.version.to_string()))
            .collect())
    }

    async fn update(
        &self,
        name: &str,
        desired: T,
        expected_version: &str,
    ) -> Result<Versioned<T>> {
        let mut inner = self.lock();
        inner.update_attempts += 1;

        let current = inner
            .objects
            .get(name)
            .map(|e| e.version)
            .ok_or_else(|| Error::not_found(T::KIND, name))?;

        if current.to_string() != expected_version {
            return Err(Error::conflict(
                T::KIND,
                name,
                format!(
                    "expected version {} but stored version is {}",
                    expected_version, current
                ),
            ));
        }

        let version = inner.bump();
        inner.objects.insert(
            name.to_string(),
            Entry {
                object: desired.clone(),
                version,
            },
        );
        Ok(Versioned::new(desired, version.to_string()))
    }

    async fn create(&self, object: T) -> Result<Versioned<T>> {
        let mut inner = self.lock();
        let name = object.name().to_string();
        if inner.objects.contains_key(&name) {
            return Err(Error::already_exists(T::KIND, name));
        }

        let version = inner.bump();
        inner.objects.insert(
            name.clone(),
            Entry {
                object: object.clone(),
                version,
            },
        );
        inner.created.push(name);
        Ok(Versioned::new(object, version.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.failing_deletes.iter().any(|n| n == name) {
            return Err(Error::control_plane_permanent(
                format!("delete {}", T::KIND),
                format!("refusing to delete {}", name),
            ));
        }
        if inner.objects.remove(name).is_none() {
            return Err(Error::not_found(T::KIND, name));
        }
        inner.deleted.push(name.to_string());
        Ok(())
    }
}
