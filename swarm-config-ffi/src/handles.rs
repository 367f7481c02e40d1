/// Handle arena for engine instances owned by foreign callers.
///
/// Callers hold opaque [`Handle`] ids, never pointers. Ids are never reused,
/// so a stale id resolves to `InvalidHandle` instead of someone else's object.
/// Each instance sits behind its own mutex; the arena lock only guards the
/// id table and is never held while an instance is in use.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use swarm_config::config::AnyConfig;
use swarm_config::{GroupInfo, GroupMembers, Keys};

use crate::error::{FfiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

/// Anything a handle can refer to.
pub enum Object {
    Config(AnyConfig),
    Keys(Keys),
}

pub type Shared = Arc<Mutex<Object>>;

pub struct HandleArena {
    next: AtomicU64,
    objects: Mutex<HashMap<u64, Shared>>,
}

impl Default for HandleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleArena {
    pub fn new() -> Self {
        HandleArena {
            // 0 is reserved so callers can use it as "no handle".
            next: AtomicU64::new(1),
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<u64, Shared>>> {
        self.objects
            .lock()
            .map_err(|_| FfiError::Internal("handle table poisoned".into()))
    }

    pub fn insert(&self, object: Object) -> Result<Handle> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.table()?.insert(id, Arc::new(Mutex::new(object)));
        log::debug!(target: "ffi", "handle {} allocated", id);
        Ok(Handle(id))
    }

    pub fn get(&self, handle: Handle) -> Result<Shared> {
        self.table()?
            .get(&handle.0)
            .cloned()
            .ok_or(FfiError::InvalidHandle(handle.0))
    }

    /// Free a handle. Calls already holding the instance finish first.
    pub fn remove(&self, handle: Handle) -> Result<()> {
        self.table()?
            .remove(&handle.0)
            .map(|_| log::debug!(target: "ffi", "handle {} freed", handle.0))
            .ok_or(FfiError::InvalidHandle(handle.0))
    }

    pub fn len(&self) -> usize {
        self.table().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve several distinct handles.
    pub fn resolve(&self, handles: &[Handle]) -> Result<Vec<Shared>> {
        for (i, h) in handles.iter().enumerate() {
            if handles[..i].contains(h) {
                return Err(FfiError::InvalidArgument(format!("handle {} passed twice", h.0)));
            }
        }
        let table = self.table()?;
        handles
            .iter()
            .map(|h| table.get(&h.0).cloned().ok_or(FfiError::InvalidHandle(h.0)))
            .collect()
    }
}

pub fn lock(shared: &Shared) -> Result<MutexGuard<'_, Object>> {
    shared
        .lock()
        .map_err(|_| FfiError::Internal("instance lock poisoned".into()))
}

/// Lock `shared` (resolved from `handles`) in ascending handle order, so two
/// calls touching the same instances can never deadlock. Guards come back in
/// the order of `handles`.
pub fn lock_in_order<'a>(handles: &[Handle], shared: &'a [Shared]) -> Result<Vec<MutexGuard<'a, Object>>> {
    let mut order: Vec<usize> = (0..handles.len()).collect();
    order.sort_by_key(|&i| handles[i]);

    let mut slots: Vec<Option<MutexGuard<'a, Object>>> = shared.iter().map(|_| None).collect();
    for i in order {
        slots[i] = Some(lock(&shared[i])?);
    }
    slots
        .into_iter()
        .map(|g| g.ok_or_else(|| FfiError::Internal("missing guard".into())))
        .collect()
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

pub fn as_config(object: &mut Object, handle: Handle) -> Result<&mut AnyConfig> {
    match object {
        Object::Config(c) => Ok(c),
        Object::Keys(_) => Err(FfiError::WrongKind(handle.0, "config")),
    }
}

pub fn as_keys(object: &mut Object, handle: Handle) -> Result<&mut Keys> {
    match object {
        Object::Keys(k) => Ok(k),
        Object::Config(_) => Err(FfiError::WrongKind(handle.0, "keys")),
    }
}

pub fn as_group_info(object: &mut Object, handle: Handle) -> Result<&mut GroupInfo> {
    match object {
        Object::Config(AnyConfig::GroupInfo(c)) => Ok(c),
        _ => Err(FfiError::WrongKind(handle.0, "group info")),
    }
}

pub fn as_group_members(object: &mut Object, handle: Handle) -> Result<&mut GroupMembers> {
    match object {
        Object::Config(AnyConfig::GroupMembers(c)) => Ok(c),
        _ => Err(FfiError::WrongKind(handle.0, "group members")),
    }
}
