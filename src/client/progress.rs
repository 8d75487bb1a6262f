//! Progress listener registry
//!
//! Listeners are either scoped to one call id, or client-wide and notified
//! for every call. Registration is explicit; there is no replay of events
//! that happened before a listener was added.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::shared::{CallId, Method};

/// Progress notification for one in-flight call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub call_id: CallId,
    pub method: Method,
    /// Fraction of work done (0.0 - 1.0)
    pub value: f32,
}

/// Callback receiving progress values of a single call
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

pub(crate) type ListenerFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

#[derive(Default)]
pub(crate) struct ProgressRegistry {
    next_handle: u64,
    listeners: BTreeMap<ListenerHandle, ListenerFn>,
    by_call: HashMap<CallId, BTreeSet<ListenerHandle>>,
    global: BTreeSet<ListenerHandle>,
}

impl ProgressRegistry {
    fn allocate(&mut self, listener: ListenerFn) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.insert(handle, listener);
        handle
    }

    /// Register a listener for every call
    pub fn add_global(&mut self, listener: ListenerFn) -> ListenerHandle {
        let handle = self.allocate(listener);
        self.global.insert(handle);
        handle
    }

    /// Register a listener for one call
    pub fn add_for_call(&mut self, call_id: CallId, callback: ProgressCallback) -> ListenerHandle {
        let handle = self.allocate(Arc::new(move |event: &ProgressEvent| callback(event.value)));
        self.by_call.entry(call_id).or_default().insert(handle);
        handle
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        if self.listeners.remove(&handle).is_none() {
            return false;
        }
        self.global.remove(&handle);
        self.by_call.retain(|_, handles| {
            handles.remove(&handle);
            !handles.is_empty()
        });
        true
    }

    /// Drop every listener scoped to a finished call
    pub fn release_call(&mut self, call_id: CallId) {
        if let Some(handles) = self.by_call.remove(&call_id) {
            for handle in handles {
                self.listeners.remove(&handle);
            }
        }
    }

    /// Listeners to notify for a call, call-scoped first, in registration order
    pub fn listeners_for(&self, call_id: CallId) -> Vec<ListenerFn> {
        let scoped = self.by_call.get(&call_id).into_iter().flatten();
        scoped
            .chain(self.global.iter())
            .filter_map(|handle| self.listeners.get(handle).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
        self.by_call.clear();
        self.global.clear();
    }
}
