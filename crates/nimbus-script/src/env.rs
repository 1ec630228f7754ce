//! Lexical scopes and the heap that keeps closure environments alive.
//!
//! Closures hold a weak reference to their defining scope; the strong
//! reference lives in the [`Heap`] of the execution that created them.
//! Dropping the heap at the end of an execution frees every scope created
//! during it, closure cycles included.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::value::Value;

/// One lexical scope.
#[derive(Default)]
pub struct Scope {
    vars: RwLock<FxHashMap<String, Value>>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    /// A scope with no parent.
    pub fn root() -> Arc<Scope> {
        Arc::new(Scope::default())
    }

    /// A new scope nested in `parent`.
    pub fn child(parent: &Arc<Scope>) -> Arc<Scope> {
        Arc::new(Scope {
            vars: RwLock::default(),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Declare `name` in this scope, shadowing outer bindings.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.vars.write().insert(name.into(), value);
    }

    /// Look `name` up through the scope chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.vars.read().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Run `f` on the nearest binding of `name`. Returns `None` when the
    /// name is not bound anywhere in the chain.
    ///
    /// The slot is locked for the duration of `f`; it must not re-enter
    /// the interpreter.
    pub fn with_slot<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut scope = self;
        loop {
            {
                let mut vars = scope.vars.write();
                if let Some(slot) = vars.get_mut(name) {
                    return Some(f(slot));
                }
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Assign to the nearest binding of `name`.
    pub fn set(&self, name: &str, value: Value) -> bool {
        self.with_slot(name, |slot| *slot = value).is_some()
    }

    /// Names bound directly in this scope.
    pub fn names(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }
}

/// Owner of the scopes captured by closures during one execution.
#[derive(Default)]
pub struct Heap {
    scopes: Mutex<Vec<Arc<Scope>>>,
    adopted: Mutex<Vec<Arc<Heap>>>,
}

impl Heap {
    pub fn new() -> Arc<Heap> {
        Arc::new(Heap::default())
    }

    /// Keep `scope` alive as long as this heap.
    pub fn retain(&self, scope: &Arc<Scope>) {
        let mut scopes = self.scopes.lock();
        if !scopes.last().is_some_and(|last| Arc::ptr_eq(last, scope)) {
            scopes.push(Arc::clone(scope));
        }
    }

    /// Keep another heap alive as long as this one, e.g. the heap of a
    /// module whose exports this execution holds.
    pub fn adopt(&self, other: &Arc<Heap>) {
        let mut adopted = self.adopted.lock();
        if !adopted.iter().any(|h| Arc::ptr_eq(h, other)) {
            adopted.push(Arc::clone(other));
        }
    }

    /// Number of scopes retained directly by this heap.
    pub fn len(&self) -> usize {
        self.scopes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("scopes", &self.scopes.lock().len())
            .field("adopted", &self.adopted.lock().len())
            .finish()
    }
}
