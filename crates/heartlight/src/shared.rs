//! Shared state handles
//!
//! Pipeline state is shared between the polling loops and spawned actions as
//! `Arc<RwLock<T>>`. Guards are short-lived and never held across an await.
//! A poisoned lock still holds consistent data (every write installs whole
//! values), so the helpers recover the guard instead of propagating the panic.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
