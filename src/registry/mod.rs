//! Per-bus registries: handler sets and event factories.
//!
//! Both registries are shared between caller threads (publish and
//! registration) and the listener thread (decode and global dispatch), so
//! every map lives behind an `RwLock`. Dispatch works on a snapshot taken
//! under the read lock; no handler runs while a lock is held.

mod handlers;
mod types;

pub use handlers::HandlerRegistry;
pub use types::TypeRegistry;

use std::sync::{LockResult, RwLockReadGuard, RwLockWriteGuard};

// Critical sections never run handler code, so a poisoned lock still guards
// consistent data.
fn read<T>(result: LockResult<RwLockReadGuard<'_, T>>) -> RwLockReadGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(result: LockResult<RwLockWriteGuard<'_, T>>) -> RwLockWriteGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}
