//! Process-wide string interner.
//!
//! Deduplicates text values so that equal strings share one allocation.
//! Guarded by a single mutex acquired only for the insert/lookup, per the
//! "process-wide state initialized lazily" design note: in a
//! thread-local-storage target, per-thread interners would be acceptable as
//! long as identity is never compared across threads — this crate keeps a
//! single global pool since the VM itself is not exposed across threads.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

fn pool() -> &'static Mutex<HashSet<Arc<str>>> {
    static POOL: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Intern `s`, returning the shared, deduplicated handle.
pub fn intern(s: &str) -> Arc<str> {
    let mut guard = pool().lock().expect("string interner poisoned");
    if let Some(existing) = guard.get(s) {
        return Arc::clone(existing);
    }
    let arc: Arc<str> = Arc::from(s);
    guard.insert(Arc::clone(&arc));
    arc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_storage() {
        let a = intern("hello");
        let b = intern("hello");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_strings_do_not_share() {
        let a = intern("hello");
        let b = intern("world");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
