//! Thread identity: OS thread id -> currently-running logical task.
//!
//! The scheduler probe rewrites the binding on every running transition, so
//! the map always reflects the latest task a thread picked up; stale
//! bindings left by a dead task are swept best-effort and otherwise
//! self-heal on the next overwrite. Resolution is a single O(1) read with
//! no side effects — it runs on the hottest probe path there is.

use crate::atomic_map::FixedU64Map;
use crate::context::{TaskId, ThreadId};

/// OS thread -> running task bindings, at most one per thread.
pub struct ThreadBindings {
    map: FixedU64Map,
}

impl ThreadBindings {
    pub fn new(capacity: usize) -> Self {
        ThreadBindings {
            map: FixedU64Map::new(capacity),
        }
    }

    /// Bind `thread` to `task`, overwriting any previous binding.
    ///
    /// Best-effort: a full table drops the write.
    pub fn bind(&self, thread: ThreadId, task: TaskId) -> bool {
        self.map.insert(thread.0, task.0).is_ok()
    }

    /// The task currently bound to `thread`, if any.
    pub fn current_task(&self, thread: ThreadId) -> Option<TaskId> {
        self.map.get(thread.0).map(TaskId)
    }

    /// Sweep bindings still pointing at `task` (termination cleanup).
    pub fn unbind_task(&self, task: TaskId) {
        self.map.retire_value(task.0);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

/// Kernel thread id of the calling thread.
///
/// Probes execute on the application's own threads, so this is the same
/// identity the scheduler probe reported bindings under.
#[cfg(target_os = "linux")]
pub fn os_thread_id() -> ThreadId {
    // gettid(2) never fails.
    ThreadId(unsafe { libc::gettid() } as u64)
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn os_thread_id() -> ThreadId {
    ThreadId(unsafe { libc::pthread_self() } as u64)
}

#[cfg(not(unix))]
pub fn os_thread_id() -> ThreadId {
    use std::hash::{Hash, Hasher};
    let mut h = fnv::FnvHasher::default();
    std::thread::current().id().hash(&mut h);
    ThreadId(h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_resolve() {
        let threads = ThreadBindings::new(16);
        assert!(threads.bind(ThreadId(100), TaskId(7)));
        assert_eq!(threads.current_task(ThreadId(100)), Some(TaskId(7)));
        assert_eq!(threads.current_task(ThreadId(101)), None);
    }

    // Binding X to A then B must resolve to B, never A.
    #[test]
    fn test_rebind_overwrites() {
        let threads = ThreadBindings::new(16);
        threads.bind(ThreadId(100), TaskId(1));
        threads.bind(ThreadId(100), TaskId(2));
        assert_eq!(threads.current_task(ThreadId(100)), Some(TaskId(2)));
        assert_eq!(threads.len(), 1);
    }

    #[test]
    fn test_unbind_task_sweeps_all_threads() {
        let threads = ThreadBindings::new(16);
        threads.bind(ThreadId(100), TaskId(7));
        threads.bind(ThreadId(101), TaskId(7));
        threads.bind(ThreadId(102), TaskId(8));
        threads.unbind_task(TaskId(7));
        assert_eq!(threads.current_task(ThreadId(100)), None);
        assert_eq!(threads.current_task(ThreadId(101)), None);
        assert_eq!(threads.current_task(ThreadId(102)), Some(TaskId(8)));
    }

    #[test]
    fn test_os_thread_id_stable_within_thread() {
        let a = os_thread_id();
        let b = os_thread_id();
        assert_eq!(a, b);

        let other = std::thread::spawn(os_thread_id).join().unwrap();
        assert_ne!(a, other);
    }
}
