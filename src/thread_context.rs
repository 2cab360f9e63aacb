use crate::WbemResult;
use log::{debug, error};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

/// Identifies one live subscription across the bridge's registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-thread setup for delivery threads.
///
/// WMI invokes sinks on worker threads it owns. Embedders that forward rows
/// into another runtime (a JVM, a CLR, an interpreter) usually must register
/// such a thread before its first callback and unregister it once no
/// subscription uses it anymore. The bridge guarantees:
///
/// * [`attach`](Self::attach) runs at most once per thread, on that thread,
///   before the first delivery it carries;
/// * [`detach`](Self::detach) runs only on the thread being detached, and
///   only after the last subscription active on it has terminated.
pub trait ThreadContextHooks: Send + Sync {
    fn attach(&self) -> WbemResult<()>;
    fn detach(&self) -> WbemResult<()>;
}

/// Hooks for embedders that need no per-thread setup.
pub struct NoopThreadContextHooks;

impl ThreadContextHooks for NoopThreadContextHooks {
    fn attach(&self) -> WbemResult<()> {
        Ok(())
    }

    fn detach(&self) -> WbemResult<()> {
        Ok(())
    }
}

/// Tracks which delivery threads are attached and which subscriptions are
/// active on each. This is the bridge's only shared mutable state; every read
/// and write holds the one registry lock for its duration.
pub struct ThreadContextRegistry {
    hooks: Arc<dyn ThreadContextHooks>,
    threads: Mutex<HashMap<ThreadId, HashSet<SubscriptionId>>>,
}

impl ThreadContextRegistry {
    pub fn new(hooks: Arc<dyn ThreadContextHooks>) -> Self {
        Self {
            hooks,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `sub` is delivering on the current thread, attaching the
    /// thread first if it has never been seen. The attach hook runs under
    /// the registry lock, so two racing deliveries cannot attach one thread
    /// twice.
    pub fn acquire(&self, sub: SubscriptionId) {
        let current = thread::current().id();
        let mut threads = self.threads.lock().unwrap();

        match threads.get_mut(&current) {
            Some(subs) => {
                subs.insert(sub);
            }
            None => {
                if let Err(e) = self.hooks.attach() {
                    // The thread is not recorded, so the attach is retried on
                    // the next delivery it carries.
                    error!("Failed to attach delivery thread {:?}: {}", current, e);
                    return;
                }

                debug!("Attached delivery thread {:?}", current);
                threads.insert(current, HashSet::from([sub]));
            }
        }
    }

    /// Remove `sub` from every thread it was active on.
    ///
    /// A thread left without active subscriptions is detached when it is the
    /// current thread. Detaching a foreign thread is unsafe; such a thread is
    /// dropped from the registry with an error and stays attached.
    pub fn release(&self, sub: SubscriptionId) {
        let current = thread::current().id();
        let mut threads = self.threads.lock().unwrap();

        threads.retain(|thread_id, subs| {
            subs.remove(&sub);

            if !subs.is_empty() {
                return true;
            }

            if *thread_id == current {
                match self.hooks.detach() {
                    Ok(()) => debug!("Detached delivery thread {:?}", thread_id),
                    Err(e) => error!("Failed to detach delivery thread {:?}: {}", thread_id, e),
                }
            } else {
                error!(
                    "Can't detach thread {:?} from thread {:?}; it stays attached",
                    thread_id, current
                );
            }

            false
        });
    }

    /// The number of threads currently attached.
    pub fn active_threads(&self) -> usize {
        self.threads.lock().unwrap().len()
    }
}
