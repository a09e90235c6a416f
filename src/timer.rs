use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies a component that registers timers, for bulk cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Returns a process-unique owner id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque payload distinguishing registrations made by the same owner.
///
/// Cancellation is matched on the `(owner, token)` pair alone; the delay
/// and repeat parameters of the original registration play no part in the
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    /// Returns a process-unique token.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct Registration {
    seq: u64,
    task: JoinHandle<()>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct TimerInner {
    runtime: Handle,
    registrations: DashMap<(OwnerId, Token), Registration>,
    seq: AtomicU64,
}

/// Schedules delayed callback invocations on a Tokio runtime.
///
/// Each registration is identified by an `(owner, token)` pair and runs as
/// its own task; cancelling a registration aborts the task, so a cancelled
/// callback never fires. A fired one-shot registration deregisters itself.
///
/// Handles are cheap to clone and share a single registration table, so one
/// timer can serve many components, each cancelling only its own
/// registrations via its [`OwnerId`].
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    /// Creates a timer bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. The timer
    /// requires a runtime to run its registration tasks.
    pub fn new() -> Self {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => panic!(
                "keepsake::Timer requires a Tokio runtime. \
                 Ensure you are calling Timer::new() from within a #[tokio::main] \
                 or #[tokio::test] context, or from code running on a Tokio runtime."
            ),
        };
        Self {
            inner: Arc::new(TimerInner {
                runtime,
                registrations: DashMap::new(),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Schedules `callback` to run once after `delay`, then every `repeat`
    /// interval if one is given.
    ///
    /// If a registration with the same `(owner, token)` identity already
    /// exists it is replaced: the previous callback is cancelled and will
    /// not fire.
    pub fn schedule<F>(
        &self,
        owner: OwnerId,
        token: Token,
        delay: Duration,
        repeat: Option<Duration>,
        callback: F,
    ) where
        F: Fn() + Send + 'static,
    {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);
        trace!(?owner, ?token, ?delay, ?repeat, "scheduling timer");
        let task = self.inner.runtime.spawn(run_registration(
            registry, owner, token, seq, delay, repeat, callback,
        ));
        // Replacing an existing registration drops it, aborting its task.
        self.inner
            .registrations
            .insert((owner, token), Registration { seq, task });
        // A very short one-shot can fire before the insert above; it will
        // have found nothing to deregister, so reap it here.
        self.inner
            .registrations
            .remove_if(&(owner, token), |_, reg| {
                reg.seq == seq && reg.task.is_finished()
            });
    }

    /// Cancels the registration identified by `(owner, token)`.
    ///
    /// Idempotent; no-op if no matching registration exists.
    pub fn cancel(&self, owner: OwnerId, token: Token) {
        if self.inner.registrations.remove(&(owner, token)).is_some() {
            trace!(?owner, ?token, "cancelled timer");
        }
    }

    /// Cancels every registration made by `owner`.
    pub fn cancel_all(&self, owner: OwnerId) {
        trace!(?owner, "cancelling all registrations");
        self.inner.registrations.retain(|key, _| key.0 != owner);
    }

    /// Number of currently active registrations, across all owners.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.registrations.len()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_registration<F>(
    registry: Weak<TimerInner>,
    owner: OwnerId,
    token: Token,
    seq: u64,
    delay: Duration,
    repeat: Option<Duration>,
    callback: F,
) where
    F: Fn() + Send + 'static,
{
    tokio::time::sleep(delay).await;
    match repeat {
        Some(every) => loop {
            callback();
            tokio::time::sleep(every).await;
        },
        None => {
            callback();
            // Deregister, unless a newer registration took over the identity.
            if let Some(registry) = registry.upgrade() {
                registry
                    .registrations
                    .remove_if(&(owner, token), |_, reg| reg.seq == seq);
            }
        }
    }
}
