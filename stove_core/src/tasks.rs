//! Named long-running threads with a shared cancellation token.
//!
//! `TaskGroup` owns every control loop of a running stove. Each task receives a
//! `Shutdown` token; requesting shutdown (from the group, a signal handler, or a
//! task that panicked) wakes every `Shutdown::sleep` immediately.

use crossbeam_channel as xch;
use eyre::WrapErr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;

struct State {
    requested: AtomicBool,
    // Dropping the sender disconnects every receiver, waking all sleepers at once
    trigger: Mutex<Option<xch::Sender<()>>>,
}

/// Cloneable cancellation token.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<State>,
    rx: xch::Receiver<()>,
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("requested", &self.is_requested())
            .finish()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = xch::bounded(0);
        Self {
            state: Arc::new(State {
                requested: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
            }),
            rx,
        }
    }

    pub fn request(&self) {
        self.state.requested.store(true, Ordering::SeqCst);
        let mut trigger = self
            .state
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trigger.take();
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `d`. Returns `false` if shutdown was requested before or during the sleep.
    pub fn sleep(&self, d: Duration) -> bool {
        if self.is_requested() {
            return false;
        }
        match self.rx.recv_timeout(d) {
            Err(xch::RecvTimeoutError::Timeout) => !self.is_requested(),
            _ => false,
        }
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        while !self.is_requested() {
            // Only disconnection ends the recv; nothing is ever sent
            let _ = self.rx.recv();
        }
    }

    /// Receiver that disconnects on shutdown, for use in `select!`.
    pub fn receiver(&self) -> &xch::Receiver<()> {
        &self.rx
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests shutdown if the owning task unwinds.
struct PanicGuard {
    name: String,
    shutdown: Shutdown,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(task = %self.name, "task panicked, shutting down the group");
            self.shutdown.request();
        }
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// Structured set of threads that start together and stop together.
pub struct TaskGroup {
    shutdown: Shutdown,
    tasks: Vec<(String, JoinHandle<()>)>,
    hooks: Vec<(String, Hook)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::with_token(Shutdown::new())
    }

    /// Group driven by an existing token, e.g. one shared with a signal handler.
    pub fn with_token(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn token(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task and block until its thread is running.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce(Shutdown) + Send + 'static,
    {
        let name = name.into();
        let (ready_tx, ready_rx) = xch::bounded::<()>(1);
        let token = self.shutdown.clone();
        let guard_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let guard = PanicGuard {
                    name: guard_name,
                    shutdown: token.clone(),
                };
                let _ = ready_tx.send(());
                tracing::debug!(task = %guard.name, "task started");
                task(token);
                tracing::debug!(task = %guard.name, "task finished");
            })
            .wrap_err_with(|| format!("spawning task {name}"))?;
        // A disconnect here means the thread died before signalling; join surfaces it later
        let _ = ready_rx.recv();
        self.tasks.push((name, handle));
        Ok(())
    }

    /// Run `hook` on shutdown after the token fires and before tasks are joined.
    pub fn on_shutdown(&mut self, name: impl Into<String>, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push((name.into(), Box::new(hook)));
    }

    /// Request shutdown, run hooks in registration order, then join every task.
    pub fn shutdown(&mut self) {
        self.shutdown.request();
        for (name, hook) in self.hooks.drain(..) {
            tracing::debug!(hook = %name, "running shutdown hook");
            hook();
        }
        for (name, handle) in self.tasks.drain(..) {
            match handle.join() {
                Ok(()) => tracing::trace!(task = %name, "task joined"),
                Err(e) => tracing::warn!(task = %name, ?e, "task panicked"),
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn sleep_returns_early_on_request() {
        let token = Shutdown::new();
        let t = token.clone();
        let h = std::thread::spawn(move || {
            let start = Instant::now();
            let completed = t.sleep(Duration::from_secs(30));
            (completed, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        token.request();
        let (completed, took) = h.join().expect("join");
        assert!(!completed);
        assert!(took < Duration::from_secs(5));
    }

    #[test]
    fn sleep_completes_without_request() {
        let token = Shutdown::new();
        assert!(token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn hooks_run_before_join() {
        let hook_ran = Arc::new(AtomicBool::new(false));
        let seen_by_task = Arc::new(AtomicBool::new(false));
        let mut group = TaskGroup::new();
        let (h, seen) = (Arc::clone(&hook_ran), Arc::clone(&seen_by_task));
        group
            .spawn("loop", move |sd| {
                sd.wait();
                let deadline = Instant::now() + Duration::from_secs(5);
                while !h.load(Ordering::SeqCst) && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
                seen.store(h.load(Ordering::SeqCst), Ordering::SeqCst);
            })
            .expect("spawn");
        let h = Arc::clone(&hook_ran);
        group.on_shutdown("motor-off", move || h.store(true, Ordering::SeqCst));
        group.shutdown();
        assert!(seen_by_task.load(Ordering::SeqCst));
        assert!(group.is_empty());
    }

    #[test]
    fn panicking_task_cancels_siblings() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new();
        let s = Arc::clone(&stopped);
        group
            .spawn("steady", move |sd| {
                sd.wait();
                s.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn");
        group
            .spawn("faulty", |_| panic!("sensor thread exploded"))
            .expect("spawn");
        let token = group.token();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !token.is_requested() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(token.is_requested());
        drop(group);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}
