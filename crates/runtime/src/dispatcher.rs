//! Single-threaded dispatch.
//!
//! The [`Dispatcher`] owns a dedicated thread running a current-thread tokio
//! runtime inside a [`LocalSet`]. Every job scheduled onto it, and every
//! local task a job spawns, executes on that one thread, one continuation at
//! a time - the cooperative scheduling model the supervision core relies on
//! for lock-free correctness of its shared state.
//!
//! External threads interact with the dispatcher only by submitting work:
//! [`Dispatcher::schedule`] enqueues a job and returns, and
//! [`Dispatcher::execute`] enqueues a job and blocks the caller until it has
//! run (running inline when the caller is already on the dispatch thread).
//!
//! Jobs may call `tokio::task::spawn_local` to start asynchronous work; the
//! spawned task's continuations interleave with later jobs on the same
//! thread.

use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the shared single-threaded executor.
pub struct Dispatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    thread_id: thread::ThreadId,
}

impl Dispatcher {
    /// Starts the dispatch thread. `name` labels the OS thread.
    pub fn new(name: &str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (id_tx, id_rx) = std::sync::mpsc::channel();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = id_tx.send(thread::current().id());

                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build dispatch runtime");

                let local = LocalSet::new();
                local.block_on(&runtime, async move {
                    while let Some(job) = rx.recv().await {
                        job();
                    }
                });

                // Local tasks still pending here are abandoned: shutdown is
                // cancellation, not a drain.
                tracing::debug!("dispatch thread exiting");
            })
            .expect("failed to spawn dispatch thread");

        let thread_id = id_rx
            .recv()
            .expect("dispatch thread died before reporting its id");

        Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
            thread_id,
        }
    }

    /// True when the caller is running on the dispatch thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Panics unless called on the dispatch thread. Entry points that mutate
    /// supervised state use this the way the original asserts its watchable
    /// thread.
    pub fn assert_current(&self) {
        assert!(self.is_current(), "must be called on the dispatch thread");
    }

    /// Enqueues `job` and returns immediately. Jobs run in submission order.
    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) {
        let sender = self.tx.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(Box::new(job)).is_err() {
                    tracing::warn!("dispatcher shut down; scheduled job dropped");
                }
            }
            None => tracing::warn!("dispatcher shut down; scheduled job dropped"),
        }
    }

    /// Enqueues `job`, blocks until it has run, and returns its result.
    ///
    /// Runs the job inline when already on the dispatch thread, so nesting
    /// `execute` inside a job cannot deadlock.
    pub fn execute<R: Send + 'static>(&self, job: impl FnOnce() -> R + Send + 'static) -> R {
        if self.is_current() {
            return job();
        }

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        self.schedule(move || {
            let _ = done_tx.send(job());
        });

        done_rx
            .recv()
            .expect("dispatcher shut down while executing job")
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel ends the job loop.
        self.tx.lock().take();

        if let Some(handle) = self.thread.lock().take() {
            if thread::current().id() != self.thread_id && handle.join().is_err() {
                tracing::error!("dispatch thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_execute_runs_on_dispatch_thread() {
        let dispatcher = Arc::new(Dispatcher::new("test-dispatch"));

        let probe = Arc::clone(&dispatcher);
        let on_thread = dispatcher.execute(move || probe.is_current());

        assert!(on_thread);
        assert!(!dispatcher.is_current());
    }

    #[test]
    fn test_scheduled_jobs_run_in_submission_order() {
        let dispatcher = Dispatcher::new("test-dispatch");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            dispatcher.schedule(move || seen.lock().push(i));
        }

        // A blocking execute acts as a barrier behind the scheduled jobs.
        dispatcher.execute(|| {});

        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_execute_nested_on_dispatch_thread_runs_inline() {
        let dispatcher = Arc::new(Dispatcher::new("test-dispatch"));

        let inner = Arc::clone(&dispatcher);
        let value = dispatcher.execute(move || inner.execute(|| 42));

        assert_eq!(value, 42);
    }

    #[test]
    fn test_local_tasks_interleave_with_jobs() {
        let dispatcher = Dispatcher::new("test-dispatch");
        let (tx, rx) = std::sync::mpsc::channel();

        dispatcher.schedule(move || {
            tokio::task::spawn_local(async move {
                tokio::task::yield_now().await;
                let _ = tx.send(7);
            });
        });

        let value = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("local task never ran");
        assert_eq!(value, 7);
    }
}
