//! A named set of worker threads with an init barrier and joint shutdown.

use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::error::panic_message;

struct InitProgress {
    completed: usize,
    failed: bool,
}

struct InitState {
    progress: Mutex<InitProgress>,
    changed: Condvar,
}

/// One-shot token handed to each worker routine. Consuming it marks the
/// routine's initialisation phase as complete; dropping it un-consumed
/// (early return, panic, or a failed spawn) counts as an init error and
/// fails the whole group's [`WorkerGroup::wait_init`].
pub(crate) struct InitDone {
    state: Arc<InitState>,
    signalled: bool,
}

impl InitDone {
    /// Reports successful initialisation.
    pub(crate) fn done(mut self) {
        self.signalled = true;
        let mut progress = self.state.progress.lock();
        progress.completed += 1;
        drop(progress);
        self.state.changed.notify_all();
    }
}

impl Drop for InitDone {
    fn drop(&mut self) {
        if !self.signalled {
            let mut progress = self.state.progress.lock();
            progress.failed = true;
            drop(progress);
            self.state.changed.notify_all();
        }
    }
}

pub(crate) struct WorkerGroup {
    name: String,
    expected: usize,
    workers: Vec<JoinHandle<()>>,
    init: Arc<InitState>,
}

impl WorkerGroup {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        WorkerGroup {
            name: name.into(),
            expected: 0,
            workers: Vec::new(),
            init: Arc::new(InitState {
                progress: Mutex::new(InitProgress {
                    completed: 0,
                    failed: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Spawns a named worker running `routine(done)` and bumps the expected
    /// init count. A panic after `done` was consumed is fatal only for that
    /// worker: it is logged and the group stays joinable.
    pub(crate) fn attach<F>(&mut self, name: &str, routine: F) -> io::Result<()>
    where
        F: FnOnce(InitDone) + Send + 'static,
    {
        self.expected += 1;
        let done = InitDone {
            state: Arc::clone(&self.init),
            signalled: false,
        };
        let group = self.name.clone();
        let worker = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.name, name))
            .spawn(move || {
                // An unwind before `done()` drops the token and flags the
                // init error, mirroring it for wait_init.
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| routine(done))) {
                    error!(
                        group = %group,
                        worker = %worker,
                        cause = panic_message(payload.as_ref()),
                        "worker thread panicked"
                    );
                }
            })?;
        // On a spawn error the closure (and the token) was just dropped,
        // which already flagged the init failure.
        self.workers.push(handle);
        Ok(())
    }

    /// Blocks until every attached worker finished initialising, or any
    /// worker failed init. `false` on init error.
    pub(crate) fn wait_init(&self) -> bool {
        let mut progress = self.init.progress.lock();
        while progress.completed < self.expected && !progress.failed {
            self.init.changed.wait(&mut progress);
        }
        !progress.failed
    }

    /// Joins all workers; idempotent.
    pub(crate) fn join(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.join();
    }
}
