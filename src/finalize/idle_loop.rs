//! Owned dispatch thread for embedders that have no native event loop.
//!
//! Hosts with a real loop wire `HostVtable::schedule_idle` to their idle
//! machinery and call the pump from there. Embedders without one (tools,
//! test harnesses) can spawn an [`IdleLoop`] instead: a dedicated thread
//! that waits on a [`Notify`] and drains the finalizer queue, so releases
//! still happen on a single owning thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::Notify;

use crate::context::RuntimeContext;
use crate::system::IdleScheduler;

/// Scheduler that wakes an [`IdleLoop`] through its shared [`Notify`].
///
/// `notify_one` stores a permit when the loop is mid-pump, so a submission
/// racing with a drain still triggers the next wake-up.
#[derive(Clone)]
pub struct NotifyScheduler {
    notify: Arc<Notify>,
}

impl NotifyScheduler {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self { notify }
    }
}

impl IdleScheduler for NotifyScheduler {
    fn schedule(&self) {
        self.notify.notify_one();
    }
}

/// Dedicated finalizer-dispatch thread.
///
/// The thread runs a current-thread tokio runtime so the wait is a plain
/// `notified().await`; every pump call happens on this one thread, which is
/// the loop-owning thread as far as the finalization protocol is concerned.
pub struct IdleLoop {
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl IdleLoop {
    /// Spawn the dispatch thread. `notify` must be the same handle the
    /// context's [`NotifyScheduler`] was built from.
    pub fn spawn(ctx: Arc<RuntimeContext>, notify: Arc<Notify>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let loop_notify = notify.clone();

        let handle = thread::Builder::new()
            .name("finalizer-idle".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("finalizer idle-loop runtime");
                rt.block_on(async move {
                    while !loop_stop.load(Ordering::Acquire) {
                        loop_notify.notified().await;
                        let dispatched = ctx.pump();
                        if dispatched > 0 {
                            log::trace!("Idle loop dispatched {} finalizers", dispatched);
                        }
                    }
                    // Requests submitted between the last pump and the stop
                    // signal still run before the thread exits.
                    ctx.pump();
                });
            })
            .expect("spawn finalizer idle-loop thread");
        let thread_id = handle.thread().id();

        Self {
            stop,
            notify,
            handle: Some(handle),
            thread_id,
        }
    }

    /// Identity of the dispatch thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop the loop and wait for it to drain and exit.
    pub fn shutdown(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            handle.join().expect("finalizer idle-loop thread panicked");
        }
    }

    fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

impl Drop for IdleLoop {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
