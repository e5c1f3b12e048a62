//! Deferred finalization queue for native handles.
//!
//! ## Problem
//!
//! Some native finalizers assume they run on the thread that owns the event
//! loop (thread-affine resource cleanup). Managed-side wrappers, however,
//! are collected on arbitrary garbage-collector or worker threads, which
//! must not invoke those finalizers inline.
//!
//! ## Solution
//!
//! Queue every release request, wake the loop, and dispatch the whole batch
//! from the loop's idle phase on its own thread. Submission is
//! fire-and-forget: it never blocks beyond the queue lock and never reports
//! failure to the caller.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::dbg_log;
use crate::diag;
use crate::registry::{TypeRegistry, TypeTag};
use crate::system::{ObjectSystem, RawBoxed, RawObject};

/// One scheduled release, consumed exactly once by the dispatch step.
#[derive(Debug)]
pub enum FinalizationRequest {
    /// Drop this crate's counted reference; the native system destroys the
    /// object when the count reaches zero.
    ObjectUnref(RawObject),
    /// Free a boxed value of the given type.
    BoxedFree(TypeTag, RawBoxed),
}

// SAFETY: FinalizationRequest is Send because:
// - the submitting thread gives up all access to the handle on submission
// - the pointer is only handed back to the native system, on the loop thread
// - the native refcount itself is thread-safe at the native layer
unsafe impl Send for FinalizationRequest {}

/// Thread-safe queue of pending finalization requests, drained by the
/// event-loop thread.
pub struct FinalizerQueue {
    queue: Mutex<VecDeque<FinalizationRequest>>,

    /// Fast check for pending items (avoids lock acquisition on hot path).
    pending: AtomicU64,
}

impl Default for FinalizerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FinalizerQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(8)),
            pending: AtomicU64::new(0),
        }
    }

    /// Enqueue a release request from any thread. The caller must not touch
    /// the contained handle afterwards.
    pub fn submit(&self, request: FinalizationRequest) {
        self.queue
            .lock()
            .expect("finalizer queue poisoned")
            .push_back(request);
        self.pending.fetch_add(1, Ordering::Release);

        tracing::trace!("Deferred a native release (pending: {})", self.len());
    }

    /// Lock-free check for pending requests.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Number of pending requests.
    #[inline]
    pub fn len(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Dispatch every pending request. Must be called on the thread that
    /// owns the event loop; each request is consumed exactly once. Returns
    /// the number dispatched.
    pub fn drain(&self, system: &dyn ObjectSystem, registry: &TypeRegistry) -> usize {
        // Fast path: nothing queued.
        if !self.has_pending() {
            return 0;
        }

        let batch: VecDeque<FinalizationRequest> = {
            let mut queue = self.queue.lock().expect("finalizer queue poisoned");
            std::mem::take(&mut *queue)
        };

        let count = batch.len();
        if count == 0 {
            return 0;
        }

        for request in batch {
            dispatch(request, system, registry);
        }

        self.pending.fetch_sub(count as u64, Ordering::Release);
        tracing::trace!("Dispatched {} deferred native releases", count);

        count
    }
}

/// Execute one release on the loop thread, with its diagnostic bracket held
/// under a single log-stream guard so the group stays contiguous.
fn dispatch(request: FinalizationRequest, system: &dyn ObjectSystem, registry: &TypeRegistry) {
    match request {
        FinalizationRequest::ObjectUnref(obj) => {
            let _group = diag::lock_if_enabled();
            dbg_log!(
                "Unref of {:p} from idle callback [thread: {:?}]",
                obj.0,
                thread::current().id()
            );
            dbg_log!(
                "\tIt is of type {}",
                registry.name_or_unknown(system.instance_type(obj))
            );
            dbg_log!("\tIts refcount before unref is {}", system.ref_count(obj));

            system.unref(obj);

            dbg_log!("\tUnref done");
        }
        FinalizationRequest::BoxedFree(tag, value) => {
            let _group = diag::lock_if_enabled();
            dbg_log!(
                "Freeing a boxed value at {:p} from idle callback [thread: {:?}]",
                value.0,
                thread::current().id()
            );
            dbg_log!("\tIt is of type {}", registry.name_or_unknown(tag));

            system.boxed_free(tag, value);

            dbg_log!("\tdone freeing {:p}", value.0);
        }
    }
}

impl std::fmt::Debug for FinalizerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizerQueue")
            .field("pending", &self.len())
            .finish()
    }
}
