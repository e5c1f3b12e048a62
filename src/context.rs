//! Runtime context: the wiring between managed-side entry points and the
//! native object system.
//!
//! One context owns the type registry and the finalizer queue and holds the
//! collaborator seams. The C surface keeps a single process-wide context;
//! tests build as many isolated ones as they need.

use std::ffi::c_void;
use std::sync::Arc;
use std::thread;

use crate::dbg_log;
use crate::diag;
use crate::finalize::{FinalizationRequest, FinalizerQueue};
use crate::registry::{TypeRegistry, TypeTag};
use crate::system::{IdleScheduler, ObjectSystem, Property, RawBoxed, RawObject};

pub struct RuntimeContext {
    system: Arc<dyn ObjectSystem>,
    idle: Arc<dyn IdleScheduler>,
    registry: TypeRegistry,
    finalizers: FinalizerQueue,
}

impl RuntimeContext {
    pub fn new(system: Arc<dyn ObjectSystem>, idle: Arc<dyn IdleScheduler>) -> Self {
        Self {
            system,
            idle,
            registry: TypeRegistry::new(),
            finalizers: FinalizerQueue::new(),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Construct an instance of `tag` from a property list and normalize its
    /// ownership.
    ///
    /// Whatever the type's reference convention, the caller ends up holding
    /// exactly one counted reference, to be released later through
    /// [`defer_unref`](Self::defer_unref). A null handle is the native
    /// allocator's failure, propagated as-is.
    pub fn construct(&self, tag: TypeTag, props: &[Property]) -> RawObject {
        let _group = diag::lock_if_enabled();
        dbg_log!(
            "Creating a new object of type {} [thread: {:?}]",
            self.registry.name_or_unknown(tag),
            thread::current().id()
        );

        let obj = self.system.construct(tag, props);

        // An initially-unowned instance may or may not be floating after
        // construction. ref_sink covers both cases: it claims the floating
        // reference, or adds one that we own. Other types are born with a
        // counted reference the caller takes over implicitly.
        if !obj.is_null() && self.registry.is_initially_unowned(self.system.instance_type(obj)) {
            self.system.ref_sink(obj);
        }

        dbg_log!("\tdone, got a pointer at {:p}", obj.0);

        obj
    }

    /// Runtime type check tolerant of null: a null instance logs the failed
    /// check and returns false, never faults. Non-null instances match iff
    /// their runtime type is `ty` or descends from it.
    pub fn check_instance_type(&self, instance: RawObject, ty: TypeTag) -> bool {
        if instance.is_null() {
            dbg_log!("Check failed: got a null pointer");
            return false;
        }
        self.registry.is_a(self.system.instance_type(instance), ty)
    }

    /// Schedule the release of this crate's counted reference to `obj` on
    /// the event-loop thread. Fire-and-forget: never blocks beyond the
    /// enqueue, never fails observably. The caller must not touch `obj`
    /// afterwards.
    pub fn defer_unref(&self, obj: RawObject) {
        self.finalizers.submit(FinalizationRequest::ObjectUnref(obj));
        self.idle.schedule();
    }

    /// Schedule the one-time free of a boxed value on the event-loop thread.
    /// Same discipline as [`defer_unref`](Self::defer_unref).
    pub fn defer_boxed_free(&self, tag: TypeTag, value: RawBoxed) {
        self.finalizers
            .submit(FinalizationRequest::BoxedFree(tag, value));
        self.idle.schedule();
    }

    /// Diagnostic-only marker that this crate stops tracking `obj` without
    /// releasing it (another owner claimed the reference through a different
    /// path). Logs the handle's type and refcount; changes nothing.
    pub fn disown(&self, obj: RawObject) {
        let Some(_group) = diag::lock_if_enabled() else {
            return;
        };
        dbg_log!(
            "Disowning an object at {:p} [thread: {:?}]",
            obj.0,
            thread::current().id()
        );
        dbg_log!(
            "\tIt is of type {}",
            self.registry.name_or_unknown(self.system.instance_type(obj))
        );
        dbg_log!(
            "\tIts refcount before disowning is {}",
            self.system.ref_count(obj)
        );
    }

    /// Release a callback trampoline pointer. Null is tolerated and ignored,
    /// unlike the raw primitive underneath, which would fault.
    pub fn release_callback(&self, ptr: *mut c_void) {
        if !ptr.is_null() {
            self.system.release_callback(ptr);
        }
    }

    /// Dispatch every pending finalization request. Must be called on the
    /// thread that owns the event loop. Returns the number dispatched.
    pub fn pump(&self) -> usize {
        self.finalizers.drain(self.system.as_ref(), &self.registry)
    }

    /// Number of finalization requests waiting for the next pump.
    pub fn pending_finalizers(&self) -> u64 {
        self.finalizers.len()
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("finalizers", &self.finalizers)
            .finish()
    }
}
