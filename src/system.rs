//! Seams to the external collaborators: the native object system and the
//! host event loop.
//!
//! The object system's refcounting and the loop's idle dispatch are
//! pre-existing, thread-safe facilities; this crate only drives them. In
//! production both are reached through a [`HostVtable`] of C function
//! pointers installed once at startup by the generated binding layer. Tests
//! substitute in-process implementations of the two traits.

use std::ffi::c_void;
use std::ptr;

use libc::{c_char, c_uint};

use crate::registry::TypeTag;

/// Opaque pointer to a native refcounted object. This crate holds at most
/// one counted reference per handle it manages; the native system may hold
/// more.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RawObject(pub *mut c_void);

impl RawObject {
    pub const NULL: RawObject = RawObject(ptr::null_mut());

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Opaque pointer to a native boxed value: heap-allocated, not refcounted,
/// released with a single free.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RawBoxed(pub *mut c_void);

impl RawBoxed {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// One (name, value) pair for batch construction. Both pointers are owned by
/// the caller for the duration of the call and are opaque to this crate; the
/// marshaling format is the native system's business.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Property {
    pub name: *const c_char,
    pub value: *const c_void,
}

/// Operations of the native object system consumed by this crate.
///
/// Implementations must be callable from any thread; the native layer's own
/// refcounting is assumed thread-safe.
pub trait ObjectSystem: Send + Sync {
    /// Allocate and initialize an instance of `tag` in one call. Returns a
    /// null handle on allocator failure.
    fn construct(&self, tag: TypeTag, props: &[Property]) -> RawObject;

    /// Atomically claim a floating reference, or add an owned one if the
    /// instance is not floating.
    fn ref_sink(&self, obj: RawObject) -> RawObject;

    /// Drop one counted reference; the native system destroys the object
    /// when the count reaches zero.
    fn unref(&self, obj: RawObject);

    /// Current reference count, for diagnostics.
    fn ref_count(&self, obj: RawObject) -> u32;

    /// Runtime type of a live instance.
    fn instance_type(&self, obj: RawObject) -> TypeTag;

    /// Free a boxed value of the given type.
    fn boxed_free(&self, tag: TypeTag, value: RawBoxed);

    /// The managed runtime's raw trampoline-release primitive. Faults on
    /// null; callers go through [`RuntimeContext::release_callback`] instead.
    ///
    /// [`RuntimeContext::release_callback`]: crate::context::RuntimeContext::release_callback
    fn release_callback(&self, ptr: *mut c_void);
}

/// Hook asking the host event loop to run the finalizer pump on its own
/// thread soon.
///
/// `schedule` must be cheap and non-blocking; a spurious call is harmless
/// because the pump finds an empty queue and does nothing.
pub trait IdleScheduler: Send + Sync {
    fn schedule(&self);
}

/// Scheduler for hosts that poll the finalizer pump themselves instead of
/// being woken per submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl IdleScheduler for NoopScheduler {
    fn schedule(&self) {}
}

/// C function-pointer table installed by the generated binding layer at
/// startup via `gi_runtime_init`. `user_data` is passed back verbatim to
/// every callback.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostVtable {
    pub construct: unsafe extern "C" fn(
        tag: u64,
        n_props: c_uint,
        names: *const *const c_char,
        values: *const *const c_void,
        user_data: *mut c_void,
    ) -> *mut c_void,
    pub ref_sink: unsafe extern "C" fn(obj: *mut c_void, user_data: *mut c_void) -> *mut c_void,
    pub unref: unsafe extern "C" fn(obj: *mut c_void, user_data: *mut c_void),
    pub ref_count: unsafe extern "C" fn(obj: *mut c_void, user_data: *mut c_void) -> u32,
    pub instance_type: unsafe extern "C" fn(obj: *mut c_void, user_data: *mut c_void) -> u64,
    pub boxed_free: unsafe extern "C" fn(tag: u64, value: *mut c_void, user_data: *mut c_void),
    pub release_callback: unsafe extern "C" fn(ptr: *mut c_void, user_data: *mut c_void),
    /// Optional wake-up for the host loop; absent for hosts that poll.
    pub schedule_idle: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub user_data: *mut c_void,
}

/// Adapter driving a [`HostVtable`] through the two trait seams.
pub(crate) struct VtableSystem {
    vt: HostVtable,
}

impl VtableSystem {
    pub(crate) fn new(vt: HostVtable) -> Self {
        Self { vt }
    }
}

// SAFETY: the vtable is installed once at startup and never mutated. The
// host guarantees its callbacks and user_data are callable from any thread;
// the native refcounting they reach is thread-safe at that layer.
unsafe impl Send for VtableSystem {}
unsafe impl Sync for VtableSystem {}

impl ObjectSystem for VtableSystem {
    fn construct(&self, tag: TypeTag, props: &[Property]) -> RawObject {
        let names: Vec<*const c_char> = props.iter().map(|p| p.name).collect();
        let values: Vec<*const c_void> = props.iter().map(|p| p.value).collect();
        // SAFETY: the arrays match the advertised length; the host validates
        // the tag and the property pointers.
        let obj = unsafe {
            (self.vt.construct)(
                tag.0,
                props.len() as c_uint,
                names.as_ptr(),
                values.as_ptr(),
                self.vt.user_data,
            )
        };
        RawObject(obj)
    }

    fn ref_sink(&self, obj: RawObject) -> RawObject {
        // SAFETY: obj is a live handle per this crate's ownership rules.
        RawObject(unsafe { (self.vt.ref_sink)(obj.0, self.vt.user_data) })
    }

    fn unref(&self, obj: RawObject) {
        // SAFETY: obj is a live handle; this drops the one reference we own.
        unsafe { (self.vt.unref)(obj.0, self.vt.user_data) }
    }

    fn ref_count(&self, obj: RawObject) -> u32 {
        // SAFETY: obj is a live handle.
        unsafe { (self.vt.ref_count)(obj.0, self.vt.user_data) }
    }

    fn instance_type(&self, obj: RawObject) -> TypeTag {
        // SAFETY: obj is a live handle.
        TypeTag(unsafe { (self.vt.instance_type)(obj.0, self.vt.user_data) })
    }

    fn boxed_free(&self, tag: TypeTag, value: RawBoxed) {
        // SAFETY: value is an unreleased boxed pointer of type tag.
        unsafe { (self.vt.boxed_free)(tag.0, value.0, self.vt.user_data) }
    }

    fn release_callback(&self, ptr: *mut c_void) {
        // SAFETY: ptr is a live trampoline pointer, checked non-null by the
        // calling helper.
        unsafe { (self.vt.release_callback)(ptr, self.vt.user_data) }
    }
}

impl IdleScheduler for VtableSystem {
    fn schedule(&self) {
        if let Some(schedule_idle) = self.vt.schedule_idle {
            // SAFETY: per the HostVtable contract.
            unsafe { schedule_idle(self.vt.user_data) }
        }
    }
}
