//! C-callable entry points consumed by generated binding code.
//!
//! The binding layer installs a [`HostVtable`] once via `gi_runtime_init`,
//! registers its types, and then funnels every construction, type check and
//! disposal through these symbols. Pointers cross this boundary untyped;
//! everything behind it is the safe surface of [`RuntimeContext`].

use std::ffi::{CStr, c_void};
use std::ptr;
use std::slice;
use std::sync::{Arc, OnceLock};

use libc::{c_char, c_int, c_uint};

use crate::context::RuntimeContext;
use crate::diag;
use crate::registry::{TypeFlags, TypeTag};
use crate::system::{HostVtable, Property, RawBoxed, RawObject, VtableSystem};

static RUNTIME: OnceLock<RuntimeContext> = OnceLock::new();

fn runtime() -> Option<&'static RuntimeContext> {
    let ctx = RUNTIME.get();
    if ctx.is_none() {
        log::error!("gobject-interop entry point called before gi_runtime_init");
    }
    ctx
}

/// Install the host vtable. Must be called exactly once, before any other
/// entry point. Returns false on a null vtable or repeated initialization.
///
/// # Safety
///
/// `vtable` must point to a valid [`HostVtable`] whose callbacks remain
/// callable from any thread for the rest of the process lifetime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_runtime_init(vtable: *const HostVtable) -> bool {
    if vtable.is_null() {
        return false;
    }
    // SAFETY: checked non-null; the table is copied, so the host's storage
    // only needs to outlive this call.
    let vtable = unsafe { *vtable };
    let system = Arc::new(VtableSystem::new(vtable));
    RUNTIME.set(RuntimeContext::new(system.clone(), system)).is_ok()
}

/// Register a native type with the runtime's registry. `parent` of 0 means a
/// root type. Returns false on a reserved tag, an unknown parent, a
/// duplicate tag, or a missing init.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_type_register(
    tag: u64,
    parent: u64,
    name: *const c_char,
    flags: c_uint,
) -> bool {
    let Some(ctx) = runtime() else { return false };
    if name.is_null() {
        return false;
    }
    // SAFETY: checked non-null, NUL-terminated per the contract above.
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    let parent = (parent != 0).then_some(TypeTag(parent));

    match ctx
        .registry()
        .register(TypeTag(tag), &name, parent, TypeFlags::from_bits_truncate(flags))
    {
        Ok(()) => true,
        Err(err) => {
            log::error!("Type registration failed for {:#x}: {}", tag, err);
            false
        }
    }
}

/// Construct an instance of `tag` from `n_props` properties given as
/// parallel (name, value) arrays. The result is never floating and the
/// caller owns exactly one counted reference to it. A null return is the
/// native allocator's failure, propagated unchanged.
///
/// # Safety
///
/// When `n_props` is non-zero, `names` and `values` must each point to
/// `n_props` valid entries, live for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_object_new(
    tag: u64,
    n_props: c_uint,
    names: *const *const c_char,
    values: *const *const c_void,
) -> *mut c_void {
    let Some(ctx) = runtime() else {
        return ptr::null_mut();
    };

    let n_props = n_props as usize;
    let props: Vec<Property> = if n_props == 0 {
        Vec::new()
    } else {
        if names.is_null() || values.is_null() {
            log::error!("gi_object_new: property arrays are null");
            return ptr::null_mut();
        }
        // SAFETY: both arrays have n_props entries per the contract above.
        let names = unsafe { slice::from_raw_parts(names, n_props) };
        let values = unsafe { slice::from_raw_parts(values, n_props) };
        names
            .iter()
            .zip(values)
            .map(|(&name, &value)| Property { name, value })
            .collect()
    };

    ctx.construct(TypeTag(tag), &props).0
}

/// Runtime type check: 1 iff `instance` is non-null and its type is `tag` or
/// a descendant. Null is tolerated (logged, returns 0).
///
/// # Safety
///
/// A non-null `instance` must be a live handle of the installed object
/// system.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_check_instance_type(instance: *mut c_void, tag: u64) -> c_int {
    let Some(ctx) = runtime() else { return 0 };
    c_int::from(ctx.check_instance_type(RawObject(instance), TypeTag(tag)))
}

/// Schedule the release of the crate's counted reference to `obj` on the
/// event-loop thread. Fire-and-forget; the caller must not touch `obj`
/// again after this returns.
///
/// # Safety
///
/// `obj` must be a live handle whose one crate-owned reference has not been
/// scheduled for release before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_object_unref(obj: *mut c_void) {
    if let Some(ctx) = runtime() {
        ctx.defer_unref(RawObject(obj));
    }
}

/// Schedule the one-time free of a boxed value on the event-loop thread.
///
/// # Safety
///
/// `value` must be an unreleased boxed value of type `tag`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_boxed_free(tag: u64, value: *mut c_void) {
    if let Some(ctx) = runtime() {
        ctx.defer_boxed_free(TypeTag(tag), RawBoxed(value));
    }
}

/// Log that the crate stops tracking `obj` without releasing it.
/// Diagnostic-only; performs no ownership transfer.
///
/// # Safety
///
/// `obj` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_object_disown(obj: *mut c_void) {
    if let Some(ctx) = runtime() {
        ctx.disown(RawObject(obj));
    }
}

/// Release a callback trampoline pointer. A null `ptr` is a successful
/// no-op, unlike the raw release primitive underneath.
///
/// # Safety
///
/// A non-null `ptr` must be a live trampoline pointer not released before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_callback_release(ptr: *mut c_void) {
    if let Some(ctx) = runtime() {
        ctx.release_callback(ptr);
    }
}

/// Drain the finalizer queue. The host loop must call this from its own
/// thread, typically as the idle callback scheduled through
/// `HostVtable::schedule_idle`. Always returns 0, the idle-callback
/// convention for "do not reschedule".
#[unsafe(no_mangle)]
pub extern "C" fn gi_finalizer_pump(_data: *mut c_void) -> c_int {
    if let Some(ctx) = runtime() {
        ctx.pump();
    }
    0
}

/// Write a message to the diagnostic stream. The message is (pointer,
/// length), not NUL-terminated, and goes out verbatim; no newline is
/// appended. No-op when tracing is disabled.
///
/// # Safety
///
/// `msg` must point to at least `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gi_debug_log(msg: *const c_char, len: c_int) {
    if msg.is_null() || len <= 0 {
        return;
    }
    // SAFETY: len readable bytes per the contract above.
    let bytes = unsafe { slice::from_raw_parts(msg as *const u8, len as usize) };
    diag::write_bytes(bytes);
}
