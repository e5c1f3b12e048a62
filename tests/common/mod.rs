//! Shared test fixture: an in-process object system with real refcounts.
//!
//! The fake keeps every instance behind a raw pointer like the native system
//! would, tracks which thread performed each release, and lets tests flip a
//! type into the floating-reference convention.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashSet;
use std::ffi::{CStr, c_void};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use gobject_interop::{
    ObjectSystem, Property, RawBoxed, RawObject, RuntimeContext, TypeFlags, TypeTag,
};

pub const BASE: TypeTag = TypeTag(1);
pub const INITIALLY_UNOWNED: TypeTag = TypeTag(2);
pub const WIDGET: TypeTag = TypeTag(3);
pub const OTHER: TypeTag = TypeTag(4);
pub const RECT: TypeTag = TypeTag(5);

struct Instance {
    tag: TypeTag,
    refcount: AtomicU32,
    floating: AtomicBool,
}

#[derive(Default)]
pub struct FakeObjectSystem {
    floating_types: Mutex<HashSet<u64>>,
    fail_next_construct: AtomicBool,
    pub sink_calls: AtomicUsize,
    /// (address, releasing thread) per destroyed object.
    pub destroyed: Mutex<Vec<(usize, ThreadId)>>,
    /// (address, releasing thread) per freed boxed value.
    pub boxed_freed: Mutex<Vec<(usize, ThreadId)>>,
    pub callbacks_released: Mutex<Vec<usize>>,
    /// (tag, property names) per construct call.
    pub constructed: Mutex<Vec<(u64, Vec<String>)>>,
}

impl FakeObjectSystem {
    pub fn mark_floating(&self, tag: TypeTag) {
        self.floating_types.lock().unwrap().insert(tag.0);
    }

    pub fn fail_next_construct(&self) {
        self.fail_next_construct.store(true, Ordering::SeqCst);
    }

    fn instance(obj: RawObject) -> &'static Instance {
        assert!(!obj.is_null());
        // Test-only: valid until the final unref destroys the instance.
        unsafe { &*(obj.0 as *const Instance) }
    }

    pub fn refcount_of(obj: RawObject) -> u32 {
        Self::instance(obj).refcount.load(Ordering::SeqCst)
    }

    pub fn is_floating(obj: RawObject) -> bool {
        Self::instance(obj).floating.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.lock().unwrap().len()
    }
}

impl ObjectSystem for FakeObjectSystem {
    fn construct(&self, tag: TypeTag, props: &[Property]) -> RawObject {
        if self.fail_next_construct.swap(false, Ordering::SeqCst) {
            return RawObject::NULL;
        }

        let names: Vec<String> = props
            .iter()
            .map(|p| {
                assert!(!p.name.is_null());
                unsafe { CStr::from_ptr(p.name) }.to_string_lossy().into_owned()
            })
            .collect();
        self.constructed.lock().unwrap().push((tag.0, names));

        // Like the native allocator: one reference, floating iff the type
        // follows that convention.
        let floating = self.floating_types.lock().unwrap().contains(&tag.0);
        let instance = Box::new(Instance {
            tag,
            refcount: AtomicU32::new(1),
            floating: AtomicBool::new(floating),
        });
        RawObject(Box::into_raw(instance) as *mut c_void)
    }

    fn ref_sink(&self, obj: RawObject) -> RawObject {
        let instance = Self::instance(obj);
        if !instance.floating.swap(false, Ordering::SeqCst) {
            instance.refcount.fetch_add(1, Ordering::SeqCst);
        }
        self.sink_calls.fetch_add(1, Ordering::SeqCst);
        obj
    }

    fn unref(&self, obj: RawObject) {
        let instance = Self::instance(obj);
        if instance.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.destroyed
                .lock()
                .unwrap()
                .push((obj.0 as usize, std::thread::current().id()));
            drop(unsafe { Box::from_raw(obj.0 as *mut Instance) });
        }
    }

    fn ref_count(&self, obj: RawObject) -> u32 {
        Self::instance(obj).refcount.load(Ordering::SeqCst)
    }

    fn instance_type(&self, obj: RawObject) -> TypeTag {
        Self::instance(obj).tag
    }

    fn boxed_free(&self, _tag: TypeTag, value: RawBoxed) {
        self.boxed_freed
            .lock()
            .unwrap()
            .push((value.0 as usize, std::thread::current().id()));
    }

    fn release_callback(&self, ptr: *mut c_void) {
        assert!(!ptr.is_null(), "raw release primitive faults on null");
        self.callbacks_released.lock().unwrap().push(ptr as usize);
    }
}

/// Register the test type hierarchy:
/// Base ─ InitiallyUnowned ─ Widget, plus an unrelated Other and a boxed
/// Rect. Widget instances are floating at birth.
pub fn register_test_types(ctx: &RuntimeContext, system: &FakeObjectSystem) {
    let registry = ctx.registry();
    registry
        .register(BASE, "Base", None, TypeFlags::empty())
        .unwrap();
    registry
        .register(
            INITIALLY_UNOWNED,
            "InitiallyUnowned",
            Some(BASE),
            TypeFlags::INITIALLY_UNOWNED,
        )
        .unwrap();
    registry
        .register(WIDGET, "Widget", Some(INITIALLY_UNOWNED), TypeFlags::empty())
        .unwrap();
    registry
        .register(OTHER, "Other", None, TypeFlags::empty())
        .unwrap();
    registry
        .register(RECT, "Rect", None, TypeFlags::BOXED)
        .unwrap();

    system.mark_floating(WIDGET);
    system.mark_floating(INITIALLY_UNOWNED);
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Context wired to a fake system and a no-op scheduler; tests that need a
/// live dispatch thread build their own wiring with NotifyScheduler.
pub fn fixture() -> (Arc<FakeObjectSystem>, RuntimeContext) {
    let system = Arc::new(FakeObjectSystem::default());
    let ctx = RuntimeContext::new(system.clone(), Arc::new(gobject_interop::NoopScheduler));
    register_test_types(&ctx, &system);
    (system, ctx)
}
