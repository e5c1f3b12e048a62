//! Binding-support shim between a managed runtime and a GObject-style
//! refcounted native object system.
//!
//! The crate mediates three concerns for generated binding code:
//!
//! - **Construction** ([`RuntimeContext::construct`]): build a native object
//!   from a dynamic property list and normalize the floating-reference
//!   convention so the caller always owns exactly one counted reference.
//! - **Destruction** ([`finalize`]): native finalizers that are only safe on
//!   the event-loop thread are never run inline; release requests are queued
//!   and dispatched from the loop's idle phase.
//! - **Diagnostics** ([`diag`]): opt-in tracing of allocation and
//!   deallocation events, enabled by an environment variable, atomic per
//!   message across threads.
//!
//! The native object system and the host loop are external collaborators,
//! reached through the seams in [`system`]; the C surface in [`abi`] is the
//! contract consumed by the binding generator.

pub mod abi;
pub mod context;
pub mod diag;
pub mod error;
pub mod finalize;
pub mod registry;
pub mod system;

// Core API
pub use context::RuntimeContext;
pub use error::InteropError;
pub use finalize::{FinalizationRequest, FinalizerQueue, IdleLoop, NotifyScheduler};
pub use registry::{TypeFlags, TypeRegistry, TypeTag};
pub use system::{
    HostVtable, IdleScheduler, NoopScheduler, ObjectSystem, Property, RawBoxed, RawObject,
};
