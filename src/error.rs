use thiserror::Error;

use crate::registry::TypeTag;

/// Errors surfaced by the Rust API. The C surface maps these to false/null
/// returns; genuine native-allocator failures are not wrapped here but
/// propagate as null handles.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteropError {
    #[error("type tag 0 is reserved")]
    InvalidTypeTag,

    #[error("type {0:?} is already registered")]
    DuplicateType(TypeTag),

    #[error("parent type {0:?} is not registered")]
    UnknownParent(TypeTag),
}
