//! Runtime type registry for the native object system.
//!
//! The native system identifies types with opaque numeric tags. The binding
//! layer registers every tag it will use at startup, together with its parent
//! and convention flags; after that the registry answers identity/ancestor
//! queries and name lookups. Tags are immutable once registered.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::error::InteropError;

/// Identifier of a native type, assigned by the native type system.
///
/// Tag `0` is reserved as the invalid tag.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeTag(pub u64);

impl TypeTag {
    pub const INVALID: TypeTag = TypeTag(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

bitflags! {
    /// Conventions attached to a registered type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        /// Instances start with a floating reference that must be claimed.
        /// Inherited by descendant types.
        const INITIALLY_UNOWNED = 1 << 0;
        /// Heap value type released with a one-time free, not an unref.
        const BOXED = 1 << 1;
    }
}

#[derive(Debug)]
struct TypeInfo {
    name: Arc<str>,
    parent: Option<TypeTag>,
    flags: TypeFlags,
}

/// Explicit tag-to-info map with a transitive descends-from relation.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeTag, TypeInfo>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tag` under `parent`. Parents must be registered first, which
    /// keeps the ancestry walks below cycle-free.
    pub fn register(
        &self,
        tag: TypeTag,
        name: &str,
        parent: Option<TypeTag>,
        flags: TypeFlags,
    ) -> Result<(), InteropError> {
        if !tag.is_valid() {
            return Err(InteropError::InvalidTypeTag);
        }

        let mut types = self.types.write();

        if let Some(parent) = parent {
            if !types.contains_key(&parent) {
                return Err(InteropError::UnknownParent(parent));
            }
        }
        if types.contains_key(&tag) {
            return Err(InteropError::DuplicateType(tag));
        }

        types.insert(
            tag,
            TypeInfo {
                name: Arc::from(name),
                parent,
                flags,
            },
        );
        log::trace!("Registered native type {} ({:#x})", name, tag.0);

        Ok(())
    }

    /// Name of a registered type.
    pub fn name(&self, tag: TypeTag) -> Option<Arc<str>> {
        self.types.read().get(&tag).map(|info| info.name.clone())
    }

    /// Name for diagnostics, tolerating unregistered tags.
    pub fn name_or_unknown(&self, tag: TypeTag) -> Arc<str> {
        self.name(tag).unwrap_or_else(|| Arc::from("<unregistered>"))
    }

    /// True iff `tag` is `ancestor` or descends from it.
    pub fn is_a(&self, tag: TypeTag, ancestor: TypeTag) -> bool {
        if tag == ancestor {
            return true;
        }

        let types = self.types.read();
        let mut cursor = tag;
        while let Some(info) = types.get(&cursor) {
            match info.parent {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
        false
    }

    /// True iff `tag` or any of its ancestors carries the floating-reference
    /// convention.
    pub fn is_initially_unowned(&self, tag: TypeTag) -> bool {
        self.inherits_flag(tag, TypeFlags::INITIALLY_UNOWNED)
    }

    fn inherits_flag(&self, tag: TypeTag, flag: TypeFlags) -> bool {
        let types = self.types.read();
        let mut cursor = Some(tag);
        while let Some(tag) = cursor {
            let Some(info) = types.get(&tag) else {
                return false;
            };
            if info.flags.contains(flag) {
                return true;
            }
            cursor = info.parent;
        }
        false
    }
}
