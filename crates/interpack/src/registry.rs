//! # Type Registry
//!
//! Maps composite types to their stable wire identity and codec functions.
//!
//! ## Philosophy
//!
//! - **Startup-Time Safety**: Types are registered once through a builder.
//!   Duplicates are rejected while building, never papered over.
//! - **Read-Only**: The built registry has no interior mutability, so lookups
//!   during dispatch cannot race with registration.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::BinaryType;
use crate::Error;
use crate::Reader;
use crate::Result;
use crate::Writer;
use crate::types::type_id;

pub type EncodeFn = fn(&dyn Any, &mut Writer<'_>) -> Result<()>;
pub type DecodeFn = fn(&mut Reader<'_>) -> Result<Box<dyn Any + Send>>;

/// Everything needed to frame one registered type.
#[derive(Clone)]
pub struct Descriptor {
    name: &'static str,
    id: i32,
    rust_type: TypeId,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Descriptor {
    fn of<T: BinaryType>() -> Self {
        Self {
            name: T::TYPE_NAME,
            id: type_id(T::TYPE_NAME),
            rust_type: TypeId::of::<T>(),
            encode: encode_erased::<T>,
            decode: decode_erased::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Payload encoder taking a type-erased value.
    pub fn encode_fn(&self) -> EncodeFn {
        self.encode
    }

    /// Payload decoder producing a type-erased value.
    pub fn decode_fn(&self) -> DecodeFn {
        self.decode
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor").field("name", &self.name).field("id", &self.id).finish()
    }
}

fn encode_erased<T: BinaryType>(v: &dyn Any, writer: &mut Writer<'_>) -> Result<()> {
    let v = v.downcast_ref::<T>().ok_or_else(|| Error::TypeMismatch {
        expected: T::TYPE_NAME.into(),
        found: "a value of another type".into(),
    })?;
    v.write(writer)
}

fn decode_erased<T: BinaryType>(reader: &mut Reader<'_>) -> Result<Box<dyn Any + Send>> {
    Ok(Box::new(T::read(reader)?))
}

/// An immutable set of registered composite types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_id: HashMap<i32, Descriptor>,
    by_rust: HashMap<TypeId, i32>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder { registry: TypeRegistry::default() }
    }

    /// A registry with no composite types; primitives still encode.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn by_id(&self, id: i32) -> Option<&Descriptor> {
        self.by_id.get(&id)
    }

    /// Looks up a descriptor by name (case-insensitive, like the type id).
    pub fn by_name(&self, name: &str) -> Option<&Descriptor> {
        self.by_id(type_id(name))
            .filter(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn by_rust_type(&self, rust_type: TypeId) -> Option<&Descriptor> {
        self.by_rust.get(&rust_type).and_then(|id| self.by_id.get(id))
    }

    /// Returns the type id of `T` if it is registered.
    pub fn id_of<T: BinaryType>(&self) -> Option<i32> {
        self.by_rust.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the type id of `T`, or `Error::Unregistered`.
    pub fn require<T: BinaryType>(&self) -> Result<i32> {
        self.id_of::<T>().ok_or_else(|| Error::Unregistered(T::TYPE_NAME.into()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Names of all registered types, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_id.values().map(|d| d.name).collect();
        names.sort_unstable();
        names
    }
}

/// Collects descriptors before the registry is frozen.
pub struct RegistryBuilder {
    registry: TypeRegistry,
}

impl RegistryBuilder {
    /// Registers `T`.
    ///
    /// # Errors
    /// - `Error::Primitive` if `T` is a primitive.
    /// - `Error::DuplicateType` if `T`, its name, or its type id is taken.
    pub fn register<T: BinaryType>(mut self) -> Result<Self> {
        if T::PRIMITIVE.is_some() {
            return Err(Error::Primitive(T::TYPE_NAME));
        }
        let desc = Descriptor::of::<T>();
        if self.registry.by_rust.contains_key(&desc.rust_type) {
            return Err(Error::DuplicateType(desc.name.into()));
        }
        if let Some(existing) = self.registry.by_id.get(&desc.id) {
            let name = if existing.name.eq_ignore_ascii_case(desc.name) {
                desc.name.to_string()
            } else {
                format!("{} (type id {} collides with {})", desc.name, desc.id, existing.name)
            };
            return Err(Error::DuplicateType(name));
        }
        self.registry.by_rust.insert(desc.rust_type, desc.id);
        self.registry.by_id.insert(desc.id, desc);
        Ok(self)
    }

    pub fn build(self) -> Arc<TypeRegistry> {
        Arc::new(self.registry)
    }
}
