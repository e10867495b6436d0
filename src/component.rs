//! Components and databags.
//!
//! A component is a plain data record attached to an entity.
//! A databag is a singleton record owned by the world.
//! Both are declared with `#[derive(Reflect)]` so that their properties
//! can be accessed by name at runtime.

use std::any::Any;
use std::fmt;

use crate::error::AccessError;
use crate::property::{Reflect, Value};
use crate::storage::Storage;

/// A data type that can be attached to entities.
///
/// # Example
/// ```
/// use tessera::property::Reflect;
/// use tessera::storage::DenseVectorStorage;
///
/// #[derive(Default, Reflect)]
/// struct Health {
///     current: f32,
///     max:     f32,
/// }
///
/// impl tessera::Component for Health {
///     const NAME: &'static str = "Health";
///     type Storage = DenseVectorStorage<Self>;
/// }
/// ```
pub trait Component: Reflect + Default + Send + Sync + Sized + 'static {
    /// The unique name of the component type.
    const NAME: &'static str;

    /// The storage backend for this component.
    type Storage: Storage<Comp = Self>;
}

/// A singleton data type owned by the world.
pub trait Databag: Reflect + Default + Send + Sync + Sized + 'static {
    /// The unique name of the databag type.
    const NAME: &'static str;
}

/// Identifies a registered component type within a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// The index of this component in per-component tables.
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "component #{}", self.0) }
}

/// Identifies a registered databag type within a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatabagId(pub u32);

impl DatabagId {
    /// The index of this databag in per-databag tables.
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for DatabagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "databag #{}", self.0) }
}

/// A type-erased [`Databag`], as held by the world.
pub trait AnyDatabag: Send + Sync {
    /// Upcasts to [`Any`].
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Upcasts to [`Any`].
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync);

    /// The name of the databag type.
    fn databag_name(&self) -> &'static str;

    /// Reads the property at `index`.
    fn get_property(&self, index: usize) -> Option<Value>;

    /// Writes the property at `index`.
    fn set_property(&mut self, index: usize, value: Value) -> Result<(), AccessError>;
}

impl<D: Databag> AnyDatabag for D {
    fn as_any(&self) -> &(dyn Any + Send + Sync) { self }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync) { self }

    fn databag_name(&self) -> &'static str { D::NAME }

    fn get_property(&self, index: usize) -> Option<Value> { self.get_by_index(index) }

    fn set_property(&mut self, index: usize, value: Value) -> Result<(), AccessError> {
        self.set_by_index(index, value).map_err(|kind| AccessError::TypeMismatch {
            component: D::NAME,
            property:  D::properties()[index].name,
            expected:  kind.name(),
        })
    }
}

impl dyn AnyDatabag {
    /// Downcasts to `D`.
    pub fn downcast_ref<D: Databag>(&self) -> &D {
        self.as_any().downcast_ref::<D>().expect("TypeId mismatch")
    }

    /// Downcasts to `D`.
    pub fn downcast_mut<D: Databag>(&mut self) -> &mut D {
        self.as_any_mut().downcast_mut::<D>().expect("TypeId mismatch")
    }
}
