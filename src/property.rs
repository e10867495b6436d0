//! Access to component fields by name or index.
//!
//! Components derive [`Reflect`] to expose their fields as a static property table.
//! The [`Registry`](crate::Registry) indexes that table by name once at registration,
//! so dynamic access resolves a name to an index with a single map lookup
//! and then dispatches on the index.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

#[doc(inline)]
pub use tessera_codegen::Reflect;

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// An integer of any width.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An entity reference.
    Entity(EntityId),
}

/// The kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Int`]
    Int,
    /// [`Value::Float`]
    Float,
    /// [`Value::Str`]
    Str,
    /// [`Value::Entity`]
    Entity,
}

impl Kind {
    /// A lowercase name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Entity => "entity",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Describes one reflected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// The field name.
    pub name: &'static str,
    /// The value kind of the field.
    pub kind: Kind,
}

/// A field type that converts to and from [`Value`].
pub trait Property: Sized {
    /// The value kind this type converts to.
    const KIND: Kind;

    /// Converts to a dynamic value.
    fn to_value(&self) -> Value;

    /// Converts from a dynamic value, returning `None` if the kind or range does not fit.
    fn from_value(value: Value) -> Option<Self>;
}

impl Property for bool {
    const KIND: Kind = Kind::Bool;

    fn to_value(&self) -> Value { Value::Bool(*self) }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! impl_int_property {
    ($($ty:ty),*) => {
        $(
            impl Property for $ty {
                const KIND: Kind = Kind::Int;

                fn to_value(&self) -> Value { Value::Int(i64::from(*self)) }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Int(value) => <$ty>::try_from(value).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_int_property!(i8, i16, i32, i64, u8, u16, u32);

impl Property for f32 {
    const KIND: Kind = Kind::Float;

    fn to_value(&self) -> Value { Value::Float(f64::from(*self)) }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(value) => Some(value as f32),
            Value::Int(value) => Some(value as f32),
            _ => None,
        }
    }
}

impl Property for f64 {
    const KIND: Kind = Kind::Float;

    fn to_value(&self) -> Value { Value::Float(*self) }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(value) => Some(value),
            Value::Int(value) => Some(value as f64),
            _ => None,
        }
    }
}

impl Property for String {
    const KIND: Kind = Kind::Str;

    fn to_value(&self) -> Value { Value::Str(self.clone()) }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl Property for EntityId {
    const KIND: Kind = Kind::Entity;

    fn to_value(&self) -> Value { Value::Entity(*self) }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Entity(value) => Some(value),
            Value::Int(value) => u32::try_from(value).ok().map(EntityId),
            _ => None,
        }
    }
}

/// Exposes the fields of a type as indexed properties.
///
/// Use `#[derive(Reflect)]` instead of implementing this manually.
/// Fields marked `#[reflect(skip)]` are not exposed.
pub trait Reflect {
    /// The property table, in declaration order.
    fn properties() -> &'static [PropertyInfo]
    where
        Self: Sized;

    /// Reads the property at `index` of [`properties`](Self::properties).
    fn get_by_index(&self, index: usize) -> Option<Value>;

    /// Writes the property at `index`.
    ///
    /// Returns the expected kind if the value does not convert.
    /// Out-of-range indices are a contract violation and panic.
    fn set_by_index(&mut self, index: usize, value: Value) -> Result<(), Kind>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Reflect)]
    struct Sample {
        speed:  f32,
        count:  u32,
        name:   String,
        target: EntityId,
        #[reflect(skip)]
        _cache: Vec<u8>,
    }

    #[test]
    fn test_properties_table() {
        let names: Vec<_> = Sample::properties().iter().map(|info| info.name).collect();
        assert_eq!(names, ["speed", "count", "name", "target"]);
        assert_eq!(Sample::properties()[1].kind, Kind::Int);
    }

    #[test]
    fn test_get_set_by_index() {
        let mut sample = Sample::default();
        sample.set_by_index(0, Value::Float(2.5)).unwrap();
        sample.set_by_index(1, Value::Int(7)).unwrap();
        sample.set_by_index(2, Value::Str("crate".into())).unwrap();
        sample.set_by_index(3, Value::Entity(EntityId(4))).unwrap();

        assert_eq!(sample.speed, 2.5);
        assert_eq!(sample.get_by_index(1), Some(Value::Int(7)));
        assert_eq!(sample.get_by_index(2), Some(Value::Str("crate".into())));
        assert_eq!(sample.target, EntityId(4));
        assert_eq!(sample.get_by_index(4), None);
    }

    #[test]
    fn test_set_rejects_wrong_kind() {
        let mut sample = Sample::default();
        assert_eq!(sample.set_by_index(1, Value::Int(-1)), Err(Kind::Int));
        assert_eq!(sample.set_by_index(2, Value::Bool(true)), Err(Kind::Str));
        assert_eq!(sample.count, 0);
    }
}
