//! Typed-capability model used in place of runtime reflection.
//!
//! Every type that takes part in marshaling implements [`Reflect`]. The trait
//! has two halves:
//!
//! - a static half, [`Reflect::type_info`], returning a [`TypeInfo`] that
//!   describes the *shape* of the type (scalar, pointer, array, list, map,
//!   record or opaque). Converter factories only ever look at `TypeInfo`, so
//!   converters are built once per type and cached by [`TypeId`].
//! - a dynamic half, [`Reflect::reflect_ref`] and [`Reflect::reflect_mut`],
//!   giving converters access to a concrete value through `&dyn` access
//!   traits ([`Pointer`], [`Array`], [`List`], [`Map`], [`Record`]).
//!
//! Implementations are provided for the primitive types, `String`,
//! `Option<T>`, `Vec<T>`, `[T; N]` and the standard map types. Records use
//! `#[derive(Reflect)]` or a hand-written impl built on [`TypeInfo::record`].
//!
//! [`TypeId`]: std::any::TypeId

use std::any::{Any, TypeId};
use std::fmt;

use crate::error::{Error, Result};

mod impls;
mod info;

pub use info::{FieldInfo, MarshalQsFn, Shape, TypeInfo, UnmarshalQsFn};

// -----------------------------------------------------------------------------
// Kind

/// The kind of a reflected type.
///
/// Scalar kinds map one-to-one to the primitive types. A user type may report
/// a scalar kind (see `#[qs(transparent)]`) to reuse the builtin converter of
/// that kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    Isize,
    I8,
    I16,
    I32,
    I64,
    Usize,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Pointer,
    Array,
    List,
    Map,
    Record,
    Opaque,
}

impl Kind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Isize => "isize",
            Kind::I8 => "i8",
            Kind::I16 => "i16",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::Usize => "usize",
            Kind::U8 => "u8",
            Kind::U16 => "u16",
            Kind::U32 => "u32",
            Kind::U64 => "u64",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::String => "string",
            Kind::Pointer => "pointer",
            Kind::Array => "array",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Opaque => "opaque",
        }
    }

    /// Returns `true` for the kinds carried by [`ScalarRef`].
    pub const fn is_scalar(self) -> bool {
        !matches!(
            self,
            Kind::Pointer | Kind::Array | Kind::List | Kind::Map | Kind::Record | Kind::Opaque
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// Reflect

/// A value the marshaling engine can inspect and populate.
pub trait Reflect: Any {
    /// Describes the shape of `Self`.
    fn type_info() -> TypeInfo
    where
        Self: Sized;

    /// Borrows the value through its shape-specific access trait.
    fn reflect_ref(&self) -> ReflectRef<'_>;

    /// Mutably borrows the value through its shape-specific access trait.
    fn reflect_mut(&mut self) -> ReflectMut<'_>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn reflect_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn kind(&self) -> Kind {
        self.reflect_ref().kind()
    }
}

impl dyn Reflect {
    pub fn is<T: Reflect>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Returns the string slice if the value is of kind [`Kind::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self.reflect_ref() {
            ReflectRef::Scalar(ScalarRef::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Reports whether the value is "empty" for the `omitempty` policy.
    ///
    /// Unset pointers, `false`, numeric zero and zero-length strings,
    /// sequences and maps are empty. Records and opaque values never are.
    pub fn is_empty_value(&self) -> bool {
        match self.reflect_ref() {
            ReflectRef::Scalar(scalar) => scalar.is_zero(),
            ReflectRef::Pointer(ptr) => ptr.get().is_none(),
            ReflectRef::Array(array) => array.len() == 0,
            ReflectRef::List(list) => list.len() == 0,
            ReflectRef::Map(map) => map.len() == 0,
            ReflectRef::Record(_) | ReflectRef::Opaque => false,
        }
    }
}

impl fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reflect({})", self.reflect_type_name())
    }
}

// -----------------------------------------------------------------------------
// Borrowed views

macro_rules! scalar_views {
    ($($variant:ident($ty:ty),)*) => {
        /// A borrowed scalar value.
        #[derive(Debug)]
        pub enum ScalarRef<'a> {
            $($variant(&'a $ty),)*
        }

        /// A mutably borrowed scalar value.
        #[derive(Debug)]
        pub enum ScalarMut<'a> {
            $($variant(&'a mut $ty),)*
        }

        impl ScalarRef<'_> {
            pub fn kind(&self) -> Kind {
                match self {
                    $(ScalarRef::$variant(_) => Kind::$variant,)*
                }
            }
        }

        impl ScalarMut<'_> {
            pub fn kind(&self) -> Kind {
                match self {
                    $(ScalarMut::$variant(_) => Kind::$variant,)*
                }
            }
        }
    };
}

scalar_views! {
    Bool(bool),
    Isize(isize),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Usize(usize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
}

impl ScalarRef<'_> {
    fn is_zero(&self) -> bool {
        match self {
            ScalarRef::Bool(v) => !**v,
            ScalarRef::Isize(v) => **v == 0,
            ScalarRef::I8(v) => **v == 0,
            ScalarRef::I16(v) => **v == 0,
            ScalarRef::I32(v) => **v == 0,
            ScalarRef::I64(v) => **v == 0,
            ScalarRef::Usize(v) => **v == 0,
            ScalarRef::U8(v) => **v == 0,
            ScalarRef::U16(v) => **v == 0,
            ScalarRef::U32(v) => **v == 0,
            ScalarRef::U64(v) => **v == 0,
            ScalarRef::F32(v) => **v == 0.0,
            ScalarRef::F64(v) => **v == 0.0,
            ScalarRef::String(v) => v.is_empty(),
        }
    }
}

/// A shape-specific immutable view of a [`Reflect`] value.
pub enum ReflectRef<'a> {
    Scalar(ScalarRef<'a>),
    Pointer(&'a dyn Pointer),
    Array(&'a dyn Array),
    List(&'a dyn List),
    Map(&'a dyn Map),
    Record(&'a dyn Record),
    Opaque,
}

/// A shape-specific mutable view of a [`Reflect`] value.
pub enum ReflectMut<'a> {
    Scalar(ScalarMut<'a>),
    Pointer(&'a mut dyn Pointer),
    Array(&'a mut dyn Array),
    List(&'a mut dyn List),
    Map(&'a mut dyn Map),
    Record(&'a mut dyn Record),
    Opaque,
}

impl ReflectRef<'_> {
    pub fn kind(&self) -> Kind {
        match self {
            ReflectRef::Scalar(scalar) => scalar.kind(),
            ReflectRef::Pointer(_) => Kind::Pointer,
            ReflectRef::Array(_) => Kind::Array,
            ReflectRef::List(_) => Kind::List,
            ReflectRef::Map(_) => Kind::Map,
            ReflectRef::Record(_) => Kind::Record,
            ReflectRef::Opaque => Kind::Opaque,
        }
    }
}

impl ReflectMut<'_> {
    pub fn kind(&self) -> Kind {
        match self {
            ReflectMut::Scalar(scalar) => scalar.kind(),
            ReflectMut::Pointer(_) => Kind::Pointer,
            ReflectMut::Array(_) => Kind::Array,
            ReflectMut::List(_) => Kind::List,
            ReflectMut::Map(_) => Kind::Map,
            ReflectMut::Record(_) => Kind::Record,
            ReflectMut::Opaque => Kind::Opaque,
        }
    }
}

// -----------------------------------------------------------------------------
// Access traits

/// An optional value, e.g. `Option<T>`.
pub trait Pointer {
    fn get(&self) -> Option<&dyn Reflect>;

    fn get_mut(&mut self) -> Option<&mut dyn Reflect>;

    /// Returns the pointee, allocating an empty one first if unset.
    fn get_or_insert_default(&mut self) -> &mut dyn Reflect;
}

/// A fixed-size sequence, e.g. `[T; N]`.
pub trait Array {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Option<&dyn Reflect>;

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
}

/// A growable sequence, e.g. `Vec<T>`.
pub trait List {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Option<&dyn Reflect>;

    /// Appends an empty element and returns it for population.
    fn push_default(&mut self) -> &mut dyn Reflect;

    fn pop(&mut self);

    fn clear(&mut self);
}

/// A map keyed by a string-kind type.
pub trait Map {
    fn len(&self) -> usize;

    fn entries(&self) -> Box<dyn Iterator<Item = (&dyn Reflect, &dyn Reflect)> + '_>;

    fn clear(&mut self);

    /// Inserts an entry under `key` whose value is an empty value populated
    /// by `fill`. Nothing is inserted if `fill` fails.
    fn insert_with(
        &mut self,
        key: &str,
        fill: &mut dyn FnMut(&mut dyn Reflect) -> Result<()>,
    ) -> Result<()>;
}

/// A record with fields addressed by their declaration index.
///
/// The indexes match [`FieldInfo::index`] of the record's [`TypeInfo`].
pub trait Record {
    fn field(&self, index: usize) -> Option<&dyn Reflect>;

    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
}

pub(crate) fn wrong_kind(actual: &'static str, actual_kind: Kind, expected: Kind) -> Error {
    Error::WrongKind {
        actual,
        actual_kind,
        expected,
    }
}

pub(crate) fn missing_field(type_name: &'static str, index: usize) -> Error {
    Error::custom(format!("record {type_name} has no field at index {index}"))
}

/// Identity of the type a converter was built for.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TypeStamp {
    id: TypeId,
    name: &'static str,
}

impl TypeStamp {
    pub(crate) fn of(info: &TypeInfo) -> Self {
        TypeStamp {
            id: info.type_id(),
            name: info.type_name(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn check(&self, value: &dyn Reflect) -> Result<()> {
        if value.as_any().type_id() == self.id {
            Ok(())
        } else {
            Err(Error::WrongType {
                actual: value.reflect_type_name(),
                expected: self.name,
            })
        }
    }
}
