use std::any::{TypeId, type_name};

use super::{Kind, Reflect};
use crate::error::{Error, Result};
use crate::marshal::{MarshalContext, MarshalQs};
use crate::unmarshal::{UnmarshalContext, UnmarshalQs};

/// Type-erased adapter calling [`MarshalQs::marshal_qs`].
pub type MarshalQsFn = fn(&dyn Reflect, &MarshalContext<'_>) -> Result<Vec<String>>;

/// Type-erased adapter calling [`UnmarshalQs::unmarshal_qs`].
pub type UnmarshalQsFn =
    fn(&mut dyn Reflect, Option<&[String]>, &UnmarshalContext<'_>) -> Result<()>;

/// Static description of a [`Reflect`] type.
///
/// A `TypeInfo` is plain data: nested types are referenced through
/// `fn() -> TypeInfo` pointers and record fields are produced on demand, so
/// building one never allocates.
#[derive(Clone, Copy, Debug)]
pub struct TypeInfo {
    type_id: TypeId,
    type_name: &'static str,
    kind: Kind,
    shape: Shape,
    marshal_qs: Option<MarshalQsFn>,
    unmarshal_qs: Option<UnmarshalQsFn>,
}

/// The structural part of a [`TypeInfo`].
#[derive(Clone, Copy, Debug)]
pub enum Shape {
    Scalar,
    Pointer {
        item: fn() -> TypeInfo,
    },
    Array {
        item: fn() -> TypeInfo,
        len: usize,
    },
    List {
        item: fn() -> TypeInfo,
    },
    Map {
        key: fn() -> TypeInfo,
        value: fn() -> TypeInfo,
    },
    Record {
        fields: fn() -> Vec<FieldInfo>,
    },
    Opaque,
}

impl TypeInfo {
    fn new<T: Reflect>(kind: Kind, shape: Shape) -> Self {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind,
            shape,
            marshal_qs: None,
            unmarshal_qs: None,
        }
    }

    /// Describes `T` as a scalar of the given kind.
    ///
    /// `T::reflect_ref` must return a [`ScalarRef`](super::ScalarRef) of the
    /// same kind.
    pub fn scalar<T: Reflect>(kind: Kind) -> Self {
        debug_assert!(kind.is_scalar(), "{kind} is not a scalar kind");
        Self::new::<T>(kind, Shape::Scalar)
    }

    pub fn pointer<T: Reflect, I: Reflect>() -> Self {
        Self::new::<T>(Kind::Pointer, Shape::Pointer { item: I::type_info })
    }

    pub fn array<T: Reflect, I: Reflect>(len: usize) -> Self {
        Self::new::<T>(
            Kind::Array,
            Shape::Array {
                item: I::type_info,
                len,
            },
        )
    }

    pub fn list<T: Reflect, I: Reflect>() -> Self {
        Self::new::<T>(Kind::List, Shape::List { item: I::type_info })
    }

    pub fn map<T: Reflect, K: Reflect, V: Reflect>() -> Self {
        Self::new::<T>(
            Kind::Map,
            Shape::Map {
                key: K::type_info,
                value: V::type_info,
            },
        )
    }

    /// Describes `T` as a record whose fields are listed by `fields`.
    pub fn record<T: Reflect>(fields: fn() -> Vec<FieldInfo>) -> Self {
        Self::new::<T>(Kind::Record, Shape::Record { fields })
    }

    /// Describes a type without inner structure. Opaque types need a custom
    /// converter, either through [`with_marshal_qs`](Self::with_marshal_qs)
    /// or through a factory registration.
    pub fn opaque<T: Reflect>() -> Self {
        Self::new::<T>(Kind::Opaque, Shape::Opaque)
    }

    /// Describes `T` with the shape of `I`, for newtypes that forward their
    /// reflection to a single inner value.
    ///
    /// Self-describing capabilities of `I` are not inherited.
    pub fn transparent<T: Reflect, I: Reflect>() -> Self {
        let inner = I::type_info();
        Self::new::<T>(inner.kind, inner.shape)
    }

    /// Marks `T` as marshaling itself through [`MarshalQs`].
    pub fn with_marshal_qs<T: Reflect + MarshalQs>(mut self) -> Self {
        debug_assert_eq!(self.type_id, TypeId::of::<T>());
        self.marshal_qs = Some(marshal_qs_adapter::<T>);
        self
    }

    /// Marks `T` as unmarshaling itself through [`UnmarshalQs`].
    pub fn with_unmarshal_qs<T: Reflect + UnmarshalQs>(mut self) -> Self {
        debug_assert_eq!(self.type_id, TypeId::of::<T>());
        self.unmarshal_qs = Some(unmarshal_qs_adapter::<T>);
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn marshal_qs(&self) -> Option<MarshalQsFn> {
        self.marshal_qs
    }

    pub fn unmarshal_qs(&self) -> Option<UnmarshalQsFn> {
        self.unmarshal_qs
    }

    /// Returns the described type of the record fields, or an empty list if
    /// `self` isn't a record.
    pub fn fields(&self) -> Vec<FieldInfo> {
        match self.shape {
            Shape::Record { fields } => fields(),
            _ => Vec::new(),
        }
    }

    /// Whether the type is a record, possibly behind pointers.
    pub(crate) fn is_record_like(&self) -> bool {
        match self.shape {
            Shape::Record { .. } => true,
            Shape::Pointer { item } => item().is_record_like(),
            _ => false,
        }
    }
}

fn marshal_qs_adapter<T: Reflect + MarshalQs>(
    value: &dyn Reflect,
    cx: &MarshalContext<'_>,
) -> Result<Vec<String>> {
    match value.downcast_ref::<T>() {
        Some(value) => value.marshal_qs(cx),
        None => Err(Error::WrongType {
            actual: value.reflect_type_name(),
            expected: type_name::<T>(),
        }),
    }
}

fn unmarshal_qs_adapter<T: Reflect + UnmarshalQs>(
    value: &mut dyn Reflect,
    data: Option<&[String]>,
    cx: &UnmarshalContext<'_>,
) -> Result<()> {
    let actual = value.reflect_type_name();
    match value.downcast_mut::<T>() {
        Some(value) => value.unmarshal_qs(data, cx),
        None => Err(Error::WrongType {
            actual,
            expected: type_name::<T>(),
        }),
    }
}

/// Static description of one record field.
#[derive(Clone, Copy, Debug)]
pub struct FieldInfo {
    name: &'static str,
    tag: &'static str,
    index: usize,
    embedded: bool,
    type_info: fn() -> TypeInfo,
}

impl FieldInfo {
    /// Describes the field `name` of type `F`, found at `index` through
    /// [`Record::field`](super::Record::field).
    pub fn new<F: Reflect>(name: &'static str, index: usize) -> Self {
        FieldInfo {
            name,
            tag: "",
            index,
            embedded: false,
            type_info: F::type_info,
        }
    }

    /// Sets the raw `qs` tag of the field: an optional name followed by
    /// comma separated options, e.g. `"page_size,omitempty"`.
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    /// Marks the field as embedded: if its type converts to whole values its
    /// keys are merged into the parent's.
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn type_info(&self) -> TypeInfo {
        (self.type_info)()
    }
}
