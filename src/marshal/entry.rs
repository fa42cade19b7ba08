use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{MarshalContext, MarshalOptions, Marshaler, MarshalerFactory};
use crate::error::{Error, Result};
use crate::reflect::{
    Kind, MarshalQsFn, Reflect, ReflectRef, ScalarRef, Shape, TypeInfo, TypeStamp, wrong_kind,
};

/// The builtin [`MarshalerFactory`].
///
/// A converter for a type is looked up in this order:
///
/// 1. a converter registered for the exact type,
/// 2. the type's own [`MarshalQs`](super::MarshalQs) implementation,
/// 3. a sub-factory registered for the type's kind (pointers, arrays and
///    lists by default),
/// 4. a converter registered for the type's kind (all scalar kinds by
///    default).
///
/// Anything else fails with [`Error::UnhandledType`]. Registrations replace
/// the builtin entry for the same type or kind.
///
/// ```
/// use qs_marshal::{DefaultMarshalerFactory, MarshalOptions, QsMarshaler, Reflect};
///
/// #[derive(Reflect)]
/// #[qs(opaque)]
/// struct Cents(u64);
///
/// #[derive(Reflect)]
/// struct Price {
///     amount: Cents,
/// }
///
/// let factory = DefaultMarshalerFactory::new().register_type(|c: &Cents, _| {
///     Ok(vec![format!("{}.{:02}", c.0 / 100, c.0 % 100)])
/// });
/// let qs = QsMarshaler::new(MarshalOptions::new().marshaler_factory(factory));
/// assert_eq!(qs.marshal_string(&Price { amount: Cents(1250) }).unwrap(), "amount=12.50");
/// ```
pub struct DefaultMarshalerFactory {
    types: HashMap<TypeId, Arc<dyn Marshaler>>,
    sub_factories: HashMap<Kind, Arc<dyn MarshalerFactory>>,
    kinds: HashMap<Kind, Arc<dyn Marshaler>>,
}

impl Default for DefaultMarshalerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultMarshalerFactory {
    /// Creates a factory with the builtin converters.
    pub fn new() -> Self {
        let mut factory = Self::empty()
            .register_sub_factory(Kind::Pointer, Arc::new(PointerMarshalerFactory))
            .register_sub_factory(Kind::Array, Arc::new(SequenceMarshalerFactory))
            .register_sub_factory(Kind::List, Arc::new(SequenceMarshalerFactory))
            .register_kind(Kind::Bool, primitive(marshal_bool))
            .register_kind(Kind::String, primitive(marshal_string));
        for kind in [Kind::Isize, Kind::I8, Kind::I16, Kind::I32, Kind::I64] {
            factory = factory.register_kind(kind, primitive(marshal_int));
        }
        for kind in [Kind::Usize, Kind::U8, Kind::U16, Kind::U32, Kind::U64] {
            factory = factory.register_kind(kind, primitive(marshal_uint));
        }
        for kind in [Kind::F32, Kind::F64] {
            factory = factory.register_kind(kind, primitive(marshal_float));
        }

        #[cfg(feature = "chrono")]
        {
            factory = factory
                .register_type(date_time::marshal::<chrono::Utc>)
                .register_type(date_time::marshal::<chrono::FixedOffset>);
        }

        factory
    }

    /// Creates a factory without any builtin converter.
    pub fn empty() -> Self {
        DefaultMarshalerFactory {
            types: HashMap::new(),
            sub_factories: HashMap::new(),
            kinds: HashMap::new(),
        }
    }

    /// Registers a typed converter for `T`.
    pub fn register_type<T, F>(self, f: F) -> Self
    where
        T: Reflect,
        F: Fn(&T, &MarshalContext<'_>) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        self.register_marshaler::<T>(Arc::new(TypedMarshaler {
            f,
            _marker: PhantomData,
        }))
    }

    /// Registers a converter for `T`.
    pub fn register_marshaler<T: Reflect>(mut self, marshaler: Arc<dyn Marshaler>) -> Self {
        self.types.insert(TypeId::of::<T>(), marshaler);
        self
    }

    /// Registers a factory for every type of the given kind.
    pub fn register_sub_factory(mut self, kind: Kind, factory: Arc<dyn MarshalerFactory>) -> Self {
        self.sub_factories.insert(kind, factory);
        self
    }

    /// Registers a converter for every type of the given kind.
    pub fn register_kind(mut self, kind: Kind, marshaler: Arc<dyn Marshaler>) -> Self {
        self.kinds.insert(kind, marshaler);
        self
    }
}

impl MarshalerFactory for DefaultMarshalerFactory {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        if let Some(marshaler) = self.types.get(&info.type_id()) {
            return Ok(marshaler.clone());
        }
        if let Some(f) = info.marshal_qs() {
            return Ok(Arc::new(SelfMarshaler(f)));
        }
        if let Some(factory) = self.sub_factories.get(&info.kind()) {
            return factory.marshaler(info, opts);
        }
        if let Some(marshaler) = self.kinds.get(&info.kind()) {
            return Ok(marshaler.clone());
        }
        Err(Error::UnhandledType(info.type_name()))
    }
}

struct TypedMarshaler<T, F> {
    f: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> Marshaler for TypedMarshaler<T, F>
where
    T: Reflect,
    F: Fn(&T, &MarshalContext<'_>) -> Result<Vec<String>> + Send + Sync,
{
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        match value.downcast_ref::<T>() {
            Some(value) => (self.f)(value, cx),
            None => Err(Error::WrongType {
                actual: value.reflect_type_name(),
                expected: std::any::type_name::<T>(),
            }),
        }
    }
}

struct SelfMarshaler(MarshalQsFn);

impl Marshaler for SelfMarshaler {
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        (self.0)(value, cx)
    }
}

// -----------------------------------------------------------------------------
// Pointers and sequences

struct PointerMarshalerFactory;

impl MarshalerFactory for PointerMarshalerFactory {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        let Shape::Pointer { item } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.factory().marshaler(&item(), opts)?;
        Ok(Arc::new(PointerMarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

struct PointerMarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Marshaler>,
}

impl Marshaler for PointerMarshaler {
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        self.stamp.check(value)?;
        match value.reflect_ref() {
            ReflectRef::Pointer(ptr) => match ptr.get() {
                Some(inner) => self.elem.marshal(inner, cx),
                None => Ok(Vec::new()),
            },
            other => Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Pointer)),
        }
    }
}

struct SequenceMarshalerFactory;

impl MarshalerFactory for SequenceMarshalerFactory {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        let item = match *info.shape() {
            Shape::Array { item, .. } | Shape::List { item } => item,
            _ => return Err(Error::UnhandledType(info.type_name())),
        };
        let elem = opts.factory().marshaler(&item(), opts)?;
        Ok(Arc::new(SequenceMarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Marshals arrays and lists element by element. With a slice separator the
/// elements are joined into a single string.
struct SequenceMarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Marshaler>,
}

impl SequenceMarshaler {
    fn marshal_items<'a>(
        &self,
        items: impl Iterator<Item = Option<&'a dyn Reflect>>,
        cx: &MarshalContext<'_>,
    ) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (i, item) in items.enumerate() {
            let Some(item) = item else { continue };
            let encoded = self
                .elem
                .marshal(item, cx)
                .map_err(|e| e.context(format!("error marshaling index {i}")))?;
            out.extend(encoded);
        }
        Ok(out)
    }
}

impl Marshaler for SequenceMarshaler {
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        self.stamp.check(value)?;
        let out = match value.reflect_ref() {
            ReflectRef::List(list) => {
                self.marshal_items((0..list.len()).map(|i| list.get(i)), cx)?
            }
            ReflectRef::Array(array) => {
                self.marshal_items((0..array.len()).map(|i| array.get(i)), cx)?
            }
            other => return Err(wrong_kind(self.stamp.name(), other.kind(), Kind::List)),
        };
        match cx.tag.slice_separator.as_str() {
            Some(sep) if !out.is_empty() => Ok(vec![out.join(sep)]),
            _ => Ok(out),
        }
    }
}

// -----------------------------------------------------------------------------
// Scalars

type PrimitiveFn = fn(&dyn Reflect, &MarshalContext<'_>) -> Result<String>;

struct PrimitiveMarshaler(PrimitiveFn);

impl Marshaler for PrimitiveMarshaler {
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        Ok(vec![(self.0)(value, cx)?])
    }
}

fn primitive(f: PrimitiveFn) -> Arc<dyn Marshaler> {
    Arc::new(PrimitiveMarshaler(f))
}

fn marshal_bool(value: &dyn Reflect, _: &MarshalContext<'_>) -> Result<String> {
    match value.reflect_ref() {
        ReflectRef::Scalar(ScalarRef::Bool(v)) => Ok(if *v { "true" } else { "false" }.to_owned()),
        other => Err(wrong_kind(value.reflect_type_name(), other.kind(), Kind::Bool)),
    }
}

fn marshal_int(value: &dyn Reflect, _: &MarshalContext<'_>) -> Result<String> {
    let mut buf = itoa::Buffer::new();
    let s = match value.reflect_ref() {
        ReflectRef::Scalar(ScalarRef::Isize(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::I8(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::I16(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::I32(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::I64(v)) => buf.format(*v),
        other => return Err(wrong_kind(value.reflect_type_name(), other.kind(), Kind::I64)),
    };
    Ok(s.to_owned())
}

fn marshal_uint(value: &dyn Reflect, _: &MarshalContext<'_>) -> Result<String> {
    let mut buf = itoa::Buffer::new();
    let s = match value.reflect_ref() {
        ReflectRef::Scalar(ScalarRef::Usize(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::U8(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::U16(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::U32(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::U64(v)) => buf.format(*v),
        other => return Err(wrong_kind(value.reflect_type_name(), other.kind(), Kind::U64)),
    };
    Ok(s.to_owned())
}

fn marshal_float(value: &dyn Reflect, _: &MarshalContext<'_>) -> Result<String> {
    let mut buf = ryu::Buffer::new();
    let s = match value.reflect_ref() {
        ReflectRef::Scalar(ScalarRef::F32(v)) => buf.format(*v),
        ReflectRef::Scalar(ScalarRef::F64(v)) => buf.format(*v),
        other => return Err(wrong_kind(value.reflect_type_name(), other.kind(), Kind::F64)),
    };
    Ok(s.to_owned())
}

fn marshal_string(value: &dyn Reflect, _: &MarshalContext<'_>) -> Result<String> {
    match value.reflect_ref() {
        ReflectRef::Scalar(ScalarRef::String(v)) => Ok(v.clone()),
        other => Err(wrong_kind(value.reflect_type_name(), other.kind(), Kind::String)),
    }
}

#[cfg(feature = "chrono")]
mod date_time {
    use std::fmt::Display;

    use chrono::{DateTime, SecondsFormat, TimeZone};

    use super::MarshalContext;
    use crate::error::Result;

    /// RFC 3339, with sub-second digits only when non-zero.
    pub(super) fn marshal<Tz>(value: &DateTime<Tz>, _: &MarshalContext<'_>) -> Result<Vec<String>>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Ok(vec![value.to_rfc3339_opts(SecondsFormat::AutoSi, true)])
    }
}
