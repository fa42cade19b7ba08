use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{UnmarshalContext, UnmarshalOptions, Unmarshaler, UnmarshalerFactory};
use crate::error::{Error, Result};
use crate::reflect::{
    Kind, Reflect, ReflectMut, ScalarMut, Shape, TypeInfo, TypeStamp, UnmarshalQsFn, wrong_kind,
};
use crate::tag::{SliceSeparator, SliceUnexpectedValue, SliceValues};

/// The builtin [`UnmarshalerFactory`].
///
/// Resolution order is the same as for
/// [`DefaultMarshalerFactory`](crate::DefaultMarshalerFactory): exact type,
/// [`UnmarshalQs`](super::UnmarshalQs), kind sub-factory, kind converter.
pub struct DefaultUnmarshalerFactory {
    types: HashMap<TypeId, Arc<dyn Unmarshaler>>,
    sub_factories: HashMap<Kind, Arc<dyn UnmarshalerFactory>>,
    kinds: HashMap<Kind, Arc<dyn Unmarshaler>>,
}

impl Default for DefaultUnmarshalerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultUnmarshalerFactory {
    /// Creates a factory with the builtin converters.
    pub fn new() -> Self {
        let mut factory = Self::empty()
            .register_sub_factory(Kind::Pointer, Arc::new(PointerUnmarshalerFactory))
            .register_sub_factory(Kind::Array, Arc::new(ArrayUnmarshalerFactory))
            .register_sub_factory(Kind::List, Arc::new(ListUnmarshalerFactory))
            .register_kind(Kind::Bool, primitive(unmarshal_bool))
            .register_kind(Kind::String, primitive(unmarshal_string));
        for kind in [Kind::Isize, Kind::I8, Kind::I16, Kind::I32, Kind::I64] {
            factory = factory.register_kind(kind, primitive(unmarshal_int));
        }
        for kind in [Kind::Usize, Kind::U8, Kind::U16, Kind::U32, Kind::U64] {
            factory = factory.register_kind(kind, primitive(unmarshal_uint));
        }
        for kind in [Kind::F32, Kind::F64] {
            factory = factory.register_kind(kind, primitive(unmarshal_float));
        }

        #[cfg(feature = "chrono")]
        {
            factory = factory
                .register_type(date_time::unmarshal_utc)
                .register_type(date_time::unmarshal_fixed);
        }

        factory
    }

    /// Creates a factory without any builtin converter.
    pub fn empty() -> Self {
        DefaultUnmarshalerFactory {
            types: HashMap::new(),
            sub_factories: HashMap::new(),
            kinds: HashMap::new(),
        }
    }

    /// Registers a typed converter for `T`.
    pub fn register_type<T, F>(self, f: F) -> Self
    where
        T: Reflect,
        F: Fn(&mut T, Option<&[String]>, &UnmarshalContext<'_>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_unmarshaler::<T>(Arc::new(TypedUnmarshaler {
            f,
            _marker: PhantomData,
        }))
    }

    /// Registers a converter for `T`.
    pub fn register_unmarshaler<T: Reflect>(mut self, unmarshaler: Arc<dyn Unmarshaler>) -> Self {
        self.types.insert(TypeId::of::<T>(), unmarshaler);
        self
    }

    /// Registers a factory for every type of the given kind.
    pub fn register_sub_factory(
        mut self,
        kind: Kind,
        factory: Arc<dyn UnmarshalerFactory>,
    ) -> Self {
        self.sub_factories.insert(kind, factory);
        self
    }

    /// Registers a converter for every type of the given kind.
    pub fn register_kind(mut self, kind: Kind, unmarshaler: Arc<dyn Unmarshaler>) -> Self {
        self.kinds.insert(kind, unmarshaler);
        self
    }
}

impl UnmarshalerFactory for DefaultUnmarshalerFactory {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        if let Some(unmarshaler) = self.types.get(&info.type_id()) {
            return Ok(unmarshaler.clone());
        }
        if let Some(f) = info.unmarshal_qs() {
            return Ok(Arc::new(SelfUnmarshaler(f)));
        }
        if let Some(factory) = self.sub_factories.get(&info.kind()) {
            return factory.unmarshaler(info, opts);
        }
        if let Some(unmarshaler) = self.kinds.get(&info.kind()) {
            return Ok(unmarshaler.clone());
        }
        Err(Error::UnhandledType(info.type_name()))
    }
}

struct TypedUnmarshaler<T, F> {
    f: F,
    _marker: PhantomData<fn(&mut T)>,
}

impl<T, F> Unmarshaler for TypedUnmarshaler<T, F>
where
    T: Reflect,
    F: Fn(&mut T, Option<&[String]>, &UnmarshalContext<'_>) -> Result<()> + Send + Sync,
{
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        let actual = value.reflect_type_name();
        match value.downcast_mut::<T>() {
            Some(value) => (self.f)(value, data, cx),
            None => Err(Error::WrongType {
                actual,
                expected: std::any::type_name::<T>(),
            }),
        }
    }
}

struct SelfUnmarshaler(UnmarshalQsFn);

impl Unmarshaler for SelfUnmarshaler {
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        (self.0)(value, data, cx)
    }
}

// -----------------------------------------------------------------------------
// Pointers and sequences

struct PointerUnmarshalerFactory;

impl UnmarshalerFactory for PointerUnmarshalerFactory {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        let Shape::Pointer { item } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.factory().unmarshaler(&item(), opts)?;
        Ok(Arc::new(PointerUnmarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Allocates the pointee if unset, then delegates, absent data included.
struct PointerUnmarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Unmarshaler>,
}

impl Unmarshaler for PointerUnmarshaler {
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        self.stamp.check(value)?;
        match value.reflect_mut() {
            ReflectMut::Pointer(ptr) => self.elem.unmarshal(ptr.get_or_insert_default(), data, cx),
            other => Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Pointer)),
        }
    }
}

/// Splits every incoming string on the separator, if any.
fn split<'a>(data: &'a [String], separator: SliceSeparator) -> Cow<'a, [String]> {
    match separator.as_str() {
        None => Cow::Borrowed(data),
        Some(sep) => Cow::Owned(
            data.iter()
                .flat_map(|s| s.split(sep))
                .map(str::to_owned)
                .collect(),
        ),
    }
}

struct ArrayUnmarshalerFactory;

impl UnmarshalerFactory for ArrayUnmarshalerFactory {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        let Shape::Array { item, .. } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.factory().unmarshaler(&item(), opts)?;
        Ok(Arc::new(ArrayUnmarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Requires exactly as many strings as the array has elements. Absent data
/// leaves the array untouched.
struct ArrayUnmarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Unmarshaler>,
}

impl Unmarshaler for ArrayUnmarshaler {
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        self.stamp.check(value)?;
        let Some(data) = data else {
            return Ok(());
        };
        let data = split(data, cx.tag.slice_separator);

        let array = match value.reflect_mut() {
            ReflectMut::Array(array) => array,
            other => return Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Array)),
        };
        if data.len() != array.len() {
            return Err(Error::LengthMismatch {
                actual: data.len(),
                expected: array.len(),
            });
        }

        for (i, s) in data.iter().enumerate() {
            let Some(item) = array.get_mut(i) else {
                break;
            };
            self.elem
                .unmarshal(item, Some(std::slice::from_ref(s)), cx)
                .map_err(|e| e.context(format!("error unmarshaling array index {i}")))?;
        }
        Ok(())
    }
}

struct ListUnmarshalerFactory;

impl UnmarshalerFactory for ListUnmarshalerFactory {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        let Shape::List { item } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.factory().unmarshaler(&item(), opts)?;
        Ok(Arc::new(ListUnmarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Appends one element per incoming string, after splitting on the
/// separator. The tag decides whether existing elements are kept and
/// whether a bad element aborts the whole list or is dropped. Absent data
/// counts as no strings, so `overrideold` empties the list.
struct ListUnmarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Unmarshaler>,
}

impl Unmarshaler for ListUnmarshaler {
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        self.stamp.check(value)?;
        let data = split(data.unwrap_or_default(), cx.tag.slice_separator);

        let list = match value.reflect_mut() {
            ReflectMut::List(list) => list,
            other => return Err(wrong_kind(self.stamp.name(), other.kind(), Kind::List)),
        };
        if cx.tag.slice_values == SliceValues::OverrideOld {
            list.clear();
        }

        for (i, s) in data.iter().enumerate() {
            let item = list.push_default();
            if let Err(err) = self.elem.unmarshal(item, Some(std::slice::from_ref(s)), cx) {
                list.pop();
                match cx.tag.slice_unexpected_value {
                    SliceUnexpectedValue::SkipBadValue => {
                        tracing::trace!(index = i, error = %err, "skipping bad list element");
                    }
                    SliceUnexpectedValue::BreakWithError => {
                        list.clear();
                        return Err(err.context(format!("error unmarshaling list index {i}")));
                    }
                }
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Scalars

type PrimitiveFn = fn(&mut dyn Reflect, &str) -> Result<()>;

/// Absent data is a no-op. Otherwise the incoming strings are reduced to one
/// by the slice-to-string policy and parsed.
struct PrimitiveUnmarshaler(PrimitiveFn);

impl Unmarshaler for PrimitiveUnmarshaler {
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        let Some(data) = data else {
            return Ok(());
        };
        let s = cx.options.single_string(data)?;
        (self.0)(value, &s)
    }
}

fn primitive(f: PrimitiveFn) -> Arc<dyn Unmarshaler> {
    Arc::new(PrimitiveUnmarshaler(f))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn unmarshal_bool(value: &mut dyn Reflect, s: &str) -> Result<()> {
    let type_name = value.reflect_type_name();
    match value.reflect_mut() {
        ReflectMut::Scalar(ScalarMut::Bool(v)) => {
            *v = parse_bool(s)
                .ok_or_else(|| Error::invalid_value(s, Kind::Bool, "not a boolean"))?;
            Ok(())
        }
        other => Err(wrong_kind(type_name, other.kind(), Kind::Bool)),
    }
}

/// Splits the base prefix off `digits`: `0x`, `0o` or `0b` (any case), or a
/// bare leading `0` for octal.
fn radix(digits: &str) -> (u32, &str) {
    let bytes = digits.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return match bytes[1] {
            b'x' | b'X' => (16, &digits[2..]),
            b'o' | b'O' => (8, &digits[2..]),
            b'b' | b'B' => (2, &digits[2..]),
            _ => (8, &digits[1..]),
        };
    }
    (10, digits)
}

/// Removes `_` digit separators. Each one must sit between two digits, or
/// directly after a base prefix.
fn strip_underscores(digits: &str, prefixed: bool) -> Option<String> {
    if !digits.contains('_') {
        return Some(digits.to_owned());
    }
    let bytes = digits.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'_' {
            continue;
        }
        let after_digit = if i == 0 { prefixed } else { bytes[i - 1] != b'_' };
        let before_digit = bytes.get(i + 1).is_some_and(|&next| next != b'_');
        if !after_digit || !before_digit {
            return None;
        }
    }
    Some(digits.replace('_', ""))
}

/// Parses the magnitude of an integer literal, sign already removed.
fn parse_magnitude(literal: &str) -> std::result::Result<u128, String> {
    let (radix, rest) = radix(literal);
    let prefixed = rest.len() < literal.len();
    let digits = strip_underscores(rest, prefixed).ok_or_else(|| "invalid syntax".to_owned())?;
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err("invalid syntax".to_owned());
    }
    u128::from_str_radix(&digits, radix).map_err(|e| e.to_string())
}

fn parse_signed(s: &str) -> std::result::Result<i128, String> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = parse_magnitude(digits)?;
    if negative {
        if magnitude > i128::MAX as u128 + 1 {
            return Err("value out of range".to_owned());
        }
        Ok((magnitude as i128).wrapping_neg())
    } else {
        i128::try_from(magnitude).map_err(|_| "value out of range".to_owned())
    }
}

fn unmarshal_int(value: &mut dyn Reflect, s: &str) -> Result<()> {
    let type_name = value.reflect_type_name();
    let mut target = value.reflect_mut();
    let kind = target.kind();
    let n = parse_signed(s).map_err(|reason| Error::invalid_value(s, kind, reason))?;
    let out_of_range = |_| Error::invalid_value(s, kind, "value out of range");
    match &mut target {
        ReflectMut::Scalar(ScalarMut::Isize(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::I8(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::I16(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::I32(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::I64(v)) => **v = n.try_into().map_err(out_of_range)?,
        _ => return Err(wrong_kind(type_name, kind, Kind::I64)),
    }
    Ok(())
}

fn unmarshal_uint(value: &mut dyn Reflect, s: &str) -> Result<()> {
    let type_name = value.reflect_type_name();
    let mut target = value.reflect_mut();
    let kind = target.kind();
    let digits = s.strip_prefix('+').unwrap_or(s);
    let n = parse_magnitude(digits).map_err(|reason| Error::invalid_value(s, kind, reason))?;
    let out_of_range = |_| Error::invalid_value(s, kind, "value out of range");
    match &mut target {
        ReflectMut::Scalar(ScalarMut::Usize(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::U8(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::U16(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::U32(v)) => **v = n.try_into().map_err(out_of_range)?,
        ReflectMut::Scalar(ScalarMut::U64(v)) => **v = n.try_into().map_err(out_of_range)?,
        _ => return Err(wrong_kind(type_name, kind, Kind::U64)),
    }
    Ok(())
}

fn unmarshal_float(value: &mut dyn Reflect, s: &str) -> Result<()> {
    let type_name = value.reflect_type_name();
    match value.reflect_mut() {
        ReflectMut::Scalar(ScalarMut::F32(v)) => {
            *v = s
                .parse()
                .map_err(|e| Error::invalid_value(s, Kind::F32, e))?;
        }
        ReflectMut::Scalar(ScalarMut::F64(v)) => {
            *v = s
                .parse()
                .map_err(|e| Error::invalid_value(s, Kind::F64, e))?;
        }
        other => return Err(wrong_kind(type_name, other.kind(), Kind::F64)),
    }
    Ok(())
}

fn unmarshal_string(value: &mut dyn Reflect, s: &str) -> Result<()> {
    let type_name = value.reflect_type_name();
    match value.reflect_mut() {
        ReflectMut::Scalar(ScalarMut::String(v)) => {
            v.clear();
            v.push_str(s);
            Ok(())
        }
        other => Err(wrong_kind(type_name, other.kind(), Kind::String)),
    }
}

#[cfg(feature = "chrono")]
mod date_time {
    use chrono::{DateTime, FixedOffset, Utc};

    use super::UnmarshalContext;
    use crate::error::{Error, Result};
    use crate::reflect::Kind;

    fn parse(
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<Option<DateTime<FixedOffset>>> {
        let Some(data) = data else {
            return Ok(None);
        };
        let s = cx.options.single_string(data)?;
        DateTime::parse_from_rfc3339(&s)
            .map(Some)
            .map_err(|e| Error::invalid_value(&s, Kind::Opaque, e))
    }

    pub(super) fn unmarshal_utc(
        value: &mut DateTime<Utc>,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        if let Some(parsed) = parse(data, cx)? {
            *value = parsed.with_timezone(&Utc);
        }
        Ok(())
    }

    pub(super) fn unmarshal_fixed(
        value: &mut DateTime<FixedOffset>,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        if let Some(parsed) = parse(data, cx)? {
            *value = parsed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_literals() {
        assert_eq!(parse_signed("42"), Ok(42));
        assert_eq!(parse_signed("-42"), Ok(-42));
        assert_eq!(parse_signed("+7"), Ok(7));
        assert_eq!(parse_signed("0x1F"), Ok(31));
        assert_eq!(parse_signed("-0o17"), Ok(-15));
        assert_eq!(parse_signed("0b101"), Ok(5));
        assert_eq!(parse_signed("010"), Ok(8));
        assert_eq!(parse_signed("0"), Ok(0));
        assert_eq!(parse_signed("-0"), Ok(0));
        assert_eq!(parse_signed("1_000"), Ok(1000));
        assert_eq!(parse_signed("0x_ff"), Ok(255));
        assert_eq!(parse_signed("0_17"), Ok(15));
        assert!(parse_signed("08").is_err());
        assert!(parse_signed("_1").is_err());
        assert!(parse_signed("1_").is_err());
        assert!(parse_signed("1__0").is_err());
        assert!(parse_signed("").is_err());
        assert!(parse_signed("0x").is_err());
        assert!(parse_signed("--1").is_err());
        assert!(parse_signed("1.5").is_err());
    }

    #[test]
    fn narrow_targets_reject_out_of_range() {
        let mut small = 0_i8;
        let err = unmarshal_int(&mut small, "128").unwrap_err();
        assert!(matches!(err, Error::InvalidValue { kind: Kind::I8, .. }), "{err}");
        unmarshal_int(&mut small, "-128").unwrap();
        assert_eq!(small, -128);

        let mut unsigned = 0_u16;
        assert!(unmarshal_uint(&mut unsigned, "-1").is_err());
        unmarshal_uint(&mut unsigned, "0xffff").unwrap();
        assert_eq!(unsigned, u16::MAX);
    }

    #[test]
    fn bool_literals() {
        for s in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(parse_bool(s), Some(true), "{s}");
        }
        for s in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(parse_bool(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn separator_splitting() {
        let data = vec!["a,b".to_owned(), "c".to_owned()];
        assert_eq!(split(&data, SliceSeparator::Comma).as_ref(), ["a", "b", "c"]);
        assert_eq!(split(&data, SliceSeparator::None).as_ref(), ["a,b", "c"]);
    }
}
