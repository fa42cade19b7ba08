//! Type-driven marshaling between typed values and multi-valued query maps.
//!
//! A [`Values`] is an ordered map from keys to lists of strings, the shape of
//! a parsed URL query. This crate converts records (structs deriving
//! [`Reflect`]) and string-keyed maps to and from `Values`, steered by
//! per-field tags:
//!
//! ```
//! use qs_marshal::Reflect;
//!
//! #[derive(Debug, Default, PartialEq, Reflect)]
//! struct Search {
//!     #[qs("q,req")]
//!     query: String,
//!     #[qs(",omitempty")]
//!     page: u32,
//!     #[qs("tag,comma")]
//!     tags: Vec<String>,
//!     #[qs("-")]
//!     cache_key: String,
//! }
//!
//! let search = Search {
//!     query: "rust serde".into(),
//!     page: 0,
//!     tags: vec!["web".into(), "parsing".into()],
//!     cache_key: "ignored".into(),
//! };
//! let query = qs_marshal::to_string(&search).unwrap();
//! assert_eq!(query, "q=rust+serde&tag=web%2Cparsing");
//!
//! let parsed: Search = qs_marshal::from_str(&query).unwrap();
//! assert_eq!(parsed, Search { cache_key: String::new(), ..search });
//! ```
//!
//! ## Tags
//!
//! A tag is written `#[qs("name,option,option")]`. The name defaults to the
//! field name in snake case, and the options are described in [`tag`].
//! `#[qs(embed)]` merges the keys of a nested record into its parent.
//!
//! ## Pipelines
//!
//! The free functions build a default pipeline on every call. Long-lived
//! programs should keep a [`QsMarshaler`] or [`QsUnmarshaler`] around: they
//! resolve the converters of each type once and cache them, and can be
//! configured with [`MarshalOptions`] and [`UnmarshalOptions`] to change the
//! tag defaults, the key naming, or to plug in custom converters.
//!
//! ## Supported types
//!
//! At the top level, records, maps keyed by `String`, and `Option`s of those.
//! As field values: `bool`, the integer and float primitives, `String`,
//! `Option<T>`, `Vec<T>`, `[T; N]` of those, and with the `chrono` feature
//! `DateTime<Utc>` and `DateTime<FixedOffset>`. Other types plug in through
//! [`MarshalQs`]/[`UnmarshalQs`] or a factory registration.

extern crate self as qs_marshal;

mod cache;
pub mod error;
pub mod marshal;
pub mod reflect;
pub mod tag;
pub mod unmarshal;
pub mod values;

#[doc(inline)]
pub use error::{Error, Result, TagError};
#[doc(inline)]
pub use marshal::{
    DefaultMarshalerFactory, DefaultValuesMarshalerFactory, MarshalContext, MarshalOptions,
    MarshalQs, Marshaler, MarshalerFactory, QsMarshaler, ValuesMarshaler, ValuesMarshalerFactory,
};
#[doc(inline)]
pub use reflect::{
    Array, FieldInfo, Kind, List, Map, Pointer, Record, Reflect, ReflectMut, ReflectRef,
    ScalarMut, ScalarRef, Shape, TypeInfo,
};
#[doc(inline)]
pub use tag::{
    MarshalPresence, SliceSeparator, SliceUnexpectedValue, SliceValues, TagOptions,
    UnmarshalPresence,
};
#[doc(inline)]
pub use unmarshal::{
    DefaultUnmarshalerFactory, DefaultValuesUnmarshalerFactory, QsUnmarshaler, UnmarshalContext,
    UnmarshalOptions, UnmarshalQs, Unmarshaler, UnmarshalerFactory, ValuesUnmarshaler,
    ValuesUnmarshalerFactory,
};
#[doc(inline)]
pub use values::Values;

#[cfg(feature = "derive")]
pub use qs_marshal_derive::Reflect;

/// Marshals `value` to [`Values`] with a default pipeline.
pub fn to_values<T: Reflect>(value: &T) -> Result<Values> {
    QsMarshaler::default().marshal(value)
}

/// Marshals `value` to an encoded query string with a default pipeline.
pub fn to_string<T: Reflect>(value: &T) -> Result<String> {
    QsMarshaler::default().marshal_string(value)
}

/// Unmarshals [`Values`] into a default-initialized `T`.
pub fn from_values<T: Reflect + Default>(values: &Values) -> Result<T> {
    let mut out = T::default();
    QsUnmarshaler::default().unmarshal(&mut out, values)?;
    Ok(out)
}

/// Parses a query string and unmarshals it into a default-initialized `T`.
pub fn from_str<T: Reflect + Default>(query: &str) -> Result<T> {
    let mut out = T::default();
    QsUnmarshaler::default().unmarshal_str(&mut out, query)?;
    Ok(out)
}

/// Checks that `T` can be marshaled by a default pipeline.
pub fn check_marshal_type<T: Reflect>() -> Result<()> {
    QsMarshaler::default().check_marshal_type::<T>()
}

/// Checks that `T` can be unmarshaled into by a default pipeline.
pub fn check_unmarshal_type<T: Reflect>() -> Result<()> {
    QsUnmarshaler::default().check_unmarshal_type::<T>()
}
