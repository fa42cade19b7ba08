//! Unmarshaling: [`Values`] into typed values.
//!
//! Mirrors [`marshal`](crate::marshal): [`ValuesUnmarshaler`]s populate a
//! whole record, map or pointer from [`Values`], and [`Unmarshaler`]s
//! populate a single field or map element from the strings stored under one
//! key. `None` data means the key was absent from the input.

use std::fmt;
use std::sync::Arc;

use crate::cache::CachedFactory;
use crate::error::{Error, Result};
use crate::reflect::{Reflect, TypeInfo};
use crate::tag::{
    FieldTag, SliceSeparator, SliceUnexpectedValue, SliceValues, TagOptions, TagSettings,
    UnmarshalPresence,
};
use crate::values::Values;

mod entry;
mod record;

pub use entry::DefaultUnmarshalerFactory;
pub use record::DefaultValuesUnmarshalerFactory;

/// Per-call context handed to [`Unmarshaler`]s.
#[derive(Clone, Copy, Debug)]
pub struct UnmarshalContext<'a> {
    /// Options of the running pipeline.
    pub options: &'a UnmarshalOptions,
    /// Resolved tag of the field being unmarshaled. Map elements and
    /// top-level values get a tag built from the pipeline defaults.
    pub tag: &'a FieldTag,
}

impl<'a> UnmarshalContext<'a> {
    pub fn new(options: &'a UnmarshalOptions, tag: &'a FieldTag) -> Self {
        UnmarshalContext { options, tag }
    }
}

/// Populates one value from the strings stored under a single key.
pub trait Unmarshaler: Send + Sync {
    /// `data` is `None` when the key is absent from the input.
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()>;
}

/// Produces [`Unmarshaler`]s for types.
pub trait UnmarshalerFactory: Send + Sync {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>>;
}

/// Populates a whole value from [`Values`].
pub trait ValuesUnmarshaler: Send + Sync {
    fn unmarshal_values(
        &self,
        value: &mut dyn Reflect,
        values: &Values,
        opts: &UnmarshalOptions,
    ) -> Result<()>;
}

/// Produces [`ValuesUnmarshaler`]s for types.
pub trait ValuesUnmarshalerFactory: Send + Sync {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>>;
}

/// Implemented by types that unmarshal themselves.
///
/// Advertised through [`TypeInfo::with_unmarshal_qs`]. See
/// [`MarshalQs`](crate::MarshalQs).
pub trait UnmarshalQs {
    fn unmarshal_qs(&mut self, data: Option<&[String]>, cx: &UnmarshalContext<'_>) -> Result<()>;
}

struct FnUnmarshaler<F>(F);

impl<F> Unmarshaler for FnUnmarshaler<F>
where
    F: Fn(&mut dyn Reflect, Option<&[String]>, &UnmarshalContext<'_>) -> Result<()> + Send + Sync,
{
    fn unmarshal(
        &self,
        value: &mut dyn Reflect,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> Result<()> {
        (self.0)(value, data, cx)
    }
}

/// Wraps a closure as an [`Unmarshaler`].
pub fn unmarshaler_fn<F>(f: F) -> Arc<dyn Unmarshaler>
where
    F: Fn(&mut dyn Reflect, Option<&[String]>, &UnmarshalContext<'_>) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnUnmarshaler(f))
}

struct FnUnmarshalerFactory<F>(F);

impl<F> UnmarshalerFactory for FnUnmarshalerFactory<F>
where
    F: Fn(&TypeInfo, &UnmarshalOptions) -> Result<Arc<dyn Unmarshaler>> + Send + Sync,
{
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        (self.0)(info, opts)
    }
}

/// Wraps a closure as an [`UnmarshalerFactory`].
pub fn unmarshaler_factory_fn<F>(f: F) -> Arc<dyn UnmarshalerFactory>
where
    F: Fn(&TypeInfo, &UnmarshalOptions) -> Result<Arc<dyn Unmarshaler>> + Send + Sync + 'static,
{
    Arc::new(FnUnmarshalerFactory(f))
}

impl<F: UnmarshalerFactory + ?Sized> UnmarshalerFactory for Arc<F> {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        (**self).unmarshaler(info, opts)
    }
}

impl<F: ValuesUnmarshalerFactory + ?Sized> ValuesUnmarshalerFactory for Arc<F> {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        (**self).values_unmarshaler(info, opts)
    }
}

impl UnmarshalerFactory for CachedFactory<dyn UnmarshalerFactory, Arc<dyn Unmarshaler>> {
    fn unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn Unmarshaler>> {
        self.cache
            .get_or_build(info, || self.inner.unmarshaler(info, opts))
    }
}

impl ValuesUnmarshalerFactory
    for CachedFactory<dyn ValuesUnmarshalerFactory, Arc<dyn ValuesUnmarshaler>>
{
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        self.cache
            .get_or_build(info, || self.inner.values_unmarshaler(info, opts))
    }
}

type SliceToStringFn = dyn Fn(&[String]) -> Result<String> + Send + Sync;
type ParserFn = dyn Fn(&str) -> Result<Values> + Send + Sync;

/// The default slice-to-string policy: exactly one value is required.
pub fn single_value(data: &[String]) -> Result<String> {
    match data {
        [value] => Ok(value.clone()),
        _ => Err(Error::SliceToString(data.to_vec())),
    }
}

/// Configuration of an unmarshaling pipeline.
#[derive(Clone)]
pub struct UnmarshalOptions {
    tags: TagSettings,
    values_factory: Arc<dyn ValuesUnmarshalerFactory>,
    factory: Arc<dyn UnmarshalerFactory>,
    slice_to_string: Arc<SliceToStringFn>,
    parser: Arc<ParserFn>,
}

impl Default for UnmarshalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnmarshalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmarshalOptions")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl UnmarshalOptions {
    pub fn new() -> Self {
        UnmarshalOptions {
            tags: TagSettings::default(),
            values_factory: Arc::new(DefaultValuesUnmarshalerFactory::new()),
            factory: Arc::new(DefaultUnmarshalerFactory::new()),
            slice_to_string: Arc::new(single_value),
            parser: Arc::new(Values::parse),
        }
    }

    /// Sets how keys are derived from field names when a tag doesn't name
    /// the key. Defaults to [`snake_case`](crate::tag::snake_case).
    pub fn name_transformer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.tags.name_transformer = Arc::new(f);
        self
    }

    /// Replaces the factory of whole-value unmarshalers.
    pub fn values_unmarshaler_factory<F: ValuesUnmarshalerFactory + 'static>(
        mut self,
        f: F,
    ) -> Self {
        self.values_factory = Arc::new(f);
        self
    }

    /// Replaces the factory of field and element unmarshalers.
    pub fn unmarshaler_factory<F: UnmarshalerFactory + 'static>(mut self, f: F) -> Self {
        self.factory = Arc::new(f);
        self
    }

    /// Sets how scalar converters reduce the strings of a key to the single
    /// string they parse. Defaults to [`single_value`].
    pub fn slice_to_string<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) -> Result<String> + Send + Sync + 'static,
    {
        self.slice_to_string = Arc::new(f);
        self
    }

    /// Replaces the query string parser used by
    /// [`QsUnmarshaler::unmarshal_str`]. Defaults to [`Values::parse`].
    pub fn values_parser<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Values> + Send + Sync + 'static,
    {
        self.parser = Arc::new(f);
        self
    }

    pub fn default_presence(mut self, presence: UnmarshalPresence) -> Self {
        self.tags.defaults.unmarshal.presence = Some(presence);
        self
    }

    pub fn default_slice_values(mut self, slice_values: SliceValues) -> Self {
        self.tags.defaults.unmarshal.slice_values = Some(slice_values);
        self
    }

    pub fn default_slice_unexpected_value(mut self, policy: SliceUnexpectedValue) -> Self {
        self.tags.defaults.unmarshal.slice_unexpected_value = Some(policy);
        self
    }

    pub fn default_slice_separator(mut self, separator: SliceSeparator) -> Self {
        self.tags.defaults.common.slice_separator = Some(separator);
        self
    }

    /// Replaces all pipeline-level tag defaults.
    pub fn tag_defaults(mut self, defaults: TagOptions) -> Self {
        self.tags.defaults = defaults;
        self
    }

    /// Sets tag defaults for every field of type `T`. They apply before the
    /// pipeline-level defaults.
    pub fn type_tag_defaults<T: Reflect>(mut self, defaults: TagOptions) -> Self {
        self.tags
            .type_defaults
            .insert(std::any::TypeId::of::<T>(), defaults);
        self
    }

    pub fn values_factory(&self) -> &dyn ValuesUnmarshalerFactory {
        &*self.values_factory
    }

    pub fn factory(&self) -> &dyn UnmarshalerFactory {
        &*self.factory
    }

    /// Applies the slice-to-string policy.
    pub fn single_string(&self, data: &[String]) -> Result<String> {
        (self.slice_to_string)(data)
    }

    pub(crate) fn tags(&self) -> &TagSettings {
        &self.tags
    }

    fn cached(mut self) -> Self {
        self.values_factory = Arc::new(CachedFactory::<_, Arc<dyn ValuesUnmarshaler>>::new(
            self.values_factory,
        ));
        self.factory = Arc::new(CachedFactory::<_, Arc<dyn Unmarshaler>>::new(self.factory));
        self
    }
}

/// An unmarshaling pipeline.
///
/// ```
/// use qs_marshal::{QsUnmarshaler, Reflect};
///
/// #[derive(Debug, Default, PartialEq, Reflect)]
/// struct Query {
///     #[qs("q,req")]
///     search: String,
///     tags: Vec<String>,
///     page: Option<u32>,
/// }
///
/// let qs = QsUnmarshaler::default();
/// let mut query = Query::default();
/// qs.unmarshal_str(&mut query, "q=rust&tags=a&tags=b").unwrap();
/// assert_eq!(
///     query,
///     Query { search: "rust".into(), tags: vec!["a".into(), "b".into()], page: Some(0) }
/// );
///
/// let err = qs.unmarshal_str(&mut Query::default(), "tags=a").unwrap_err();
/// assert_eq!(err.required_field(), Some("q"));
/// ```
#[derive(Debug)]
pub struct QsUnmarshaler {
    opts: UnmarshalOptions,
}

impl Default for QsUnmarshaler {
    fn default() -> Self {
        Self::new(UnmarshalOptions::default())
    }
}

impl QsUnmarshaler {
    pub fn new(opts: UnmarshalOptions) -> Self {
        QsUnmarshaler {
            opts: opts.cached(),
        }
    }

    pub fn options(&self) -> &UnmarshalOptions {
        &self.opts
    }

    /// Populates a record, a map, or a pointer to either, from `values`.
    pub fn unmarshal<T: Reflect>(&self, into: &mut T, values: &Values) -> Result<()> {
        self.values_unmarshaler(&T::type_info())?
            .unmarshal_values(into, values, &self.opts)
    }

    /// Parses `query` and unmarshals the result into `into`.
    pub fn unmarshal_str<T: Reflect>(&self, into: &mut T, query: &str) -> Result<()> {
        let values = (self.opts.parser)(query)
            .map_err(|e| e.context(format!("error parsing query string {query:?}")))?;
        self.unmarshal(into, &values)
    }

    /// Checks that values of type `T` can be unmarshaled into, without
    /// unmarshaling.
    pub fn check_unmarshal_type<T: Reflect>(&self) -> Result<()> {
        self.values_unmarshaler(&T::type_info()).map(|_| ())
    }

    /// Checks that the type of `value` can be unmarshaled into.
    pub fn check_unmarshal<T: Reflect>(&self, _value: &T) -> Result<()> {
        self.check_unmarshal_type::<T>()
    }

    fn values_unmarshaler(&self, info: &TypeInfo) -> Result<Arc<dyn ValuesUnmarshaler>> {
        self.opts.values_factory().values_unmarshaler(info, &self.opts)
    }
}
