//! Marshaling: typed values to [`Values`].
//!
//! Conversion happens at two levels:
//!
//! - [`ValuesMarshaler`]s turn a whole value (a record, a map or a pointer
//!   to one of them) into [`Values`].
//! - [`Marshaler`]s turn a single field or map element into the list of
//!   strings stored under one key.
//!
//! Both are produced by factories from the static [`TypeInfo`] of a type.
//! [`QsMarshaler`] wraps the configured factories with a per-type cache, so
//! each type is inspected once per pipeline.

use std::fmt;
use std::sync::Arc;

use crate::cache::CachedFactory;
use crate::error::Result;
use crate::reflect::{Reflect, TypeInfo};
use crate::tag::{FieldTag, MarshalPresence, SliceSeparator, TagOptions, TagSettings};
use crate::values::Values;

mod entry;
mod record;

pub use entry::DefaultMarshalerFactory;
pub use record::DefaultValuesMarshalerFactory;

/// Per-call context handed to [`Marshaler`]s.
#[derive(Clone, Copy, Debug)]
pub struct MarshalContext<'a> {
    /// Options of the running pipeline.
    pub options: &'a MarshalOptions,
    /// Resolved tag of the field being marshaled. Map elements and
    /// top-level values get a tag built from the pipeline defaults.
    pub tag: &'a FieldTag,
}

impl<'a> MarshalContext<'a> {
    pub fn new(options: &'a MarshalOptions, tag: &'a FieldTag) -> Self {
        MarshalContext { options, tag }
    }
}

/// Converts one value to the strings stored under a single key.
pub trait Marshaler: Send + Sync {
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>>;
}

/// Produces [`Marshaler`]s for types.
pub trait MarshalerFactory: Send + Sync {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>>;
}

/// Converts a whole value to [`Values`].
pub trait ValuesMarshaler: Send + Sync {
    fn marshal_values(&self, value: &dyn Reflect, opts: &MarshalOptions) -> Result<Values>;
}

/// Produces [`ValuesMarshaler`]s for types.
pub trait ValuesMarshalerFactory: Send + Sync {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>>;
}

/// Implemented by types that marshal themselves.
///
/// The capability is advertised through
/// [`TypeInfo::with_marshal_qs`], which `#[derive(Reflect)]` does for
/// `#[qs(custom)]` types. It takes precedence over the kind-based
/// converters but not over a converter registered for the exact type.
pub trait MarshalQs {
    fn marshal_qs(&self, cx: &MarshalContext<'_>) -> Result<Vec<String>>;
}

struct FnMarshaler<F>(F);

impl<F> Marshaler for FnMarshaler<F>
where
    F: Fn(&dyn Reflect, &MarshalContext<'_>) -> Result<Vec<String>> + Send + Sync,
{
    fn marshal(&self, value: &dyn Reflect, cx: &MarshalContext<'_>) -> Result<Vec<String>> {
        (self.0)(value, cx)
    }
}

/// Wraps a closure as a [`Marshaler`].
pub fn marshaler_fn<F>(f: F) -> Arc<dyn Marshaler>
where
    F: Fn(&dyn Reflect, &MarshalContext<'_>) -> Result<Vec<String>> + Send + Sync + 'static,
{
    Arc::new(FnMarshaler(f))
}

struct FnMarshalerFactory<F>(F);

impl<F> MarshalerFactory for FnMarshalerFactory<F>
where
    F: Fn(&TypeInfo, &MarshalOptions) -> Result<Arc<dyn Marshaler>> + Send + Sync,
{
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        (self.0)(info, opts)
    }
}

/// Wraps a closure as a [`MarshalerFactory`].
pub fn marshaler_factory_fn<F>(f: F) -> Arc<dyn MarshalerFactory>
where
    F: Fn(&TypeInfo, &MarshalOptions) -> Result<Arc<dyn Marshaler>> + Send + Sync + 'static,
{
    Arc::new(FnMarshalerFactory(f))
}

impl<F: MarshalerFactory + ?Sized> MarshalerFactory for Arc<F> {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        (**self).marshaler(info, opts)
    }
}

impl<F: ValuesMarshalerFactory + ?Sized> ValuesMarshalerFactory for Arc<F> {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        (**self).values_marshaler(info, opts)
    }
}

impl MarshalerFactory for CachedFactory<dyn MarshalerFactory, Arc<dyn Marshaler>> {
    fn marshaler(&self, info: &TypeInfo, opts: &MarshalOptions) -> Result<Arc<dyn Marshaler>> {
        self.cache
            .get_or_build(info, || self.inner.marshaler(info, opts))
    }
}

impl ValuesMarshalerFactory for CachedFactory<dyn ValuesMarshalerFactory, Arc<dyn ValuesMarshaler>> {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        self.cache
            .get_or_build(info, || self.inner.values_marshaler(info, opts))
    }
}

/// Configuration of a marshaling pipeline.
///
/// ```
/// use qs_marshal::{MarshalOptions, MarshalPresence, QsMarshaler};
///
/// let qs = QsMarshaler::new(
///     MarshalOptions::new()
///         .default_presence(MarshalPresence::OmitEmpty)
///         .name_transformer(|name| name.to_uppercase()),
/// );
/// # let _ = qs;
/// ```
#[derive(Clone)]
pub struct MarshalOptions {
    tags: TagSettings,
    values_factory: Arc<dyn ValuesMarshalerFactory>,
    factory: Arc<dyn MarshalerFactory>,
    encoder: Arc<dyn Fn(&Values) -> String + Send + Sync>,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MarshalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalOptions")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl MarshalOptions {
    pub fn new() -> Self {
        MarshalOptions {
            tags: TagSettings::default(),
            values_factory: Arc::new(DefaultValuesMarshalerFactory::new()),
            factory: Arc::new(DefaultMarshalerFactory::new()),
            encoder: Arc::new(Values::encode),
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

    /// Replaces the factory of whole-value marshalers.
    pub fn values_marshaler_factory<F: ValuesMarshalerFactory + 'static>(mut self, f: F) -> Self {
        self.values_factory = Arc::new(f);
        self
    }

    /// Replaces the factory of field and element marshalers.
    pub fn marshaler_factory<F: MarshalerFactory + 'static>(mut self, f: F) -> Self {
        self.factory = Arc::new(f);
        self
    }

    /// Replaces the query string encoder used by
    /// [`QsMarshaler::marshal_string`]. Defaults to [`Values::encode`].
    pub fn values_encoder<F>(mut self, f: F) -> Self
    where
        F: Fn(&Values) -> String + Send + Sync + 'static,
    {
        self.encoder = Arc::new(f);
        self
    }

    /// Presence policy for fields whose tag doesn't specify one, and for map
    /// entries.
    pub fn default_presence(mut self, presence: MarshalPresence) -> Self {
        self.tags.defaults.marshal.presence = Some(presence);
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

    pub fn values_factory(&self) -> &dyn ValuesMarshalerFactory {
        &*self.values_factory
    }

    pub fn factory(&self) -> &dyn MarshalerFactory {
        &*self.factory
    }

    /// The resolved default presence policy.
    pub fn presence(&self) -> MarshalPresence {
        self.tags.defaults.marshal.presence.unwrap_or_default()
    }

    pub(crate) fn tags(&self) -> &TagSettings {
        &self.tags
    }

    fn cached(mut self) -> Self {
        self.values_factory = Arc::new(CachedFactory::<_, Arc<dyn ValuesMarshaler>>::new(
            self.values_factory,
        ));
        self.factory = Arc::new(CachedFactory::<_, Arc<dyn Marshaler>>::new(self.factory));
        self
    }
}

/// A marshaling pipeline.
///
/// Converters are resolved on first use of a type and cached for the
/// lifetime of the pipeline, failures included. A `QsMarshaler` can be
/// shared between threads.
///
/// ```
/// use qs_marshal::{QsMarshaler, Reflect};
///
/// #[derive(Reflect)]
/// struct Query {
///     #[qs("q")]
///     search: String,
///     page: Option<u32>,
/// }
///
/// let qs = QsMarshaler::default();
/// let values = qs
///     .marshal(&Query { search: "rust".into(), page: Some(2) })
///     .unwrap();
/// assert_eq!(values.encode(), "q=rust&page=2");
/// ```
#[derive(Debug)]
pub struct QsMarshaler {
    opts: MarshalOptions,
}

impl Default for QsMarshaler {
    fn default() -> Self {
        Self::new(MarshalOptions::default())
    }
}

impl QsMarshaler {
    pub fn new(opts: MarshalOptions) -> Self {
        QsMarshaler {
            opts: opts.cached(),
        }
    }

    pub fn options(&self) -> &MarshalOptions {
        &self.opts
    }

    /// Marshals a record, a map, or a pointer to either.
    pub fn marshal<T: Reflect>(&self, value: &T) -> Result<Values> {
        self.values_marshaler(&T::type_info())?
            .marshal_values(value, &self.opts)
    }

    /// Marshals `value` and encodes the result as a query string.
    pub fn marshal_string<T: Reflect>(&self, value: &T) -> Result<String> {
        let values = self.marshal(value)?;
        Ok((self.opts.encoder)(&values))
    }

    /// Checks that values of type `T` can be marshaled, without marshaling
    /// one.
    pub fn check_marshal_type<T: Reflect>(&self) -> Result<()> {
        self.values_marshaler(&T::type_info()).map(|_| ())
    }

    /// Checks that the type of `value` can be marshaled.
    pub fn check_marshal<T: Reflect>(&self, _value: &T) -> Result<()> {
        self.check_marshal_type::<T>()
    }

    fn values_marshaler(&self, info: &TypeInfo) -> Result<Arc<dyn ValuesMarshaler>> {
        self.opts.values_factory().values_marshaler(info, &self.opts)
    }
}
