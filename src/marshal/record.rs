use std::collections::HashMap;
use std::sync::Arc;

use super::{
    MarshalContext, MarshalOptions, Marshaler, ValuesMarshaler, ValuesMarshalerFactory,
};
use crate::error::{Error, Result};
use crate::reflect::{
    Kind, Reflect, ReflectRef, Shape, TypeInfo, TypeStamp, missing_field, wrong_kind,
};
use crate::tag::{FieldTag, MarshalPresence};
use crate::values::Values;

/// The builtin [`ValuesMarshalerFactory`], dispatching on the kind of the
/// type: records, maps with string keys, and pointers to either.
pub struct DefaultValuesMarshalerFactory {
    sub_factories: HashMap<Kind, Arc<dyn ValuesMarshalerFactory>>,
}

impl Default for DefaultValuesMarshalerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultValuesMarshalerFactory {
    pub fn new() -> Self {
        DefaultValuesMarshalerFactory {
            sub_factories: HashMap::new(),
        }
        .register_sub_factory(Kind::Record, Arc::new(RecordMarshalerFactory))
        .register_sub_factory(Kind::Map, Arc::new(MapMarshalerFactory))
        .register_sub_factory(Kind::Pointer, Arc::new(PointerMarshalerFactory))
    }

    /// Registers a factory for every type of the given kind, replacing the
    /// builtin one.
    pub fn register_sub_factory(
        mut self,
        kind: Kind,
        factory: Arc<dyn ValuesMarshalerFactory>,
    ) -> Self {
        self.sub_factories.insert(kind, factory);
        self
    }
}

impl ValuesMarshalerFactory for DefaultValuesMarshalerFactory {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        match self.sub_factories.get(&info.kind()) {
            Some(factory) => factory.values_marshaler(info, opts),
            None => Err(Error::UnhandledType(info.type_name())),
        }
    }
}

// -----------------------------------------------------------------------------
// Records

struct RecordMarshalerFactory;

impl ValuesMarshalerFactory for RecordMarshalerFactory {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        let mut fields = Vec::new();
        let mut embedded = Vec::new();

        for field in info.fields() {
            let field_type = field.type_info();
            let context = || {
                format!(
                    "error creating marshaler for field {} in record {}",
                    field.name(),
                    info.type_name()
                )
            };

            let Some(tag) = opts
                .tags()
                .field_tag(&field, &field_type)
                .map_err(|e| e.context(context()))?
            else {
                continue;
            };

            // an embedded record must build; anything else without a values
            // converter stays an ordinary entry
            if field.is_embedded() {
                match opts.values_factory().values_marshaler(&field_type, opts) {
                    Ok(marshaler) => {
                        embedded.push(EmbeddedField {
                            index: field.index(),
                            name: field.name(),
                            marshaler,
                        });
                        continue;
                    }
                    Err(err) if field_type.is_record_like() => {
                        return Err(err.context(context()));
                    }
                    Err(_) => {}
                }
            }

            let marshaler = opts
                .factory()
                .marshaler(&field_type, opts)
                .map_err(|e| e.context(context()))?;
            fields.push(RecordField {
                index: field.index(),
                tag,
                marshaler,
            });
        }

        tracing::trace!(
            type_name = info.type_name(),
            fields = fields.len(),
            embedded = embedded.len(),
            "built record marshaler"
        );
        Ok(Arc::new(RecordMarshaler {
            stamp: TypeStamp::of(info),
            fields,
            embedded,
        }))
    }
}

struct RecordField {
    index: usize,
    tag: FieldTag,
    marshaler: Arc<dyn Marshaler>,
}

struct EmbeddedField {
    index: usize,
    name: &'static str,
    marshaler: Arc<dyn ValuesMarshaler>,
}

/// Writes each field under its key, then merges the values of embedded
/// fields. Keys of embedded fields overwrite the ones already written.
struct RecordMarshaler {
    stamp: TypeStamp,
    fields: Vec<RecordField>,
    embedded: Vec<EmbeddedField>,
}

impl ValuesMarshaler for RecordMarshaler {
    fn marshal_values(&self, value: &dyn Reflect, opts: &MarshalOptions) -> Result<Values> {
        self.stamp.check(value)?;
        let ReflectRef::Record(record) = value.reflect_ref() else {
            return Err(wrong_kind(self.stamp.name(), value.kind(), Kind::Record));
        };

        let mut values = Values::with_capacity(self.fields.len());
        for field in &self.fields {
            let field_value = record
                .field(field.index)
                .ok_or_else(|| missing_field(self.stamp.name(), field.index))?;
            if field.tag.marshal_presence == MarshalPresence::OmitEmpty
                && field_value.is_empty_value()
            {
                continue;
            }

            let cx = MarshalContext::new(opts, &field.tag);
            let encoded = field
                .marshaler
                .marshal(field_value, &cx)
                .map_err(|e| e.context(format!("error marshaling entry {:?}", field.tag.name)))?;
            if !encoded.is_empty() {
                values.insert(field.tag.name.clone(), encoded);
            }
        }

        for field in &self.embedded {
            let field_value = record
                .field(field.index)
                .ok_or_else(|| missing_field(self.stamp.name(), field.index))?;
            let embedded = field
                .marshaler
                .marshal_values(field_value, opts)
                .map_err(|e| e.context(format!("error marshaling embedded field {:?}", field.name)))?;
            values.merge(embedded);
        }

        Ok(values)
    }
}

// -----------------------------------------------------------------------------
// Maps

struct MapMarshalerFactory;

impl ValuesMarshalerFactory for MapMarshalerFactory {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        let Shape::Map { key, value } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        if key().kind() != Kind::String {
            return Err(Error::MapKey(info.type_name()));
        }
        let value = value();
        let elem = opts.factory().marshaler(&value, opts).map_err(|e| {
            e.context(format!(
                "error creating marshaler for map value type {}",
                value.type_name()
            ))
        })?;
        Ok(Arc::new(MapMarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Writes each entry under its key, applying the default presence policy
/// of the pipeline to every value.
struct MapMarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Marshaler>,
}

impl ValuesMarshaler for MapMarshaler {
    fn marshal_values(&self, value: &dyn Reflect, opts: &MarshalOptions) -> Result<Values> {
        self.stamp.check(value)?;
        let ReflectRef::Map(map) = value.reflect_ref() else {
            return Err(wrong_kind(self.stamp.name(), value.kind(), Kind::Map));
        };

        let tag = opts.tags().default_tag();
        let cx = MarshalContext::new(opts, &tag);
        let mut values = Values::with_capacity(map.len());
        for (key, item) in map.entries() {
            if tag.marshal_presence == MarshalPresence::OmitEmpty && item.is_empty_value() {
                continue;
            }
            let key = key
                .as_str()
                .ok_or_else(|| wrong_kind(key.reflect_type_name(), key.kind(), Kind::String))?;
            let encoded = self
                .elem
                .marshal(item, &cx)
                .map_err(|e| e.context(format!("error marshaling key {key:?}")))?;
            if !encoded.is_empty() {
                values.insert(key, encoded);
            }
        }
        Ok(values)
    }
}

// -----------------------------------------------------------------------------
// Pointers

struct PointerMarshalerFactory;

impl ValuesMarshalerFactory for PointerMarshalerFactory {
    fn values_marshaler(
        &self,
        info: &TypeInfo,
        opts: &MarshalOptions,
    ) -> Result<Arc<dyn ValuesMarshaler>> {
        let Shape::Pointer { item } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.values_factory().values_marshaler(&item(), opts)?;
        Ok(Arc::new(PointerMarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// An unset pointer marshals to empty values.
struct PointerMarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn ValuesMarshaler>,
}

impl ValuesMarshaler for PointerMarshaler {
    fn marshal_values(&self, value: &dyn Reflect, opts: &MarshalOptions) -> Result<Values> {
        self.stamp.check(value)?;
        let ReflectRef::Pointer(ptr) = value.reflect_ref() else {
            return Err(wrong_kind(self.stamp.name(), value.kind(), Kind::Pointer));
        };
        match ptr.get() {
            Some(inner) => self.elem.marshal_values(inner, opts),
            None => Ok(Values::new()),
        }
    }
}
