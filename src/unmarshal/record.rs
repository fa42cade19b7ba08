use std::collections::HashMap;
use std::sync::Arc;

use super::{
    UnmarshalContext, UnmarshalOptions, Unmarshaler, ValuesUnmarshaler, ValuesUnmarshalerFactory,
};
use crate::error::{Error, Result};
use crate::reflect::{
    Kind, Reflect, ReflectMut, Shape, TypeInfo, TypeStamp, missing_field, wrong_kind,
};
use crate::tag::{FieldTag, UnmarshalPresence};
use crate::values::Values;

/// The builtin [`ValuesUnmarshalerFactory`], dispatching on the kind of the
/// type: records, maps with string keys, and pointers to either.
pub struct DefaultValuesUnmarshalerFactory {
    sub_factories: HashMap<Kind, Arc<dyn ValuesUnmarshalerFactory>>,
}

impl Default for DefaultValuesUnmarshalerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultValuesUnmarshalerFactory {
    pub fn new() -> Self {
        DefaultValuesUnmarshalerFactory {
            sub_factories: HashMap::new(),
        }
        .register_sub_factory(Kind::Record, Arc::new(RecordUnmarshalerFactory))
        .register_sub_factory(Kind::Map, Arc::new(MapUnmarshalerFactory))
        .register_sub_factory(Kind::Pointer, Arc::new(PointerUnmarshalerFactory))
    }

    /// Registers a factory for every type of the given kind, replacing the
    /// builtin one.
    pub fn register_sub_factory(
        mut self,
        kind: Kind,
        factory: Arc<dyn ValuesUnmarshalerFactory>,
    ) -> Self {
        self.sub_factories.insert(kind, factory);
        self
    }
}

impl ValuesUnmarshalerFactory for DefaultValuesUnmarshalerFactory {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        match self.sub_factories.get(&info.kind()) {
            Some(factory) => factory.values_unmarshaler(info, opts),
            None => Err(Error::UnhandledType(info.type_name())),
        }
    }
}

// -----------------------------------------------------------------------------
// Records

struct RecordUnmarshalerFactory;

impl ValuesUnmarshalerFactory for RecordUnmarshalerFactory {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        let mut fields = Vec::new();
        let mut embedded = Vec::new();

        for field in info.fields() {
            let field_type = field.type_info();
            let context = || {
                format!(
                    "error creating unmarshaler for field {} in record {}",
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

            if field.is_embedded() {
                match opts.values_factory().values_unmarshaler(&field_type, opts) {
                    Ok(unmarshaler) => {
                        embedded.push(EmbeddedField {
                            index: field.index(),
                            name: field.name(),
                            unmarshaler,
                        });
                        continue;
                    }
                    Err(err) if field_type.is_record_like() => {
                        return Err(err.context(context()));
                    }
                    Err(_) => {}
                }
            }

            let unmarshaler = opts
                .factory()
                .unmarshaler(&field_type, opts)
                .map_err(|e| e.context(context()))?;
            fields.push(RecordField {
                index: field.index(),
                tag,
                unmarshaler,
            });
        }

        tracing::trace!(
            type_name = info.type_name(),
            fields = fields.len(),
            embedded = embedded.len(),
            "built record unmarshaler"
        );
        Ok(Arc::new(RecordUnmarshaler {
            stamp: TypeStamp::of(info),
            fields,
            embedded,
        }))
    }
}

struct RecordField {
    index: usize,
    tag: FieldTag,
    unmarshaler: Arc<dyn Unmarshaler>,
}

struct EmbeddedField {
    index: usize,
    name: &'static str,
    unmarshaler: Arc<dyn ValuesUnmarshaler>,
}

/// Populates each field from its key according to the field's presence
/// policy, then lets embedded fields read the same values.
struct RecordUnmarshaler {
    stamp: TypeStamp,
    fields: Vec<RecordField>,
    embedded: Vec<EmbeddedField>,
}

impl ValuesUnmarshaler for RecordUnmarshaler {
    fn unmarshal_values(
        &self,
        value: &mut dyn Reflect,
        values: &Values,
        opts: &UnmarshalOptions,
    ) -> Result<()> {
        self.stamp.check(value)?;
        let record = match value.reflect_mut() {
            ReflectMut::Record(record) => record,
            other => return Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Record)),
        };

        for field in &self.fields {
            let name = &field.tag.name;
            let data = values.get(name);
            if data.is_none() {
                match field.tag.unmarshal_presence {
                    UnmarshalPresence::Nil => continue,
                    UnmarshalPresence::Req => {
                        return Err(Error::RequiredField {
                            field: name.clone(),
                            message: format!(
                                "missing required field {name:?} in record {}",
                                self.stamp.name()
                            ),
                        });
                    }
                    UnmarshalPresence::Opt => {}
                }
            }

            let field_value = record
                .field_mut(field.index)
                .ok_or_else(|| missing_field(self.stamp.name(), field.index))?;
            let cx = UnmarshalContext::new(opts, &field.tag);
            field
                .unmarshaler
                .unmarshal(field_value, data, &cx)
                .map_err(|e| e.context(format!("error unmarshaling entry {name:?}")))?;
        }

        for field in &self.embedded {
            let field_value = record
                .field_mut(field.index)
                .ok_or_else(|| missing_field(self.stamp.name(), field.index))?;
            if let Err(err) = field.unmarshaler.unmarshal_values(field_value, values, opts) {
                return Err(match err.required_field().map(str::to_owned) {
                    Some(missing) => Error::RequiredField {
                        field: missing,
                        message: format!("embedded field {:?} :: {err}", field.name),
                    },
                    None => {
                        err.context(format!("error unmarshaling embedded field {:?}", field.name))
                    }
                });
            }
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Maps

struct MapUnmarshalerFactory;

impl ValuesUnmarshalerFactory for MapUnmarshalerFactory {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        let Shape::Map { key, value } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        if key().kind() != Kind::String {
            return Err(Error::MapKey(info.type_name()));
        }
        let value = value();
        let elem = opts.factory().unmarshaler(&value, opts).map_err(|e| {
            e.context(format!(
                "error creating unmarshaler for map value type {}",
                value.type_name()
            ))
        })?;
        Ok(Arc::new(MapUnmarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Clears the map, then inserts one entry per incoming key. Any failing
/// entry fails the whole call.
struct MapUnmarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn Unmarshaler>,
}

impl ValuesUnmarshaler for MapUnmarshaler {
    fn unmarshal_values(
        &self,
        value: &mut dyn Reflect,
        values: &Values,
        opts: &UnmarshalOptions,
    ) -> Result<()> {
        self.stamp.check(value)?;
        let map = match value.reflect_mut() {
            ReflectMut::Map(map) => map,
            other => return Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Map)),
        };

        let tag = opts.tags().default_tag();
        let cx = UnmarshalContext::new(opts, &tag);
        map.clear();
        for (key, data) in values {
            map.insert_with(key, &mut |item: &mut dyn Reflect| {
                self.elem.unmarshal(item, Some(data.as_slice()), &cx)
            })
            .map_err(|e| e.context(format!("error unmarshaling key {key:?}")))?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Pointers

struct PointerUnmarshalerFactory;

impl ValuesUnmarshalerFactory for PointerUnmarshalerFactory {
    fn values_unmarshaler(
        &self,
        info: &TypeInfo,
        opts: &UnmarshalOptions,
    ) -> Result<Arc<dyn ValuesUnmarshaler>> {
        let Shape::Pointer { item } = *info.shape() else {
            return Err(Error::UnhandledType(info.type_name()));
        };
        let elem = opts.values_factory().values_unmarshaler(&item(), opts)?;
        Ok(Arc::new(PointerUnmarshaler {
            stamp: TypeStamp::of(info),
            elem,
        }))
    }
}

/// Allocates the pointee if unset, then delegates.
struct PointerUnmarshaler {
    stamp: TypeStamp,
    elem: Arc<dyn ValuesUnmarshaler>,
}

impl ValuesUnmarshaler for PointerUnmarshaler {
    fn unmarshal_values(
        &self,
        value: &mut dyn Reflect,
        values: &Values,
        opts: &UnmarshalOptions,
    ) -> Result<()> {
        self.stamp.check(value)?;
        match value.reflect_mut() {
            ReflectMut::Pointer(ptr) => {
                self.elem
                    .unmarshal_values(ptr.get_or_insert_default(), values, opts)
            }
            other => Err(wrong_kind(self.stamp.name(), other.kind(), Kind::Pointer)),
        }
    }
}
