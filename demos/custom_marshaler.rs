//! Plugging custom converters into a pipeline.
//!
//! `Level` converts itself, while `Duration`s are handled by a converter
//! registered with the factories, since the type is foreign.
//!
//! Run with `cargo run --example custom_marshaler`.

use std::time::Duration;

use qs_marshal::{
    DefaultMarshalerFactory, DefaultUnmarshalerFactory, Error, Kind, MarshalContext,
    MarshalOptions, MarshalQs, QsMarshaler, QsUnmarshaler, Reflect, ReflectMut, ReflectRef,
    TypeInfo, UnmarshalContext, UnmarshalOptions, UnmarshalQs,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Reflect)]
#[qs(custom)]
enum Level {
    #[default]
    Info,
    Warn,
    Error,
}

impl MarshalQs for Level {
    fn marshal_qs(&self, _cx: &MarshalContext<'_>) -> qs_marshal::Result<Vec<String>> {
        let s = match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        Ok(vec![s.to_owned()])
    }
}

impl UnmarshalQs for Level {
    fn unmarshal_qs(
        &mut self,
        data: Option<&[String]>,
        cx: &UnmarshalContext<'_>,
    ) -> qs_marshal::Result<()> {
        let Some(data) = data else {
            return Ok(());
        };
        *self = match cx.options.single_string(data)?.as_str() {
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            other => return Err(Error::custom(format!("unknown level {other:?}"))),
        };
        Ok(())
    }
}

/// Wraps the foreign `Duration` so it can describe itself, written as a
/// number of milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Timeout(Duration);

impl Reflect for Timeout {
    fn type_info() -> TypeInfo {
        TypeInfo::opaque::<Self>()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Opaque
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Opaque
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[derive(Debug, Default, PartialEq, Reflect)]
struct Filter {
    #[qs("level,omitempty")]
    min_level: Level,
    #[qs(",nil")]
    timeout: Option<Timeout>,
    levels: Vec<Level>,
}

fn main() {
    let qs = QsMarshaler::new(MarshalOptions::new().marshaler_factory(
        DefaultMarshalerFactory::new().register_type(|t: &Timeout, _: &MarshalContext<'_>| {
            Ok(vec![t.0.as_millis().to_string()])
        }),
    ));
    let de = QsUnmarshaler::new(UnmarshalOptions::new().unmarshaler_factory(
        DefaultUnmarshalerFactory::new().register_type(
            |t: &mut Timeout, data: Option<&[String]>, cx: &UnmarshalContext<'_>| {
                if let Some(data) = data {
                    let s = cx.options.single_string(data)?;
                    let ms = s
                        .parse()
                        .map_err(|e| Error::custom(format!("invalid timeout {s:?}: {e}")))?;
                    t.0 = Duration::from_millis(ms);
                }
                Ok(())
            },
        ),
    ));

    let filter = Filter {
        min_level: Level::Warn,
        timeout: Some(Timeout(Duration::from_millis(1500))),
        levels: vec![Level::Info, Level::Error],
    };
    let encoded = qs.marshal_string(&filter).unwrap();
    println!("{encoded}");
    assert_eq!(encoded, "level=warn&timeout=1500&levels=info&levels=error");

    let mut decoded = Filter::default();
    de.unmarshal_str(&mut decoded, &encoded).unwrap();
    println!("{decoded:?}");
    assert_eq!(decoded, filter);

    let err = de
        .unmarshal_str(&mut Filter::default(), "levels=debug")
        .unwrap_err();
    println!("{err}");

    assert_eq!(Timeout::type_info().kind(), Kind::Opaque);
}
