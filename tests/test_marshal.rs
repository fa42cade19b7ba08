use std::collections::{BTreeMap, HashMap};

use pretty_assertions::assert_eq;
use qs_marshal::{
    Error, MarshalOptions, MarshalPresence, QsMarshaler, Reflect, SliceSeparator, TagOptions,
    Values,
};

#[derive(Debug, Default, Reflect)]
struct Address {
    city: String,
    postcode: String,
}

#[derive(Debug, Default, Reflect)]
struct QueryParams {
    id: u8,
    name: String,
    phone: u32,
    #[qs("user_ids")]
    user_ids: Vec<u8>,
    ratio: f64,
    active: bool,
}

fn values(pairs: &[(&str, &[&str])]) -> Values {
    pairs
        .iter()
        .map(|(k, v)| (*k, v.iter().map(|s| s.to_string()).collect::<Vec<_>>()))
        .collect()
}

#[test]
fn marshal_struct() {
    let params = QueryParams {
        id: 42,
        name: "Acme".to_string(),
        phone: 12345,
        user_ids: vec![1, 2, 3, 4],
        ratio: 0.5,
        active: true,
    };

    assert_eq!(
        qs_marshal::to_values(&params).unwrap(),
        values(&[
            ("id", &["42"]),
            ("name", &["Acme"]),
            ("phone", &["12345"]),
            ("user_ids", &["1", "2", "3", "4"]),
            ("ratio", &["0.5"]),
            ("active", &["true"]),
        ])
    );
    assert_eq!(
        qs_marshal::to_string(&params).unwrap(),
        "id=42&name=Acme&phone=12345&user_ids=1&user_ids=2&user_ids=3&user_ids=4&ratio=0.5&active=true"
    );
}

#[test]
fn field_names_are_snake_cased() {
    #[derive(Reflect)]
    #[allow(non_snake_case)]
    struct Query {
        pageSize: u32,
        HTTPServer: String,
        r#type: String,
    }

    let query = Query {
        pageSize: 10,
        HTTPServer: "x".into(),
        r#type: "y".into(),
    };
    assert_eq!(
        qs_marshal::to_string(&query).unwrap(),
        "page_size=10&http_server=x&type=y"
    );
}

#[test]
fn keepempty_by_default() {
    let params = QueryParams::default();
    // Empty lists produce no strings and therefore no key.
    assert_eq!(
        qs_marshal::to_string(&params).unwrap(),
        "id=0&name=&phone=0&ratio=0.0&active=false"
    );
}

#[test]
fn omitempty_skips_zero_values() {
    #[derive(Default, Reflect)]
    struct Query {
        #[qs(",omitempty")]
        page: u32,
        #[qs(",omitempty")]
        name: String,
        #[qs(",omitempty")]
        active: bool,
        #[qs(",omitempty")]
        cursor: Option<String>,
        #[qs(",keepempty")]
        limit: u32,
    }

    assert_eq!(qs_marshal::to_string(&Query::default()).unwrap(), "limit=0");

    let query = Query {
        page: 2,
        cursor: Some(String::new()),
        ..Query::default()
    };
    // A set pointer is not empty even when it points to an empty value.
    assert_eq!(
        qs_marshal::to_string(&query).unwrap(),
        "page=2&cursor=&limit=0"
    );
}

#[test]
fn pipeline_default_presence() {
    let qs = QsMarshaler::new(MarshalOptions::new().default_presence(MarshalPresence::OmitEmpty));
    let params = QueryParams {
        name: "Acme".into(),
        ..QueryParams::default()
    };
    assert_eq!(qs.marshal_string(&params).unwrap(), "name=Acme");
}

#[test]
fn skipped_fields() {
    #[derive(Reflect)]
    struct Query {
        visible: u8,
        #[qs("-")]
        hidden: u8,
    }

    let query = Query {
        visible: 1,
        hidden: 2,
    };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "visible=1");
    let _ = query.hidden;
}

#[test]
fn skipped_fields_need_not_be_reflected() {
    /// A handle the engine knows nothing about.
    #[derive(Debug, Default)]
    struct Connection {
        open: bool,
    }

    #[derive(Debug, Default, Reflect)]
    struct Query {
        page: u8,
        #[qs("-")]
        conn: std::sync::Arc<std::sync::Mutex<Connection>>,
        #[qs("-,omitempty")]
        raw: Connection,
        last: u8,
    }

    let query = Query {
        page: 1,
        last: 2,
        ..Query::default()
    };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "page=1&last=2");

    let parsed: Query = qs_marshal::from_str("page=3&conn=x&raw=y&last=4").unwrap();
    assert_eq!((parsed.page, parsed.last), (3, 4));
    assert!(!parsed.raw.open);
    assert!(!parsed.conn.lock().unwrap().open);
}

#[test]
fn options_marshal_as_absent_or_present() {
    #[derive(Reflect)]
    struct Query {
        vec: Option<Vec<u8>>,
        num: Option<i32>,
    }

    let query = Query {
        vec: None,
        num: None,
    };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "");

    let query = Query {
        vec: Some(vec![1, 2]),
        num: Some(-3),
    };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "vec=1&vec=2&num=-3");
}

#[test]
fn separators_join_elements() {
    #[derive(Reflect)]
    struct Query {
        #[qs(",comma")]
        comma: Vec<String>,
        #[qs(",semicolon")]
        semicolon: [u8; 3],
        #[qs(",space")]
        space: Vec<u16>,
        #[qs(",comma")]
        empty: Vec<u8>,
    }

    let query = Query {
        comma: vec!["a".into(), "b".into()],
        semicolon: [1, 2, 3],
        space: vec![7],
        empty: Vec::new(),
    };
    assert_eq!(
        qs_marshal::to_values(&query).unwrap(),
        values(&[("comma", &["a,b"]), ("semicolon", &["1;2;3"]), ("space", &["7"])])
    );
}

#[test]
fn pipeline_default_separator() {
    let qs =
        QsMarshaler::new(MarshalOptions::new().default_slice_separator(SliceSeparator::Comma));

    #[derive(Reflect)]
    struct Query {
        ids: Vec<u32>,
        #[qs(",none")]
        raw: Vec<u32>,
    }

    let query = Query {
        ids: vec![1, 2],
        raw: vec![3, 4],
    };
    assert_eq!(qs.marshal_string(&query).unwrap(), "ids=1%2C2&raw=3&raw=4");
}

#[test]
fn type_level_defaults() {
    let qs = QsMarshaler::new(MarshalOptions::new().type_tag_defaults::<Vec<String>>(
        TagOptions {
            common: qs_marshal::tag::CommonTagOptions {
                slice_separator: Some(SliceSeparator::Semicolon),
            },
            ..TagOptions::default()
        },
    ));

    #[derive(Reflect)]
    struct Query {
        names: Vec<String>,
        ids: Vec<u8>,
    }

    let query = Query {
        names: vec!["a".into(), "b".into()],
        ids: vec![1, 2],
    };
    assert_eq!(
        qs.marshal(&query).unwrap(),
        values(&[("names", &["a;b"]), ("ids", &["1", "2"])])
    );
}

#[test]
fn name_transformer() {
    let qs = QsMarshaler::new(MarshalOptions::new().name_transformer(|name| name.to_uppercase()));

    #[derive(Reflect)]
    struct Query {
        page: u8,
        #[qs("explicit")]
        other: u8,
    }

    assert_eq!(
        qs.marshal_string(&Query { page: 1, other: 2 }).unwrap(),
        "PAGE=1&explicit=2"
    );
}

#[test]
fn marshal_maps() {
    let mut map = BTreeMap::new();
    map.insert("b".to_string(), vec![2u8, 3]);
    map.insert("a".to_string(), vec![1u8]);
    assert_eq!(qs_marshal::to_string(&map).unwrap(), "a=1&b=2&b=3");

    let mut map = HashMap::new();
    map.insert("only".to_string(), "value".to_string());
    assert_eq!(qs_marshal::to_string(&map).unwrap(), "only=value");

    let mut map = indexmap::IndexMap::new();
    map.insert("z".to_string(), 1i64);
    map.insert("y".to_string(), -1i64);
    assert_eq!(qs_marshal::to_string(&map).unwrap(), "z=1&y=-1");
}

#[test]
fn map_keys_must_be_strings() {
    let map: BTreeMap<u32, String> = BTreeMap::new();
    let err = qs_marshal::to_values(&map).unwrap_err();
    assert!(matches!(err, Error::MapKey(_)), "{err}");
}

#[test]
fn nested_records_are_unhandled_as_entries() {
    #[derive(Reflect)]
    struct Outer {
        address: Address,
    }

    let err = qs_marshal::check_marshal_type::<Outer>().unwrap_err();
    assert!(matches!(err.root(), Error::UnhandledType(_)), "{err}");
    insta::assert_snapshot!(err.to_string(), @"error creating marshaler for field address in record test_marshal::nested_records_are_unhandled_as_entries::Outer :: unhandled type: test_marshal::Address");
}

#[test]
fn top_level_scalars_are_unhandled() {
    let err = qs_marshal::check_marshal_type::<i32>().unwrap_err();
    assert_eq!(err, Error::UnhandledType("i32"));
    assert_eq!(err.to_string(), "unhandled type: i32");

    assert!(qs_marshal::check_marshal_type::<QueryParams>().is_ok());
    assert!(qs_marshal::check_marshal_type::<Option<QueryParams>>().is_ok());
    assert!(qs_marshal::check_marshal_type::<BTreeMap<String, Vec<u8>>>().is_ok());
}

#[test]
fn top_level_pointer() {
    let params: Option<QueryParams> = None;
    assert_eq!(qs_marshal::to_values(&params).unwrap(), Values::new());

    let params = Some(QueryParams {
        id: 1,
        ..QueryParams::default()
    });
    assert_eq!(
        qs_marshal::to_values(&params).unwrap().get("id"),
        Some(&["1".to_string()][..])
    );
}

#[test]
fn invalid_tags_fail_type_check() {
    #[derive(Reflect)]
    struct Query {
        #[qs("name,omitempty,keepempty")]
        name: String,
    }

    let qs = QsMarshaler::default();
    let err = qs.check_marshal_type::<Query>().unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r#"error creating marshaler for field name in record test_marshal::invalid_tags_fail_type_check::Query :: invalid tag: "name,omitempty,keepempty" :: only one MarshalPresence option is allowed - you've specified at least two: omitempty, keepempty"#);

    // The failure is cached and reported again on use.
    let again = qs
        .marshal(&Query {
            name: String::new(),
        })
        .unwrap_err();
    assert_eq!(err, again);
}

#[test]
fn custom_encoder() {
    let qs = QsMarshaler::new(MarshalOptions::new().values_encoder(|values| {
        values
            .iter()
            .map(|(k, v)| format!("{k}:{}", v.join("|")))
            .collect::<Vec<_>>()
            .join(";")
    }));

    #[derive(Reflect)]
    struct Query {
        a: Vec<u8>,
        b: String,
    }

    let query = Query {
        a: vec![1, 2],
        b: "x y".into(),
    };
    assert_eq!(qs.marshal_string(&query).unwrap(), "a:1|2;b:x y");
}
