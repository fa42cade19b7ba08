use pretty_assertions::assert_eq;
use qs_marshal::{Error, QsUnmarshaler, Reflect};

#[derive(Debug, Default, PartialEq, Reflect)]
struct Paging {
    page: u32,
    #[qs("per_page")]
    size: u32,
}

#[derive(Debug, Default, PartialEq, Reflect)]
struct Auth {
    #[qs("token,req")]
    token: String,
}

#[derive(Debug, Default, PartialEq, Reflect)]
struct Search {
    q: String,
    #[qs(embed)]
    paging: Paging,
    #[qs(embed)]
    auth: Option<Auth>,
}

#[test]
fn embedded_fields_are_flattened() {
    let search = Search {
        q: "rust".into(),
        paging: Paging { page: 2, size: 50 },
        auth: Some(Auth {
            token: "secret".into(),
        }),
    };
    assert_eq!(
        qs_marshal::to_string(&search).unwrap(),
        "q=rust&page=2&per_page=50&token=secret"
    );

    let parsed: Search = qs_marshal::from_str("token=secret&per_page=50&q=rust&page=2").unwrap();
    assert_eq!(parsed, search);
}

#[test]
fn unset_embedded_pointer_marshals_nothing() {
    let search = Search {
        q: "x".into(),
        ..Search::default()
    };
    assert_eq!(
        qs_marshal::to_string(&search).unwrap(),
        "q=x&page=0&per_page=0"
    );
}

#[test]
fn required_field_in_embedded_record() {
    let err = qs_marshal::from_str::<Search>("q=rust").unwrap_err();
    assert_eq!(err.required_field(), Some("token"));
    insta::assert_snapshot!(err.to_string(), @r#"embedded field "auth" :: missing required field "token" in record test_embedded::Auth"#);
}

#[test]
fn embedded_keys_overwrite_parent_keys() {
    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Page {
        page: u32,
        #[qs(embed)]
        paging: Paging,
    }

    let value = Page {
        page: 1,
        paging: Paging { page: 9, size: 10 },
    };
    assert_eq!(
        qs_marshal::to_string(&value).unwrap(),
        "page=9&per_page=10"
    );

    // Both read the shared key.
    let parsed: Page = qs_marshal::from_str("page=3").unwrap();
    assert_eq!(
        parsed,
        Page {
            page: 3,
            paging: Paging { page: 3, size: 0 },
        }
    );
}

#[test]
fn embedding_a_scalar_keeps_it_as_entry() {
    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Query {
        #[qs(embed)]
        limit: u32,
    }

    let query = Query { limit: 5 };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "limit=5");
    assert_eq!(qs_marshal::from_str::<Query>("limit=5").unwrap(), query);
}

#[test]
fn skipped_embedded_fields() {
    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Query {
        q: String,
        #[qs("-", embed)]
        paging: Paging,
    }

    let query = Query {
        q: "a".into(),
        paging: Paging { page: 1, size: 1 },
    };
    assert_eq!(qs_marshal::to_string(&query).unwrap(), "q=a");

    let parsed: Query = qs_marshal::from_str("q=b&page=4").unwrap();
    assert_eq!(parsed.paging, Paging::default());
}

#[test]
fn nested_embedding() {
    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Inner {
        #[qs(embed)]
        paging: Paging,
        sort: String,
    }

    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Outer {
        #[qs(embed)]
        inner: Inner,
        q: String,
    }

    let outer = Outer {
        inner: Inner {
            paging: Paging { page: 1, size: 2 },
            sort: "asc".into(),
        },
        q: "z".into(),
    };
    let encoded = qs_marshal::to_string(&outer).unwrap();
    assert_eq!(encoded, "q=z&sort=asc&page=1&per_page=2");
    assert_eq!(qs_marshal::from_str::<Outer>(&encoded).unwrap(), outer);
}

#[test]
fn embedded_errors_carry_context() {
    let qs = QsUnmarshaler::default();
    let err = qs
        .unmarshal_str(&mut Search::default(), "page=x&token=t")
        .unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { .. }));
    insta::assert_snapshot!(err.to_string(), @r#"error unmarshaling embedded field "paging" :: error unmarshaling entry "page" :: invalid u32 value "x": invalid digit found in string"#);
}

#[test]
fn broken_embedded_records_report_their_own_error() {
    #[derive(Debug, Default, Reflect)]
    struct Broken {
        #[qs("a,,")]
        a: u8,
    }

    #[derive(Debug, Default, Reflect)]
    struct Query {
        #[qs(embed)]
        broken: Broken,
    }

    #[derive(Debug, Default, Reflect)]
    struct OptionalQuery {
        #[qs(embed)]
        broken: Option<Broken>,
    }

    let err = qs_marshal::check_marshal_type::<Query>().unwrap_err();
    assert!(matches!(err.root(), Error::Tag { .. }), "{err}");
    let err = qs_marshal::check_unmarshal_type::<Query>().unwrap_err();
    assert!(matches!(err.root(), Error::Tag { .. }), "{err}");
    let err = qs_marshal::check_unmarshal_type::<OptionalQuery>().unwrap_err();
    assert!(matches!(err.root(), Error::Tag { .. }), "{err}");
}
