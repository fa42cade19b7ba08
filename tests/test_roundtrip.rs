use std::collections::{BTreeMap, HashMap};

use qs_marshal::{QsMarshaler, QsUnmarshaler, Reflect};

/// Marshals `$data`, checks the encoded form, then unmarshals it into a
/// default value and checks that the original comes back.
macro_rules! roundtrip_test {
    ($data:expr, $expected:expr) => {
        let data = $data;
        let encoded = QsMarshaler::default().marshal_string(&data).expect("marshal");
        pretty_assertions::assert_eq!(encoded, $expected);

        let decoded = decode_like(&data, &encoded);
        pretty_assertions::assert_eq!(data, decoded);
    };
}

fn decode_like<T: Reflect + Default>(_: &T, encoded: &str) -> T {
    let mut decoded = T::default();
    QsUnmarshaler::default()
        .unmarshal_str(&mut decoded, encoded)
        .expect("unmarshal");
    decoded
}

// ========== BASIC STRUCTS ==========

#[derive(Debug, Default, PartialEq, Reflect)]
struct Primitives {
    b: bool,
    i8: i8,
    i16: i16,
    i32: i32,
    i64: i64,
    isize: isize,
    u8: u8,
    u16: u16,
    u32: u32,
    u64: u64,
    usize: usize,
    f32: f32,
    f64: f64,
    s: String,
}

#[test]
fn primitives() {
    roundtrip_test!(
        Primitives {
            b: true,
            i8: i8::MIN,
            i16: -300,
            i32: 70000,
            i64: i64::MAX,
            isize: -1,
            u8: u8::MAX,
            u16: 500,
            u32: 7,
            u64: u64::MAX,
            usize: 0,
            f32: 0.25,
            f64: -1.5e-7,
            s: "hello world & more".into(),
        },
        "b=true&i8=-128&i16=-300&i32=70000&i64=9223372036854775807&isize=-1&u8=255&u16=500&u32=7&u64=18446744073709551615&usize=0&f32=0.25&f64=-1.5e-7&s=hello+world+%26+more"
    );
}

#[test]
fn unicode_and_reserved_characters() {
    #[derive(Debug, Default, PartialEq, Reflect)]
    struct Text {
        a: String,
        b: Vec<String>,
    }

    roundtrip_test!(
        Text {
            a: "é=ü?#+".into(),
            b: vec!["".into(), "%".into()],
        },
        "a=%C3%A9%3D%C3%BC%3F%23%2B&b=&b=%25"
    );
}

// ========== SEQUENCES ==========

#[derive(Debug, Default, PartialEq, Reflect)]
struct Sequences {
    list: Vec<u32>,
    #[qs(",comma")]
    packed: Vec<String>,
    array: [i16; 3],
    #[qs(",semicolon")]
    packed_array: [bool; 2],
    optional: Option<Vec<u8>>,
}

#[test]
fn sequences() {
    roundtrip_test!(
        Sequences {
            list: vec![3, 1, 2],
            packed: vec!["x".into(), "y".into()],
            array: [-1, 0, 1],
            packed_array: [true, false],
            optional: Some(vec![9]),
        },
        "list=3&list=1&list=2&packed=x%2Cy&array=-1&array=0&array=1&packed_array=true%3Bfalse&optional=9"
    );
}

// ========== MAPS ==========

#[test]
fn btree_map() {
    let mut map = BTreeMap::new();
    map.insert("beta".to_string(), vec![2.5f64, 3.0]);
    map.insert("alpha".to_string(), vec![]);
    map.insert("gamma".to_string(), vec![-0.5]);
    // Entries without strings are not written and don't come back.
    let data = map.clone();
    let encoded = QsMarshaler::default().marshal_string(&data).unwrap();
    pretty_assertions::assert_eq!(encoded, "beta=2.5&beta=3.0&gamma=-0.5");

    map.remove("alpha");
    roundtrip_test!(map, "beta=2.5&beta=3.0&gamma=-0.5");
}

#[test]
fn hash_map_of_options() {
    let mut map = HashMap::new();
    map.insert("k".to_string(), Some(1u8));
    roundtrip_test!(map, "k=1");
}

// ========== NESTED VALUES ==========

#[derive(Debug, Default, PartialEq, Reflect)]
struct Filters {
    #[qs("min_price,omitempty,nil")]
    min_price: Option<u32>,
    #[qs("max_price,omitempty,nil")]
    max_price: Option<u32>,
}

#[derive(Debug, Default, PartialEq, Reflect)]
struct Query {
    #[qs("q,req")]
    search: String,
    #[qs(embed)]
    filters: Filters,
    #[qs(",comma,keepold")]
    tags: Vec<String>,
}

#[test]
fn embedded_and_options() {
    roundtrip_test!(
        Query {
            search: "shoes".into(),
            filters: Filters {
                min_price: Some(10),
                max_price: None,
            },
            tags: vec!["red".into(), "sale".into()],
        },
        "q=shoes&tags=red%2Csale&min_price=10"
    );
}

#[test]
fn top_level_option() {
    roundtrip_test!(
        Some(Filters {
            min_price: Some(1),
            max_price: Some(2),
        }),
        "min_price=1&max_price=2"
    );
}
