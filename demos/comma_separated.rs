//! Packing list fields into a single comma separated value.
//!
//! Run with `cargo run --example comma_separated`.

use qs_marshal::{QsMarshaler, QsUnmarshaler, Reflect};

#[derive(Debug, Default, PartialEq, Reflect)]
struct Query {
    #[qs("r,comma")]
    values: Vec<u8>,
    #[qs(",comma,skipbadvalue")]
    lenient: Vec<u8>,
    s: u8,
}

fn main() {
    let de = QsUnmarshaler::default();

    let mut query = Query::default();
    de.unmarshal_str(&mut query, "s=12&r=1,2,3&lenient=4,x,5")
        .unwrap();
    println!("{query:?}");
    assert_eq!(query.values, vec![1, 2, 3]);
    assert_eq!(query.lenient, vec![4, 5]);

    // Repeated keys and packed values can be mixed.
    let mut query = Query::default();
    de.unmarshal_str(&mut query, "r=1,2&r=3").unwrap();
    assert_eq!(query.values, vec![1, 2, 3]);

    let encoded = QsMarshaler::default().marshal_string(&query).unwrap();
    println!("{encoded}");
    assert_eq!(encoded, "r=1%2C2%2C3&s=0");
}
