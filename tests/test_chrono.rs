#![cfg(feature = "chrono")]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use pretty_assertions::assert_eq;
use qs_marshal::{Error, Reflect};

#[derive(Clone, Debug, Default, PartialEq, Reflect)]
struct Params {
    date_time: DateTime<FixedOffset>,
    #[qs(",omitempty")]
    created: Option<DateTime<Utc>>,
}

#[test]
fn dates() {
    let params = Params {
        date_time: DateTime::parse_from_rfc3339("2014-11-28T21:45:59.324310806+09:00").unwrap(),
        created: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
    };

    let s = qs_marshal::to_string(&params).unwrap();
    assert_eq!(
        s,
        "date_time=2014-11-28T21%3A45%3A59.324310806%2B09%3A00&created=2024-01-02T03%3A04%3A05Z"
    );

    let data: Params = qs_marshal::from_str(&s).unwrap();
    assert_eq!(data, params);
}

#[test]
fn unset_dates() {
    let params = Params {
        date_time: DateTime::parse_from_rfc3339("2000-01-01T00:00:00-05:00").unwrap(),
        created: None,
    };
    let values = qs_marshal::to_values(&params).unwrap();
    assert_eq!(values.get_first("date_time"), Some("2000-01-01T00:00:00-05:00"));
    assert!(!values.contains_key("created"));
}

#[test]
fn improperly_encoded_dates() {
    // An unescaped `+` is read as a space.
    let s = "date_time=2014-11-28T21:45:59.324310806+09:00";
    let err = qs_marshal::from_str::<Params>(s).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { .. }), "got: {err}");
}

#[test]
fn offsets_are_normalized_to_utc() {
    let data: Params = qs_marshal::from_str("created=2024-01-02T05%3A04%3A05%2B02%3A00").unwrap();
    assert_eq!(
        data.created,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    );
}
