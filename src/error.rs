use std::fmt::Display;

use crate::reflect::Kind;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while building converters or while marshaling and
/// unmarshaling values.
///
/// Configuration errors (`UnhandledType`, `Tag`, `MapKey`) are raised the
/// first time a type is resolved and are cached along with the type, so
/// every later attempt fails with the same error. Data errors
/// (`RequiredField`, `InvalidValue`, `LengthMismatch`, `SliceToString`)
/// are returned to the caller of the marshal or unmarshal call.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// No converter could be resolved for the type.
    #[error("unhandled type: {0}")]
    UnhandledType(&'static str),

    /// A converter was invoked with a value of a different type than the
    /// one it was built for.
    #[error("received type {actual}, want {expected}")]
    WrongType {
        actual: &'static str,
        expected: &'static str,
    },

    /// A converter was invoked with a value of a different kind than the
    /// one it handles.
    #[error("received type {actual} of kind {actual_kind}, want kind {expected}")]
    WrongKind {
        actual: &'static str,
        actual_kind: Kind,
        expected: Kind,
    },

    /// A field tagged with `req` was missing from the unmarshaled values.
    #[error("{message}")]
    RequiredField { field: String, message: String },

    /// Malformed field tag.
    #[error("invalid tag: {tag:?} :: {source}")]
    Tag {
        tag: String,
        #[source]
        source: TagError,
    },

    /// A single string could not be parsed into the target kind.
    #[error("invalid {kind} value {value:?}: {reason}")]
    InvalidValue {
        value: String,
        kind: Kind,
        reason: String,
    },

    /// The number of incoming values doesn't match a fixed-size sequence.
    #[error("array length == {actual}, want {expected}")]
    LengthMismatch { actual: usize, expected: usize },

    /// Maps can only be converted when their key is a string.
    #[error("map key type is expected to be string: {0}")]
    MapKey(&'static str),

    /// The default slice-to-string policy received zero or several values.
    #[error("expected exactly one value, got {0:?}")]
    SliceToString(Vec<String>),

    /// An inner error annotated with the field, key or index it came from.
    #[error("{context} :: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Custom(String),
}

/// Errors raised by the field tag parser.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag string contains a surplus comma")]
    SurplusComma,

    #[error("invalid option in field tag: {0:?}")]
    InvalidOption(String),

    #[error(
        "only one {category} option is allowed - you've specified at least two: {first}, {second}"
    )]
    DuplicateOption {
        category: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

impl Error {
    /// Creates an error from an arbitrary message, mainly for custom
    /// converters.
    pub fn custom<T: Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }

    /// Wraps `self` with a context message.
    pub fn context<C: Display>(self, context: C) -> Self {
        Error::Context {
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn invalid_value<R: Display>(value: &str, kind: Kind, reason: R) -> Self {
        Error::InvalidValue {
            value: value.to_owned(),
            kind,
            reason: reason.to_string(),
        }
    }

    /// Returns the name of the missing field if this error was caused by a
    /// required field that was absent from the input, looking through any
    /// context wrappers.
    pub fn required_field(&self) -> Option<&str> {
        match self {
            Error::RequiredField { field, .. } => Some(field),
            Error::Context { source, .. } => source.required_field(),
            _ => None,
        }
    }

    /// Returns `true` if the error was caused by a missing required field.
    pub fn is_required_field(&self) -> bool {
        self.required_field().is_some()
    }

    /// Returns the innermost error, skipping context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_field_is_detected_through_context() {
        let err = Error::RequiredField {
            field: "page".into(),
            message: "missing required field \"page\"".into(),
        }
        .context("error unmarshaling embedded field \"paging\"");

        assert_eq!(err.required_field(), Some("page"));
        assert!(matches!(err.root(), Error::RequiredField { .. }));
    }

    #[test]
    fn other_errors_are_not_required_field_errors() {
        let err = Error::LengthMismatch {
            actual: 1,
            expected: 2,
        }
        .context("entry \"a\"");
        assert!(!err.is_required_field());
        assert_eq!(
            err.to_string(),
            "entry \"a\" :: array length == 1, want 2"
        );
    }
}
