//! Field tags: per-field names and options.
//!
//! A tag is a comma separated string. The first element is the encoded key
//! (empty means "derive the key from the field name"), the following ones
//! are options. Each option belongs to exactly one group and each group may
//! be given at most once per tag:
//!
//! | group                  | options                          | default          |
//! |------------------------|----------------------------------|------------------|
//! | marshal presence       | `keepempty`, `omitempty`         | `keepempty`      |
//! | unmarshal presence     | `opt`, `nil`, `req`              | `opt`            |
//! | slice values           | `overrideold`, `keepold`         | `overrideold`    |
//! | slice unexpected value | `breakwitherror`, `skipbadvalue` | `breakwitherror` |
//! | slice separator        | `none`, `comma`, `semicolon`, `space` | `none`      |
//!
//! A tag equal to `-` excludes the field.
//!
//! Unset groups are filled from the per-type defaults of the field's type,
//! then from the pipeline defaults, then from the defaults above.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, TagError};
use crate::reflect::{FieldInfo, TypeInfo};

macro_rules! tag_option {
    (
        $(#[$meta:meta])*
        $name:ident($category:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $token:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $token)]
                $variant,
            )+
        }

        impl $name {
            const CATEGORY: &'static str = $category;

            /// The token used for this option in field tags.
            pub const fn token(self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }

            pub fn from_token(token: &str) -> Option<Self> {
                match token {
                    $($token => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.token())
            }
        }
    };
}

tag_option! {
    /// Whether empty values are written when marshaling.
    MarshalPresence("MarshalPresence") {
        #[default]
        KeepEmpty => "keepempty",
        OmitEmpty => "omitempty",
    }
}

tag_option! {
    /// What happens when a field's key is absent from the values being
    /// unmarshaled.
    UnmarshalPresence("UnmarshalPresence") {
        /// The field converter is called with no data.
        #[default]
        Opt => "opt",
        /// The field is left untouched.
        Nil => "nil",
        /// Unmarshaling fails with a required-field error.
        Req => "req",
    }
}

tag_option! {
    /// Whether unmarshaling a growable sequence replaces or extends the
    /// existing elements.
    SliceValues("SliceValues") {
        #[default]
        OverrideOld => "overrideold",
        KeepOld => "keepold",
    }
}

tag_option! {
    /// What happens when one element of a growable sequence fails to
    /// unmarshal.
    SliceUnexpectedValue("SliceUnexpectedValue") {
        /// Clear the sequence and fail.
        #[default]
        BreakWithError => "breakwitherror",
        /// Drop the element and continue.
        SkipBadValue => "skipbadvalue",
    }
}

tag_option! {
    /// Separator used to pack several sequence elements into one string.
    SliceSeparator("SliceSeparator") {
        #[default]
        None => "none",
        Comma => "comma",
        Semicolon => "semicolon",
        Space => "space",
    }
}

impl SliceSeparator {
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            SliceSeparator::None => None,
            SliceSeparator::Comma => Some(","),
            SliceSeparator::Semicolon => Some(";"),
            SliceSeparator::Space => Some(" "),
        }
    }
}

/// Options used by marshaling. `None` means "not specified".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalTagOptions {
    pub presence: Option<MarshalPresence>,
}

/// Options used by unmarshaling. `None` means "not specified".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmarshalTagOptions {
    pub presence: Option<UnmarshalPresence>,
    pub slice_values: Option<SliceValues>,
    pub slice_unexpected_value: Option<SliceUnexpectedValue>,
}

/// Options shared by both directions. `None` means "not specified".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonTagOptions {
    pub slice_separator: Option<SliceSeparator>,
}

/// All option groups of a tag, each possibly unspecified.
///
/// Used for explicit tags, per-type defaults and pipeline defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptions {
    pub marshal: MarshalTagOptions,
    pub unmarshal: UnmarshalTagOptions,
    pub common: CommonTagOptions,
}

fn set_once<T: Copy>(
    slot: &mut Option<T>,
    value: T,
    category: &'static str,
    token: fn(T) -> &'static str,
) -> Result<(), TagError> {
    match *slot {
        Some(first) => Err(TagError::DuplicateOption {
            category,
            first: token(first),
            second: token(value),
        }),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

impl TagOptions {
    /// Parses the comma separated options of a tag (everything after the
    /// name).
    pub fn parse(options: &str) -> Result<Self, TagError> {
        if options.split(',').any(str::is_empty) {
            return Err(TagError::SurplusComma);
        }
        let mut out = TagOptions::default();
        for token in options.split(',') {
            out.apply_token(token)?;
        }
        Ok(out)
    }

    fn apply_token(&mut self, token: &str) -> Result<(), TagError> {
        let candidates = [
            MarshalPresence::from_token(token).is_some(),
            UnmarshalPresence::from_token(token).is_some(),
            SliceValues::from_token(token).is_some(),
            SliceUnexpectedValue::from_token(token).is_some(),
            SliceSeparator::from_token(token).is_some(),
        ];
        if candidates.iter().filter(|&&c| c).count() != 1 {
            return Err(TagError::InvalidOption(token.to_owned()));
        }

        if let Some(v) = MarshalPresence::from_token(token) {
            set_once(
                &mut self.marshal.presence,
                v,
                MarshalPresence::CATEGORY,
                MarshalPresence::token,
            )
        } else if let Some(v) = UnmarshalPresence::from_token(token) {
            set_once(
                &mut self.unmarshal.presence,
                v,
                UnmarshalPresence::CATEGORY,
                UnmarshalPresence::token,
            )
        } else if let Some(v) = SliceValues::from_token(token) {
            set_once(
                &mut self.unmarshal.slice_values,
                v,
                SliceValues::CATEGORY,
                SliceValues::token,
            )
        } else if let Some(v) = SliceUnexpectedValue::from_token(token) {
            set_once(
                &mut self.unmarshal.slice_unexpected_value,
                v,
                SliceUnexpectedValue::CATEGORY,
                SliceUnexpectedValue::token,
            )
        } else if let Some(v) = SliceSeparator::from_token(token) {
            set_once(
                &mut self.common.slice_separator,
                v,
                SliceSeparator::CATEGORY,
                SliceSeparator::token,
            )
        } else {
            Err(TagError::InvalidOption(token.to_owned()))
        }
    }

    /// Fills every unspecified group from `defaults`.
    pub fn apply_defaults(&mut self, defaults: &TagOptions) {
        fn fill<T: Copy>(slot: &mut Option<T>, default: Option<T>) {
            if slot.is_none() {
                *slot = default;
            }
        }
        fill(&mut self.marshal.presence, defaults.marshal.presence);
        fill(&mut self.unmarshal.presence, defaults.unmarshal.presence);
        fill(&mut self.unmarshal.slice_values, defaults.unmarshal.slice_values);
        fill(
            &mut self.unmarshal.slice_unexpected_value,
            defaults.unmarshal.slice_unexpected_value,
        );
        fill(&mut self.common.slice_separator, defaults.common.slice_separator);
    }
}

/// A parsed tag: the key override (possibly empty) plus its options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag<'a> {
    pub name: &'a str,
    pub options: TagOptions,
}

impl<'a> Tag<'a> {
    pub fn parse(tag: &'a str) -> Result<Self, TagError> {
        match tag.split_once(',') {
            None => Ok(Tag {
                name: tag,
                options: TagOptions::default(),
            }),
            Some((name, options)) => Ok(Tag {
                name,
                options: TagOptions::parse(options)?,
            }),
        }
    }

    pub fn is_skip(&self) -> bool {
        self.name == "-"
    }
}

/// The fully resolved settings of a field, as seen by converters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTag {
    /// The encoded key.
    pub name: String,
    pub marshal_presence: MarshalPresence,
    pub unmarshal_presence: UnmarshalPresence,
    pub slice_values: SliceValues,
    pub slice_unexpected_value: SliceUnexpectedValue,
    pub slice_separator: SliceSeparator,
}

impl FieldTag {
    /// Resolves `options` against the hardcoded defaults.
    pub fn resolve(name: String, options: &TagOptions) -> Self {
        FieldTag {
            name,
            marshal_presence: options.marshal.presence.unwrap_or_default(),
            unmarshal_presence: options.unmarshal.presence.unwrap_or_default(),
            slice_values: options.unmarshal.slice_values.unwrap_or_default(),
            slice_unexpected_value: options.unmarshal.slice_unexpected_value.unwrap_or_default(),
            slice_separator: options.common.slice_separator.unwrap_or_default(),
        }
    }
}

impl Default for FieldTag {
    fn default() -> Self {
        FieldTag::resolve(String::new(), &TagOptions::default())
    }
}

/// Maps a field name to its default encoded key.
pub type NameTransformer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The tag-related part of pipeline options.
#[derive(Clone)]
pub(crate) struct TagSettings {
    pub(crate) name_transformer: NameTransformer,
    pub(crate) defaults: TagOptions,
    pub(crate) type_defaults: HashMap<TypeId, TagOptions>,
}

impl Default for TagSettings {
    fn default() -> Self {
        TagSettings {
            name_transformer: Arc::new(snake_case),
            defaults: TagOptions::default(),
            type_defaults: HashMap::new(),
        }
    }
}

impl fmt::Debug for TagSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagSettings")
            .field("defaults", &self.defaults)
            .field("type_defaults", &self.type_defaults.len())
            .finish_non_exhaustive()
    }
}

impl TagSettings {
    /// Resolves the tag of `field`, whose type is `field_type`. Returns
    /// `None` for excluded fields.
    pub(crate) fn field_tag(
        &self,
        field: &FieldInfo,
        field_type: &TypeInfo,
    ) -> Result<Option<FieldTag>> {
        let raw = field.tag();
        let tag = Tag::parse(raw).map_err(|source| Error::Tag {
            tag: raw.to_owned(),
            source,
        })?;
        if tag.is_skip() {
            return Ok(None);
        }

        let mut options = tag.options;
        if let Some(type_defaults) = self.type_defaults.get(&field_type.type_id()) {
            options.apply_defaults(type_defaults);
        }
        options.apply_defaults(&self.defaults);

        let name = if tag.name.is_empty() {
            (self.name_transformer)(field.name())
        } else {
            tag.name.to_owned()
        };
        Ok(Some(FieldTag::resolve(name, &options)))
    }

    /// The tag used for map elements and top-level values.
    pub(crate) fn default_tag(&self) -> FieldTag {
        FieldTag::resolve(String::new(), &self.defaults)
    }
}

/// Converts `CamelCase` names to `snake_case`.
///
/// An underscore is inserted before an upper case letter unless it starts
/// the name or follows an underscore, and only if a lower case letter is
/// directly before or after it. Runs of capitals are therefore treated as a
/// single word: `HTTPServer` becomes `http_server`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let is_lower = |i: usize| chars.get(i).is_some_and(|c| c.is_lowercase());

    let mut out = String::with_capacity(name.len() + name.len() / 2);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 && chars[i - 1] != '_' && (is_lower(i - 1) || is_lower(i + 1)) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn snake_case_conversions() {
        let cases = [
            ("", ""),
            ("woof", "woof"),
            ("_woof", "_woof"),
            ("woof_", "woof_"),
            ("Woof", "woof"),
            ("WOOF", "woof"),
            ("woofWoof", "woof_woof"),
            ("WoofWoof", "woof_woof"),
            ("woofWOOF", "woof_woof"),
            ("WOOFWoof", "woof_woof"),
            ("WOOFWoofWoofWOOFWoofWoof", "woof_woof_woof_woof_woof_woof"),
            ("WWoof", "w_woof"),
            ("_WOOF", "_woof"),
            ("woof0_WOOF1_2", "woof0_woof1_2"),
            ("Woof_W_", "woof_w_"),
            ("WoofW_", "woof_w_"),
            ("HTTPServer", "http_server"),
            ("page_size", "page_size"),
        ];
        for (input, expected) in cases {
            assert_eq!(snake_case(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn default_options() {
        let tag = FieldTag::resolve("a".into(), &Tag::parse("a").unwrap().options);
        assert_eq!(
            tag,
            FieldTag {
                name: "a".into(),
                marshal_presence: MarshalPresence::KeepEmpty,
                unmarshal_presence: UnmarshalPresence::Opt,
                slice_values: SliceValues::OverrideOld,
                slice_unexpected_value: SliceUnexpectedValue::BreakWithError,
                slice_separator: SliceSeparator::None,
            }
        );
    }

    #[test]
    fn explicit_options() {
        let tag = Tag::parse("ids,omitempty,req,keepold,skipbadvalue,comma").unwrap();
        assert_eq!(tag.name, "ids");
        assert_eq!(
            tag.options,
            TagOptions {
                marshal: MarshalTagOptions {
                    presence: Some(MarshalPresence::OmitEmpty),
                },
                unmarshal: UnmarshalTagOptions {
                    presence: Some(UnmarshalPresence::Req),
                    slice_values: Some(SliceValues::KeepOld),
                    slice_unexpected_value: Some(SliceUnexpectedValue::SkipBadValue),
                },
                common: CommonTagOptions {
                    slice_separator: Some(SliceSeparator::Comma),
                },
            }
        );
    }

    #[test]
    fn empty_name_with_options() {
        let tag = Tag::parse(",nil").unwrap();
        assert_eq!(tag.name, "");
        assert_eq!(tag.options.unmarshal.presence, Some(UnmarshalPresence::Nil));
    }

    #[test]
    fn surplus_commas() {
        for raw in [",", "a,", "a,,opt", ",opt,", "a,opt,,omitempty"] {
            assert_eq!(
                Tag::parse(raw),
                Err(TagError::SurplusComma),
                "tag {raw:?} should fail"
            );
        }
    }

    #[test]
    fn invalid_option() {
        assert_eq!(
            Tag::parse("a,optional"),
            Err(TagError::InvalidOption("optional".into()))
        );
        assert_eq!(
            Tag::parse("a,OmitEmpty"),
            Err(TagError::InvalidOption("OmitEmpty".into()))
        );
    }

    #[test]
    fn duplicate_options() {
        let cases = [
            ("a,keepempty,omitempty", "MarshalPresence", "keepempty", "omitempty"),
            ("a,opt,req", "UnmarshalPresence", "opt", "req"),
            ("a,nil,nil", "UnmarshalPresence", "nil", "nil"),
            ("a,keepold,overrideold", "SliceValues", "keepold", "overrideold"),
            (
                "a,skipbadvalue,breakwitherror",
                "SliceUnexpectedValue",
                "skipbadvalue",
                "breakwitherror",
            ),
            ("a,comma,space", "SliceSeparator", "comma", "space"),
        ];
        for (raw, category, first, second) in cases {
            assert_eq!(
                Tag::parse(raw),
                Err(TagError::DuplicateOption {
                    category,
                    first,
                    second
                }),
                "tag {raw:?}"
            );
        }
    }

    #[test]
    fn duplicate_option_message() {
        let err = Tag::parse("a,opt,req").unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"only one UnmarshalPresence option is allowed - you've specified at least two: opt, req"
        );
    }

    #[test]
    fn defaults_fill_unset_groups_only() {
        let mut options = Tag::parse("a,req").unwrap().options;
        let type_defaults = TagOptions {
            unmarshal: UnmarshalTagOptions {
                presence: Some(UnmarshalPresence::Nil),
                slice_values: Some(SliceValues::KeepOld),
                ..Default::default()
            },
            ..Default::default()
        };
        let defaults = TagOptions {
            unmarshal: UnmarshalTagOptions {
                slice_values: Some(SliceValues::OverrideOld),
                slice_unexpected_value: Some(SliceUnexpectedValue::SkipBadValue),
                ..Default::default()
            },
            ..Default::default()
        };
        options.apply_defaults(&type_defaults);
        options.apply_defaults(&defaults);

        let tag = FieldTag::resolve("a".into(), &options);
        assert_eq!(tag.unmarshal_presence, UnmarshalPresence::Req);
        assert_eq!(tag.slice_values, SliceValues::KeepOld);
        assert_eq!(tag.slice_unexpected_value, SliceUnexpectedValue::SkipBadValue);
        assert_eq!(tag.marshal_presence, MarshalPresence::KeepEmpty);
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: TagOptions = serde_json::from_str(
            r#"{"marshal": {"presence": "omitempty"}, "common": {"slice_separator": "semicolon"}}"#,
        )
        .unwrap();
        assert_eq!(options.marshal.presence, Some(MarshalPresence::OmitEmpty));
        assert_eq!(options.common.slice_separator, Some(SliceSeparator::Semicolon));
        assert_eq!(options.unmarshal, UnmarshalTagOptions::default());
    }
}
