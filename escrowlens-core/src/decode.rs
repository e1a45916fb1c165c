//! Decoders for the ledger's loosely-typed JSON encodings.
//!
//! The read API is not shape-stable across fields: an optional may arrive
//! bare, as `null`, or as a `{"vec": [...]}` wrapper; an enum may arrive as
//! a string, a single-key object, or an object carrying a `__variant__` /
//! `__name__` marker; text may be a byte array, `0x` hex, or a plain string.
//!
//! Every encoding has a strict `parse_*` combinator returning
//! [`DecodeResult`]. The `decode_*` wrappers are total: an unrecognized
//! shape is logged as a decode ambiguity (with the field name) and replaced
//! by the fallback documented on each wrapper, so one malformed field never
//! fails a whole derivation.

use crate::address::Address;
use crate::error::{json_kind, DecodeError, DecodeResult};
use serde_json::Value;

static NULL: Value = Value::Null;

/// Look up `name` on an object, yielding `null` when absent or when `obj`
/// is not an object.
pub fn field<'a>(obj: &'a Value, name: &str) -> &'a Value {
    obj.get(name).unwrap_or(&NULL)
}

/// The inner sequence of a `{"vec": [...]}` wrapper.
fn vec_wrapper(value: &Value) -> Option<&[Value]> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get("vec")?.as_array().map(Vec::as_slice)
}

fn ambiguity(field: &str, value: &Value, err: &DecodeError, fallback: &str) {
    tracing::warn!(
        field,
        found = json_kind(value),
        error = %err,
        fallback,
        "decode ambiguity"
    );
}

// === Optional ===

/// Strictly unwrap an optional value.
///
/// `null` and an empty wrapper are `None`; a one-element wrapper yields its
/// element, itself unwrapped recursively; anything else is a bare value.
pub fn parse_optional(value: &Value) -> DecodeResult<Option<&Value>> {
    if value.is_null() {
        return Ok(None);
    }
    match vec_wrapper(value) {
        Some([]) => Ok(None),
        Some([inner]) => parse_optional(inner),
        Some(items) => Err(DecodeError::OversizedOption(items.len())),
        None => Ok(Some(value)),
    }
}

/// Total form of [`parse_optional`]. Fallback: `None`.
pub fn decode_optional<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    parse_optional(value).unwrap_or_else(|e| {
        ambiguity(field, value, &e, "none");
        None
    })
}

// === Variant tags ===

/// Strictly extract an enum variant tag.
///
/// Accepts a bare string, a bare number (numeric enum discriminants), a
/// one-element option wrapper, an object with a `__variant__` or `__name__`
/// marker, or a single-key object whose key is the tag.
pub fn parse_variant_tag(value: &Value) -> DecodeResult<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Object(map) => {
            if let Some(items) = vec_wrapper(value) {
                return match items {
                    [inner] => parse_variant_tag(inner),
                    _ => Err(DecodeError::shape("variant tag", value)),
                };
            }
            for marker in ["__variant__", "__name__"] {
                if let Some(Value::String(tag)) = map.get(marker) {
                    return Ok(tag.clone());
                }
            }
            match map.keys().next() {
                Some(key) if map.len() == 1 => Ok(key.clone()),
                _ => Err(DecodeError::shape("variant tag", value)),
            }
        }
        other => Err(DecodeError::shape("variant tag", other)),
    }
}

/// Total form of [`parse_variant_tag`]. Fallback: the caller's `default`.
pub fn decode_variant_tag(value: &Value, default: &str, field: &str) -> String {
    parse_variant_tag(value).unwrap_or_else(|e| {
        ambiguity(field, value, &e, default);
        default.to_string()
    })
}

/// A closed enum decoded from a ledger variant tag.
pub trait VariantTag: Sized + Copy {
    /// Name used in diagnostics
    const KIND: &'static str;

    /// Substituted when the tag is missing, malformed, or unknown. This
    /// masks decode failures, so every implementor documents its choice.
    const FALLBACK: Self;

    fn from_tag(tag: &str) -> Option<Self>;
}

/// Strictly decode a typed variant.
pub fn parse_variant<T: VariantTag>(value: &Value) -> DecodeResult<T> {
    let tag = parse_variant_tag(value)?;
    T::from_tag(&tag).ok_or(DecodeError::UnknownVariant { kind: T::KIND, tag })
}

/// Total form of [`parse_variant`]. Fallback: `T::FALLBACK`.
pub fn decode_variant<T: VariantTag>(value: &Value, field: &str) -> T {
    parse_variant(value).unwrap_or_else(|e| {
        ambiguity(field, value, &e, T::KIND);
        T::FALLBACK
    })
}

// === Text payloads ===

fn strip_nul(s: String) -> String {
    if s.contains('\0') {
        s.replace('\0', "")
    } else {
        s
    }
}

fn bytes_to_text(bytes: &[u8]) -> String {
    strip_nul(String::from_utf8_lossy(bytes).into_owned())
}

/// Strictly decode a UTF-8 payload.
///
/// Accepts a `0x` hex string, a byte array, a plain string, an option
/// wrapper around any of those, or a `{"value": ...}` wrapper. Invalid UTF-8
/// is replaced lossily and NUL bytes are stripped. An empty result is `None`.
pub fn parse_text_payload(value: &Value) -> DecodeResult<Option<String>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_digits) => {
                let bytes =
                    hex::decode(hex_digits).map_err(|_| DecodeError::InvalidHex(s.clone()))?;
                bytes_to_text(&bytes)
            }
            None => strip_nul(s.clone()),
        },
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| DecodeError::InvalidByte(item.to_string()))
                })
                .collect::<DecodeResult<Vec<u8>>>()?;
            bytes_to_text(&bytes)
        }
        Value::Object(map) => {
            if vec_wrapper(value).is_some() {
                return match parse_optional(value)? {
                    Some(inner) => parse_text_payload(inner),
                    None => Ok(None),
                };
            }
            match map.get("value") {
                Some(inner) if map.len() == 1 => return parse_text_payload(inner),
                _ => return Err(DecodeError::shape("text payload", value)),
            }
        }
        other => return Err(DecodeError::shape("text payload", other)),
    };
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Total form of [`parse_text_payload`].
///
/// Fallback: a string that failed hex decoding is returned as-is (minus NUL
/// bytes); any other unrecognized shape is `None`.
pub fn decode_text_payload(value: &Value, field: &str) -> Option<String> {
    match parse_text_payload(value) {
        Ok(text) => text,
        Err(e) => {
            ambiguity(field, value, &e, "raw or none");
            value
                .as_str()
                .map(|s| strip_nul(s.to_string()))
                .filter(|s| !s.is_empty())
        }
    }
}

// === Addresses ===

pub fn parse_address(value: &Value) -> DecodeResult<Address> {
    match value {
        Value::String(s) => Address::parse(s),
        other => Err(DecodeError::shape("address string", other)),
    }
}

/// Total address decode. Fallback: `None`.
pub fn decode_address(value: &Value, field: &str) -> Option<Address> {
    parse_address(value).map_or_else(
        |e| {
            ambiguity(field, value, &e, "none");
            None
        },
        Some,
    )
}

/// Optional address; a zero address counts as absent.
pub fn decode_optional_address(value: &Value, field: &str) -> Option<Address> {
    decode_optional(value, field)
        .and_then(|inner| decode_address(inner, field))
        .filter(|addr| !addr.is_zero())
}

fn address_items(value: &Value) -> DecodeResult<&[Value]> {
    match value {
        Value::Null => Ok(&[]),
        Value::Array(items) => Ok(items.as_slice()),
        Value::Object(_) => match vec_wrapper(value) {
            // An option around a vector arrives as `{"vec": [[...]]}`.
            Some([Value::Array(items)]) => Ok(items.as_slice()),
            Some(items) => Ok(items),
            None => Err(DecodeError::shape("address list", value)),
        },
        other => Err(DecodeError::shape("address list", other)),
    }
}

/// Strictly decode a list of addresses, bare or wrapped.
pub fn parse_address_list(value: &Value) -> DecodeResult<Vec<Address>> {
    address_items(value)?.iter().map(parse_address).collect()
}

/// Total form of [`parse_address_list`].
///
/// Fallback: the elements that do parse as addresses, in order; an
/// unrecognized container is an empty list.
pub fn decode_address_list(value: &Value, field: &str) -> Vec<Address> {
    match parse_address_list(value) {
        Ok(list) => list,
        Err(e) => {
            ambiguity(field, value, &e, "parseable elements");
            address_items(value)
                .unwrap_or(&[])
                .iter()
                .filter_map(|item| parse_address(item).ok())
                .collect()
        }
    }
}

// === Scalars ===

/// Unsigned integer from a JSON number or a decimal string (the ledger
/// prints u64 and wider as strings).
pub fn parse_u64(value: &Value) -> DecodeResult<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| DecodeError::InvalidNumber(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| DecodeError::InvalidNumber(s.clone())),
        other => Err(DecodeError::shape("unsigned integer", other)),
    }
}

/// Total integer decode. Fallback: `0`; an absent field is `0` silently.
pub fn decode_u64(value: &Value, field: &str) -> u64 {
    if value.is_null() {
        return 0;
    }
    parse_u64(value).unwrap_or_else(|e| {
        ambiguity(field, value, &e, "0");
        0
    })
}

/// Optional integer; `None` when absent, empty, or unparseable.
pub fn decode_optional_u64(value: &Value, field: &str) -> Option<u64> {
    let inner = decode_optional(value, field)?;
    parse_u64(inner).map_or_else(
        |e| {
            ambiguity(field, inner, &e, "none");
            None
        },
        Some,
    )
}

pub fn parse_bool(value: &Value) -> DecodeResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(DecodeError::shape("bool", other)),
    }
}

/// Optional boolean; `None` when absent, empty, or unparseable.
pub fn decode_optional_bool(value: &Value, field: &str) -> Option<bool> {
    let inner = decode_optional(value, field)?;
    parse_bool(inner).map_or_else(
        |e| {
            ambiguity(field, inner, &e, "none");
            None
        },
        Some,
    )
}
