//! Table-key and view-argument normalization.
//!
//! The ledger's JSON API wants unsigned integers wider than a byte as
//! decimal strings and `u8` as a bare number. A key in the wrong form is
//! not an error on the ledger side, the lookup just comes back 404.

use serde_json::Value;

/// Normalize `key` for a table lookup (or view argument) of `key_type`.
///
/// - `address`: passed through
/// - `u8`: JSON number (numeric strings are parsed)
/// - `u16`..`u256`: decimal string
/// - anything else: passed through
pub fn normalize_key(key_type: &str, key: Value) -> Value {
    match key_type {
        "address" => key,
        "u8" => match key {
            Value::String(ref s) => s
                .trim()
                .parse::<u8>()
                .map(Value::from)
                .unwrap_or(key),
            other => other,
        },
        t if is_wide_unsigned(t) => match key {
            Value::Number(n) => Value::String(n.to_string()),
            other => other,
        },
        _ => key,
    }
}

fn is_wide_unsigned(key_type: &str) -> bool {
    key_type
        .strip_prefix('u')
        .is_some_and(|bits| !bits.is_empty() && bits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn u64_keys_become_strings() {
        assert_eq!(normalize_key("u64", json!(7)), json!("7"));
        assert_eq!(normalize_key("u64", json!("7")), json!("7"));
        assert_eq!(normalize_key("u128", json!(12)), json!("12"));
    }

    #[test]
    fn u8_keys_stay_numbers() {
        assert_eq!(normalize_key("u8", json!(3)), json!(3));
        assert_eq!(normalize_key("u8", json!("3")), json!(3));
        assert_eq!(normalize_key("u8", json!("three")), json!("three"));
    }

    #[test]
    fn addresses_and_other_types_pass_through() {
        assert_eq!(normalize_key("address", json!("0xab")), json!("0xab"));
        assert_eq!(normalize_key("bool", json!(true)), json!(true));
        assert_eq!(normalize_key("unit", json!(5)), json!(5));
    }
}
