//! Canonicalizing transforms applied before values reach a backend and again
//! on whatever the backend hands back.

use serde_json::Value;

use super::defaults::{derivation_path as path, signature, HEX_PREFIX};
use super::errors::WalletError;
use super::types::DerivationPathObject;
use super::validators::derivation_path_validator;

/// Adds exactly one `0x` tag when `add_prefix` is true, strips one when false.
/// Idempotent for a fixed flag.
pub fn hex_sequence_normalizer(value: &str, add_prefix: bool) -> String {
    let body = value.strip_prefix(HEX_PREFIX).unwrap_or(value);
    if add_prefix {
        format!("{}{}", HEX_PREFIX, body)
    } else {
        body.to_string()
    }
}

/// Same contract as [`hex_sequence_normalizer`], folded to lowercase.
pub fn address_normalizer(value: &str, add_prefix: bool) -> String {
    hex_sequence_normalizer(&value.to_lowercase(), add_prefix)
}

/// Left-pads odd-length hex bodies so they decode to whole bytes.
pub fn multiple_of_two_hex_normalizer(value: &str) -> String {
    let body = hex_sequence_normalizer(value, false);
    if body.len() % 2 == 0 {
        body
    } else {
        format!("0{}", body)
    }
}

/// Parses a path string into its record form. Fails when any of the first
/// three segments lacks the hardened mark.
pub fn derivation_path_to_object(value: &str) -> Result<DerivationPathObject, WalletError> {
    let value: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    derivation_path_validator(&value).map_err(|e| WalletError::Normalization(e.to_string()))?;

    let mut numbers = value
        .split(path::DELIMITER)
        .skip(1)
        .map(|segment| segment.trim_end_matches(path::HARDENED_MARK).parse::<u32>());
    let mut next = || numbers.next().transpose().map_err(|e| WalletError::Normalization(e.to_string()));

    Ok(DerivationPathObject {
        purpose: next()?,
        coin_type: next()?,
        account: next()?,
        change: next()?,
        address_index: next()?,
    })
}

/// Renders a record as a canonical path string. The set fields must form a
/// gap-free prefix starting at `purpose`, and every index must sit below the
/// hardened offset; anything else cannot be parsed back and is rejected.
pub fn derivation_path_from_object(value: &DerivationPathObject) -> Result<String, WalletError> {
    let segments = [
        value.purpose,
        value.coin_type,
        value.account,
        value.change,
        value.address_index,
    ];
    let depth = segments.iter().take_while(|segment| segment.is_some()).count();
    if depth == 0 || segments[depth..].iter().any(Option::is_some) {
        return Err(WalletError::Normalization(format!(
            "derivation path record {:?} must set a gap-free prefix of segments",
            value
        )));
    }

    let mut rendered = String::from(path::HEADER_KEY);
    for (position, segment) in segments.iter().flatten().enumerate() {
        if *segment >= path::HARDENED_OFFSET {
            return Err(WalletError::Normalization(format!(
                "derivation path segment {} is out of range",
                segment
            )));
        }
        rendered.push(path::DELIMITER);
        rendered.push_str(&segment.to_string());
        if position < path::HARDENED_SEGMENTS {
            rendered.push(path::HARDENED_MARK);
        }
    }
    Ok(rendered)
}

/// Canonical string form of a path: whitespace removed, grammar enforced.
pub fn derivation_path_normalizer(value: &str) -> Result<String, WalletError> {
    derivation_path_from_object(&derivation_path_to_object(value)?)
}

/// Maps `0` to [`signature::RECOVERY_ODD`] and `1` to
/// [`signature::RECOVERY_EVEN`]. Every other integer is returned unchanged.
/// Non-integers fail with a type mismatch.
pub fn recovery_param_normalizer(value: &Value) -> Result<u64, WalletError> {
    let mismatch = WalletError::TypeMismatch { field: "recoveryParam", expected: "an integer" };
    let param = match value {
        Value::Number(number) => number.as_u64().ok_or(mismatch)?,
        _ => return Err(mismatch),
    };
    Ok(match param {
        0 => signature::RECOVERY_ODD,
        1 => signature::RECOVERY_EVEN,
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    const UNPREFIXED: &str = "ead7de0ec184a6c8a";
    const PREFIXED: &str = "0xead7de0ec184a6c8a";

    #[test]
    fn test_hex_sequence_adds_and_removes_prefix() {
        assert_eq!(hex_sequence_normalizer(UNPREFIXED, true), PREFIXED);
        assert_eq!(hex_sequence_normalizer(PREFIXED, true), PREFIXED);
        assert_eq!(hex_sequence_normalizer(PREFIXED, false), UNPREFIXED);
        assert_eq!(hex_sequence_normalizer(UNPREFIXED, false), UNPREFIXED);
    }

    #[test]
    fn test_address_normalizer_lowercases() {
        assert_eq!(
            address_normalizer("742d35Cc6634C0532925a3b844Bc454e4438f44e", true),
            "0x742d35cc6634c0532925a3b844bc454e4438f44e"
        );
        assert_eq!(
            address_normalizer("0x742d35Cc6634C0532925a3b844Bc454e4438f44e", false),
            "742d35cc6634c0532925a3b844bc454e4438f44e"
        );
    }

    #[test]
    fn test_multiple_of_two_hex_normalizer() {
        assert_eq!(multiple_of_two_hex_normalizer("0xabc"), "0abc");
        assert_eq!(multiple_of_two_hex_normalizer("abcd"), "abcd");
    }

    #[test]
    fn test_recovery_param_normalizer() {
        assert_eq!(recovery_param_normalizer(&json!(0)).unwrap(), signature::RECOVERY_ODD);
        assert_eq!(recovery_param_normalizer(&json!(1)).unwrap(), signature::RECOVERY_EVEN);
        assert_eq!(recovery_param_normalizer(&json!(42)).unwrap(), 42);
        assert_eq!(recovery_param_normalizer(&json!(27)).unwrap(), 27);
    }

    #[test]
    fn test_recovery_param_normalizer_rejects_non_integers() {
        for value in [json!("not-a-number"), json!(null), json!([]), json!(1.5), json!(-1)] {
            let err = recovery_param_normalizer(&value).unwrap_err();
            assert!(matches!(err, WalletError::TypeMismatch { field: "recoveryParam", .. }));
        }
    }

    #[test]
    fn test_derivation_path_object_round_trip() {
        let object = DerivationPathObject {
            purpose: Some(44),
            coin_type: Some(60),
            account: Some(0),
            change: Some(0),
            address_index: Some(3),
        };
        let rendered = derivation_path_from_object(&object).unwrap();
        assert_eq!(rendered, "m/44'/60'/0'/0/3");
        assert_eq!(derivation_path_to_object(&rendered).unwrap(), object);
    }

    #[test]
    fn test_derivation_path_from_partial_object() {
        let root = DerivationPathObject {
            purpose: Some(44),
            coin_type: Some(1),
            account: Some(0),
            change: Some(0),
            address_index: None,
        };
        let rendered = derivation_path_from_object(&root).unwrap();
        assert_eq!(rendered, "m/44'/1'/0'/0");
        assert_eq!(derivation_path_to_object(&rendered).unwrap(), root);
    }

    #[test_case(DerivationPathObject::default(); "empty")]
    #[test_case(DerivationPathObject { coin_type: Some(1), change: Some(0), ..Default::default() }; "missing purpose")]
    #[test_case(DerivationPathObject { purpose: Some(44), coin_type: Some(60), change: Some(0), ..Default::default() }; "missing account")]
    fn test_derivation_path_rejects_gapped_object(object: DerivationPathObject) {
        let err = derivation_path_from_object(&object).unwrap_err();
        assert!(matches!(err, WalletError::Normalization(_)));
    }

    #[test_case(DerivationPathObject { purpose: Some(0x8000_0000), ..Default::default() }; "hardened purpose")]
    #[test_case(DerivationPathObject {
        purpose: Some(44),
        coin_type: Some(60),
        account: Some(0),
        change: Some(0),
        address_index: Some(u32::MAX),
    }; "max index")]
    fn test_derivation_path_rejects_out_of_range_segment(object: DerivationPathObject) {
        let err = derivation_path_from_object(&object).unwrap_err();
        assert!(matches!(err, WalletError::Normalization(_)));
    }

    #[test]
    fn test_derivation_path_normalizer() {
        assert_eq!(derivation_path_normalizer(" m / 44' / 60' / 0' / 0 ").unwrap(), "m/44'/60'/0'/0");
        let err = derivation_path_normalizer("m/44'/60/0'/0/0").unwrap_err();
        assert!(matches!(err, WalletError::Normalization(_)));
    }

    proptest! {
        #[test]
        fn prop_hex_prefix_round_trip(body in "[0-9a-f]{0,64}", prefixed in any::<bool>()) {
            let input = if prefixed { format!("0x{}", body) } else { body.clone() };
            let canonical = hex_sequence_normalizer(&input, true);
            prop_assert_eq!(&canonical, &format!("0x{}", body));
            prop_assert_eq!(hex_sequence_normalizer(&canonical, false), body.clone());
            prop_assert_eq!(hex_sequence_normalizer(&hex_sequence_normalizer(&canonical, false), true), canonical);
        }

        #[test]
        fn prop_derivation_path_round_trip(
            coin_type in 0u32..0x8000_0000,
            account in 0u32..0x8000_0000,
            change in 0u32..2,
            address_index in 0u32..0x8000_0000,
        ) {
            let object = DerivationPathObject {
                purpose: Some(44),
                coin_type: Some(coin_type),
                account: Some(account),
                change: Some(change),
                address_index: Some(address_index),
            };
            let rendered = derivation_path_from_object(&object).unwrap();
            prop_assert!(rendered.starts_with("m/"));
            prop_assert_eq!(derivation_path_to_object(&rendered).unwrap(), object);
        }
    }
}
