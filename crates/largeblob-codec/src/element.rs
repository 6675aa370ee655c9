//! Single-element codec: CBOR map `{1: ct, 2: nonce, 3: origSize}`.

use ciborium::value::{Integer, Value};
use largeblob_core::{constants::NONCE_LEN, Element};

use crate::CodecError;

fn small_uint_key(key: &Value) -> Option<u8> {
    match key {
        Value::Integer(i) => u8::try_from(*i).ok(),
        _ => None,
    }
}

/// Encode a sealed [`Element`] as the definite CBOR map this format uses on
/// the wire, with entries in key order 1, 2, 3.
#[must_use]
pub fn encode(elem: &Element) -> Value {
    Value::Map(vec![
        (Value::Integer(Integer::from(1)), Value::Bytes(elem.ct().to_vec())),
        (Value::Integer(Integer::from(2)), Value::Bytes(elem.nonce().to_vec())),
        (Value::Integer(Integer::from(3)), Value::Integer(Integer::from(elem.orig_size()))),
    ])
}

/// Decode a single CBOR item into an [`Element`], failing hard on any
/// shape or invariant violation.
///
/// Unknown small-integer keys are ignored; keys that are not representable
/// as a `u8` are ignored too (`spec.md` §4.1) rather than rejected.
///
/// # Errors
/// - [`CodecError::Shape`] if `item` is not a CBOR map.
/// - [`CodecError::Incomplete`] if `ct`, `nonce`, or `origSize` is missing,
///   or `nonce` is present but not exactly 12 bytes.
/// - [`CodecError::Core`] if `ct` is shorter than the GCM tag length or
///   `origSize` is zero.
pub fn decode_hard(item: &Value) -> Result<Element, CodecError> {
    let Value::Map(entries) = item else {
        return Err(CodecError::Shape("element is not a CBOR map".into()));
    };

    let mut ct: Option<Vec<u8>> = None;
    let mut nonce: Option<[u8; NONCE_LEN]> = None;
    let mut orig_size: Option<u64> = None;

    for (key, val) in entries {
        let Some(k) = small_uint_key(key) else { continue };
        match k {
            1 => {
                if let Value::Bytes(b) = val {
                    ct = Some(b.clone());
                }
            }
            2 => {
                if let Value::Bytes(b) = val {
                    if b.len() == NONCE_LEN {
                        let mut n = [0u8; NONCE_LEN];
                        n.copy_from_slice(b);
                        nonce = Some(n);
                    }
                }
            }
            3 => {
                if let Value::Integer(i) = val {
                    if let Ok(n) = u64::try_from(*i) {
                        orig_size = Some(n);
                    }
                }
            }
            _ => {}
        }
    }

    let ct = ct.ok_or(CodecError::Incomplete("ct"))?;
    let nonce = nonce.ok_or(CodecError::Incomplete("nonce"))?;
    let orig_size = orig_size.ok_or(CodecError::Incomplete("origSize"))?;

    Ok(Element::new(ct, nonce, orig_size)?)
}

/// Decode a single CBOR item into an [`Element`], treating any failure as
/// "not a conformant element" rather than a hard error.
///
/// This is the primitive array traversal uses: a non-conformant element is
/// skipped during lookup but left untouched in the array (`spec.md` §4.1,
/// §4.6).
#[must_use]
pub fn decode_soft(item: &Value) -> Option<Element> {
    decode_hard(item).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use largeblob_core::constants::NONCE_LEN;

    fn sample_element() -> Element {
        Element::new(vec![0xAB; 20], [0x11; NONCE_LEN], 5).unwrap()
    }

    #[test]
    fn round_trips() {
        let elem = sample_element();
        let item = encode(&elem);
        let back = decode_hard(&item).unwrap();
        assert_eq!(back.ct(), elem.ct());
        assert_eq!(back.nonce(), elem.nonce());
        assert_eq!(back.orig_size(), elem.orig_size());
    }

    #[test]
    fn rejects_non_map() {
        let item = Value::Null;
        assert!(decode_hard(&item).is_err());
    }

    #[test]
    fn missing_field_is_incomplete() {
        let item = Value::Map(vec![
            (Value::Integer(Integer::from(1)), Value::Bytes(vec![0u8; 16])),
            (Value::Integer(Integer::from(2)), Value::Bytes(vec![0u8; NONCE_LEN])),
        ]);
        let err = decode_hard(&item).unwrap_err();
        assert!(matches!(err, CodecError::Incomplete("origSize")));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let elem = sample_element();
        let mut item = encode(&elem);
        if let Value::Map(entries) = &mut item {
            entries.push((Value::Integer(Integer::from(99)), Value::Text("ignored".into())));
            entries.push((Value::Text("also-ignored".into()), Value::Bool(true)));
        }
        let back = decode_hard(&item).unwrap();
        assert_eq!(back.orig_size(), elem.orig_size());
    }

    #[test]
    fn wrong_nonce_length_soft_fails() {
        let item = Value::Map(vec![
            (Value::Integer(Integer::from(1)), Value::Bytes(vec![0u8; 16])),
            (Value::Integer(Integer::from(2)), Value::Bytes(vec![0u8; 5])),
            (Value::Integer(Integer::from(3)), Value::Integer(Integer::from(10))),
        ]);
        assert!(decode_soft(&item).is_none());
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let item = Value::Map(vec![
            (Value::Integer(Integer::from(1)), Value::Bytes(vec![0u8; 15])),
            (Value::Integer(Integer::from(2)), Value::Bytes(vec![0u8; NONCE_LEN])),
            (Value::Integer(Integer::from(3)), Value::Integer(Integer::from(10))),
        ]);
        let err = decode_hard(&item).unwrap_err();
        assert!(matches!(err, CodecError::Core(_)));
    }
}
