//! `spec.md` §4.6: insert-or-replace, idempotent remove, and the
//! best-effort trim helper.

use ciborium::value::Value;

use largeblob_codec::{element::decode_soft, LargeBlobArray};
use largeblob_core::Key;
use largeblob_sealer::Compressor;

use crate::{lookup::find, EngineError};

/// Insert `new_item` at the position returned by [`find`], or append it if
/// no element currently opens under `key`.
///
/// # Errors
/// Propagates [`EngineError`] from the underlying lookup.
pub fn insert(
    array: &mut LargeBlobArray,
    key: &Key,
    compressor: &dyn Compressor,
    new_item: Value,
) -> Result<(), EngineError> {
    match find(array, key, compressor, false)? {
        Some(hit) => array.replace(hit.index, new_item),
        None => array.push(new_item),
    }
    Ok(())
}

/// Remove the element that opens under `key`, if any.
///
/// Not-found is success-as-no-op (the corrected, idempotent design;
/// `spec.md` §4.6/REDESIGN FLAGS) rather than an error, so `remove; remove`
/// observably does the same thing twice.
///
/// # Errors
/// Propagates [`EngineError`] from the underlying lookup.
pub fn remove(array: &mut LargeBlobArray, key: &Key, compressor: &dyn Compressor) -> Result<(), EngineError> {
    if let Some(hit) = find(array, key, compressor, false)? {
        array.remove(hit.index);
    }
    Ok(())
}

/// A credential-management collaborator (`spec.md` §6): enumerates the
/// symmetric keys of credentials currently resident on the authenticator,
/// so `trim` can tell which large-blob elements are orphaned.
///
/// Out of scope beyond this trait — a real implementation walks resident
/// credentials via the CTAP2 credential-management command.
pub trait CredentialEnumerator {
    /// All large-blob keys currently backed by a resident credential.
    fn resident_keys(&self) -> Vec<Key>;
}

/// Rebuild `array`, retaining every element that either fails to decode
/// (non-conformant elements are always kept, per `spec.md` §4.1/§4.6) or
/// opens under at least one key in `enumerator`'s resident set. Order is
/// preserved.
///
/// Membership only needs AEAD success, not a recovered plaintext, so this
/// skips decompression entirely (see [`largeblob_sealer::decrypt_only`]).
#[must_use]
pub fn trim(array: &LargeBlobArray, enumerator: &dyn CredentialEnumerator) -> LargeBlobArray {
    let keys = enumerator.resident_keys();
    let mut kept = LargeBlobArray::empty();

    for item in array.items() {
        let Some(elem) = decode_soft(item) else {
            kept.push(item.clone());
            continue;
        };
        let opens = keys.iter().any(|k| largeblob_sealer::decrypt_only(&elem, k).is_some());
        if opens {
            kept.push(item.clone());
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use largeblob_codec::element::encode;
    use largeblob_core::constants::KEY_LEN;
    use largeblob_sealer::{seal, OsRngSource, ZstdCompressor};

    fn key(byte: u8) -> Key {
        Key::from([byte; KEY_LEN])
    }

    #[test]
    fn insert_appends_when_not_found() {
        let compressor = ZstdCompressor::default();
        let mut rng = OsRngSource;
        let k = key(0x01);
        let elem = seal(b"data", &k, &mut rng, &compressor).unwrap();

        let mut array = LargeBlobArray::empty();
        insert(&mut array, &k, &compressor, encode(&elem)).unwrap();
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn insert_replaces_existing_slot() {
        let compressor = ZstdCompressor::default();
        let mut rng = OsRngSource;
        let k = key(0x02);
        let e1 = seal(b"first", &k, &mut rng, &compressor).unwrap();
        let e2 = seal(b"second", &k, &mut rng, &compressor).unwrap();

        let mut array = LargeBlobArray::empty();
        array.push(encode(&e1));
        insert(&mut array, &k, &compressor, encode(&e2)).unwrap();

        assert_eq!(array.len(), 1);
        let decoded = decode_soft(array.get(0).unwrap()).unwrap();
        assert_eq!(decoded.nonce(), e2.nonce());
    }

    #[test]
    fn remove_is_idempotent() {
        let compressor = ZstdCompressor::default();
        let mut rng = OsRngSource;
        let k = key(0x03);
        let elem = seal(b"data", &k, &mut rng, &compressor).unwrap();

        let mut array = LargeBlobArray::empty();
        array.push(encode(&elem));

        remove(&mut array, &k, &compressor).unwrap();
        assert!(array.is_empty());
        remove(&mut array, &k, &compressor).unwrap();
        assert!(array.is_empty());
    }

    struct FixedKeys(Vec<Key>);
    impl CredentialEnumerator for FixedKeys {
        fn resident_keys(&self) -> Vec<Key> {
            self.0.clone()
        }
    }

    #[test]
    fn trim_drops_orphans_keeps_non_conformant_and_resident() {
        use ciborium::value::{Integer, Value};
        let compressor = ZstdCompressor::default();
        let mut rng = OsRngSource;
        let resident = key(0x04);
        let orphan = key(0x05);

        let resident_elem = seal(b"keep me", &resident, &mut rng, &compressor).unwrap();
        let orphan_elem = seal(b"drop me", &orphan, &mut rng, &compressor).unwrap();
        let non_conformant = Value::Map(vec![(
            Value::Integer(Integer::from(1)),
            Value::Bytes(vec![0u8; 16]),
        )]);

        let mut array = LargeBlobArray::empty();
        array.push(encode(&resident_elem));
        array.push(encode(&orphan_elem));
        array.push(non_conformant.clone());

        let enumerator = FixedKeys(vec![resident]);
        let trimmed = trim(&array, &enumerator);

        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.get(1), Some(&non_conformant));
    }
}
