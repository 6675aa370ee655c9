//! `spec.md` §4.5: trial-decrypt every element until one opens under the
//! caller's key.

use largeblob_codec::{element::decode_soft, LargeBlobArray};
use largeblob_core::Key;
use largeblob_sealer::Compressor;

use crate::EngineError;

/// The result of a successful [`find`]: the winning element's position, and
/// its plaintext if the caller asked for it.
#[derive(Debug, Clone)]
pub struct LookupHit {
    /// Index into the array's items of the element that opened.
    pub index: usize,
    /// The recovered plaintext, present iff `want_plaintext` was `true`.
    pub plaintext: Option<Vec<u8>>,
}

/// Iterate the array in order, skipping elements that fail to decode
/// (non-conformant, left untouched by mutation elsewhere), and attempt
/// AEAD decryption of each conformant element under `key`. The first index
/// that decrypts wins, deterministically, because array order is
/// preserved by every mutation (`spec.md` §4.5).
///
/// # Errors
/// Returns [`EngineError::Internal`] if the winning element decrypts but
/// its plaintext fails to decompress to exactly `orig_size` bytes — this
/// indicates a device-side inconsistency, not a wrong key, so it is not
/// swallowed the way a non-matching key or a non-conformant element is.
pub fn find(
    array: &LargeBlobArray,
    key: &Key,
    compressor: &dyn Compressor,
    want_plaintext: bool,
) -> Result<Option<LookupHit>, EngineError> {
    for (index, item) in array.items().iter().enumerate() {
        let Some(elem) = decode_soft(item) else { continue };
        let Some(compressed) = largeblob_sealer::decrypt_only(&elem, key) else { continue };

        if !want_plaintext {
            return Ok(Some(LookupHit { index, plaintext: None }));
        }

        let orig_size = usize::try_from(elem.orig_size())
            .map_err(|_| EngineError::Internal("origSize exceeds host size bound".into()))?;
        let plaintext = compressor.decompress(&compressed, orig_size).map_err(|e| {
            EngineError::Internal(format!("decompression failed for matched element: {e}"))
        })?;
        return Ok(Some(LookupHit { index, plaintext: Some(plaintext) }));
    }
    Ok(None)
}
