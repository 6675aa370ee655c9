//! Data model, wire constants, and error taxonomy shared by the largeBlobArray
//! engine crates.
//!
//! This crate has no knowledge of CBOR, transport framing, or cryptography —
//! it only defines the types those layers agree on and the invariants that
//! make an [`Element`] or [`Key`] valid in the first place.

#![deny(unsafe_code)]

pub mod constants {
    //! Wire-format constants from CTAP 2.1 §6.10.

    /// Length in bytes of the symmetric key used to seal/open an element.
    pub const KEY_LEN: usize = 32;
    /// Length in bytes of the AES-256-GCM nonce stored alongside each element.
    pub const NONCE_LEN: usize = 12;
    /// Length in bytes of the AES-GCM authentication tag appended to ciphertext.
    pub const TAG_LEN: usize = 16;
    /// Minimum legal ciphertext length (a tag with no payload).
    pub const MIN_CT_LEN: usize = TAG_LEN;
    /// Length in bytes of the digest trailer appended to a serialized array.
    pub const DIGEST_LEN: usize = 16;
    /// The four ASCII bytes prefixed to the little-endian plaintext length to
    /// form the per-element AEAD additional authenticated data.
    pub const AAD_PREFIX: &[u8; 4] = b"blob";
    /// Bytes of `0xFF` that open the per-fragment HMAC preamble.
    pub const HMAC_PREAMBLE_PAD_LEN: usize = 32;
    /// CTAP2 command identifier for the largeBlobs command, used both as a
    /// CBOR map key in a full request and as the single byte baked into the
    /// per-fragment HMAC preamble.
    pub const CTAP_CBOR_LARGEBLOB: u8 = 0x0c;
    /// Total length of the per-fragment HMAC preamble: 32 pad bytes, the
    /// command byte, one zero byte, a 4-byte little-endian offset, and a
    /// 32-byte SHA-256 digest of the fragment body.
    pub const HMAC_PREAMBLE_LEN: usize =
        HMAC_PREAMBLE_PAD_LEN + 1 + 1 + 4 + 32;
    /// Envelope reserved out of the authenticator's advertised max message
    /// size before it is used as a transfer chunk length.
    pub const ENVELOPE_RESERVE: usize = 64;
}

mod key {
    use crate::{constants::KEY_LEN, CoreError};
    use zeroize::{Zeroize, ZeroizeOnDrop};

    /// A 32-byte symmetric key, opaque to this engine, supplied by the caller.
    ///
    /// Zeroized on drop: the bytes never outlive the call that owns them.
    #[derive(Clone, Zeroize, ZeroizeOnDrop)]
    pub struct Key([u8; KEY_LEN]);

    impl Key {
        /// Borrow the raw key bytes.
        #[must_use]
        pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
            &self.0
        }
    }

    impl TryFrom<&[u8]> for Key {
        type Error = CoreError;

        /// Rejects any slice whose length is not exactly
        /// [`KEY_LEN`](crate::constants::KEY_LEN) with
        /// [`CoreError::InvalidArgument`].
        fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
            if bytes.len() != KEY_LEN {
                return Err(CoreError::InvalidArgument(format!(
                    "key length {} != {KEY_LEN}",
                    bytes.len()
                )));
            }
            let mut buf = [0u8; KEY_LEN];
            buf.copy_from_slice(bytes);
            Ok(Self(buf))
        }
    }

    impl From<[u8; KEY_LEN]> for Key {
        fn from(bytes: [u8; KEY_LEN]) -> Self {
            Self(bytes)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn rejects_wrong_length() {
            let short = [0u8; 16];
            assert!(Key::try_from(&short[..]).is_err());
        }

        #[test]
        fn accepts_exact_length() {
            let bytes = [7u8; KEY_LEN];
            let key = Key::try_from(&bytes[..]).unwrap();
            assert_eq!(key.as_bytes(), &bytes);
        }
    }
}
pub use key::Key;

mod element {
    use crate::constants::{MIN_CT_LEN, NONCE_LEN};
    use crate::CoreError;
    use zeroize::Zeroize;

    /// One logical record of the largeBlobArray: an AEAD-sealed per-credential
    /// blob plus the metadata needed to open it again.
    ///
    /// Constructing an `Element` enforces the §3 field-length invariants, so a
    /// live `Element` value is itself proof they hold: `ct.len() >= 16`,
    /// `nonce.len() == 12`, `orig_size != 0`.
    #[derive(Clone, Zeroize)]
    pub struct Element {
        ct: Vec<u8>,
        nonce: [u8; NONCE_LEN],
        orig_size: u64,
    }

    impl Element {
        /// Build an element, validating the length invariants from `spec.md`
        /// §3/§4.1.
        ///
        /// # Errors
        /// Returns [`CoreError::InvalidArgument`] if `ct` is shorter than the
        /// GCM tag length, or `orig_size` is zero.
        pub fn new(ct: Vec<u8>, nonce: [u8; NONCE_LEN], orig_size: u64) -> Result<Self, CoreError> {
            if ct.len() < MIN_CT_LEN {
                return Err(CoreError::InvalidArgument(format!(
                    "ciphertext length {} < {MIN_CT_LEN}",
                    ct.len()
                )));
            }
            if orig_size == 0 {
                return Err(CoreError::InvalidArgument("origSize is zero".into()));
            }
            Ok(Self { ct, nonce, orig_size })
        }

        /// The AEAD ciphertext (GCM tag included).
        #[must_use]
        pub fn ct(&self) -> &[u8] {
            &self.ct
        }

        /// The 12-byte nonce used to seal this element.
        #[must_use]
        pub fn nonce(&self) -> &[u8; NONCE_LEN] {
            &self.nonce
        }

        /// The uncompressed plaintext length, bound into the AEAD as AAD.
        #[must_use]
        pub fn orig_size(&self) -> u64 {
            self.orig_size
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn rejects_short_ciphertext() {
            let err = Element::new(vec![0u8; 15], [0u8; NONCE_LEN], 5).unwrap_err();
            assert!(matches!(err, CoreError::InvalidArgument(_)));
        }

        #[test]
        fn rejects_zero_orig_size() {
            let err = Element::new(vec![0u8; 16], [0u8; NONCE_LEN], 0).unwrap_err();
            assert!(matches!(err, CoreError::InvalidArgument(_)));
        }

        #[test]
        fn accepts_minimal_valid_element() {
            let e = Element::new(vec![0u8; 16], [1u8; NONCE_LEN], 1).unwrap();
            assert_eq!(e.ct().len(), 16);
            assert_eq!(e.orig_size(), 1);
        }
    }
}
pub use element::Element;

/// Errors surfaced by the data-model layer itself.
///
/// The full engine taxonomy (`spec.md` §7) is assembled one layer up in
/// `largeblob-engine::EngineError`, which wraps this type among others via
/// `#[from]`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A caller-supplied value failed validation (bad key length, empty blob,
    /// malformed element fields).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An internal invariant was violated (allocation, overflow, or a crypto
    /// primitive rejecting an otherwise well-formed input).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Build the additional authenticated data bound into an element's AEAD tag:
/// the 4-byte ASCII literal `"blob"` followed by the plaintext length encoded
/// as an 8-byte little-endian unsigned integer.
///
/// This is what stops an attacker from splicing a compressed payload from one
/// entry onto another entry's length metadata.
#[must_use]
pub fn element_aad(plaintext_len: u64) -> [u8; 12] {
    let mut aad = [0u8; 12];
    aad[..4].copy_from_slice(constants::AAD_PREFIX);
    aad[4..].copy_from_slice(&plaintext_len.to_le_bytes());
    aad
}

/// Build the 70-byte preamble that is HMAC-SHA-256'd (keyed by the PIN/UV
/// auth token) to authorize one write fragment: 32 bytes of `0xFF`, the
/// largeBlob command identifier, one zero byte, the fragment offset as a
/// 4-byte little-endian integer, and the SHA-256 digest of the fragment body.
///
/// `fragment_digest` must already be the SHA-256 of the fragment bytes; this
/// function only assembles the preamble, it does not hash anything itself
/// (callers in `largeblob-auth` own the hashing so the same digest can be
/// folded into the running whole-array digest too).
///
/// # Errors
/// Returns [`CoreError::InvalidArgument`] if `offset` does not fit in 32
/// bits, matching the wire format's `u32` offset field.
pub fn hmac_preamble(offset: u64, fragment_digest: &[u8; 32]) -> Result<[u8; constants::HMAC_PREAMBLE_LEN], CoreError> {
    let offset_u32 = u32::try_from(offset)
        .map_err(|_| CoreError::InvalidArgument(format!("offset {offset} exceeds u32")))?;
    let mut buf = [0u8; constants::HMAC_PREAMBLE_LEN];
    buf[..32].fill(0xff);
    buf[32] = constants::CTAP_CBOR_LARGEBLOB;
    buf[33] = 0x00;
    buf[34..38].copy_from_slice(&offset_u32.to_le_bytes());
    buf[38..].copy_from_slice(fragment_digest);
    Ok(buf)
}
