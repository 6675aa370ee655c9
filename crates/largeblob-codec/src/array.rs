//! Whole-array codec: a definite CBOR array of elements with a trailing
//! 16-byte SHA-256 digest over the serialized body.

use ciborium::value::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use largeblob_core::constants::DIGEST_LEN;

use crate::CodecError;

/// Outcome of comparing a trailing digest against the recomputed one.
///
/// Tri-valued rather than a bool because "too short to even have a trailer"
/// is a distinct condition from "has a trailer that doesn't match" — the
/// fetcher treats both as "synthesize an empty array" but callers that only
/// care about corruption vs. truncation can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    /// The trailing 16 bytes equal SHA-256(body)\[..16\].
    Match,
    /// The trailing 16 bytes are present but do not match.
    Mismatch,
    /// The buffer was not even long enough to hold a trailer.
    TooShort,
}

/// Recompute SHA-256 over everything but the last 16 bytes of `bytes` and
/// compare it, in constant time, against that trailer.
///
/// Requires `bytes.len() > 16`; anything at or below that is
/// [`DigestOutcome::TooShort`] since there is no body left to hash.
#[must_use]
pub fn verify_digest(bytes: &[u8]) -> DigestOutcome {
    if bytes.len() <= DIGEST_LEN {
        return DigestOutcome::TooShort;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = hasher.finalize();
    if digest[..DIGEST_LEN].ct_eq(trailer).into() {
        DigestOutcome::Match
    } else {
        DigestOutcome::Mismatch
    }
}

/// An in-memory largeBlobArray: a definite-length ordered sequence of raw
/// CBOR items.
///
/// Items are kept as raw [`Value`]s rather than eagerly decoded
/// [`largeblob_core::Element`]s, per `spec.md` §4.3: loading an array does
/// not validate individual elements, only the container shape and the
/// trailing digest. Decoding — and tolerating non-conformant entries — is a
/// lazy, per-lookup concern handled one layer up.
#[derive(Debug, Clone, Default)]
pub struct LargeBlobArray {
    items: Vec<Value>,
}

impl LargeBlobArray {
    /// The canonical initial value: an empty array.
    #[must_use]
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Wrap an already-parsed sequence of raw CBOR items.
    #[must_use]
    pub fn from_items(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Number of entries (valid or non-conformant) in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the array holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow all raw items in order.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Borrow the raw item at `idx`, if any.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.items.get(idx)
    }

    /// Replace the item at `idx` with `item`.
    ///
    /// # Panics
    /// Panics if `idx >= self.len()`; callers only reach this after a
    /// successful lookup returned `idx` against the same array.
    pub fn replace(&mut self, idx: usize, item: Value) {
        self.items[idx] = item;
    }

    /// Append `item` at the end of the array.
    pub fn push(&mut self, item: Value) {
        self.items.push(item);
    }

    /// Remove and return the item at `idx`, shifting later items down to
    /// close the gap (order-preserving).
    ///
    /// # Panics
    /// Panics if `idx >= self.len()`.
    pub fn remove(&mut self, idx: usize) -> Value {
        self.items.remove(idx)
    }

    /// Consume the array, returning its raw items.
    #[must_use]
    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

/// CBOR-encode the array exactly as held in memory, with no digest trailer.
///
/// Exposed separately from [`serialize`] because the writer streams this
/// body to the authenticator in fragments and appends the trailer as its
/// own final fragment, rather than transmitting the combined wire image in
/// one piece.
///
/// # Errors
/// [`CodecError::Encode`] if the CBOR library rejects the item (should not
/// happen for well-formed [`Value`]s).
pub fn encode_body(array: &LargeBlobArray) -> Result<Vec<u8>, CodecError> {
    let root = Value::Array(array.items.clone());
    let mut body = Vec::new();
    ciborium::ser::into_writer(&root, &mut body).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(body)
}

/// CBOR-encode the array exactly as held in memory, then append 16 bytes of
/// SHA-256(body) to form the on-device wire image.
///
/// # Errors
/// [`CodecError::Encode`] if the CBOR library rejects the item (should not
/// happen for well-formed [`Value`]s); [`CodecError::SizeOverflow`] if the
/// serialized body is so large that appending the 16-byte trailer would
/// overflow `usize`.
pub fn serialize(array: &LargeBlobArray) -> Result<Vec<u8>, CodecError> {
    let mut body = encode_body(array)?;
    if body.len() > usize::MAX - DIGEST_LEN {
        return Err(CodecError::SizeOverflow);
    }
    let mut hasher = Sha256::new();
    hasher.update(&body);
    let digest = hasher.finalize();
    body.extend_from_slice(&digest[..DIGEST_LEN]);
    Ok(body)
}

/// Parse the on-device byte image into an array, ignoring (but requiring
/// the presence of) the trailing digest.
///
/// Does not validate individual elements; decoding tolerance for
/// non-conformant entries is applied lazily by the lookup component.
///
/// # Errors
/// [`CodecError::TooShortForDigest`] if `bytes.len() < 16`;
/// [`CodecError::Decode`] if the remainder does not parse as CBOR;
/// [`CodecError::Shape`] if it parses but is not a CBOR array.
pub fn load(bytes: &[u8]) -> Result<LargeBlobArray, CodecError> {
    if bytes.len() < DIGEST_LEN {
        return Err(CodecError::TooShortForDigest);
    }
    let body = &bytes[..bytes.len() - DIGEST_LEN];
    let value: Value =
        ciborium::de::from_reader(body).map_err(|e| CodecError::Decode(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(LargeBlobArray::from_items(items)),
        _ => Err(CodecError::Shape("array body is not a CBOR array".into())),
    }
}
