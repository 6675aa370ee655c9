//! CBOR encoding and decoding for the CTAP2 largeBlobArray wire format:
//! the per-element map (`element`) and the digest-trailed container
//! (`array`).
//!
//! The underlying CBOR byte encoder is treated as an external collaborator
//! (`spec.md` §1/§6) — this crate depends on [`ciborium`] for it rather than
//! writing one.

#![deny(unsafe_code)]

pub mod array;
pub mod element;

pub use array::{encode_body, DigestOutcome, LargeBlobArray};
pub use element::decode_hard as decode_element_hard;

/// Errors from CBOR encoding/decoding and digest-trailer parsing.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A CBOR value did not have the shape (map/array, definite-length,
    /// integer key) this format requires.
    #[error("cbor shape error: {0}")]
    Shape(String),
    /// A required element field was missing after iterating the map.
    #[error("incomplete element: missing {0}")]
    Incomplete(&'static str),
    /// A field's length violated a §3 invariant (ciphertext too short,
    /// nonce the wrong length, orig_size zero).
    #[error(transparent)]
    Core(#[from] largeblob_core::CoreError),
    /// The on-device byte image was shorter than the 16-byte digest trailer.
    #[error("buffer too short for digest trailer")]
    TooShortForDigest,
    /// Serialization overflowed the implementation's size bound.
    #[error("serialized array too large to append a digest trailer")]
    SizeOverflow,
    /// The underlying CBOR library failed to encode a well-formed item.
    #[error("cbor encode failed: {0}")]
    Encode(String),
    /// The underlying CBOR library failed to parse the byte stream.
    #[error("cbor decode failed: {0}")]
    Decode(String),
}
