//! Fragmented fetch/write transport for the largeBlobArray wire format
//! (`spec.md` §4.4, §4.7).
//!
//! The HID/NFC transport itself is an external collaborator (`spec.md`
//! §6) — this crate depends only on the [`Transport`] trait for it, plus
//! `ciborium` for the fragment request/reply envelopes and `sha2` for the
//! streaming whole-body digest computed while writing.

#![deny(unsafe_code)]

pub mod fetch;
pub mod write;

pub use fetch::fetch;
pub use write::write;

use std::time::Duration;

/// The authenticator transport collaborator (`spec.md` §6's `tx`/`rx`
/// contract), narrowed to the single largeBlob command this engine issues.
///
/// A single call is a strict request/response pair: `tx` sends one
/// CBOR-encoded largeBlob command, `rx` blocks for the matching reply.
/// Implementations own framing below the CBOR layer (HID packetization,
/// CTAPHID channel handling); this trait only sees whole command/reply
/// payloads.
pub trait Transport {
    /// Send one CBOR-encoded largeBlob command.
    ///
    /// # Errors
    /// Returns [`TransportError::Tx`] if the underlying channel rejects or
    /// fails to deliver the command.
    fn tx(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Block for the reply to the most recent [`Transport::tx`] call.
    ///
    /// `timeout = None` blocks indefinitely, matching `spec.md` §5's `-1`
    /// sentinel expressed idiomatically.
    ///
    /// # Errors
    /// Returns [`TransportError::Rx`] on timeout, channel failure, or a
    /// non-success status from the authenticator.
    fn rx(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError>;

    /// The authenticator's advertised maximum message size, used to derive
    /// the per-call chunk length (`spec.md` §4.4).
    fn max_msg_size(&self) -> usize;
}

/// Errors from the fragment transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending a fragment failed.
    #[error("transport send failed: {0}")]
    Tx(String),
    /// Receiving a fragment failed, timed out, or the authenticator
    /// returned a non-success status.
    #[error("transport receive failed: {0}")]
    Rx(String),
    /// The computed chunk length (`min(maxmsgsize, buffer_cap) - 64`) was
    /// zero or negative.
    #[error("chunk length collapsed to zero (maxmsgsize/buffer cap too small)")]
    ChunkLenZero,
    /// A request or reply CBOR envelope could not be built or parsed.
    #[error("malformed fragment envelope: {0}")]
    Envelope(String),
    /// The array to write serialized to a size that would overflow the
    /// wire format's length fields.
    #[error("array serialization overflowed")]
    SizeOverflow,
    /// A data-model or codec layer invariant was violated.
    #[error(transparent)]
    Codec(#[from] largeblob_codec::CodecError),
    /// Write-fragment authorization failed.
    #[error(transparent)]
    Auth(#[from] largeblob_auth::AuthError),
}

/// Compute the chunk length shared by fetch and write: the authenticator's
/// advertised maximum message size, saturated to the implementation's
/// buffer cap, minus the 64-byte envelope reserve (`spec.md` §4.4).
///
/// # Errors
/// Returns [`TransportError::ChunkLenZero`] if the result is zero.
pub fn chunk_len(max_msg_size: usize, buffer_cap: usize) -> Result<usize, TransportError> {
    let capped = max_msg_size.min(buffer_cap);
    capped
        .checked_sub(largeblob_core::constants::ENVELOPE_RESERVE)
        .filter(|&n| n > 0)
        .ok_or(TransportError::ChunkLenZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_len_subtracts_envelope_reserve() {
        assert_eq!(chunk_len(1024, 4096).unwrap(), 1024 - 64);
        assert_eq!(chunk_len(4096, 200).unwrap(), 200 - 64);
    }

    #[test]
    fn chunk_len_zero_is_rejected() {
        assert!(chunk_len(64, 4096).is_err());
        assert!(chunk_len(10, 4096).is_err());
    }
}
