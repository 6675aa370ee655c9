//! Public `get`/`put`/`remove`/`trim` operations over a device-resident
//! largeBlobArray (`spec.md` §2 "Public ops", §6).
//!
//! This crate composes every other layer: [`largeblob_codec`] for the wire
//! format, [`largeblob_sealer`] for AEAD sealing, [`largeblob_transport`]
//! for fragmented I/O, and [`largeblob_auth`] for write authorization.

#![deny(unsafe_code)]

pub mod lookup;
pub mod mutate;

pub use lookup::LookupHit;
pub use mutate::CredentialEnumerator;
pub use largeblob_telemetry::{init_json_logging, TelemetryError};

use std::time::Duration;

use tracing::info_span;

use largeblob_codec::element::encode;
use largeblob_core::Key;
use largeblob_sealer::{Compressor, Rng};
use largeblob_transport::Transport;

/// The full error taxonomy surfaced by a public operation (`spec.md` §7),
/// composed from every layer's own `thiserror` enum via `#[from]`.
///
/// Two of `spec.md` §7's seven rows — digest-mismatch-on-read and
/// decode-failure-on-a-single-element — never reach this type: they are
/// recovered locally (empty-array synthesis, skip-and-preserve) by the
/// codec and transport layers respectively.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A caller-supplied argument violated a precondition (bad key length,
    /// empty put blob).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An internal invariant was violated (allocation, CBOR build,
    /// serialization overflow, a matched element that fails to decompress).
    #[error("internal error: {0}")]
    Internal(String),
    /// No element in the array opens under the given key.
    #[error("not found")]
    NotFound,
    /// Sealing a plaintext into an element failed.
    #[error(transparent)]
    Seal(#[from] largeblob_sealer::SealError),
    /// The fragment transport failed, or a write fragment failed HMAC
    /// authorization.
    #[error(transparent)]
    Transport(#[from] largeblob_transport::TransportError),
    /// PIN/UV auth token acquisition failed (passthrough from the
    /// collaborator, per `spec.md` §7).
    #[error(transparent)]
    Auth(#[from] largeblob_auth::AuthError),
    /// A caller-supplied key failed the 32-byte length invariant.
    #[error(transparent)]
    Core(#[from] largeblob_core::CoreError),
}

/// Tunables mirroring `spec.md`'s implementation-defined knobs: the local
/// receive-buffer ceiling used in the chunk-length calculation, and the
/// zstd compression level. Mirrors the teacher workspace's
/// `blob_store::Config` shape.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on how large a single fragment this implementation will
    /// hold in memory, independent of what the authenticator advertises.
    pub buffer_cap: usize,
    /// zstd compression level used by [`largeblob_sealer::ZstdCompressor`].
    pub zstd_level: i32,
    /// How long to wait for each fragment round-trip; `None` blocks
    /// indefinitely (`spec.md` §5's `-1` sentinel).
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { buffer_cap: 4096, zstd_level: 3, timeout: None }
    }
}

impl EngineConfig {
    /// Build a config with a given buffer cap, defaulting the remaining
    /// fields.
    #[must_use]
    pub fn with_buffer_cap(buffer_cap: usize) -> Self {
        Self { buffer_cap, ..Self::default() }
    }
}

/// Fetch and open the element that opens under `key`.
///
/// Validate → fetch → lookup (`spec.md` §2). Returns
/// [`EngineError::NotFound`] if no element opens, matching §7's "surfaced
/// on get" row.
///
/// `spec.md` §6's "all take `K_len == 32` or return invalid-argument" is
/// enforced once, at the point a caller builds a [`Key`] via
/// `Key::try_from`; every public op here takes the already-validated
/// newtype rather than re-checking a raw length on every call.
///
/// # Errors
/// [`EngineError::Transport`] on transport failure,
/// [`EngineError::NotFound`] if nothing opens,
/// [`EngineError::Internal`] if the matched element fails to decompress.
pub fn get(
    transport: &mut dyn Transport,
    config: &EngineConfig,
    key: &Key,
) -> Result<Vec<u8>, EngineError> {
    let span = info_span!("largeblob.engine.get");
    let _guard = span.enter();

    let array = largeblob_transport::fetch(transport, config.buffer_cap, config.timeout)?;
    let compressor = largeblob_sealer::ZstdCompressor::new(config.zstd_level);
    let hit = lookup::find(&array, key, &compressor, true)?;
    hit.and_then(|h| h.plaintext).ok_or(EngineError::NotFound)
}

/// Insert-or-replace `plaintext` under `key`.
///
/// Validate → seal → fetch → insert-or-replace → write (`spec.md` §2).
/// Always draws a fresh nonce and rewrites the array, even if the sealed
/// ciphertext would incidentally match an existing entry — `spec.md` §9's
/// open question is resolved as "never short-circuit".
///
/// # Errors
/// [`EngineError::InvalidArgument`] for an empty `plaintext`;
/// [`EngineError::Seal`], [`EngineError::Transport`], or
/// [`EngineError::Auth`] from the respective layer.
pub fn put(
    transport: &mut dyn Transport,
    config: &EngineConfig,
    key: &Key,
    plaintext: &[u8],
    token: Option<&largeblob_auth::UvAuthToken>,
) -> Result<(), EngineError> {
    let span = info_span!("largeblob.engine.put", plaintext_len = plaintext.len());
    let _guard = span.enter();

    if plaintext.is_empty() {
        return Err(EngineError::InvalidArgument("put blob is empty".into()));
    }

    let compressor = largeblob_sealer::ZstdCompressor::new(config.zstd_level);
    let mut rng = largeblob_sealer::OsRngSource;
    let element = largeblob_sealer::seal(plaintext, key, &mut rng, &compressor)?;

    let mut array = largeblob_transport::fetch(transport, config.buffer_cap, config.timeout)?;
    mutate::insert(&mut array, key, &compressor, encode(&element))?;

    largeblob_transport::write(transport, &array, token, config.buffer_cap, config.timeout)?;
    Ok(())
}

/// Remove the element that opens under `key`.
///
/// Not-found is success-as-no-op: `remove; remove` observably does the
/// same thing twice (`spec.md` §4.6, §7, REDESIGN FLAGS).
///
/// # Errors
/// [`EngineError::Transport`] or [`EngineError::Auth`] from the respective
/// layer.
pub fn remove(
    transport: &mut dyn Transport,
    config: &EngineConfig,
    key: &Key,
    token: Option<&largeblob_auth::UvAuthToken>,
) -> Result<(), EngineError> {
    let span = info_span!("largeblob.engine.remove");
    let _guard = span.enter();

    let compressor = largeblob_sealer::ZstdCompressor::new(config.zstd_level);
    let mut array = largeblob_transport::fetch(transport, config.buffer_cap, config.timeout)?;
    mutate::remove(&mut array, key, &compressor)?;

    largeblob_transport::write(transport, &array, token, config.buffer_cap, config.timeout)?;
    Ok(())
}

/// Fetch, drop every element orphaned from `enumerator`'s resident
/// credential set, and write the result back (`spec.md` §6's
/// `largeblob_trim`).
///
/// # Errors
/// [`EngineError::Transport`] or [`EngineError::Auth`] from the respective
/// layer.
pub fn trim(
    transport: &mut dyn Transport,
    config: &EngineConfig,
    enumerator: &dyn CredentialEnumerator,
    token: Option<&largeblob_auth::UvAuthToken>,
) -> Result<(), EngineError> {
    let span = info_span!("largeblob.engine.trim");
    let _guard = span.enter();

    let array = largeblob_transport::fetch(transport, config.buffer_cap, config.timeout)?;
    let trimmed = mutate::trim(&array, enumerator);
    largeblob_transport::write(transport, &trimmed, token, config.buffer_cap, config.timeout)?;
    Ok(())
}
