//! Compress-then-seal / open-then-decompress for a single largeBlobArray
//! element.
//!
//! `spec.md` §4.2. AEAD and compression are named external collaborators
//! (`spec.md` §1/§6); this crate depends on `aes-gcm` and `zstd` for them —
//! the same two crates the teacher workspace already uses for its
//! content-addressable blob store.

#![deny(unsafe_code)]

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use largeblob_core::{constants::NONCE_LEN, element_aad, CoreError, Element, Key};

/// Errors from sealing a plaintext into an [`Element`].
///
/// `open` deliberately has no error type of its own — per `spec.md` §4.2 it
/// fails silently (`Option::None`) since it is the trial-decryption
/// primitive lookup relies on; a real error type there would make every
/// caller re-derive "absent" from it.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// The compression collaborator rejected the plaintext.
    #[error("compression failed: {0}")]
    Compress(String),
    /// A data-model invariant was violated while assembling the element
    /// (should not happen for well-formed inputs; surfaced rather than
    /// panicking).
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Source of cryptographically strong random bytes, standing in for the RNG
/// collaborator from `spec.md` §6.
pub trait Rng {
    /// Fill `buf` with random bytes.
    fn fill(&mut self, buf: &mut [u8]);
}

/// [`Rng`] backed by the OS CSPRNG via the `rand` crate.
#[derive(Debug, Default)]
pub struct OsRngSource;

impl Rng for OsRngSource {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// Compression collaborator from `spec.md` §6: `compress`/`uncompress` with
/// length enforcement.
pub trait Compressor {
    /// Compress `src`.
    ///
    /// # Errors
    /// Returns [`SealError::Compress`] if the underlying codec rejects the
    /// input.
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, SealError>;

    /// Decompress `src`, requiring the result to be exactly `expected_len`
    /// bytes.
    ///
    /// # Errors
    /// Returns [`SealError::Compress`] if decoding fails or the decompressed
    /// length does not equal `expected_len`.
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>, SealError>;
}

/// [`Compressor`] backed by `zstd` at a fixed level, for deterministic
/// output (mirrors the teacher workspace's blob store, which fixes its zstd
/// level for the same reason).
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCompressor {
    /// Build a compressor at the given zstd level.
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, SealError> {
        zstd::bulk::compress(src, self.level).map_err(|e| SealError::Compress(e.to_string()))
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>, SealError> {
        let out = zstd::bulk::decompress(src, expected_len)
            .map_err(|e| SealError::Compress(e.to_string()))?;
        if out.len() != expected_len {
            return Err(SealError::Compress(format!(
                "decompressed length {} != expected {expected_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

fn aead_nonce(bytes: &[u8; NONCE_LEN]) -> &Nonce<<Aes256Gcm as aes_gcm::AeadCore>::NonceSize> {
    Nonce::<<Aes256Gcm as aes_gcm::AeadCore>::NonceSize>::from_slice(bytes)
}

/// Compress `pt`, then AES-256-GCM-seal the compressed bytes under `key`
/// with a fresh random nonce and AAD derived from `pt.len()` (not the
/// compressed length).
///
/// # Errors
/// Propagates [`SealError::Compress`] from the compressor, or
/// [`SealError::Core`] if the resulting fields somehow violate an
/// [`Element`] invariant (cannot happen for a non-empty `pt`, since the GCM
/// tag alone is 16 bytes).
pub fn seal(
    pt: &[u8],
    key: &Key,
    rng: &mut dyn Rng,
    compressor: &dyn Compressor,
) -> Result<Element, SealError> {
    let compressed = compressor.compress(pt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).expect("key is exactly 32 bytes");
    let aad = element_aad(pt.len() as u64);
    let mut ct = cipher
        .encrypt(
            aead_nonce(&nonce_bytes),
            aes_gcm::aead::Payload { msg: &compressed, aad: &aad },
        )
        .map_err(|_| SealError::Compress("aead encryption failed".into()))?;

    let elem = Element::new(std::mem::take(&mut ct), nonce_bytes, pt.len() as u64)?;
    nonce_bytes.zeroize();
    Ok(elem)
}

/// Recompute AAD from `elem.orig_size()` and run AES-256-GCM decryption
/// only, returning the still-compressed bytes.
///
/// This is the trial-decryption primitive lookup runs against every element
/// in an array to find which one opens under a given key: it deliberately
/// stops short of decompression, so a wrong key and a corrupt compressed
/// payload both just look like "this element didn't open" rather than
/// forcing every candidate through decompression too.
#[must_use]
pub fn decrypt_only(elem: &Element, key: &Key) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).ok()?;
    let aad = element_aad(elem.orig_size());
    cipher
        .decrypt(aead_nonce(elem.nonce()), aes_gcm::aead::Payload { msg: elem.ct(), aad: &aad })
        .ok()
}

/// Open `elem` under `key`: AEAD-decrypt via [`decrypt_only`], then on
/// success decompress to exactly `orig_size` bytes.
///
/// Returns `None` on *any* AEAD or decompression failure — suitable for
/// callers that only care whether a key opens an element at all. Callers
/// that have already established a matching index via [`decrypt_only`] and
/// now need the plaintext should treat a decompression failure at that
/// point as an internal inconsistency rather than silent absence (`spec.md`
/// §4.5).
#[must_use]
pub fn open(elem: &Element, key: &Key, compressor: &dyn Compressor) -> Option<Vec<u8>> {
    let compressed = decrypt_only(elem, key)?;
    let orig_size = usize::try_from(elem.orig_size()).ok()?;
    compressor.decompress(&compressed, orig_size).ok()
}
