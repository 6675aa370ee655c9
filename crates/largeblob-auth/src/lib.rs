//! PIN/UV auth token collaborator and per-fragment HMAC write authorization.
//!
//! `spec.md` §4.4/§6 name the PIN/UV auth protocol (ECDH key agreement,
//! token retrieval) as an external collaborator this engine does not
//! implement — ECDH and the authenticator's PIN subsystem live outside a
//! large-blob client. [`PinUvAuthStack`] is the seam: a real integration
//! supplies the negotiated token, this crate only turns that token into the
//! HMAC-SHA-256 that authorizes one write fragment.

#![deny(unsafe_code)]

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{field, info_span};
use zeroize::{Zeroize, ZeroizeOnDrop};

use largeblob_core::{hmac_preamble, CoreError};

type HmacSha256 = Hmac<Sha256>;

/// Errors from token handling or fragment authorization.
///
/// Stable `error_code` strings (used in spans): `no_token`, `bad_preamble`,
/// `mac_rejected`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The collaborator has no PIN/UV auth token available (not obtained, or
    /// the authenticator does not require one for this operation).
    #[error("no PIN/UV auth token available")]
    NoToken,
    /// The preamble could not be assembled (offset overflow — see
    /// [`largeblob_core::hmac_preamble`]).
    #[error(transparent)]
    Preamble(#[from] CoreError),
    /// A supplied tag did not match the recomputed HMAC.
    #[error("fragment HMAC verification failed")]
    MacRejected,
}

/// A PIN/UV auth token, held only as long as the write operation that needed
/// it.
///
/// Zeroized on drop, same rationale as [`largeblob_core::Key`]: this token
/// authorizes writes to the authenticator and must not outlive its caller's
/// stack frame.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UvAuthToken(Vec<u8>);

impl UvAuthToken {
    /// Wrap raw token bytes obtained from the PIN/UV auth protocol.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The PIN/UV auth protocol collaborator (`spec.md` §4.4/§6).
///
/// A real implementation performs ECDH key agreement with the authenticator
/// and exchanges PIN/UV auth protocol messages to obtain a token; this
/// engine only consumes the result through this trait.
pub trait PinUvAuthStack {
    /// Whether the authenticator's current configuration requires a PIN/UV
    /// auth token for a largeBlob write (it is never required for a read).
    fn uv_required_for_write(&self) -> bool;

    /// Obtain a token authorizing largeBlob writes, performing ECDH and the
    /// PIN/UV auth protocol exchange if needed.
    ///
    /// # Errors
    /// Returns [`AuthError::NoToken`] if no token can be obtained (PIN not
    /// set, UV unavailable, user declined).
    fn get_uv_token(&mut self) -> Result<UvAuthToken, AuthError>;
}

/// Compute the per-fragment HMAC-SHA-256 that authorizes a largeBlob write
/// fragment: SHA-256 the fragment body, assemble the 70-byte preamble over
/// `offset` and that digest, then HMAC the preamble under `token`.
///
/// # Errors
/// Propagates [`AuthError::Preamble`] if `offset` does not fit a `u32`.
pub fn authorize_fragment(
    token: &UvAuthToken,
    offset: u64,
    fragment: &[u8],
) -> Result<[u8; 32], AuthError> {
    use sha2::Digest;

    let span = info_span!("largeblob.auth.fragment", offset, error_code = field::Empty);
    let _guard = span.enter();

    let mut hasher = Sha256::new();
    hasher.update(fragment);
    let fragment_digest: [u8; 32] = hasher.finalize().into();

    let preamble = match hmac_preamble(offset, &fragment_digest) {
        Ok(p) => p,
        Err(e) => {
            span.record("error_code", "bad_preamble");
            return Err(AuthError::Preamble(e));
        }
    };

    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&preamble);
    Ok(mac.finalize().into_bytes().into())
}

/// Verify a previously computed fragment MAC in constant time.
#[must_use]
pub fn verify_fragment_mac(expected: &[u8; 32], candidate: &[u8; 32]) -> bool {
    expected.ct_eq(candidate).into()
}

/// A deterministic [`PinUvAuthStack`] double for tests: always returns the
/// same fixed token, never requires UV.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStack {
    token: Vec<u8>,
    require_uv: bool,
}

impl StaticTokenStack {
    /// Build a double that hands back `token` and reports `require_uv` for
    /// [`PinUvAuthStack::uv_required_for_write`].
    #[must_use]
    pub fn new(token: Vec<u8>, require_uv: bool) -> Self {
        Self { token, require_uv }
    }
}

impl PinUvAuthStack for StaticTokenStack {
    fn uv_required_for_write(&self) -> bool {
        self.require_uv
    }

    fn get_uv_token(&mut self) -> Result<UvAuthToken, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NoToken);
        }
        Ok(UvAuthToken::new(self.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_is_deterministic_for_fixed_inputs() {
        let token = UvAuthToken::new(vec![0x42; 32]);
        let a = authorize_fragment(&token, 7, b"fragment body").unwrap();
        let b = authorize_fragment(&token, 7, b"fragment body").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn authorize_differs_by_offset() {
        let token = UvAuthToken::new(vec![0x42; 32]);
        let a = authorize_fragment(&token, 0, b"fragment body").unwrap();
        let b = authorize_fragment(&token, 512, b"fragment body").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn authorize_differs_by_token() {
        let t1 = UvAuthToken::new(vec![0x01; 32]);
        let t2 = UvAuthToken::new(vec![0x02; 32]);
        let a = authorize_fragment(&t1, 0, b"fragment body").unwrap();
        let b = authorize_fragment(&t2, 0, b"fragment body").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_matches_self() {
        let token = UvAuthToken::new(vec![0x09; 16]);
        let mac = authorize_fragment(&token, 128, b"body").unwrap();
        assert!(verify_fragment_mac(&mac, &mac));
        let mut tampered = mac;
        tampered[0] ^= 0x01;
        assert!(!verify_fragment_mac(&mac, &tampered));
    }

    #[test]
    fn static_stack_round_trips_token() {
        let mut stack = StaticTokenStack::new(vec![1, 2, 3], true);
        assert!(stack.uv_required_for_write());
        let token = stack.get_uv_token().unwrap();
        assert_eq!(token.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn empty_static_stack_reports_no_token() {
        let mut stack = StaticTokenStack::default();
        assert!(matches!(stack.get_uv_token(), Err(AuthError::NoToken)));
    }

    proptest::proptest! {
        #[test]
        fn offset_overflow_is_rejected(offset in (u64::from(u32::MAX) + 1)..u64::MAX) {
            let token = UvAuthToken::new(vec![0x01; 32]);
            proptest::prop_assert!(authorize_fragment(&token, offset, b"x").is_err());
        }
    }
}
