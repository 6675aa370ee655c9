//! `spec.md` §4.7: serialize, stream in offset-ordered fragments with a
//! rolling SHA-256 digest, each fragment HMAC-authorized when a PIN/UV
//! token is required.

use ciborium::value::{Integer, Value};
use sha2::{Digest, Sha256};
use tracing::{field, info_span};

use largeblob_auth::UvAuthToken;
use largeblob_codec::{encode_body, LargeBlobArray};
use largeblob_core::constants::DIGEST_LEN;

use crate::{chunk_len, Transport, TransportError};

fn build_write_request(
    chunk: &[u8],
    offset: u64,
    total_size: Option<u64>,
    pin_auth: Option<&[u8; 32]>,
) -> Result<Vec<u8>, TransportError> {
    let mut entries = vec![
        (Value::Integer(Integer::from(2)), Value::Bytes(chunk.to_vec())),
        (Value::Integer(Integer::from(3)), Value::Integer(Integer::from(offset))),
    ];
    if let Some(total) = total_size {
        entries.push((Value::Integer(Integer::from(4)), Value::Integer(Integer::from(total))));
    }
    if let Some(mac) = pin_auth {
        entries.push((Value::Integer(Integer::from(5)), Value::Bytes(mac.to_vec())));
        entries.push((Value::Integer(Integer::from(6)), Value::Integer(Integer::from(1))));
    }
    let root = Value::Map(entries);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&root, &mut out)
        .map_err(|e| TransportError::Envelope(e.to_string()))?;
    Ok(out)
}

fn send_fragment_and_await(
    transport: &mut dyn Transport,
    request: &[u8],
    timeout: Option<std::time::Duration>,
) -> Result<(), TransportError> {
    transport.tx(request).map_err(|e| TransportError::Tx(e.to_string()))?;
    // A write fragment's reply carries no payload this engine needs; any
    // non-success status is already folded into `Transport::rx`'s error by
    // its implementation, so receiving `Ok` here is the acknowledgement.
    transport.rx(timeout).map_err(|e| TransportError::Rx(e.to_string()))?;
    Ok(())
}

/// Serialize `array`, stream its body to the authenticator in
/// offset-ordered, HMAC-authorized fragments, then transmit the trailing
/// 16-byte digest as a final fragment.
///
/// Fragments are sent strictly in increasing offset and each is awaited
/// before the next is sent (`spec.md` §4.7 "Ordering"); a single failed
/// fragment aborts the whole write with no retry.
///
/// # Errors
/// - [`TransportError::SizeOverflow`] if the body is too large to append a
///   digest trailer.
/// - [`TransportError::ChunkLenZero`] if the computed chunk length is zero.
/// - [`TransportError::Auth`] if fragment HMAC authorization fails.
/// - [`TransportError::Tx`]/[`TransportError::Rx`] if any fragment send or
///   acknowledgement fails.
pub fn write(
    transport: &mut dyn Transport,
    array: &LargeBlobArray,
    token: Option<&UvAuthToken>,
    buffer_cap: usize,
    timeout: Option<std::time::Duration>,
) -> Result<(), TransportError> {
    let body = encode_body(array)?;
    if body.len() > usize::MAX - DIGEST_LEN {
        return Err(TransportError::SizeOverflow);
    }
    let total_size = (body.len() + DIGEST_LEN) as u64;

    let len = chunk_len(transport.max_msg_size(), buffer_cap)?;

    let span = info_span!(
        "largeblob.transport.write",
        chunk_len = len,
        body_len = body.len(),
        fragments = field::Empty
    );
    let _guard = span.enter();

    let mut hasher = Sha256::new();
    let mut offset: u64 = 0;
    let mut fragments: u32 = 0;

    while (offset as usize) < body.len() {
        let start = offset as usize;
        let end = (start + len).min(body.len());
        let chunk = &body[start..end];

        hasher.update(chunk);

        let pin_auth = match token {
            Some(t) => Some(largeblob_auth::authorize_fragment(t, offset, chunk)?),
            None => None,
        };
        let total = if offset == 0 { Some(total_size) } else { None };
        let request = build_write_request(chunk, offset, total, pin_auth.as_ref())?;
        send_fragment_and_await(transport, &request, timeout)?;

        offset += chunk.len() as u64;
        fragments += 1;
    }

    let digest: [u8; 32] = hasher.finalize().into();
    let trailer = &digest[..DIGEST_LEN];
    let pin_auth = match token {
        Some(t) => Some(largeblob_auth::authorize_fragment(t, offset, trailer)?),
        None => None,
    };
    // The trailer fragment only carries `totalSize` if it happens to be the
    // very first fragment sent (an empty body, offset == 0); that case is
    // covered by `offset == 0` below exactly as the body loop would have.
    let total = if offset == 0 { Some(total_size) } else { None };
    let request = build_write_request(trailer, offset, total, pin_auth.as_ref())?;
    send_fragment_and_await(transport, &request, timeout)?;
    fragments += 1;

    span.record("fragments", fragments);
    Ok(())
}
