//! Transport-safe encoding of target URLs and request payloads.
//!
//! The gateway's `/p` endpoint takes its target as `u=<base64url, no padding>`
//! and `/fetch` takes request bodies as `bodyB64` in the same alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode arbitrary bytes as URL-safe base64 without `=` padding.
pub fn b64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Encode a target URL for the `u` query parameter.
pub fn encode_target(target: &str) -> String {
    b64url(target.as_bytes())
}

/// Inverse of `b64url`. The gateway does this on its side; the harness only
/// uses it to check its own output.
pub fn b64url_decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded)
}
