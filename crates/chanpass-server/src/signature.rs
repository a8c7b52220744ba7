//! Webhook signature: hex-encoded HMAC-SHA256 of the raw request body, keyed
//! with the shared webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

fn mac(secret: &str, body: &[u8]) -> HmacSha256 {
  // HMAC accepts keys of any length, so this cannot fail.
  let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
    .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
  mac.update(body);
  mac
}

/// Compute the signature the provider would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
  hex::encode(mac(secret, body).finalize().into_bytes())
}

/// Check `signature` against `body` in constant time.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> Result<(), Error> {
  let expected = hex::decode(signature.trim()).map_err(|_| Error::BadSignature)?;
  mac(secret, body)
    .verify_slice(&expected)
    .map_err(|_| Error::BadSignature)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_own_signature() {
    let sig = sign("whsec", b"{\"event\":\"payment.captured\"}");
    assert_eq!(sig.len(), 64);
    assert!(verify("whsec", b"{\"event\":\"payment.captured\"}", &sig).is_ok());
  }

  #[test]
  fn rejects_tampered_body_wrong_secret_and_garbage() {
    let sig = sign("whsec", b"body");
    assert!(matches!(verify("whsec", b"body!", &sig), Err(Error::BadSignature)));
    assert!(matches!(verify("other", b"body", &sig), Err(Error::BadSignature)));
    assert!(matches!(verify("whsec", b"body", "not-hex"), Err(Error::BadSignature)));
    assert!(matches!(verify("whsec", b"body", ""), Err(Error::BadSignature)));
  }

  #[test]
  fn matches_known_vector() {
    // RFC 4231 test case 2.
    assert_eq!(
      sign("Jefe", b"what do ya want for nothing?"),
      "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
    );
  }
}
