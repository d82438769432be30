//! TOTP URI wrapping and parse-only validation (§4.6).
//!
//! Generating a live code from a TOTP secret is delegated to a standard OTP
//! library out of scope for this crate (see [`OtpUriValidator`]); what lives
//! here is just making sure a stored URI is well-formed before it's saved.

use crate::error::BlobError;
use url::Url;

/// Validates that a string is a parseable `otpauth://` URI carrying a
/// `secret` parameter, without decoding or ever generating a code from it.
pub trait OtpUriValidator {
  fn validate(&self, uri: &str) -> Result<(), BlobError>;
}

/// Parses with the `url` crate and checks the `otpauth` scheme plus a
/// non-empty `secret` query parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlOtpValidator;

impl OtpUriValidator for UrlOtpValidator {
  fn validate(&self, uri: &str) -> Result<(), BlobError> {
    let parsed = Url::parse(uri).map_err(|e| BlobError::InvalidTotpUri(format!("{uri}: {e}")))?;
    if parsed.scheme() != "otpauth" {
      return Err(BlobError::InvalidTotpUri(format!("{uri}: scheme must be otpauth")));
    }
    let has_secret = parsed.query_pairs().any(|(k, v)| k == "secret" && !v.is_empty());
    if !has_secret {
      return Err(BlobError::InvalidTotpUri(format!("{uri}: missing secret parameter")));
    }
    Ok(())
  }
}

/// Wraps a bare TOTP secret as `otpauth://totp/vaultlog:<name>?secret=<val>`.
/// Strings that already look like a URI (contain `://`) pass through
/// unchanged.
pub fn wrap_secret(name: &str, secret_or_uri: &str) -> String {
  if secret_or_uri.contains("://") {
    return secret_or_uri.to_string();
  }
  format!("otpauth://totp/vaultlog:{name}?secret={secret_or_uri}")
}

/// Wraps (if bare) and validates a TOTP value before it's stored.
pub fn prepare(validator: &impl OtpUriValidator, name: &str, secret_or_uri: &str) -> Result<String, BlobError> {
  let uri = wrap_secret(name, secret_or_uri);
  validator.validate(&uri)?;
  Ok(uri)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wraps_bare_secret() {
    let uri = wrap_secret("github", "JBSWY3DPEHPK3PXP");
    assert_eq!(uri, "otpauth://totp/vaultlog:github?secret=JBSWY3DPEHPK3PXP");
  }

  #[test]
  fn passes_through_existing_uri() {
    let uri = wrap_secret("github", "otpauth://totp/other:label?secret=ABC");
    assert_eq!(uri, "otpauth://totp/other:label?secret=ABC");
  }

  #[test]
  fn prepare_validates_wrapped_secret() {
    let validator = UrlOtpValidator;
    let stored = prepare(&validator, "github", "JBSWY3DPEHPK3PXP").unwrap();
    assert!(stored.starts_with("otpauth://totp/"));
  }

  #[test]
  fn rejects_non_otpauth_scheme() {
    let validator = UrlOtpValidator;
    assert!(prepare(&validator, "github", "https://example.com?secret=x").is_err());
  }

  #[test]
  fn rejects_missing_secret() {
    let validator = UrlOtpValidator;
    assert!(prepare(&validator, "github", "otpauth://totp/vaultlog:github").is_err());
  }
}
