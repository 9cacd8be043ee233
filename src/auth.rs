//! Shared-access-signature tokens for hub authentication
//!
//! A SAS token is a time-limited credential derived from the device's shared
//! access key. It is regenerated for every connection attempt; nothing here
//! is persisted or retried.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Characters left bare by JavaScript's `encodeURIComponent`. The hub
/// validates tokens against exactly that encoding, so the set must match.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Token generation errors
#[derive(Debug, Error)]
pub enum SasError {
    #[error("signing key is not valid base64: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),
    #[error("HMAC-SHA256 rejected the signing key")]
    SigningFailed,
}

/// A signed, time-limited credential in the hub's
/// `SharedAccessSignature sr=..&sig=..&se=..[&skn=..]` wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    token: String,
    expiry: u64,
}

impl SasToken {
    /// Sign a token valid for `ttl_mins` starting now.
    ///
    /// `signing_key` is the base64-encoded shared access key. `policy_name`
    /// adds the `&skn=` suffix when present (hub device connections pass
    /// `None`).
    pub fn generate(
        resource_uri: &str,
        signing_key: &str,
        policy_name: Option<&str>,
        ttl_mins: u64,
    ) -> Result<Self, SasError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        // Round fractional seconds up, matching the source of truth for
        // what the hub accepts.
        let now_secs = since_epoch.as_secs() + u64::from(since_epoch.subsec_nanos() > 0);
        Self::generate_at(resource_uri, signing_key, policy_name, ttl_mins, now_secs)
    }

    /// Sign a token with an explicit clock, for deterministic tests.
    pub fn generate_at(
        resource_uri: &str,
        signing_key: &str,
        policy_name: Option<&str>,
        ttl_mins: u64,
        now_secs: u64,
    ) -> Result<Self, SasError> {
        let expiry = now_secs + ttl_mins * 60;
        let encoded_uri = url_encode(resource_uri);
        let to_sign = format!("{encoded_uri}\n{expiry}");

        let key_bytes = BASE64.decode(signing_key)?;
        let mut mac =
            HmacSha256::new_from_slice(&key_bytes).map_err(|_| SasError::SigningFailed)?;
        mac.update(to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let mut token = format!(
            "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry}",
            url_encode(&signature)
        );
        if let Some(policy) = policy_name {
            token.push_str("&skn=");
            token.push_str(policy);
        }

        Ok(Self { token, expiry })
    }

    /// The serialized credential, used as the MQTT password.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Unix-seconds expiry embedded in the token.
    pub fn expiry(&self) -> u64 {
        self.expiry
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

fn url_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}
