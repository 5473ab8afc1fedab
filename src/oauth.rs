//! OAuth 1.0a request signing (HMAC-SHA1) for user-context API calls.
//!
//! Only signing is implemented. Tokens are supplied by the caller; see
//! [`crate::auth`] for where they come from.

use crate::error::{Result, XpandError};
use crate::model::{AccessToken, ConsumerCredentials};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use itertools::Itertools;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

/// Signs requests with a consumer key pair and a user access token.
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer: ConsumerCredentials,
    token: AccessToken,
}

/// RFC 3986 percent-encoding, as OAuth requires.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl OAuth1Signer {
    #[must_use]
    pub const fn new(consumer: ConsumerCredentials, token: AccessToken) -> Self {
        Self { consumer, token }
    }

    /// Build the `Authorization` header for a request.
    ///
    /// `params` are the query or form parameters that will be sent; they
    /// take part in the signature but are not repeated in the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the HMAC key cannot be constructed.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let nonce: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.header_with(method, url, params, &nonce, &timestamp)
    }

    fn header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.consumer.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.token.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let signature = self.sign(method, url, oauth_params.iter().chain(params))?;
        oauth_params.push(("oauth_signature", &signature));
        oauth_params.sort_unstable();

        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .join(", ");
        Ok(format!("OAuth {fields}"))
    }

    fn sign<'a>(
        &self,
        method: &str,
        url: &str,
        params: impl Iterator<Item = &'a (&'a str, &'a str)>,
    ) -> Result<String> {
        let param_string = params
            .map(|(k, v)| (encode(k), encode(v)))
            .sorted()
            .map(|(k, v)| format!("{k}={v}"))
            .join("&");
        let base = format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            encode(url),
            encode(&param_string)
        );
        let key = format!(
            "{}&{}",
            encode(&self.consumer.consumer_secret),
            encode(&self.token.access_token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| XpandError::invalid_argument(format!("bad signing key: {e}")))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> OAuth1Signer {
        OAuth1Signer::new(
            ConsumerCredentials {
                consumer_key: "xvz1evFS4wEEPTGEFPHBog".to_string(),
                consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string(),
            },
            AccessToken {
                access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
                access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string(),
            },
        )
    }

    // Worked example from the platform's "creating a signature" documentation.
    #[test]
    fn signature_matches_reference_example() {
        let header = signer()
            .header_with(
                "POST",
                "https://api.twitter.com/1.1/statuses/update.json",
                &[
                    ("include_entities", "true"),
                    ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
                ],
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
                "1318622958",
            )
            .unwrap();
        assert!(
            header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""),
            "{header}"
        );
    }

    #[test]
    fn header_lists_oauth_fields_sorted() {
        let header = signer()
            .header_with("GET", "https://example.com/x", &[], "n", "1")
            .unwrap();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", oauth_nonce=\"n\""));
        assert!(header.ends_with("oauth_version=\"1.0\""));
        assert!(!header.contains("include_entities"));
    }

    #[test]
    fn nonces_differ_between_requests() {
        let s = signer();
        let a = s.authorization_header("GET", "https://example.com", &[]).unwrap();
        let b = s.authorization_header("GET", "https://example.com", &[]).unwrap();
        assert_ne!(a, b);
    }
}
