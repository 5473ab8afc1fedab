//! Remote tweet lookup.
//!
//! [`TweetFetcher`] is the only surface the engine sees. [`TwitterClient`]
//! implements it against the v1.1 REST API with OAuth 1.0a user context.

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::oauth::OAuth1Signer;
use itertools::Itertools;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Most ids the batch lookup endpoint accepts per call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Single and batch tweet lookup.
pub trait TweetFetcher {
    /// Fetch one tweet in full.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tweet is gone, `RateLimited` if the window is spent,
    /// anything else for transport or API failures.
    fn fetch_one(&self, id: u64) -> Result<Value, FetchError>;

    /// Fetch up to [`MAX_BATCH_SIZE`] tweets. Ids missing from the returned
    /// map were not found.
    ///
    /// # Errors
    ///
    /// `RateLimited` if the window is spent, anything else for transport or
    /// API failures.
    fn fetch_batch(&self, ids: &[u64]) -> Result<HashMap<u64, Value>, FetchError>;
}

impl<T: TweetFetcher + ?Sized> TweetFetcher for &T {
    fn fetch_one(&self, id: u64) -> Result<Value, FetchError> {
        (**self).fetch_one(id)
    }

    fn fetch_batch(&self, ids: &[u64]) -> Result<HashMap<u64, Value>, FetchError> {
        (**self).fetch_batch(ids)
    }
}

/// Blocking, OAuth-signed API client.
pub struct TwitterClient {
    http: Client,
    signer: OAuth1Signer,
    base_url: String,
}

impl TwitterClient {
    /// Build a client for `api.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(signer: OAuth1Signer, api: &ApiConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(api.user_agent.clone())
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            signer,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let auth = self
            .signer
            .authorization_header("GET", &url, params)
            .map_err(|e| FetchError::Request(e.to_string()))?;

        trace!(%url, ?params, "GET");
        let resp = self
            .http
            .get(&url)
            .query(params)
            .header(AUTHORIZATION, auth)
            .send()?;

        let status = resp.status();
        debug!(%url, status = status.as_u16(), "API response");
        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            s if !s.is_success() => {
                let body = resp.text().unwrap_or_else(|_| "Unknown error".to_string());
                Err(FetchError::Api {
                    status: s.as_u16(),
                    body,
                })
            }
            _ => Ok(resp.json::<Value>()?),
        }
    }

    /// Profile of the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    pub fn verify_credentials(&self) -> Result<Value, FetchError> {
        self.get(
            "account/verify_credentials.json",
            &[("include_email", "true")],
        )
    }

    /// A tweet in extended mode with its author reduced to an id.
    ///
    /// Used for the `status` embedded in the user profile.
    ///
    /// # Errors
    ///
    /// Same as [`TweetFetcher::fetch_one`].
    pub fn fetch_status(&self, id: u64) -> Result<Value, FetchError> {
        self.show(id, true)
    }

    fn show(&self, id: u64, trim_user: bool) -> Result<Value, FetchError> {
        let id = id.to_string();
        let mut params = vec![
            ("id", id.as_str()),
            ("tweet_mode", "extended"),
            ("include_ext_alt_text", "true"),
        ];
        if trim_user {
            params.push(("trim_user", "true"));
        }
        self.get("statuses/show.json", &params)
    }
}

impl TweetFetcher for TwitterClient {
    fn fetch_one(&self, id: u64) -> Result<Value, FetchError> {
        self.show(id, false)
    }

    fn fetch_batch(&self, ids: &[u64]) -> Result<HashMap<u64, Value>, FetchError> {
        if ids.len() > MAX_BATCH_SIZE {
            return Err(FetchError::Request(format!(
                "{} ids exceeds the lookup limit of {MAX_BATCH_SIZE}",
                ids.len()
            )));
        }
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let id_list = ids.iter().join(",");
        let body = self.get(
            "statuses/lookup.json",
            &[
                ("id", id_list.as_str()),
                ("tweet_mode", "extended"),
                ("include_ext_alt_text", "true"),
            ],
        )?;
        index_lookup_response(body)
    }
}

/// Key a lookup response array by each tweet's `id_str`.
///
/// # Errors
///
/// Returns `Decode` if the body is not an array.
pub fn index_lookup_response(body: Value) -> Result<HashMap<u64, Value>, FetchError> {
    let Value::Array(items) = body else {
        return Err(FetchError::Decode("lookup response is not a list".to_string()));
    };
    Ok(items
        .into_iter()
        .filter_map(|tweet| {
            let id = tweet
                .get("id_str")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<u64>().ok())
                .or_else(|| tweet.get("id").and_then(Value::as_u64))?;
            Some((id, tweet))
        })
        .collect())
}
