//! File-backed credentials and profile cache.
//!
//! Three JSON files live next to the archive:
//!
//! - `consumer.json`: `{consumer_key, consumer_secret}`
//! - `access.json`: `{access_token, access_token_secret}`
//! - `user.json`: the authenticated user's profile as returned by the API
//!
//! Missing credential files are filled in from plain prompts. There is no
//! browser/PIN authorization here; an access token generated elsewhere (for
//! example on the developer portal) is pasted in.

use crate::error::{FetchError, Result, ResultExt, XpandError};
use crate::model::{AccessToken, ConsumerCredentials, UserProfile};
use crate::oauth::OAuth1Signer;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

pub const CONSUMER_FILE: &str = "consumer.json";
pub const ACCESS_FILE: &str = "access.json";
pub const USER_FILE: &str = "user.json";

/// Where answers to credential prompts come from.
pub trait Prompter {
    /// Ask for a single line of input.
    ///
    /// # Errors
    ///
    /// Returns an error if input cannot be read.
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, prompt: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map(|s| s.trim().to_string())
            .context("reading from terminal")
    }
}

fn load_json<T: DeserializeOwned>(path: &Path, kind: &'static str) -> Result<T> {
    if !path.exists() {
        return Err(XpandError::InvalidCredentials {
            kind,
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(XpandError::malformed(kind, path, "not a file"));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| XpandError::path_error("read", path, e))?;
    serde_json::from_str(&content).map_err(|e| XpandError::malformed(kind, path, e.to_string()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|e| XpandError::path_error("write", path, e))?;
    debug!(path = %path.display(), "Wrote credential cache");
    Ok(())
}

/// Ask for two non-empty values or fail with `InvalidCredentials`.
fn ask_pair(
    prompter: &dyn Prompter,
    kind: &'static str,
    path: &Path,
    prompts: [&str; 2],
) -> Result<(String, String)> {
    let first = prompter.ask(prompts[0])?;
    let second = prompter.ask(prompts[1])?;
    if first.is_empty() || second.is_empty() {
        return Err(XpandError::InvalidCredentials {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok((first, second))
}

/// Read `consumer.json`.
///
/// # Errors
///
/// `InvalidCredentials` if the file is missing, `MalformedCredentials` if it
/// lacks either field.
pub fn load_consumer(base_dir: &Path) -> Result<ConsumerCredentials> {
    load_json(&base_dir.join(CONSUMER_FILE), "consumer")
}

/// Read `consumer.json`, prompting for and saving it when missing.
///
/// # Errors
///
/// Malformed files, empty answers, and write failures.
pub fn ensure_consumer(base_dir: &Path, prompter: &dyn Prompter) -> Result<ConsumerCredentials> {
    match load_consumer(base_dir) {
        Err(XpandError::InvalidCredentials { path, .. }) => {
            info!("No consumer credentials found");
            let (consumer_key, consumer_secret) = ask_pair(
                prompter,
                "consumer",
                &path,
                [
                    "Consumer key for the application",
                    "Consumer secret for the application",
                ],
            )?;
            let creds = ConsumerCredentials {
                consumer_key,
                consumer_secret,
            };
            write_json(&path, &creds)?;
            Ok(creds)
        }
        other => other,
    }
}

/// Read `access.json`.
///
/// # Errors
///
/// `InvalidCredentials` if the file is missing, `MalformedCredentials` if it
/// lacks either field.
pub fn load_access_token(base_dir: &Path) -> Result<AccessToken> {
    load_json(&base_dir.join(ACCESS_FILE), "access")
}

/// Read `access.json`, prompting for and saving it when missing.
///
/// # Errors
///
/// Malformed files, empty answers, and write failures.
pub fn ensure_access_token(base_dir: &Path, prompter: &dyn Prompter) -> Result<AccessToken> {
    match load_access_token(base_dir) {
        Err(XpandError::InvalidCredentials { path, .. }) => {
            info!("No access token found");
            let (access_token, access_token_secret) = ask_pair(
                prompter,
                "access",
                &path,
                ["Access token for your account", "Access token secret"],
            )?;
            let token = AccessToken {
                access_token,
                access_token_secret,
            };
            write_json(&path, &token)?;
            Ok(token)
        }
        other => other,
    }
}

/// Load or prompt for both credential files and build a request signer.
///
/// # Errors
///
/// See [`ensure_consumer`] and [`ensure_access_token`].
pub fn ensure_signer(base_dir: &Path, prompter: &dyn Prompter) -> Result<OAuth1Signer> {
    let consumer = ensure_consumer(base_dir, prompter)?;
    let token = ensure_access_token(base_dir, prompter)?;
    Ok(OAuth1Signer::new(consumer, token))
}

/// Read `user.json`.
///
/// # Errors
///
/// `InvalidUserProfile` if the file is missing, `MalformedCredentials` if it
/// lacks `id_str` or `screen_name`.
pub fn load_user_profile(base_dir: &Path) -> Result<UserProfile> {
    let path = base_dir.join(USER_FILE);
    load_json(&path, "user profile").map_err(|e| match e {
        XpandError::InvalidCredentials { path, .. } => XpandError::InvalidUserProfile { path },
        other => other,
    })
}

/// Read `user.json`, or call `fetch` for the profile and cache it.
///
/// The fetched value is written verbatim so later runs see every field,
/// except that an embedded `status` is replaced by the tweet returned from
/// `fetch_status` (extended text, trimmed user). A status that no longer
/// exists is kept as the profile returned it.
///
/// # Errors
///
/// Fetch failures, a fetched profile without `id_str`/`screen_name`, and
/// write failures.
pub fn ensure_user_profile(
    base_dir: &Path,
    fetch: impl FnOnce() -> Result<Value>,
    fetch_status: impl FnOnce(u64) -> Result<Value>,
) -> Result<UserProfile> {
    match load_user_profile(base_dir) {
        Err(XpandError::InvalidUserProfile { path }) => {
            info!("Fetching profile of the authenticated user");
            let mut raw = fetch()?;
            let profile: UserProfile = serde_json::from_value(raw.clone())
                .map_err(|e| XpandError::malformed("user profile", &path, e.to_string()))?;
            expand_status(&mut raw, fetch_status)?;
            write_json(&path, &raw)?;
            Ok(profile)
        }
        other => other,
    }
}

fn expand_status(
    profile: &mut Value,
    fetch_status: impl FnOnce(u64) -> Result<Value>,
) -> Result<()> {
    let Some(id) = profile
        .pointer("/status/id_str")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
    else {
        return Ok(());
    };
    debug!(id, "Fetching profile status in extended mode");
    match fetch_status(id) {
        Ok(status) => {
            profile["status"] = status;
            Ok(())
        }
        Err(XpandError::Fetch(FetchError::NotFound)) => {
            debug!(id, "Profile status not found, keeping it as returned");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
