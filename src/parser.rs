//! X archive data parser.
//!
//! Handles the JavaScript-wrapped JSON format used in X data exports.
//! Files are formatted as: `window.YTD.<datatype>.part0 = [...]`. Everything
//! before the first opening delimiter is skipped, the rest is parsed as JSON.

use crate::error::{Result, XpandError};
use crate::model::{ArchiveAccount, TweetRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Accepted tweet-list filenames, newest export format first.
pub const TWEET_FILES: &[&str] = &["tweets.js", "tweet.js"];

/// Account-list filename.
pub const ACCOUNT_FILE: &str = "account.js";

/// Advance `reader` up to, but not including, the first occurrence of `target`.
///
/// Returns the number of bytes skipped and whether the target was found. On a
/// miss the reader is left at EOF. Only single-byte targets are supported.
///
/// # Errors
///
/// Returns `InvalidArgument` for multi-byte targets and IO errors from the
/// underlying reader.
pub fn skip_until_byte<R: BufRead>(reader: &mut R, target: &[u8]) -> Result<(usize, bool)> {
    let [needle] = target else {
        return Err(XpandError::invalid_argument(
            "only single-byte delimiters are supported",
        ));
    };

    let mut offset = 0;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok((offset, false));
        }
        if let Some(pos) = memchr::memchr(*needle, buf) {
            reader.consume(pos);
            return Ok((offset + pos, true));
        }
        let len = buf.len();
        reader.consume(len);
        offset += len;
    }
}

/// Open `path` and parse the JSON value that starts at `delimiter`.
fn read_js_value(path: &Path, delimiter: u8) -> Result<Value> {
    let file = File::open(path).map_err(|e| XpandError::path_error("open", path, e))?;
    let mut reader = BufReader::new(file);

    let (skipped, found) = skip_until_byte(&mut reader, &[delimiter])
        .map_err(|e| XpandError::invalid_archive_file(path, e.to_string()))?;
    if !found {
        return Err(XpandError::invalid_archive_file(
            path,
            format!("no '{}' found after {skipped} bytes", char::from(delimiter)),
        ));
    }
    debug!(path = %path.display(), skipped, "Skipped JS assignment prefix");

    serde_json::from_reader(reader)
        .map_err(|e| XpandError::invalid_archive_file(path, format!("invalid JSON: {e}")))
}

/// Parse a JS file whose assigned value is a list.
///
/// # Errors
///
/// Returns `InvalidArchiveFile` if the file does not hold a JSON list.
pub fn parse_js_list(path: &Path) -> Result<Vec<Value>> {
    match read_js_value(path, b'[')? {
        Value::Array(items) => Ok(items),
        _ => Err(XpandError::invalid_archive_file(
            path,
            "does not contain a list of objects",
        )),
    }
}

/// Parser for X archive data
pub struct ArchiveParser {
    archive_path: PathBuf,
}

impl ArchiveParser {
    pub fn new(archive_path: impl AsRef<Path>) -> Self {
        Self {
            archive_path: archive_path.as_ref().to_path_buf(),
        }
    }

    /// Like [`ArchiveParser::new`], but the directory must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotADirectory` if `archive_path` is not a directory.
    pub fn open(archive_path: impl AsRef<Path>) -> Result<Self> {
        let path = archive_path.as_ref();
        if !path.is_dir() {
            return Err(XpandError::not_a_directory(path));
        }
        Ok(Self::new(path))
    }

    fn data_path(&self) -> PathBuf {
        self.archive_path.join("data")
    }

    /// Locate the tweet-list file, preferring `tweets.js` over legacy `tweet.js`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArchiveFile` when none of the accepted names exist.
    pub fn tweets_file(&self) -> Result<PathBuf> {
        let data = self.data_path();
        TWEET_FILES
            .iter()
            .map(|name| data.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                XpandError::invalid_archive_file(
                    data.join(TWEET_FILES[0]),
                    format!("no tweet data file found (tried {})", TWEET_FILES.join(", ")),
                )
            })
    }

    /// Parse account info from account.js.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArchiveFile` unless the file holds exactly one account
    /// with an `accountId`.
    pub fn parse_account(&self) -> Result<ArchiveAccount> {
        let path = self.data_path().join(ACCOUNT_FILE);
        info!("Parsing {ACCOUNT_FILE}...");
        let items = parse_js_list(&path)?;

        let [item] = items.as_slice() else {
            return Err(XpandError::invalid_archive_file(
                &path,
                format!("expected exactly 1 account, found {}", items.len()),
            ));
        };

        let account = item.get("account").unwrap_or(item);
        let account_id = account
            .get("accountId")
            .and_then(Value::as_str)
            .ok_or_else(|| XpandError::invalid_archive_file(&path, "account has no accountId"))?;

        Ok(ArchiveAccount {
            account_id: account_id.to_string(),
            username: account
                .get("username")
                .and_then(Value::as_str)
                .map(String::from),
            display_name: account
                .get("accountDisplayName")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    /// Parse the account and check it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArchiveFile` if the account cannot be parsed or its
    /// id differs from `user_id`.
    pub fn verified_account(&self, user_id: &str) -> Result<ArchiveAccount> {
        let account = self.parse_account()?;
        if account.account_id != user_id {
            return Err(XpandError::invalid_archive_file(
                self.data_path().join(ACCOUNT_FILE),
                format!(
                    "archive belongs to account {} but the authenticated user is {user_id}",
                    account.account_id
                ),
            ));
        }
        debug!(account_id = %account.account_id, "Archive account matches authenticated user");
        Ok(account)
    }

    /// Parse every tweet in the tweet-list file into records, ascending by id.
    ///
    /// Entries may be wrapped (`{"tweet": {...}}`) or bare. The owner comes
    /// from an embedded `user.id_str` when present, else `default_owner`.
    /// Duplicate ids keep the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArchiveFile` for a missing file, a non-list value, or
    /// an entry without a numeric id.
    pub fn parse_tweets(&self, default_owner: &str) -> Result<Vec<TweetRecord>> {
        let path = self.tweets_file()?;
        info!("Parsing {}...", path.display());
        let items = parse_js_list(&path)?;

        let mut records: BTreeMap<u64, TweetRecord> = BTreeMap::new();
        for (index, item) in items.into_iter().enumerate() {
            let tweet = match item {
                Value::Object(mut obj) => match obj.remove("tweet") {
                    Some(inner @ Value::Object(_)) => inner,
                    Some(other) => {
                        obj.insert("tweet".to_string(), other);
                        Value::Object(obj)
                    }
                    None => Value::Object(obj),
                },
                _ => {
                    return Err(XpandError::invalid_archive_file(
                        &path,
                        format!("entry {index} is not an object"),
                    ));
                }
            };

            let id = tweet_id(&tweet).ok_or_else(|| {
                XpandError::invalid_archive_file(&path, format!("entry {index} has no valid id_str"))
            })?;
            let owner = tweet
                .get("user")
                .and_then(|u| u.get("id_str"))
                .and_then(Value::as_str)
                .unwrap_or(default_owner)
                .to_string();

            if records.contains_key(&id) {
                warn!(id, "Duplicate tweet id in archive, keeping first entry");
                continue;
            }
            records.insert(id, TweetRecord::new(id, owner, Some(tweet)));
        }

        info!("Parsed {} tweets", records.len());
        Ok(records.into_values().collect())
    }

    /// List all available data files in the archive
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be walked.
    pub fn list_data_files(&self) -> Result<Vec<String>> {
        let data_path = self.data_path();
        let mut files = Vec::new();

        for entry in WalkDir::new(&data_path).max_depth(1) {
            let entry = entry.map_err(|e| {
                XpandError::path_error("read", &data_path, std::io::Error::other(e))
            })?;
            if entry.file_type().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.ends_with(".js") {
                        files.push(name.to_string());
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// The authoritative id: `id_str`, falling back to `id` (string or number).
fn tweet_id(tweet: &Value) -> Option<u64> {
    if let Some(id) = tweet.get("id_str").and_then(Value::as_str) {
        return id.parse().ok();
    }
    match tweet.get("id")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
