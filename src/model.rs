//! Data models for archive expansion.
//!
//! These structures carry tweets from the archive's JS export through the
//! reconciliation engine and into the on-disk cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Where a record's contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TweetState {
    /// Raw archive data that still needs a remote lookup.
    Unprocessed,
    /// Loaded from an artifact already on disk.
    Cached,
    /// Archive entry already embedded owner info (older export formats).
    Embedded,
    /// Contents adopted from a remote lookup.
    Fetched,
    /// Remote lookup had nothing; contents were synthesized.
    Skeleton,
}

impl TweetState {
    #[must_use]
    pub const fn is_processed(self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

impl std::fmt::Display for TweetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unprocessed => write!(f, "unprocessed"),
            Self::Cached => write!(f, "cached"),
            Self::Embedded => write!(f, "embedded"),
            Self::Fetched => write!(f, "fetched"),
            Self::Skeleton => write!(f, "skeleton"),
        }
    }
}

/// A single tweet as tracked by the engine.
///
/// Identity is the numeric id. Order with [`TweetRecord::cmp_by_id`].
#[derive(Debug, Clone)]
pub struct TweetRecord {
    pub id: u64,
    pub owner_user_id: String,
    pub state: TweetState,
    pub saved_location: Option<PathBuf>,
    pub contents: Option<Value>,
}

impl TweetRecord {
    /// Create an unprocessed record from archive data.
    #[must_use]
    pub fn new(id: u64, owner_user_id: impl Into<String>, contents: Option<Value>) -> Self {
        Self {
            id,
            owner_user_id: owner_user_id.into(),
            state: TweetState::Unprocessed,
            saved_location: None,
            contents,
        }
    }

    /// Ascending order by id.
    #[must_use]
    pub fn cmp_by_id(a: &Self, b: &Self) -> Ordering {
        a.id.cmp(&b.id)
    }

    #[must_use]
    pub fn id_str(&self) -> String {
        self.id.to_string()
    }

    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.state.is_processed()
    }

    /// True when contents are an object carrying a `user` object.
    #[must_use]
    pub fn has_owner(&self) -> bool {
        self.contents.as_ref().is_some_and(contents_have_owner)
    }

    /// Mark as loaded from the cache.
    pub fn mark_cached(&mut self, contents: Value, location: PathBuf) {
        self.contents = Some(contents);
        self.saved_location = Some(location);
        self.state = TweetState::Cached;
    }

    /// Adopt contents returned by a remote lookup.
    pub fn adopt_fetched(&mut self, contents: Value) {
        self.contents = Some(contents);
        self.state = TweetState::Fetched;
    }

    /// Make sure the record leaves the engine with contents and an owner.
    ///
    /// Missing contents become `{id, id_str}`. Contents without a `user`
    /// object get a minimal one built from `owner_id`.
    pub fn apply_skeleton(&mut self, owner_id: &str) {
        let id = self.id;
        let contents = self.contents.get_or_insert_with(|| skeleton_contents(id));
        if !contents.is_object() {
            *contents = skeleton_contents(id);
        }
        if !contents_have_owner(contents) {
            if let Some(obj) = contents.as_object_mut() {
                obj.insert("user".to_string(), owner_stub(owner_id));
            }
        }
        self.state = TweetState::Skeleton;
    }
}

/// Minimal placeholder for a tweet that could not be fetched.
#[must_use]
pub fn skeleton_contents(id: u64) -> Value {
    json!({ "id": id, "id_str": id.to_string() })
}

/// Minimal owner reference. Numeric ids are written as numbers like the API does.
#[must_use]
pub fn owner_stub(owner_id: &str) -> Value {
    let mut user = Map::new();
    let id = owner_id
        .parse::<u64>()
        .map_or_else(|_| Value::String(owner_id.to_string()), Value::from);
    user.insert("id".to_string(), id);
    user.insert("id_str".to_string(), Value::String(owner_id.to_string()));
    Value::Object(user)
}

#[must_use]
pub fn contents_have_owner(contents: &Value) -> bool {
    contents.get("user").is_some_and(Value::is_object)
}

/// Account information from `account.js`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveAccount {
    pub account_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// Application key pair, cached in `consumer.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

/// User-context access token, cached in `access.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub access_token_secret: String,
}

/// Authenticated user's profile, cached in `user.json`.
///
/// Only `id_str` and `screen_name` are required; everything else the API
/// returned is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id_str: String,
    pub screen_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of one engine run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches that received a response.
    pub batches: usize,
    /// Records whose contents came back from the API.
    pub fetched: usize,
    /// Records that fell back to a skeleton.
    pub skeletons: usize,
    /// Artifacts written to disk.
    pub saved: usize,
    /// Rate-limit cooldowns slept through.
    pub cooldowns: usize,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
    /// Records still pending after the run.
    pub remaining: usize,
}

impl RunSummary {
    /// Records that moved from pending to processed.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.fetched + self.skeletons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_by_id_sorts_ascending() {
        let mut records = vec![
            TweetRecord::new(203, "7", None),
            TweetRecord::new(101, "7", None),
            TweetRecord::new(102, "7", None),
        ];
        records.sort_by(TweetRecord::cmp_by_id);
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![101, 102, 203]);
    }

    #[test]
    fn skeleton_for_empty_record() {
        let mut record = TweetRecord::new(203, "42", None);
        record.apply_skeleton("42");
        assert_eq!(
            record.contents.unwrap(),
            json!({"id": 203, "id_str": "203", "user": {"id": 42, "id_str": "42"}})
        );
        assert_eq!(record.state, TweetState::Skeleton);
    }

    #[test]
    fn skeleton_keeps_existing_contents() {
        let mut record = TweetRecord::new(5, "42", Some(json!({"id_str": "5", "full_text": "hi"})));
        record.apply_skeleton("42");
        let contents = record.contents.unwrap();
        assert_eq!(contents["full_text"], "hi");
        assert_eq!(contents["user"]["id_str"], "42");
    }

    #[test]
    fn skeleton_does_not_replace_existing_owner() {
        let mut record = TweetRecord::new(5, "42", Some(json!({"user": {"id_str": "9"}})));
        record.apply_skeleton("42");
        assert_eq!(record.contents.unwrap()["user"]["id_str"], "9");
    }

    #[test]
    fn owner_stub_keeps_non_numeric_ids_as_strings() {
        assert_eq!(owner_stub("abc"), json!({"id": "abc", "id_str": "abc"}));
    }

    #[test]
    fn has_owner_requires_object() {
        assert!(!TweetRecord::new(1, "1", Some(json!({"user": "x"}))).has_owner());
        assert!(TweetRecord::new(1, "1", Some(json!({"user": {}}))).has_owner());
        assert!(!TweetRecord::new(1, "1", None).has_owner());
    }

    #[test]
    fn user_profile_keeps_extra_fields() {
        let profile: UserProfile = serde_json::from_value(
            json!({"id_str": "42", "screen_name": "me", "followers_count": 3}),
        )
        .unwrap();
        assert_eq!(profile.extra["followers_count"], 3);
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["screen_name"], "me");
        assert_eq!(back["followers_count"], 3);
    }
}
