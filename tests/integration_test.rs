//! Integration tests for xpand.
//!
//! These tests drive the library end to end against a temporary archive:
//! - Archive parsing and account verification
//! - Reconciliation runs with a scripted fetcher
//! - Resuming, idempotence, and forced refreshes on disk

use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use xpand::{
    ArchiveParser, EngineConfig, FetchError, Reconciler, TweetCache, TweetFetcher, TweetState,
    XpandError,
};

const OWNER: &str = "4242";

/// In-memory API: serves `tweets`, replays `failures` first, records calls.
#[derive(Default)]
struct ScriptedApi {
    tweets: HashMap<u64, Value>,
    failures: RefCell<VecDeque<FetchError>>,
    calls: RefCell<Vec<Vec<u64>>>,
}

impl ScriptedApi {
    fn serving(ids: &[u64]) -> Self {
        let tweets = ids
            .iter()
            .map(|&id| {
                let tweet = json!({
                    "id": id,
                    "id_str": id.to_string(),
                    "full_text": format!("full text of {id}"),
                    "user": {"id": 4242, "id_str": OWNER, "screen_name": "me"},
                });
                (id, tweet)
            })
            .collect();
        Self {
            tweets,
            ..Self::default()
        }
    }

    fn fail_next(&self, err: FetchError) {
        self.failures.borrow_mut().push_back(err);
    }

    fn calls(&self) -> Vec<Vec<u64>> {
        self.calls.borrow().clone()
    }
}

impl TweetFetcher for ScriptedApi {
    fn fetch_one(&self, id: u64) -> Result<Value, FetchError> {
        self.calls.borrow_mut().push(vec![id]);
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        self.tweets.get(&id).cloned().ok_or(FetchError::NotFound)
    }

    fn fetch_batch(&self, ids: &[u64]) -> Result<HashMap<u64, Value>, FetchError> {
        self.calls.borrow_mut().push(ids.to_vec());
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.tweets.get(id).map(|t| (*id, t.clone())))
            .collect())
    }
}

/// Create an archive with the given tweet ids and account id.
fn create_test_archive(ids: &[u64], account_id: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();

    let entries: Vec<Value> = ids
        .iter()
        .map(|id| json!({"tweet": {"id_str": id.to_string(), "full_text": "truncated…"}}))
        .collect();
    std::fs::write(
        data_dir.join("tweets.js"),
        format!("window.YTD.tweets.part0 = {}", Value::Array(entries)),
    )
    .unwrap();
    std::fs::write(
        data_dir.join("account.js"),
        format!(
            r#"window.YTD.account.part0 = [{{"account": {{"accountId": "{account_id}", "username": "me"}}}}]"#
        ),
    )
    .unwrap();

    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        batch_size: 100,
        cooldown: Duration::ZERO,
    }
}

fn engine_for<'a>(base: &Path, api: &'a ScriptedApi) -> Reconciler<&'a ScriptedApi> {
    let parser = ArchiveParser::open(base).unwrap();
    let account = parser.verified_account(OWNER).unwrap();
    let records = parser.parse_tweets(&account.account_id).unwrap();
    let mut engine = Reconciler::new(api, TweetCache::new(base), OWNER, fast_config());
    engine.load_tweets(records).unwrap();
    engine
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_full_run_fetches_and_fills_gaps_with_skeletons() {
    let (_tmp, base) = create_test_archive(&[101, 203, 102], OWNER);
    let api = ScriptedApi::serving(&[101, 102]);

    let mut engine = engine_for(&base, &api);
    let summary = engine.process_tweets(false, None).unwrap();

    assert_eq!(api.calls(), vec![vec![101, 102, 203]]);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.skeletons, 1);
    assert_eq!(summary.remaining, 0);
    assert!(engine.pending().is_empty());

    for record in engine.processed().values() {
        let contents = record.contents.as_ref().unwrap();
        assert!(contents["user"].is_object(), "{} has no user", record.id);
    }
    assert_eq!(engine.processed()[&203].state, TweetState::Skeleton);

    let skeleton = read_json(&base.join("expanded/203/203.json"));
    assert_eq!(skeleton["user"], json!({"id": 4242, "id_str": OWNER}));
    assert_eq!(skeleton["full_text"], "truncated…");

    let fetched = read_json(&base.join("expanded/101/101.json"));
    assert_eq!(fetched["full_text"], "full text of 101");
}

#[test]
fn test_second_run_changes_nothing() {
    let (_tmp, base) = create_test_archive(&[1_000_001, 1_000_002], OWNER);
    let api = ScriptedApi::serving(&[1_000_001]);
    engine_for(&base, &api).process_tweets(false, None).unwrap();

    let path = base.join("expanded/1000/1000002.json");
    let before = std::fs::read(&path).unwrap();
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    let second_api = ScriptedApi::serving(&[1_000_001, 1_000_002]);
    let mut engine = engine_for(&base, &second_api);
    assert!(engine.pending().is_empty());
    let summary = engine.process_tweets(false, None).unwrap();

    assert_eq!(summary.saved, 0);
    assert!(second_api.calls().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    assert_eq!(engine.processed()[&1_000_002].state, TweetState::Cached);
}

#[test]
fn test_interrupted_run_resumes() {
    let ids: Vec<u64> = (1..=5).collect();
    let (_tmp, base) = create_test_archive(&ids, OWNER);
    let api = ScriptedApi::serving(&ids);

    let mut first = engine_for(&base, &api);
    let summary = first.process_tweets(false, Some(2)).unwrap();
    assert_eq!(summary.remaining, 3);

    let mut second = engine_for(&base, &api);
    assert_eq!(second.pending().len(), 3);
    second.process_tweets(false, None).unwrap();

    assert_eq!(api.calls(), vec![vec![1, 2], vec![3, 4, 5]]);
    assert_eq!(TweetCache::new(&base).cached_ids().unwrap(), ids);
}

#[test]
fn test_rate_limit_waits_once_without_duplicates() {
    let (_tmp, base) = create_test_archive(&[7, 8], OWNER);
    let api = ScriptedApi::serving(&[7, 8]);
    api.fail_next(FetchError::RateLimited);

    let summary = engine_for(&base, &api).process_tweets(false, None).unwrap();

    assert_eq!(summary.cooldowns, 1);
    assert_eq!(api.calls(), vec![vec![7, 8], vec![7, 8]]);
    assert_eq!(summary.saved, 2);
}

#[test]
fn test_account_mismatch_writes_nothing() {
    let (_tmp, base) = create_test_archive(&[1, 2], "999");
    let parser = ArchiveParser::open(&base).unwrap();

    let err = parser.verified_account(OWNER).unwrap_err();

    assert!(matches!(err, XpandError::InvalidArchiveFile { .. }));
    assert!(!base.join("expanded").exists());
}

#[test]
fn test_forced_refresh_overwrites_cached_tweet() {
    let (_tmp, base) = create_test_archive(&[55], OWNER);
    let api = ScriptedApi::default();
    engine_for(&base, &api).process_tweets(false, None).unwrap();
    let path = base.join("expanded/55/55.json");
    assert!(read_json(&path).get("full_text").is_some());
    assert_eq!(read_json(&path)["full_text"], "truncated…");

    let restored = ScriptedApi::serving(&[55]);
    let mut engine = engine_for(&base, &restored);

    let unchanged = engine.refresh_one(55, false).unwrap().unwrap();
    assert_eq!(unchanged.state, TweetState::Cached);
    assert!(restored.calls().is_empty());

    let refreshed = engine.refresh_one(55, true).unwrap().unwrap();
    assert_eq!(refreshed.state, TweetState::Fetched);
    assert_eq!(read_json(&path)["full_text"], "full text of 55");
}

#[test]
fn test_non_recoverable_error_keeps_saved_batches() {
    let ids: Vec<u64> = (10..14).collect();
    let (_tmp, base) = create_test_archive(&ids, OWNER);
    let api = ScriptedApi::serving(&ids);

    let mut engine = Reconciler::new(
        &api,
        TweetCache::new(&base),
        OWNER,
        EngineConfig {
            batch_size: 2,
            cooldown: Duration::ZERO,
        },
    );
    let parser = ArchiveParser::open(&base).unwrap();
    engine.load_tweets(parser.parse_tweets(OWNER).unwrap()).unwrap();
    engine.process_tweets(false, Some(2)).unwrap();

    api.fail_next(FetchError::Api {
        status: 500,
        body: "internal error".to_string(),
    });
    assert!(engine.process_tweets(false, None).is_err());

    assert_eq!(TweetCache::new(&base).cached_ids().unwrap(), vec![10, 11]);
    let pending: Vec<u64> = engine.pending().iter().map(|r| r.id).collect();
    assert_eq!(pending, vec![12, 13]);
}
