//! Fetch/cache reconciliation.
//!
//! The engine splits archive tweets into processed (cached on disk, or
//! carrying owner info) and pending, then walks the pending set in
//! ascending-id batches through a [`TweetFetcher`], saving every result. Rate
//! limits are waited out with a fixed cooldown that a [`CancelToken`] can
//! interrupt. Whatever was saved stays saved, so re-running resumes where the
//! last run stopped.

use crate::cache::TweetCache;
use crate::cancel::CancelToken;
use crate::client::{MAX_BATCH_SIZE, TweetFetcher};
use crate::error::{FetchError, Result};
use crate::model::{RunSummary, TweetRecord, TweetState};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ids per lookup call.
pub const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_SIZE;

/// Wait after a rate-limit response before retrying the same batch.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Progress notifications for a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    BatchStarted {
        index: usize,
        total: usize,
        first_id: u64,
        last_id: u64,
        size: usize,
    },
    RateLimited {
        cooldown: Duration,
        resume_at: DateTime<Utc>,
    },
    BatchCompleted {
        index: usize,
        fetched: usize,
        skeletons: usize,
        saved: usize,
    },
    Cancelled,
}

/// Counts from [`Reconciler::load_tweets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub cached: usize,
    pub embedded: usize,
    pub pending: usize,
}

/// Decide where an archive record starts out.
///
/// A cached artifact wins. Otherwise archive contents that already carry a
/// `user` object count as processed; everything else is unprocessed.
///
/// # Errors
///
/// Returns an error if a cached artifact exists but cannot be read.
pub fn classify(cache: &TweetCache, mut record: TweetRecord) -> Result<TweetRecord> {
    if let Some(contents) = cache.load(record.id)? {
        record.mark_cached(contents, cache.path_for(record.id));
    } else if record.has_owner() {
        record.state = TweetState::Embedded;
    } else {
        record.state = TweetState::Unprocessed;
    }
    Ok(record)
}

type Observer = Box<dyn FnMut(&EngineEvent)>;

/// Owns the processed/pending partition for one run.
pub struct Reconciler<F> {
    fetcher: F,
    cache: TweetCache,
    owner_id: String,
    config: EngineConfig,
    cancel: CancelToken,
    processed: BTreeMap<u64, TweetRecord>,
    pending: Vec<TweetRecord>,
    observer: Option<Observer>,
}

impl<F: TweetFetcher> Reconciler<F> {
    /// `owner_id` is the authenticated account, used for skeleton owners.
    pub fn new(
        fetcher: F,
        cache: TweetCache,
        owner_id: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            owner_id: owner_id.into(),
            config,
            cancel: CancelToken::new(),
            processed: BTreeMap::new(),
            pending: Vec::new(),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(&EngineEvent) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn processed(&self) -> &BTreeMap<u64, TweetRecord> {
        &self.processed
    }

    #[must_use]
    pub fn pending(&self) -> &[TweetRecord] {
        &self.pending
    }

    #[must_use]
    pub const fn cache(&self) -> &TweetCache {
        &self.cache
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    /// Partition archive records into processed and pending.
    ///
    /// Pending ends up sorted ascending by id. Ids already known to the
    /// engine are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a cached artifact cannot be read.
    pub fn load_tweets(
        &mut self,
        records: impl IntoIterator<Item = TweetRecord>,
    ) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();
        for record in records {
            if self.processed.contains_key(&record.id) {
                continue;
            }
            let record = classify(&self.cache, record)?;
            match record.state {
                TweetState::Cached => summary.cached += 1,
                TweetState::Unprocessed => {
                    self.pending.push(record);
                    continue;
                }
                _ => summary.embedded += 1,
            }
            debug!(id = record.id, state = %record.state, "Already processed");
            self.processed.insert(record.id, record);
        }

        self.pending.sort_by(TweetRecord::cmp_by_id);
        self.pending.dedup_by_key(|r| r.id);
        summary.pending = self.pending.len();

        info!(
            cached = summary.cached,
            embedded = summary.embedded,
            pending = summary.pending,
            "Loaded tweets"
        );
        Ok(summary)
    }

    /// Fetch and save up to `max_to_process` pending records (all by default).
    ///
    /// Stops early, without error, when the cancel token fires. Pending is
    /// recomputed afterwards in every case, including on error.
    ///
    /// # Errors
    ///
    /// Cache write failures and fetch failures other than rate limiting.
    pub fn process_tweets(
        &mut self,
        force_overwrite: bool,
        max_to_process: Option<usize>,
    ) -> Result<RunSummary> {
        let limit = max_to_process.map_or(self.pending.len(), |max| max.min(self.pending.len()));
        let mut summary = RunSummary::default();

        let outcome = self.run_batches(limit, force_overwrite, &mut summary);

        let processed = &self.processed;
        self.pending.retain(|r| !processed.contains_key(&r.id));
        summary.remaining = self.pending.len();

        outcome?;
        info!(
            batches = summary.batches,
            fetched = summary.fetched,
            skeletons = summary.skeletons,
            saved = summary.saved,
            remaining = summary.remaining,
            cancelled = summary.cancelled,
            "Run finished"
        );
        Ok(summary)
    }

    fn run_batches(
        &mut self,
        limit: usize,
        force_overwrite: bool,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let batch_size = self.config.batch_size.clamp(1, MAX_BATCH_SIZE);
        let total = limit.div_ceil(batch_size);

        for (index, start) in (0..limit).step_by(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                self.emit(EngineEvent::Cancelled);
                break;
            }

            let end = (start + batch_size).min(limit);
            let ids: Vec<u64> = self.pending[start..end].iter().map(|r| r.id).collect();
            self.emit(EngineEvent::BatchStarted {
                index,
                total,
                first_id: ids[0],
                last_id: ids[ids.len() - 1],
                size: ids.len(),
            });

            let Some(result) =
                self.until_not_rate_limited(&mut summary.cooldowns, |f| f.fetch_batch(&ids))
            else {
                summary.cancelled = true;
                self.emit(EngineEvent::Cancelled);
                break;
            };
            let mut found = result?;
            if self.cancel.is_cancelled() {
                debug!(first_id = ids[0], "Cancelled while fetching, dropping batch");
                summary.cancelled = true;
                self.emit(EngineEvent::Cancelled);
                break;
            }
            summary.batches += 1;

            let (mut fetched, mut skeletons, mut saved) = (0, 0, 0);
            for pending in &self.pending[start..end] {
                let mut record = pending.clone();
                let guarded = self.is_save_guarded(&record, force_overwrite);
                if let Some(contents) = found.remove(&record.id) {
                    record.adopt_fetched(contents);
                    fetched += 1;
                } else {
                    debug!(id = record.id, "Not returned by lookup, using skeleton");
                    record.apply_skeleton(&self.owner_id);
                    skeletons += 1;
                }
                if !guarded {
                    record.saved_location = Some(self.cache.save(&record)?);
                    saved += 1;
                }
                self.processed.insert(record.id, record);
            }

            summary.fetched += fetched;
            summary.skeletons += skeletons;
            summary.saved += saved;
            info!(
                batch = index + 1,
                of = total,
                fetched,
                skipped = skeletons,
                "Batch complete"
            );
            self.emit(EngineEvent::BatchCompleted {
                index,
                fetched,
                skeletons,
                saved,
            });
        }
        Ok(())
    }

    /// Re-fetch a single tweet and save it.
    ///
    /// Already-processed tweets that are on disk are returned untouched
    /// unless `force_overwrite` is set. Ids not in the archive are accepted.
    /// Returns `None` if cancelled before the result could be saved.
    ///
    /// # Errors
    ///
    /// Cache write failures and fetch failures other than not-found or rate
    /// limiting.
    pub fn refresh_one(&mut self, id: u64, force_overwrite: bool) -> Result<Option<&TweetRecord>> {
        let known = self
            .processed
            .get(&id)
            .or_else(|| self.pending.iter().find(|r| r.id == id))
            .cloned();
        let mut record = match known {
            Some(record) => record,
            None => classify(&self.cache, TweetRecord::new(id, self.owner_id.clone(), None))?,
        };

        if self.is_save_guarded(&record, force_overwrite) {
            debug!(id, state = %record.state, "Already saved, not refreshing");
            self.processed.insert(id, record);
            return Ok(self.processed.get(&id));
        }

        let mut cooldowns = 0;
        let Some(result) = self.until_not_rate_limited(&mut cooldowns, |f| f.fetch_one(id)) else {
            self.emit(EngineEvent::Cancelled);
            return Ok(None);
        };
        if self.cancel.is_cancelled() {
            self.emit(EngineEvent::Cancelled);
            return Ok(None);
        }
        match result {
            Ok(contents) => record.adopt_fetched(contents),
            Err(FetchError::NotFound) => {
                debug!(id, "Tweet not found, using skeleton");
                record.apply_skeleton(&self.owner_id);
            }
            Err(e) => return Err(e.into()),
        }

        record.saved_location = Some(self.cache.save(&record)?);
        self.pending.retain(|r| r.id != id);
        self.processed.insert(id, record);
        Ok(self.processed.get(&id))
    }

    /// Previously processed records already on disk are left alone unless forced.
    fn is_save_guarded(&self, record: &TweetRecord, force_overwrite: bool) -> bool {
        !force_overwrite
            && record.is_processed()
            && record
                .saved_location
                .as_ref()
                .is_some_and(|_| self.cache.exists(record.id))
    }

    /// Call `fetch` until it returns something other than `RateLimited`,
    /// sleeping the fixed cooldown in between. `None` means cancelled.
    fn until_not_rate_limited<T>(
        &mut self,
        cooldowns: &mut usize,
        fetch: impl Fn(&F) -> std::result::Result<T, FetchError>,
    ) -> Option<std::result::Result<T, FetchError>> {
        loop {
            match fetch(&self.fetcher) {
                Err(FetchError::RateLimited) => {
                    *cooldowns += 1;
                    let cooldown = self.config.cooldown;
                    let resume_at = chrono::Duration::from_std(cooldown)
                        .ok()
                        .and_then(|d| Utc::now().checked_add_signed(d))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    warn!(
                        cooldown_secs = cooldown.as_secs(),
                        resume_at = %resume_at.format("%H:%M:%S"),
                        "Rate limited, waiting before retrying"
                    );
                    self.emit(EngineEvent::RateLimited {
                        cooldown,
                        resume_at,
                    });
                    if self.cancel.sleep(cooldown) {
                        return None;
                    }
                }
                other => return Some(other),
            }
        }
    }
}
