//! Process-wide table of analysis progress, keyed by submission id.
//!
//! Each record has exactly one writer: the [`ProgressWriter`] handed out by
//! [`ProgressStore::create`], which is not `Clone` and is moved into the
//! analysis worker. Pollers only ever get cloned snapshots, so a reader can see
//! a half-finished record (say `hash_progress` at 100 without `results.hash`)
//! but never a torn one. Nothing here is persisted; a restart loses all state.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use common::{
    data::{
        FrameAnalysisResult, HashResult, MetadataResult, Phase, PreviewFrame, ProgressRecord,
        Status,
    },
    payloads::ResultsResponse,
};
use dashmap::DashMap;
use log::{info, warn};

pub type SubmissionId = String;

/// A fresh collision-resistant id (UUIDv7: millisecond timestamp plus random bits).
pub fn new_submission_id() -> SubmissionId {
    uuidv7::create()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Default)]
pub struct ProgressStore {
    records: DashMap<SubmissionId, ProgressRecord>,
}

impl ProgressStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a running record for `id` and returns its only writer.
    pub fn create(self: &Arc<Self>, id: SubmissionId) -> ProgressWriter {
        self.records.insert(id.clone(), ProgressRecord::new(now()));
        ProgressWriter {
            store: Arc::clone(self),
            id,
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<ProgressRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// The results map once the analysis is complete, `not_ready` before that.
    pub fn results(&self, id: &str) -> Option<ResultsResponse> {
        self.records.get(id).map(|r| match r.status {
            Status::Complete => ResultsResponse::Ready(r.results.clone()),
            _ => ResultsResponse::not_ready(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Drops terminal records created more than `max_age` ago. Running
    /// records are kept regardless of age.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let cutoff = now().saturating_sub(max_age.as_secs());
        let before = self.records.len();
        self.records
            .retain(|_, r| !r.is_terminal() || r.created_at >= cutoff);
        before - self.records.len()
    }
}

/// Periodically evicts finished records. Only started when a retention
/// window is configured.
pub fn spawn_sweeper(store: Arc<ProgressStore>, max_age: Duration) {
    actix_web::rt::spawn(async move {
        let period = max_age.clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            let evicted = store.evict_older_than(max_age);
            if evicted > 0 {
                info!(
                    "evicted {evicted} finished analyses older than {}s, {} left",
                    max_age.as_secs(),
                    store.len()
                );
            }
        }
    });
}

/// Write side of a single [`ProgressRecord`].
///
/// Every mutation is a no-op once the record is terminal. Progress values only
/// move forward.
pub struct ProgressWriter {
    store: Arc<ProgressStore>,
    id: SubmissionId,
}

impl ProgressWriter {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn update(&mut self, f: impl FnOnce(&mut ProgressRecord)) {
        if let Some(mut record) = self.store.records.get_mut(&self.id) {
            if !record.is_terminal() {
                f(record.value_mut());
            }
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.update(|r| r.status = Status::Running { phase });
    }

    pub fn set_hash_progress(&mut self, percent: f64) {
        self.update(|r| r.hash_progress = r.hash_progress.max(percent.clamp(0.0, 100.0)));
    }

    pub fn set_frame_progress(&mut self, percent: f64) {
        self.update(|r| r.frame_progress = r.frame_progress.max(percent.clamp(0.0, 100.0)));
    }

    pub fn finish_metadata(&mut self, metadata: MetadataResult) {
        self.update(|r| {
            r.results.metadata = Some(metadata);
            r.metadata_done = true;
        });
    }

    pub fn finish_hash(&mut self, hash: HashResult) {
        self.update(|r| {
            r.hash_progress = 100.0;
            r.results.hash = Some(hash);
        });
    }

    pub fn finish_frames(&mut self, frames: FrameAnalysisResult) {
        self.update(|r| {
            r.frame_progress = 100.0;
            r.results.frames = Some(frames);
        });
    }

    pub fn finish_preview(&mut self, preview: Option<PreviewFrame>) {
        self.update(|r| r.results.preview_frame = preview);
    }

    pub fn complete(&mut self) {
        self.update(|r| r.status = Status::Complete);
    }

    /// Stops the record with an error. Results written so far are kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.update(|r| r.status = Status::Error { message });
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        let running = self
            .store
            .records
            .get(&self.id)
            .is_some_and(|r| !r.is_terminal());
        if running {
            warn!("analysis {} ended without a terminal status", self.id);
            self.fail("analysis worker stopped unexpectedly");
        }
    }
}
