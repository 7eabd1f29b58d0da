//!
//! src/apply.rs  Andrew Belles  Oct 19th, 2026
//!
//! Takes resolutions and writes them onto library tracks: the per-track
//! rules (skip unlinked, skip already processed unless forced, optionally
//! overwrite year) and the batch loop over a library query
//!

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ApplyConfig;
use crate::errors::RecordingDateError;
use crate::persistent::{Persistent, RecordingFields, Track};
use crate::resolver::{DateResolver, MetadataClient};
use crate::types::{RecordingId, ResolutionResult};

/// What happened to one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    NoRecordingId,
    AlreadyProcessed,
    NotFound,
    Applied(ResolutionResult)
}

/// Per-run tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
    pub cancelled: bool
}

impl ApplySummary {
    fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied(_) => self.applied += 1,
            ApplyOutcome::NotFound => self.not_found += 1,
            ApplyOutcome::NoRecordingId | ApplyOutcome::AlreadyProcessed => self.skipped += 1
        }
    }
}

/// Maps a resolution onto the four recording_* fields
pub fn recording_fields(result: &ResolutionResult) -> RecordingFields {
    RecordingFields {
        recording_year: result.oldest.year,
        recording_month: result.oldest.month,
        recording_day: result.oldest.day,
        recording_disambiguation: result.relation_type.clone()
    }
}

pub struct Applier<'a, C> {
    resolver: &'a DateResolver<C>,
    db: &'a Persistent,
    cfg: ApplyConfig
}

impl<'a, C: MetadataClient> Applier<'a, C> {
    pub fn new(resolver: &'a DateResolver<C>, db: &'a Persistent, cfg: ApplyConfig) -> Self {
        Self { resolver, db, cfg }
    }

    pub async fn process_track(&self, track: &Track) ->
        Result<ApplyOutcome, RecordingDateError> {
        let Some(mbid) = track.mb_trackid.as_deref() else {
            info!(track = %track.id, title = %track.title, "apply.skip.no_mbid");
            return Ok(ApplyOutcome::NoRecordingId);
        };

        if track.has_recording_year() && !self.cfg.force {
            info!(track = %track.id, title = %track.title, "apply.skip.processed");
            return Ok(ApplyOutcome::AlreadyProcessed);
        }

        let result = self.resolver
            .get_first_recording_year(&RecordingId::new(mbid))
            .await?;

        let Some(year) = result.oldest.year else {
            info!(track = %track.id, mbid = %mbid, "apply.not_found");
            return Ok(ApplyOutcome::NotFound);
        };

        self.db.store_recording_fields(&track.id, &recording_fields(&result)).await?;
        if self.cfg.write_over {
            self.db.set_year(&track.id, year).await?;
            info!(track = %track.id, year = year, "apply.year.overwritten");
        }

        info!(
            track = %track.id,
            mbid = %mbid,
            date = %result.oldest,
            relation = ?result.relation_type,
            "apply.done"
        );
        Ok(ApplyOutcome::Applied(result))
    }

    /// Processes every track matching `query` in library order. A failing
    /// track is logged and counted; the loop stops between tracks once
    /// `shutdown` is cancelled.
    pub async fn run(&self, query: Option<&str>, shutdown: &CancellationToken) ->
        Result<ApplySummary, RecordingDateError> {
        let tracks = self.db.query_tracks(query).await?;
        info!(tracks = tracks.len(), query = ?query, "apply.start");

        let mut summary = ApplySummary::default();
        for track in &tracks {
            if shutdown.is_cancelled() {
                warn!(remaining = tracks.len() - summary_total(&summary), "apply.cancelled");
                summary.cancelled = true;
                break;
            }
            match self.process_track(track).await {
                Ok(outcome) => {
                    debug!(track = %track.id, outcome = ?outcome, "apply.track");
                    summary.record(&outcome);
                }
                Err(e) => {
                    error!(track = %track.id, error = %e, transient = e.is_transient(),
                        "apply.failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            not_found = summary.not_found,
            failed = summary.failed,
            "apply.exit"
        );
        Ok(summary)
    }
}

fn summary_total(s: &ApplySummary) -> usize {
    s.applied + s.skipped + s.not_found + s.failed
}
