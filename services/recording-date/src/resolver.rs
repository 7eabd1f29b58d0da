//!
//! src/resolver.rs  Andrew Belles  Oct 19th, 2026
//!
//! Walks the recording relation graph backwards from one recording and
//! reduces every reachable release date to the oldest one
//!

use std::{collections::HashSet, future::Future, pin::Pin};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::date::PartialDate;
use crate::errors::RecordingDateError;
use crate::types::{Recording, RecordingId, ResolutionResult};

/// Source of recording nodes. `NotFound` for unknown ids, `Http` or
/// `RateLimited` for transient failures; retries are the implementor's job.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch_recording(&self, id: &RecordingId) ->
        Result<Recording, RecordingDateError>;
}

type Running = (PartialDate, Option<String>);
type Step<'a> = Pin<Box<dyn Future<Output = Result<Running, RecordingDateError>> + Send + 'a>>;

pub struct DateResolver<C> {
    client: C,
    relations: HashSet<String>,
    cycle_guard: bool
}

impl<C: MetadataClient> DateResolver<C> {
    pub fn new(client: C, cfg: &ResolverConfig) -> Self {
        Self {
            client,
            relations: cfg.relations.iter().cloned().collect(),
            cycle_guard: cfg.cycle_guard
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Oldest known release date of `id` or of any recording it was
    /// derived from, with the relation type that led there.
    pub async fn get_first_recording_year(&self, id: &RecordingId) ->
        Result<ResolutionResult, RecordingDateError> {
        debug!(mbid = %id, "resolve.start");

        let mut path = HashSet::new();
        if self.cycle_guard {
            path.insert(id.clone());
        }

        let (oldest, relation_type) = self.resolve_oldest(
            id,
            PartialDate::default(),
            None,
            &mut path
        ).await?;

        debug!(mbid = %id, oldest = %oldest, relation = ?relation_type, "resolve.done");
        Ok( ResolutionResult { oldest, relation_type } )
    }

    /// Relations are followed first, in service order, each recursive call
    /// handing back the new running pair. This recording's own releases
    /// are folded in afterwards and never change the relation type.
    fn resolve_oldest<'a>(
        &'a self,
        id: &'a RecordingId,
        mut oldest: PartialDate,
        mut relation_type: Option<String>,
        path: &'a mut HashSet<RecordingId>
    ) -> Step<'a> {
        Box::pin(async move {
            let recording = self.client.fetch_recording(id).await?;
            debug!(
                mbid = %id,
                relations = recording.relations.len(),
                releases = recording.releases.len(),
                "resolve.fetch"
            );

            for edge in &recording.relations {
                if edge.is_backward() {
                    continue;
                }
                if !self.relations.contains(&edge.relation_type) {
                    continue;
                }
                if edge.artist_mismatch() {
                    info!(
                        mbid = %id,
                        target = %edge.target,
                        artist = edge.target_artist.as_deref().unwrap_or_default(),
                        expected = edge.source_artist.as_deref().unwrap_or_default(),
                        "resolve.skip.artist"
                    );
                    continue;
                }
                if self.cycle_guard && !path.insert(edge.target.clone()) {
                    warn!(
                        mbid = %id,
                        target = %edge.target,
                        relation = %edge.relation_type,
                        "resolve.cycle"
                    );
                    continue;
                }

                let step = self.resolve_oldest(
                    &edge.target,
                    oldest,
                    Some(edge.relation_type.clone()),
                    path
                ).await;

                if self.cycle_guard {
                    path.remove(&edge.target);
                }
                (oldest, relation_type) = step?;
            }

            for release in &recording.releases {
                let Some(date_str) = release.date.as_deref() else {
                    continue;
                };
                let release_date = PartialDate::parse(date_str);
                if release_date.is_unknown() {
                    continue;
                }
                oldest = oldest.older(release_date);
            }

            Ok( (oldest, relation_type) )
        })
    }
}
