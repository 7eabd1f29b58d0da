//!
//! src/types.rs  Andrew Belles  Oct 19th, 2026
//!
//! Domain types for one resolution: recordings, the relation edges between
//! them and the dated releases they appear on
//!

use serde::{Deserialize, Serialize};

use crate::date::PartialDate;

/// MusicBrainz recording MBID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingId(pub String);

impl RecordingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordingId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward
}

impl Direction {
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "forward"  => Some(Direction::Forward),
            "backward" => Some(Direction::Backward),
            _ => None
        }
    }
}

/// Typed link from one recording to another ("remaster", "edit", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: RecordingId,
    pub target: RecordingId,
    pub relation_type: String,
    pub direction: Option<Direction>,
    pub source_artist: Option<String>,
    pub target_artist: Option<String>
}

impl RelationEdge {
    /// Backward edges are the inverse view of a forward edge
    pub fn is_backward(&self) -> bool {
        self.direction == Some(Direction::Backward)
    }

    /// Both credits known and different
    pub fn artist_mismatch(&self) -> bool {
        match (self.source_artist.as_deref(), self.target_artist.as_deref()) {
            (Some(source), Some(target)) => source != target,
            _ => false
        }
    }
}

/// One release of a recording; `date` is the raw date string if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub date: Option<String>
}

impl Release {
    pub fn dated(date: &str) -> Self {
        Self { date: Some(date.to_string()) }
    }

    pub fn undated() -> Self {
        Self { date: None }
    }
}

/// A recording node as returned by the metadata service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    pub artist: Option<String>,
    pub relations: Vec<RelationEdge>,
    pub releases: Vec<Release>
}

/// Oldest date found plus the relation type carried with it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub oldest: PartialDate,
    pub relation_type: Option<String>
}

impl ResolutionResult {
    /// An unset year means no dated release was reachable
    pub fn is_found(&self) -> bool {
        !self.oldest.is_unknown()
    }
}
