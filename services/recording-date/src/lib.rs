//!
//! src/lib.rs  Andrew Belles  Oct 19th, 2026
//!
//! Resolves the earliest known recording date of a track by walking
//! MusicBrainz recording relations back to their oldest dated release,
//! and writes the result onto library tracks
//!

pub mod apply;
pub mod config;
pub mod date;
pub mod errors;
pub mod fetch;
pub mod logging;
pub mod persistent;
pub mod resolver;
pub mod types;

pub use date::PartialDate;
pub use errors::RecordingDateError;
pub use resolver::{DateResolver, MetadataClient};
pub use types::{RecordingId, ResolutionResult};
