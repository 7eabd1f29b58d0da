//!
//! src/main.rs  Andrew Belles  Oct 19th, 2026
//!
//! Command line entry: resolve recording ids directly, run the resolver
//! over library tracks, or import a track (resolving it on the way in)
//!
//!

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use recording_date::apply::{Applier, ApplyOutcome};
use recording_date::config::{self, ApplyConfig};
use recording_date::fetch::MusicBrainzClient;
use recording_date::logging;
use recording_date::persistent::{NewTrack, Persistent};
use recording_date::{DateResolver, RecordingDateError, RecordingId};

#[derive(Parser, Debug)]
#[command(name = "recording-date", version,
    about = "Find the date of the first known recording of a track")]
struct Cli {
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the earliest recording date for MusicBrainz recording ids
    Resolve {
        #[arg(required = true)]
        mbids: Vec<String>
    },
    /// Retrieve the date of the first known recording of library tracks
    #[command(name = "recordingdate", visible_alias = "rdate")]
    Apply {
        /// Substring matched against title, artist and recording id
        query: Vec<String>,
        /// Redo tracks that already have a recording year
        #[arg(long)]
        force: bool,
        /// Also overwrite the plain year field
        #[arg(long)]
        write_over: bool
    },
    /// Add a track to the library, resolving it when auto is enabled
    Import {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        mbid: Option<String>,
        #[arg(long)]
        year: Option<i32>
    }
}

/// Command line flags can only switch force/write_over on
fn apply_overrides(base: ApplyConfig, force: bool, write_over: bool) -> ApplyConfig {
    ApplyConfig {
        force: base.force || force,
        write_over: base.write_over || write_over,
        ..base
    }
}

fn join_query(query: &[String]) -> Option<String> {
    let joined = query.join(" ");
    if joined.trim().is_empty() { None } else { Some(joined) }
}

#[tokio::main]
async fn main() -> Result<(), RecordingDateError> {
    let cli  = Cli::parse();
    let cfgs = config::load_config()?;
    let _logger = logging::init_logging(&cfgs.logging)?;

    info!(
        service="recording-date",
        version=%env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let musicbrainz = MusicBrainzClient::new(
        &cfgs.http,
        &cfgs.identity,
        &cfgs.musicbrainz
    )?;
    let resolver = DateResolver::new(musicbrainz, &cfgs.resolver);

    match cli.command {
        Command::Resolve { mbids } => {
            for mbid in mbids {
                let id = RecordingId::new(mbid);
                match resolver.get_first_recording_year(&id).await {
                    Ok(result) => println!(
                        "{id}\t{}\t{}",
                        result.oldest,
                        result.relation_type.as_deref().unwrap_or("-")
                    ),
                    Err(e) => {
                        error!(mbid = %id, error = %e, "resolve.failed");
                        println!("{id}\terror: {e}");
                    }
                }
            }
        }
        Command::Apply { query, force, write_over } => {
            let db = Persistent::init(&cfgs.persistence.db_url).await?;
            let cfg = apply_overrides(cfgs.apply, force, write_over);
            let applier = Applier::new(&resolver, &db, cfg);

            let shutdown = CancellationToken::new();
            let trigger = {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!(msg = "stopping after current track", "apply.signal");
                        shutdown.cancel();
                    }
                })
            };

            let query = join_query(&query);
            let summary = applier.run(query.as_deref(), &shutdown).await?;
            trigger.abort();

            println!(
                "applied {} / skipped {} / not found {} / failed {}",
                summary.applied, summary.skipped, summary.not_found, summary.failed
            );
        }
        Command::Import { title, artist, mbid, year } => {
            let db = Persistent::init(&cfgs.persistence.db_url).await?;
            let id = db.insert_track(&NewTrack { title, artist, mb_trackid: mbid, year }).await?;
            info!(track = %id, "import.done");

            if cfgs.apply.auto {
                let applier = Applier::new(&resolver, &db, cfgs.apply);
                let track = db.get_track(&id).await?
                    .ok_or_else(|| RecordingDateError::Db(format!("imported track {id} vanished")))?;
                match applier.process_track(&track).await? {
                    ApplyOutcome::Applied(result) => println!(
                        "{id}\t{}\t{}",
                        result.oldest,
                        result.relation_type.as_deref().unwrap_or("-")
                    ),
                    other => println!("{id}\t{other:?}")
                }
            } else {
                println!("{id}");
            }
        }
    }

    Ok(())
}
