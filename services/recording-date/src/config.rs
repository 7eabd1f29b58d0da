//!
//! src/config.rs  Andrew Belles  Oct 19th, 2026
//!
//! Builds every configuration struct the service needs from the process
//! environment (and .env). Values are handed to constructors explicitly;
//! nothing here is global.
//!

use url::Url;
use std::time;
use crate::RecordingDateError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 500;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Slowest accepted request rate: one lookup an hour
pub const MB_MIN_RPS: f32 = 1.0 / 3600.0;

pub const DEFAULT_RELATIONS: [&str; 3] = ["edit", "first track release", "remaster"];

/// Source of configuration values, usually the process environment
pub trait Lookup {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F: Fn(&str) -> Option<String>> Lookup for F {
    fn get(&self, key: &str) -> Option<String> { self(key) }
}

/// Unset and blank values count as missing
fn env_value(env: &impl Lookup, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_to_bool(env: &impl Lookup, key: &str, default: bool) -> bool {
    match env_value(env, key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on")  => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default
    }
}

fn env_to_float(env: &impl Lookup, key: &str, default: f32) -> f32 {
    env_value(env, key)
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(default)
}

/// Mirrors are allowed, so only the scheme is checked
fn ensure_http(url: &Url) -> Result<(), String> {
    match url.scheme() {
        "https" | "http" => Ok(()),
        other => Err(format!("URL must be http(s), got {other}: {url}"))
    }
}

fn ensure_host(url: &Url) -> Result<(), String> {
    match url.host_str() {
        Some(_) => Ok(()),
        None => Err(format!("URL missing host: {url}"))
    }
}

/// Configuration for identity expected by musicbrainz
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub mb_user_agent: String,
}

fn build_identity(env: &impl Lookup) -> IdentityConfig {
    let application = env_value(env, "APPLICATION")
        .unwrap_or_else(|| format!("recording-date/{}", env!("CARGO_PKG_VERSION")));
    let mb_user_agent = match env_value(env, "MUSIC_BRAINZ_HEADER") {
        Some(contact) => format!("{application} ( {contact} )"),
        None => application
    };
    IdentityConfig { mb_user_agent }
}

///
/// Configuration for musicbrainz api
///
#[derive(Debug, Clone)]
pub struct MusicBrainzConfig {
    pub base_url: Url,         // https://musicbrainz.org/ws/2/
    pub inc_recording: String, // releases+recording-rels+artist-credits
    pub max_rps: f32           // default 1.0
}

fn build_musicbrainz(env: &impl Lookup) -> Result<MusicBrainzConfig, RecordingDateError> {
    let base_url = env_value(env, "MB_BASE_URL")
        .unwrap_or_else(|| "https://musicbrainz.org/ws/2/".to_string());

    let mut base_url = Url::parse(&base_url)
        .map_err(|e| RecordingDateError::Config(
                format!("MB_BASE_URL invalid {e}")
        ))?;

    ensure_http(&base_url)
        .map_err(RecordingDateError::Config)?;
    ensure_host(&base_url)
        .map_err(RecordingDateError::Config)?;

    // ensure trailing slash so joins stay under /ws/2/
    if !base_url.path().ends_with('/') {
        let mut path = base_url.path().to_string();
        path.push('/');
        base_url.set_path(&path);
    }

    let inc_recording = env_value(env, "MB_INC_RECORDING")
        .unwrap_or_else(|| "releases+recording-rels+artist-credits".to_string());

    let max_rps = env_to_float(env, "MB_MAX_RPS", 1.0);
    if !max_rps.is_finite() || max_rps < MB_MIN_RPS {
        return Err(RecordingDateError::Config(
            format!("MB_MAX_RPS must be finite and at least {MB_MIN_RPS}, got {max_rps}")
        ));
    }

    Ok( MusicBrainzConfig { base_url, inc_recording, max_rps } )
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
            retryable_statuses: RETRYABLE_STATUSES.to_vec()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Which relations the resolver follows and whether revisiting a
/// recording on the current path is refused
///
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub relations: Vec<String>,
    pub cycle_guard: bool
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            relations: DEFAULT_RELATIONS.iter().map(|r| r.to_string()).collect(),
            cycle_guard: true
        }
    }
}

fn build_resolver(env: &impl Lookup) -> ResolverConfig {
    let defaults = ResolverConfig::default();
    let relations = match env_value(env, "RECORDING_DATE_RELATIONS") {
        Some(list) => list.split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        None => defaults.relations
    };
    let cycle_guard = env_to_bool(env, "RECORDING_DATE_CYCLE_GUARD", defaults.cycle_guard);
    ResolverConfig { relations, cycle_guard }
}

///
/// How resolved dates are written back onto library tracks
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyConfig {
    pub auto: bool,       // resolve on import
    pub force: bool,      // redo tracks that already carry a recording_year
    pub write_over: bool  // also overwrite the plain year field
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { auto: true, force: false, write_over: false }
    }
}

fn build_apply(env: &impl Lookup) -> ApplyConfig {
    let defaults = ApplyConfig::default();
    ApplyConfig {
        auto: env_to_bool(env, "RECORDING_DATE_AUTO", defaults.auto),
        force: env_to_bool(env, "RECORDING_DATE_FORCE", defaults.force),
        write_over: env_to_bool(env, "RECORDING_DATE_WRITE_OVER", defaults.write_over)
    }
}

///
/// Configuration for the sqlite track library
///
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub db_url: String
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { db_url: "sqlite:./data/library.db".to_string() }
    }
}

fn build_persistence(env: &impl Lookup) -> PersistenceConfig {
    match env_value(env, "RECORDING_DATE_DB") {
        Some(db_url) => PersistenceConfig { db_url },
        None => PersistenceConfig::default()
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,recording_date=debug,reqwest=warn,sqlx=warn".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true
        }
    }
}

fn build_logging(env: &impl Lookup) -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(format) = env_value(env, "RECORDING_DATE_LOG_FORMAT") {
        logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty
        };
    }
    if logging.format == LogFormat::Json {
        logging.with_ansi = false;
        logging.include_file_line = true;
    }
    logging
}

///
/// AppConfig which holds everything the resolver, client and applier need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub musicbrainz: MusicBrainzConfig,
    pub http: HttpConfig,
    pub resolver: ResolverConfig,
    pub apply: ApplyConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig
}

///
/// Return all configuration to caller at program start.
///
pub fn load_config() -> Result<AppConfig, RecordingDateError> {
    dotenvy::dotenv().ok();
    load_config_from(&|key: &str| std::env::var(key).ok())
}

pub fn load_config_from(env: &impl Lookup) -> Result<AppConfig, RecordingDateError> {
    let identity    = build_identity(env);
    let musicbrainz = build_musicbrainz(env)?;
    let http        = HttpConfig::default();
    let resolver    = build_resolver(env);
    let apply       = build_apply(env);
    let persistence = build_persistence(env);
    let logging     = build_logging(env);

    Ok( AppConfig {
        identity, musicbrainz, http, resolver, apply, persistence, logging
    } )
}
