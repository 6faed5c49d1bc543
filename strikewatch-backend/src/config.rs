use std::env::var;
use std::time::Duration;

use chrono::NaiveTime;
use dotenvy::dotenv;

use crate::format::DisplayOptions;
use crate::query::QueryOptions;
use crate::render::RenderOptions;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP status server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// HTTP request timeout
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Database file path
    /// Env: DATABASE_PATH (default: "strikewatch.db")
    pub database_path: String,

    /// Discord API Token
    /// Env: DISCORD_TOKEN (checked at startup)
    pub discord_token: Option<String>,

    /// Prefix for text commands
    /// Env: DISCORD_COMMAND_PREFIX (default: "!")
    pub command_prefix: String,

    /// Per-attempt query timeout
    /// Env: QUERY_TIMEOUT_MS (default: 5000)
    pub query_timeout: Duration,

    /// How long a successful query result is reused, zero disables caching
    /// Env: CACHE_TTL_MS (default: 30000)
    pub cache_ttl: Duration,

    /// Extra attempts after a failed query
    /// Env: RETRY_COUNT (default: 1)
    pub retry_count: u32,

    /// Maximum players listed in reports
    /// Env: MAX_PLAYERS_SHOWN (default: 20)
    pub max_players_shown: usize,

    /// Env: SHOW_VAC (default: false)
    pub show_vac: bool,

    /// Env: SHOW_PASSWORD (default: false)
    pub show_password: bool,

    /// Reply with an image unless text is requested
    /// Env: GENERATE_IMAGE (default: false)
    pub generate_image: bool,

    /// Env: IMAGE_WIDTH (default: 800)
    pub image_width: u32,

    /// Env: IMAGE_MIN_HEIGHT (default: 300)
    pub image_min_height: u32,

    /// Base font size in pixels
    /// Env: FONT_SIZE (default: 20)
    pub font_size: u32,

    /// TrueType/OpenType font overriding the bundled DejaVu Sans
    /// Env: FONT_PATH (default: unset, bundled font)
    pub font_path: Option<String>,

    /// Initial saved server list, comma separated
    /// Env: SERVER_LIST (default: empty)
    pub server_list: Vec<String>,

    /// Deadline for every member of a batch query, zero disables it
    /// Env: BATCH_TIMEOUT_MS (default: 15000)
    pub batch_timeout: Duration,

    /// Env: SCHEDULE_ENABLED (default: false)
    pub schedule_enabled: bool,

    /// Env: SCHEDULE_INTERVAL_MIN (default: 30)
    pub schedule_interval_minutes: u64,

    /// Start of the daily broadcast window, local time
    /// Env: SCHEDULE_START (default: "08:00")
    pub schedule_start: NaiveTime,

    /// End of the daily broadcast window, local time
    /// Env: SCHEDULE_END (default: "23:00")
    pub schedule_end: NaiveTime,

    /// Initial broadcast channel IDs, comma separated
    /// Env: SCHEDULE_CHANNELS (default: empty)
    pub schedule_channels: Vec<u64>,

    /// Broadcast an image instead of a text table
    /// Env: SCHEDULE_IMAGE (default: true)
    pub schedule_image: bool,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            port: env_or_default("PORT", defaults.port),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            discord_token: var("DISCORD_TOKEN").ok(),
            command_prefix: env_or_default_string("DISCORD_COMMAND_PREFIX", &defaults.command_prefix),
            query_timeout: Duration::from_millis(env_or_default("QUERY_TIMEOUT_MS", 5000)),
            cache_ttl: Duration::from_millis(env_or_default("CACHE_TTL_MS", 30_000)),
            retry_count: env_or_default("RETRY_COUNT", defaults.retry_count),
            max_players_shown: env_or_default("MAX_PLAYERS_SHOWN", defaults.max_players_shown),
            show_vac: env_or_default("SHOW_VAC", defaults.show_vac),
            show_password: env_or_default("SHOW_PASSWORD", defaults.show_password),
            generate_image: env_or_default("GENERATE_IMAGE", defaults.generate_image),
            image_width: env_or_default("IMAGE_WIDTH", defaults.image_width),
            image_min_height: env_or_default("IMAGE_MIN_HEIGHT", defaults.image_min_height),
            font_size: env_or_default("FONT_SIZE", defaults.font_size),
            font_path: var("FONT_PATH").ok().filter(|path| !path.trim().is_empty()),
            server_list: env_list("SERVER_LIST"),
            batch_timeout: Duration::from_millis(env_or_default("BATCH_TIMEOUT_MS", 15_000)),
            schedule_enabled: env_or_default("SCHEDULE_ENABLED", defaults.schedule_enabled),
            schedule_interval_minutes: env_or_default(
                "SCHEDULE_INTERVAL_MIN",
                defaults.schedule_interval_minutes,
            ),
            schedule_start: env_or_default_time("SCHEDULE_START", defaults.schedule_start),
            schedule_end: env_or_default_time("SCHEDULE_END", defaults.schedule_end),
            schedule_channels: env_list("SCHEDULE_CHANNELS")
                .iter()
                .filter_map(|id| id.parse().ok())
                .collect(),
            schedule_image: env_or_default("SCHEDULE_IMAGE", defaults.schedule_image),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            timeout: self.query_timeout,
            cache_ttl: self.cache_ttl,
            retries: self.retry_count,
            batch_timeout: self.batch_timeout,
        }
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            show_password: self.show_password,
            show_vac: self.show_vac,
            max_players: self.max_players_shown,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            width: self.image_width,
            min_height: self.image_min_height,
            font_size: self.font_size,
            display: self.display_options(),
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            port: 3000,
            request_timeout: Duration::from_secs(30),
            database_path: "strikewatch.db".to_string(),
            discord_token: None,
            command_prefix: "!".to_string(),
            query_timeout: Duration::from_millis(5000),
            cache_ttl: Duration::from_millis(30_000),
            retry_count: 1,
            max_players_shown: 20,
            show_vac: false,
            show_password: false,
            generate_image: false,
            image_width: 800,
            image_min_height: 300,
            font_size: 20,
            font_path: None,
            server_list: Vec::new(),
            batch_timeout: Duration::from_millis(15_000),
            schedule_enabled: false,
            schedule_interval_minutes: 30,
            schedule_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            schedule_end: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            schedule_channels: Vec::new(),
            schedule_image: true,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an `HH:MM` environment variable or return default value
fn env_or_default_time(key: &str, default: NaiveTime) -> NaiveTime {
    match var(key) {
        Ok(val) => parse_time_of_day(&val).unwrap_or_else(|| {
            tracing::warn!(key, value = %val, "expected HH:MM, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Parse a comma separated environment variable, skipping blanks
fn env_list(key: &str) -> Vec<String> {
    var(key).map(|val| split_list(&val)).unwrap_or_default()
}

/// Split a comma or whitespace separated list, skipping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `HH:MM` (24h).
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
