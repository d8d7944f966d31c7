//! The versioned configuration document (§3, §6).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverwritePolicy {
    Skip,
    Overwrite,
    /// Reserved per §9 open question: the source only ever consumes
    /// `skip`/`overwrite`. Kept as a distinguished third value rather than
    /// guessed-at behavior; the Optimizer maps it to a failed item.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    Mp3,
    Flac,
    Ogg,
    M4a,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// One parallel-list entry shared by songs/albums/artists/playlists (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub create_m3u: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryParameters {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitParameters {
    #[serde(default)]
    pub requests_per_second: Option<f64>,
    #[serde(default)]
    pub burst: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub file_existence_cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub file_existence_cache_ttl_secs: u64,
}

fn default_cache_capacity() -> usize {
    10_000
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

/// Five optional bandwidth/retry toggles named by §3 without further detail;
/// all default to "feature not engaged" so their absence never fails
/// validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedToggles {
    #[serde(default)]
    pub max_bandwidth_bytes_per_sec: Option<u64>,
    #[serde(default)]
    pub retry_on_rate_limit: bool,
    #[serde(default)]
    pub retry_on_timeout: bool,
    #[serde(default)]
    pub prefer_alt_url_on_retry: bool,
    #[serde(default)]
    pub jitter_retries: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_version")]
    pub version: String,
    pub credentials: Credentials,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
    #[serde(default)]
    pub provider_preference: Vec<String>,
    #[serde(default)]
    pub overwrite_policy: OverwritePolicy,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub rate_limit: RateLimitParameters,
    #[serde(default)]
    pub retry: RetryParameters,
    #[serde(default)]
    pub advanced: AdvancedToggles,
    #[serde(default)]
    pub output_directory: String,

    #[serde(default)]
    pub songs: Vec<SourceEntry>,
    #[serde(default)]
    pub albums: Vec<SourceEntry>,
    #[serde(default)]
    pub artists: Vec<SourceEntry>,
    #[serde(default)]
    pub playlists: Vec<SourceEntry>,
}

fn default_version() -> String {
    "v1.0.0".to_string()
}
fn default_threads() -> u32 {
    4
}
fn default_bitrate() -> u32 {
    320
}

impl Default for OverwritePolicy {
    fn default() -> Self {
        Self::Skip
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

impl Configuration {
    /// Validation per §4.G: required fields, enumerations, numeric ranges.
    /// Returns every violation found rather than failing fast, matching
    /// `ValidateConfig`'s `{valid, errors[]}` contract (§4.I).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.credentials.username.trim().is_empty() {
            errors.push("credentials.username is required".to_string());
        }
        if self.songs.is_empty()
            && self.albums.is_empty()
            && self.artists.is_empty()
            && self.playlists.is_empty()
        {
            errors.push("at least one source entry is required".to_string());
        }
        if self.threads == 0 {
            errors.push("threads must be at least 1".to_string());
        }
        if self.bitrate_kbps == 0 {
            errors.push("bitrate_kbps must be greater than 0".to_string());
        }
        for entry in self
            .songs
            .iter()
            .chain(self.albums.iter())
            .chain(self.artists.iter())
            .chain(self.playlists.iter())
        {
            if entry.url.trim().is_empty() {
                errors.push(format!("source entry '{}' has an empty url", entry.name));
            }
        }
        errors
    }
}
