//! Runtime settings and the table of logical crossings.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::cache::DEFAULT_TTL;
use crate::fetch::{DEFAULT_API_URL, DEFAULT_TIMEOUT};

/// Default number of sensor fetches allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Settings read from the environment (and `.env`).
///
/// | Variable                  | Default                                     |
/// |---------------------------|---------------------------------------------|
/// | `TRAFFIC_API_URL`         | `https://trafikkdata-api.atlas.vegvesen.no` |
/// | `TRAFFIC_CACHE_TTL_SECS`  | `86400`                                     |
/// | `TRAFFIC_MAX_ATTEMPTS`    | `3`                                         |
/// | `TRAFFIC_TIMEOUT_SECS`    | `10`                                        |
/// | `TRAFFIC_MAX_CONCURRENCY` | `3`                                         |
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub cache_ttl: Duration,
    /// Total calls per request, the first one included.
    pub max_attempts: u32,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            cache_ttl: DEFAULT_TTL,
            max_attempts: 3,
            timeout: DEFAULT_TIMEOUT,
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Unparseable values
    /// fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: lookup("TRAFFIC_API_URL").unwrap_or(defaults.api_url),
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "TRAFFIC_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            max_attempts: parse_or(&lookup, "TRAFFIC_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "TRAFFIC_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
            max_concurrency: parse_or(&lookup, "TRAFFIC_MAX_CONCURRENCY", defaults.max_concurrency)
                .max(1),
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid setting, using default");
            default
        }),
        None => default,
    }
}

/// A road segment shown to the user, backed by one or more sensors whose
/// volumes are summed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalCrossing {
    pub name: String,
    pub point_ids: Vec<String>,
}

/// Maps crossing names to their traffic registration points.
///
/// A replacement table can be stored as a JSON object:
/// ```json
/// {
///   "Bybrua": ["17949V320695"],
///   "Ryfylketunnelen": ["99040V2725982", "00911V2725983"]
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CrossingCatalog {
    crossings: Vec<LogicalCrossing>,
}

impl Default for CrossingCatalog {
    fn default() -> Self {
        let builtin: [(&str, &[&str]); 3] = [
            ("Ryfylketunnelen", &["99040V2725982", "00911V2725983"]),
            (
                "Hundvågtunnelen",
                &["10239V2725979", "62464V2725991", "92743V2726085"],
            ),
            ("Bybrua", &["17949V320695"]),
        ];
        Self {
            crossings: builtin
                .iter()
                .map(|(name, ids)| LogicalCrossing {
                    name: name.to_string(),
                    point_ids: ids.iter().map(|id| id.to_string()).collect(),
                })
                .collect(),
        }
    }
}

impl CrossingCatalog {
    pub fn from_json(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, Vec<String>> = serde_json::from_str(content)?;
        let crossings: Vec<LogicalCrossing> = entries
            .into_iter()
            .map(|(name, point_ids)| LogicalCrossing { name, point_ids })
            .collect();

        if let Some(empty) = crossings.iter().find(|c| c.point_ids.is_empty()) {
            anyhow::bail!("crossing '{}' has no traffic registration points", empty.name);
        }
        Ok(Self { crossings })
    }

    /// Loads the table from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read crossing table {path}"))?;
        Self::from_json(&content).with_context(|| format!("invalid crossing table {path}"))
    }

    /// Looks a crossing up by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&LogicalCrossing> {
        let wanted = name.to_lowercase();
        self.crossings
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalCrossing> {
        self.crossings.iter()
    }
}
