//! Runtime configuration: where brew lives and how patient we are.

use std::path::PathBuf;
use std::time::Duration;

/// Base URL for the Homebrew JSON API.
pub const DEFAULT_API_BASE: &str = "https://formulae.brew.sh/api";

/// Tunables for the orchestration layer.
///
/// Everything has a sensible default; construct with `Config::default()` and
/// override fields as needed before wiring up
/// [`BrewServices`](crate::services::BrewServices).
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the brew executable.
    pub brew_path: PathBuf,
    /// Base URL of the package catalog API.
    pub api_base: String,
    /// How long the merged remote catalog stays fresh before a refetch.
    pub catalog_ttl: Duration,
    /// Quiet period after the last keystroke before a search fires.
    pub debounce: Duration,
    /// Delay before re-reading the installed list after an upgrade, giving
    /// brew time to finalize links and receipts.
    pub resync_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brew_path: detect_brew_path(),
            api_base: DEFAULT_API_BASE.to_string(),
            catalog_ttl: Duration::from_secs(24 * 60 * 60),
            debounce: Duration::from_millis(500),
            resync_delay: Duration::from_secs(1),
        }
    }
}

/// Locate the brew executable.
///
/// Honors `HOMEBREW_PREFIX` when set, then checks the Apple Silicon prefix,
/// then falls back to the Intel/Linux default.
pub fn detect_brew_path() -> PathBuf {
    if let Some(prefix) = std::env::var_os("HOMEBREW_PREFIX") {
        return PathBuf::from(prefix).join("bin/brew");
    }

    let apple_silicon = PathBuf::from("/opt/homebrew/bin/brew");
    if apple_silicon.exists() {
        return apple_silicon;
    }

    PathBuf::from("/usr/local/bin/brew")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_populated() {
        let config = Config::default();
        assert!(config.brew_path.ends_with("bin/brew"));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.debounce < config.catalog_ttl);
    }
}
