//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the
//! fridge. In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_extracts_dir() -> PathBuf {
    PathBuf::from("extracts")
}

fn default_max_bytes() -> u64 {
    1_000_000
}

fn default_huge_count() -> usize {
    10
}

fn default_export_url() -> String {
    "https://directory.peppol.eu/export/businesscards".to_string()
}

/// 📦 The AppConfig: every knob the sync has, with defaults tuned so that a
/// bare `cardex sync` in an empty directory does something sensible.
///
/// 🎯 Paths are relative to the working directory unless you say otherwise,
/// which is more self-awareness than most apps achieve in their lifetime.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📥 Where the downloaded export lives between download and parse.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// 📜 Where the run log goes. One file, append mode, no rotation drama.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 🗂️ Root of the per-country artifact tree.
    #[serde(default = "default_extracts_dir")]
    pub extracts_dir: PathBuf,
    /// 🔊 Debug-level logging. For when info-level optimism isn't cutting it.
    #[serde(default)]
    pub verbose: bool,
    /// 📏 Rollover threshold per artifact, in bytes. Not a hard cap — the
    /// record that crosses the line still lands, the *next* one rolls.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// ♻️ Keep the tmp dir after a successful sync instead of sweeping it.
    #[serde(default)]
    pub keep_tmp: bool,
    /// 🏋️ How many entries the huge-files report shows.
    #[serde(default = "default_huge_count")]
    pub huge_count: usize,
    /// 🌍 Where the directory export comes from.
    #[serde(default = "default_export_url")]
    pub export_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            log_dir: default_log_dir(),
            extracts_dir: default_extracts_dir(),
            verbose: false,
            max_bytes: default_max_bytes(),
            keep_tmp: false,
            huge_count: default_huge_count(),
            export_url: default_export_url(),
        }
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power
/// of hoping (every field has a default, so hoping actually works here).
///
/// 🔧 Merges environment variables (CARDEX_*) with an optional TOML file.
///
/// 📐 DESIGN NOTE (no cap, this is tribal knowledge):
///   - If `config_file_name` is None  → env vars + defaults. No file. No assumptions.
///   - If `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable. Check the error message
/// though — it's contextual, informative, and written with love. Or despair.
/// Hard to tell at 3am.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ Env vars as the base layer — like a good sourdough starter.
    // ALL CARDEX_* vars accepted. No ID required. No velvet rope.
    let config = Figment::new().merge(Env::prefixed("CARDEX_"));

    // 🎯 Conditionally layer in TOML only if a file was actually provided.
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CARDEX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CARDEX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_test_config(contents: &str) -> PathBuf {
        let timestamp_of_questionable_life_choices = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("💀 Clock went backwards. Time is a flat bug report.")
            .as_nanos();
        let temp_path = std::env::temp_dir().join(format!(
            "cardex_app_config_{timestamp_of_questionable_life_choices}.toml"
        ));

        // 🧪 A real file, because Figment wants TOML from disk, like it's method acting.
        fs::write(&temp_path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        temp_path
    }

    #[test]
    fn the_one_where_an_empty_config_means_all_defaults() {
        let config_path = write_test_config("");
        let config = load_config(Some(&config_path)).expect("empty config should load");

        assert_eq!(config.tmp_dir, PathBuf::from("tmp"));
        assert_eq!(config.log_dir, PathBuf::from("log"));
        assert_eq!(config.extracts_dir, PathBuf::from("extracts"));
        assert!(!config.verbose);
        assert_eq!(config.max_bytes, 1_000_000);
        assert!(!config.keep_tmp);
        assert_eq!(config.huge_count, 10);
        assert_eq!(
            config.export_url,
            "https://directory.peppol.eu/export/businesscards"
        );

        fs::remove_file(config_path).ok();
    }

    #[test]
    fn the_one_where_the_toml_file_moves_the_knobs() {
        let config_path = write_test_config(
            r#"
            tmp_dir = "/var/tmp/cardex"
            max_bytes = 5000000
            keep_tmp = true
            huge_count = 3
            export_url = "http://localhost:8080/export"
            "#,
        );
        let config = load_config(Some(&config_path)).expect("config should load");

        assert_eq!(config.tmp_dir, PathBuf::from("/var/tmp/cardex"));
        assert_eq!(config.max_bytes, 5_000_000);
        assert!(config.keep_tmp);
        assert_eq!(config.huge_count, 3);
        assert_eq!(config.export_url, "http://localhost:8080/export");
        // untouched knobs keep their defaults
        assert_eq!(config.extracts_dir, PathBuf::from("extracts"));

        fs::remove_file(config_path).ok();
    }
}
