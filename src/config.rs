//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.regsurvey.toml` files. The file names the testers to survey and
//! their priority order.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".regsurvey.toml";

/// Survey file name without extension, used when none is configured.
pub const DEFAULT_OUTPUT_STEM: &str = "regtest_survey";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Testers to survey.
    #[serde(default)]
    pub testers: Vec<TesterConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root of the test-suite tree holding `TEST_DIRS`.
    #[serde(default = "default_tests_root")]
    pub tests_root: PathBuf,

    /// Dashboard directory: holds `archive/` and receives the survey.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Per-report retrieval timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Log at DEBUG level unless `--quiet` is given.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tests_root: default_tests_root(),
            output_dir: default_output_dir(),
            timeout_seconds: default_timeout(),
            verbose: false,
        }
    }
}

fn default_tests_root() -> PathBuf {
    PathBuf::from("../../tests")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout() -> u64 {
    5
}

/// Survey rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Page title.
    #[serde(default = "default_title")]
    pub title: String,

    /// File name of the survey inside the output directory.
    /// Derived from the output format when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            output_file: None,
        }
    }
}

fn default_title() -> String {
    "Regtest Survey".to_string()
}

/// One tester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TesterConfig {
    /// Archive directory name; unique.
    pub key: String,

    /// Display name. Defaults to the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Priority; lower sorts first.
    #[serde(default)]
    pub sortkey: i64,

    /// Explicit report location, bypassing the archive listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

impl TesterConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Reject a zero timeout and duplicate tester keys.
    pub fn validate(&self) -> Result<()> {
        if self.general.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be at least 1 second");
        }

        let mut seen = std::collections::HashSet::new();
        for tester in &self.testers {
            if !seen.insert(tester.key.as_str()) {
                anyhow::bail!("Duplicate tester key in config: {}", tester.key);
            }
        }
        Ok(())
    }

    /// Testers in priority order (ascending sortkey, stable on ties).
    pub fn testers_by_priority(&self) -> Vec<&TesterConfig> {
        let mut testers: Vec<&TesterConfig> = self.testers.iter().collect();
        testers.sort_by_key(|t| t.sortkey);
        testers
    }

    /// Display names keyed by tester key.
    pub fn tester_names(&self) -> HashMap<String, String> {
        self.testers
            .iter()
            .map(|t| (t.key.clone(), t.display_name().to_string()))
            .collect()
    }

    /// Full path of the survey file for the given output format.
    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        match self.report.output_file {
            Some(ref file) => self.general.output_dir.join(file),
            None => self
                .general
                .output_dir
                .join(format!("{}.{}", DEFAULT_OUTPUT_STEM, format.extension())),
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref tests_root) = args.tests_root {
            self.general.tests_root = tests_root.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }
        if let Some(timeout) = args.timeout {
            self.general.timeout_seconds = timeout;
        }
        if let Some(ref output) = args.output {
            self.report.output_file = Some(output.clone());
        }
        if let Some(ref title) = args.title {
            self.report.title = title.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.testers.push(TesterConfig {
            key: "local-gcc".to_string(),
            name: Some("Local GCC".to_string()),
            sortkey: 10,
            report_url: None,
        });
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.timeout_seconds, 5);
        assert_eq!(config.report.output_file, None);
        assert!(config.testers.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "/srv/dashboard"
timeout_seconds = 10

[report]
title = "Nightly Survey"

[[testers]]
key = "intel"
name = "Intel MKL"
sortkey = 20

[[testers]]
key = "gcc"
sortkey = 10
report_url = "https://example.org/gcc/latest.txt.gz"

[[testers]]
key = "clang"
sortkey = 10
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("/srv/dashboard"));
        assert_eq!(config.general.timeout_seconds, 10);
        assert_eq!(config.general.tests_root, PathBuf::from("../../tests"));
        assert_eq!(config.report.title, "Nightly Survey");

        let order: Vec<&str> = config
            .testers_by_priority()
            .iter()
            .map(|t| t.key.as_str())
            .collect();
        assert_eq!(order, vec!["gcc", "clang", "intel"]);

        let names = config.tester_names();
        assert_eq!(names["intel"], "Intel MKL");
        assert_eq!(names["gcc"], "gcc");
        assert_eq!(
            config.output_path(OutputFormat::Html),
            PathBuf::from("/srv/dashboard/regtest_survey.html")
        );
    }

    #[test]
    fn test_output_path_follows_format() {
        let mut config = Config::default();
        assert_eq!(
            config.output_path(OutputFormat::Json),
            PathBuf::from("./regtest_survey.json")
        );
        assert_eq!(
            config.output_path(OutputFormat::Markdown),
            PathBuf::from("./regtest_survey.md")
        );

        config.report.output_file = Some("survey.html".to_string());
        assert_eq!(
            config.output_path(OutputFormat::Json),
            PathBuf::from("./survey.html")
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[general]\ntimeout_seconds = 0\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn test_verbose_from_file_raises_log_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[general]\nverbose = true\n").unwrap();

        let mut config = Config::load(&path).unwrap();
        let args = crate::cli::Args::parse_from(["regsurvey"]);
        config.merge_with_args(&args);
        assert!(config.general.verbose);
        assert_eq!(
            args.log_level(config.general.verbose),
            tracing::Level::DEBUG
        );

        let quiet = crate::cli::Args::parse_from(["regsurvey", "--quiet"]);
        assert_eq!(
            quiet.log_level(config.general.verbose),
            tracing::Level::ERROR
        );
    }

    #[test]
    fn test_duplicate_tester_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            "[[testers]]\nkey = \"a\"\n\n[[testers]]\nkey = \"a\"\n",
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate tester key"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[report]"));
        assert!(toml_str.contains("[[testers]]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.testers.len(), 1);
    }
}
