//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// RegSurvey - cross-tester consensus survey for numeric regression tests
///
/// Reads the latest report of every configured tester, reconciles the
/// numeric results of each test case into a consensus value and flags
/// testers that diverge beyond the test's tolerance.
///
/// Examples:
///   regsurvey --config dashboard.toml --output-dir /srv/dashboard
///   regsurvey --format markdown --output survey.md
///   regsurvey --fail-on-outliers --quiet
///   regsurvey --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .regsurvey.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "REGSURVEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dashboard directory holding archive/ and receiving the survey
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Root of the test-suite tree (contains TEST_DIRS)
    #[arg(long, value_name = "DIR")]
    pub tests_root: Option<PathBuf>,

    /// File name of the survey inside the output directory
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Output format (html, markdown, json); also picks the default file extension
    #[arg(long, default_value = "html", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Report retrieval timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Page title
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 if any test case has an outlier tester
    ///
    /// Useful for CI pipelines.
    #[arg(long)]
    pub fail_on_outliers: bool,

    /// Generate a default .regsurvey.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Sortable HTML table (default)
    #[default]
    Html,
    /// Markdown tables
    Markdown,
    /// JSON document
    Json,
}

impl OutputFormat {
    /// File extension of the default survey name.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref output) = self.output {
            if output.is_empty() || output.contains('/') {
                return Err("Output must be a plain file name; use --output-dir for the directory"
                    .to_string());
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        if let Some(ref tests_root) = self.tests_root {
            if !tests_root.is_dir() {
                return Err(format!(
                    "Tests root is not a directory: {}",
                    tests_root.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level; `--quiet` wins over any verbose setting.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            output_dir: None,
            tests_root: None,
            output: None,
            format: OutputFormat::Html,
            timeout: None,
            title: None,
            verbose: false,
            quiet: false,
            fail_on_outliers: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::parse_from([
            "regsurvey",
            "--format",
            "json",
            "--timeout",
            "10",
            "--fail-on-outliers",
        ]);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.timeout, Some(10));
        assert!(args.fail_on_outliers);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_output_name() {
        let mut args = make_args();
        args.output = Some("nested/survey.html".to_string());
        assert!(args.validate().is_err());

        args.output = Some("survey.html".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_config() {
        let mut args = make_args();
        args.config = Some(PathBuf::from("/definitely/not/here.toml"));
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
