//! RegSurvey - cross-tester regression-test survey
//!
//! A CLI tool that reads the latest report of every configured tester,
//! reconciles the numeric results of each test case into a consensus
//! value and flags testers whose results diverge beyond tolerance.
//!
//! Exit codes:
//!   0 - Success (no outliers, or no --fail-on-outliers set)
//!   1 - Runtime error (config, catalog, malformed report, write failure)
//!   2 - Outliers found and --fail-on-outliers set

mod analysis;
mod catalog;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod tester;

use anyhow::{Context, Result};
use catalog::CatalogLoader;
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, TesterConfig};
use indicatif::{ProgressBar, ProgressStyle};
use models::{ObservationSet, Survey, SurveyMetadata, TesterObservation};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tester::{parse_report, ReportFetcher, ReportSource};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration; [general] verbose feeds the log level
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("RegSurvey v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run_survey(&args, &config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Survey failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .regsurvey.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Edit it to list your testers and point at the tests tree.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete survey workflow. Returns exit code (0 or 2).
async fn run_survey(args: &Args, config: &Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Load the catalog
    println!(
        "📚 Loading test catalog: {}",
        config.general.tests_root.display()
    );
    let loader = CatalogLoader::new(config.general.tests_root.clone());
    let catalog = loader.load()?;
    if catalog.is_empty() {
        warn!("Test catalog is empty; no test case can be surveyed");
    }
    let test_types = loader.load_types()?;

    // Step 2: Collect tester observations, in priority order
    let testers = config.testers_by_priority();
    if testers.is_empty() {
        warn!("No testers configured");
    }
    println!("📥 Reading reports of {} testers...", testers.len());

    let fetcher = ReportFetcher::new(config.general.timeout_seconds)?;
    let progress = progress_bar(testers.len() as u64, args.quiet);
    let observations =
        collect_observations(&fetcher, &testers, &config.general.output_dir, &progress).await?;
    progress.finish_and_clear();

    // Step 3: Aggregate
    println!("🧮 Aggregating results...");
    let rows = analysis::aggregate_all(&catalog, &observations);
    let summaries =
        analysis::summarize_testers(&rows, observations.columns(), &config.tester_names());

    let survey = Survey {
        metadata: SurveyMetadata {
            title: config.report.title.clone(),
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        facts: catalog.facts(),
        testers: summaries,
        rows,
        test_types,
    };

    // Step 4: Render and save
    let output = match args.format {
        OutputFormat::Html => report::generate_html_report(&survey),
        OutputFormat::Markdown => report::generate_markdown_report(&survey),
        OutputFormat::Json => report::generate_json_report(&survey)?,
    };

    let output_path = config.output_path(args.format);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write survey to {}", output_path.display()))?;

    // Print summary
    let flagged = survey.flagged_rows();
    println!("\n📊 Survey Summary:");
    println!("   Catalog test cases: {}", survey.facts.total);
    println!(
        "   Testers used: {} of {}",
        survey.testers.len(),
        config.testers.len()
    );
    println!("   Test cases surveyed: {}", survey.rows.len());
    println!("   Test cases with outliers: {}", flagged);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!("\nWrote: {}", output_path.display());

    let exit_code = survey_exit_code(flagged, args.fail_on_outliers);
    if exit_code != 0 {
        eprintln!(
            "\n⛔ {} test cases have outlier testers. Failing (exit code {}).",
            flagged, exit_code
        );
    }

    Ok(exit_code)
}

/// Exit code of a completed survey: 2 when outliers fail the run, else 0.
fn survey_exit_code(flagged: usize, fail_on_outliers: bool) -> i32 {
    if fail_on_outliers && flagged > 0 {
        2
    } else {
        0
    }
}

/// Collect observations of every tester, in the given priority order.
///
/// Skipped testers get no column; the first malformed report aborts.
async fn collect_observations(
    fetcher: &ReportFetcher,
    testers: &[&TesterConfig],
    output_dir: &Path,
    progress: &ProgressBar,
) -> Result<ObservationSet> {
    let mut observations = ObservationSet::new();
    for &tester in testers {
        progress.set_message(tester.key.clone());
        if let Some(observation) = collect_tester(fetcher, tester, output_dir).await? {
            info!(
                "Tester {}: {} numeric results",
                tester.key,
                observation.len()
            );
            observations.insert(&tester.key, observation);
        }
        progress.inc(1);
    }
    Ok(observations)
}

/// Fetch and parse one tester's latest report.
///
/// Retrieval problems drop the tester (`Ok(None)`); a malformed report is
/// fatal.
async fn collect_tester(
    fetcher: &ReportFetcher,
    tester: &TesterConfig,
    output_dir: &Path,
) -> Result<Option<TesterObservation>> {
    let source = ReportSource::for_tester(&tester.key, tester.report_url.as_deref(), output_dir);

    let location = match source.resolve() {
        Ok(Some(location)) => location,
        Ok(None) => {
            warn!("Tester {}: no recent report listed - skipping.", tester.key);
            return Ok(None);
        }
        Err(e) => {
            warn!("Tester {}: {:#} - skipping.", tester.key, e);
            return Ok(None);
        }
    };

    let text = match fetcher.fetch(&location).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Tester {}: {:#} - skipping.", tester.key, e);
            return Ok(None);
        }
    };

    let observation = parse_report(&text)
        .with_context(|| format!("Malformed report of tester {}: {}", tester.key, location))?;
    if observation.is_none() {
        warn!(
            "Tester {}: could not recognize as regtests report - skipping.",
            tester.key
        );
    }

    Ok(observation)
}

/// Progress bar over testers; hidden in quiet mode.
fn progress_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    match ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => debug!("Invalid progress template: {}", e),
    }
    pb
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so the file it came from is returned
/// for the caller to log.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(config::DEFAULT_CONFIG_FILE)))),
        None => Ok((Config::default(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    const GOOD_REPORT: &str = "Work base dir: /work\n\
Keepalive: 600 s\n\
>>> /work/QS/regtest-1\n\
    h2o.inp    -17.146036424188    OK (   1.00 sec)\n\
<<< /work/QS/regtest-1\n";

    fn tester_config(key: &str, report_url: Option<String>) -> TesterConfig {
        TesterConfig {
            key: key.to_string(),
            name: None,
            sortkey: 0,
            report_url,
        }
    }

    fn write_report(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_unusable_testers_are_skipped() {
        let dir = TempDir::new().unwrap();
        let good = write_report(&dir, "good.txt", GOOD_REPORT);
        let missing = dir.path().join("missing.txt").display().to_string();
        let no_keepalive = write_report(&dir, "plain.txt", "just some build log\n");
        let listing = dir.path().join("archive").join("delta");
        std::fs::create_dir_all(&listing).unwrap();
        std::fs::write(listing.join(tester::fetcher::LIST_RECENT_FILE), "").unwrap();

        let testers = vec![
            tester_config("alpha", Some(good)),
            tester_config("bravo", Some(missing)),
            tester_config("charlie", Some(no_keepalive)),
            tester_config("delta", None),
            tester_config("echo", None),
        ];
        let refs: Vec<&TesterConfig> = testers.iter().collect();
        let fetcher = ReportFetcher::new(5).unwrap();

        let observations = tokio_test::block_on(collect_observations(
            &fetcher,
            &refs,
            dir.path(),
            &ProgressBar::hidden(),
        ))
        .unwrap();

        let keys: Vec<(usize, &str)> = observations.columns().iter().collect();
        assert_eq!(keys, vec![(0, "alpha")]);
        let values = observations.values_for("QS/regtest-1/h2o.inp");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].1.text, "-17.146036424188");

        let delta = tokio_test::block_on(collect_tester(&fetcher, &testers[3], dir.path()));
        assert!(delta.unwrap().is_none());
    }

    #[test]
    fn test_malformed_report_is_fatal() {
        let dir = TempDir::new().unwrap();
        let bad = write_report(
            &dir,
            "bad.txt",
            "Work base dir: /work\nKeepalive: 600 s\n>>> /elsewhere/QS\n",
        );
        let good = write_report(&dir, "good.txt", GOOD_REPORT);
        let testers = vec![tester_config("alpha", Some(good)), tester_config("bravo", Some(bad))];
        let fetcher = ReportFetcher::new(5).unwrap();

        let single = tokio_test::block_on(collect_tester(&fetcher, &testers[1], dir.path()));
        let err = single.unwrap_err();
        assert!(format!("{:#}", err).contains("bravo"));

        let refs: Vec<&TesterConfig> = testers.iter().collect();
        let all = tokio_test::block_on(collect_observations(
            &fetcher,
            &refs,
            dir.path(),
            &ProgressBar::hidden(),
        ));
        assert!(all.is_err());
    }

    #[test]
    fn test_survey_exit_code() {
        assert_eq!(survey_exit_code(0, false), 0);
        assert_eq!(survey_exit_code(3, false), 0);
        assert_eq!(survey_exit_code(0, true), 0);
        assert_eq!(survey_exit_code(3, true), 2);
    }

    #[test]
    fn test_load_config_reports_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("survey.toml");
        std::fs::write(&path, "[general]\nverbose = true\n").unwrap();

        let mut args = Args::parse_from(["regsurvey"]);
        args.config = Some(path.clone());
        let (config, source) = load_config(&args).unwrap();
        assert_eq!(source, Some(path));
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);
    }
}
