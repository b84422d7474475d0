//! Tester report parsing.
//!
//! A report is the free-text log of one regression run. Results are listed
//! inside directory blocks opened by `>>> <base>/<dir>` and closed by `<<<`.
//! The parser walks the lines with an explicit two-state machine and keeps
//! every numeric result it can validate.

use crate::error::ReportError;
use crate::models::{ObservedValue, TesterObservation};
use tracing::{debug, warn};

/// Substring every genuine report contains.
pub const REPORT_MARKER: &str = "Keepalive:";

const BASE_DIR_MARKER: &str = "Work base dir:";
const UNIT_TEST_MARKER: &str = "/UNIT/";
const ENTER_MARKER: &str = ">>>";
const EXIT_MARKER: &str = "<<<";
const NO_CHECK_PLACEHOLDER: &str = "-";

/// Test-file extensions that carry numeric results.
pub const RESULT_EXTENSIONS: &[&str] = &["inp", "restart"];

/// Tokens belonging to the status of a result line, not to its value.
const STATUS_WORDS: &[&str] = &["OK", "WRONG", "RESULT"];

/// Where the parser is relative to directory blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseState {
    Outside,
    Inside { dir: String },
}

/// Outcome of feeding one line to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Line did not touch state or results.
    Ignored,
    /// Base directory updated.
    BaseDir,
    /// Entered a directory block.
    Entered,
    /// Left a directory block.
    Exited,
    /// A result was recorded under this identifier.
    Recorded(String),
    /// Result line rejected, with the reason.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnitTest,
    NotAResult,
    UnknownExtension,
    NoCheck,
    Unparseable,
}

/// Line-by-line state machine over one report.
#[derive(Debug)]
pub struct ReportParser {
    base_dir: Option<String>,
    state: ParseState,
    line_no: usize,
    values: TesterObservation,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser {
    pub fn new() -> Self {
        Self {
            base_dir: None,
            state: ParseState::Outside,
            line_no: 0,
            values: TesterObservation::new(),
        }
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    pub fn base_dir(&self) -> Option<&str> {
        self.base_dir.as_deref()
    }

    /// Feed the next line of the report.
    pub fn feed_line(&mut self, line: &str) -> Result<LineOutcome, ReportError> {
        self.line_no += 1;

        if let Some(rest) = line.strip_prefix(BASE_DIR_MARKER) {
            self.base_dir = Some(rest.trim().to_string());
            return Ok(LineOutcome::BaseDir);
        }

        if line.contains(UNIT_TEST_MARKER) {
            return Ok(LineOutcome::Skipped(SkipReason::UnitTest));
        }

        if line.starts_with(ENTER_MARKER) {
            let dir = self.directory_suffix(line)?;
            debug!("Entering {}", dir);
            self.state = if dir.is_empty() {
                ParseState::Outside
            } else {
                ParseState::Inside { dir }
            };
            return Ok(LineOutcome::Entered);
        }

        if line.starts_with(EXIT_MARKER) {
            self.state = ParseState::Outside;
            return Ok(LineOutcome::Exited);
        }

        match &self.state {
            ParseState::Outside => Ok(LineOutcome::Ignored),
            ParseState::Inside { dir } => match parse_result_line(dir, line) {
                Ok((name, value)) => {
                    self.values.insert(name.clone(), value);
                    Ok(LineOutcome::Recorded(name))
                }
                Err(reason) => Ok(LineOutcome::Skipped(reason)),
            },
        }
    }

    /// Consume the parser, returning everything recorded so far.
    pub fn finish(self) -> TesterObservation {
        if let ParseState::Inside { dir } = self.state() {
            debug!("Report ended inside directory block {}", dir);
        }
        self.values
    }

    fn directory_suffix(&self, line: &str) -> Result<String, ReportError> {
        let base = self
            .base_dir()
            .ok_or(ReportError::MissingBaseDir { line: self.line_no })?;
        let prefix = format!("{} {}/", ENTER_MARKER, base);
        match line.strip_prefix(&prefix) {
            Some(suffix) => Ok(suffix.to_string()),
            None => Err(ReportError::BaseDirMismatch {
                line: self.line_no,
                expected: prefix,
                found: line.to_string(),
            }),
        }
    }
}

/// Classify one line found inside a directory block.
fn parse_result_line(dir: &str, line: &str) -> Result<(String, ObservedValue), SkipReason> {
    if !line.contains("OK") && !line.contains("WRONG RESULT") {
        return Err(SkipReason::NotAResult);
    }

    let mut tokens = line.split_whitespace();
    let file = tokens.next().ok_or(SkipReason::NotAResult)?;

    let extension = file.rsplit_once('.').map(|(_, ext)| ext);
    if !extension.is_some_and(|ext| RESULT_EXTENSIONS.contains(&ext)) {
        warn!("Found strange line:\n{}", line);
        return Err(SkipReason::UnknownExtension);
    }

    // The value is the first token that is not part of the status.
    let token = tokens
        .find(|t| !STATUS_WORDS.contains(t))
        .ok_or(SkipReason::Unparseable)?;
    if token == NO_CHECK_PLACEHOLDER {
        return Err(SkipReason::NoCheck);
    }

    let value = ObservedValue::parse(token).ok_or(SkipReason::Unparseable)?;
    Ok((format!("{}/{}", dir, file), value))
}

/// Parse a complete report.
///
/// Returns `Ok(None)` when the text is not recognisable as a report, in which
/// case the tester should be dropped. Malformed directory markers are fatal.
pub fn parse_report(text: &str) -> Result<Option<TesterObservation>, ReportError> {
    if !text.contains(REPORT_MARKER) {
        return Ok(None);
    }

    let mut parser = ReportParser::new();
    for line in text.split('\n') {
        parser.feed_line(line.trim_end_matches('\r'))?;
    }

    Ok(Some(parser.finish()))
}
