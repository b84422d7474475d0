//! Test catalog loading.
//!
//! The catalog lives in the test-suite tree:
//!
//! - `TEST_DIRS` lists test directories and the build flags they require.
//! - `<dir>/TEST_FILES` lists the tests of one directory as
//!   `name type [tolerance] [reference]` records.
//! - `TEST_TYPES` holds the numeric-type taxonomy.
//!
//! Malformed records are fatal: a survey computed against a corrupt catalog
//! would be misleading.

use crate::error::CatalogError;
use crate::models::{CatalogFacts, TestDef, DEFAULT_TOLERANCE};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TEST_DIRS_FILE: &str = "TEST_DIRS";
pub const TEST_FILES_FILE: &str = "TEST_FILES";
pub const TEST_TYPES_FILE: &str = "TEST_TYPES";

/// Tolerance bounds `10^-k` covered by the catalog facts, tightest first.
const TOLERANCE_BOUNDS: [(u32, f64); 9] = [
    (14, 1e-14),
    (13, 1e-13),
    (12, 1e-12),
    (11, 1e-11),
    (10, 1e-10),
    (9, 1e-9),
    (8, 1e-8),
    (7, 1e-7),
    (6, 1e-6),
];

/// One entry of `TEST_DIRS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDir {
    pub path: String,
    pub flags: Vec<String>,
}

/// All known test cases, keyed by `<dir>/<file>`.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    tests: BTreeMap<String, TestDef>,
}

impl TestCatalog {
    pub fn get(&self, name: &str) -> Option<&TestDef> {
        self.tests.get(name)
    }

    pub fn insert(&mut self, name: &str, def: TestDef) {
        self.tests.insert(name.to_string(), def);
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Catalog-wide counts for the survey header.
    pub fn facts(&self) -> CatalogFacts {
        let defs: Vec<&TestDef> = self.tests.values().collect();

        let tolerance_buckets = TOLERANCE_BOUNDS
            .iter()
            .map(|&(k, bound)| {
                let n = defs
                    .iter()
                    .filter(|d| d.is_numeric() && d.tolerance <= bound)
                    .count();
                (k, n)
            })
            .collect();

        CatalogFacts {
            total: defs.len(),
            require_flags: defs.iter().filter(|d| !d.flags.is_empty()).count(),
            numeric: defs.iter().filter(|d| d.is_numeric()).count(),
            with_reference: defs.iter().filter(|d| d.has_reference()).count(),
            tolerance_buckets,
        }
    }
}

/// Iterate over the meaningful lines of a catalog file with 1-based numbers.
fn content_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse `TEST_DIRS`.
pub fn parse_test_dirs(content: &str) -> Vec<TestDir> {
    content_lines(content)
        .filter_map(|(_, line)| {
            let mut parts = line.split_whitespace();
            let path = parts.next()?.to_string();
            let flags = parts.map(String::from).collect();
            Some(TestDir { path, flags })
        })
        .collect()
}

/// Parse one `TEST_FILES` record.
pub fn parse_test_record(
    line: &str,
    flags: &[String],
    source: &Path,
    line_no: usize,
) -> Result<(String, TestDef), CatalogError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if !(2..=4).contains(&parts.len()) {
        return Err(CatalogError::FieldCount {
            path: source.to_path_buf(),
            line: line_no,
            fields: parts.len(),
        });
    }

    let test_type = parts[1].parse().map_err(|_| CatalogError::TestType {
        path: source.to_path_buf(),
        line: line_no,
        value: parts[1].to_string(),
    })?;

    let tolerance: f64 = match parts.get(2) {
        Some(raw) => raw.parse().map_err(|_| CatalogError::Tolerance {
            path: source.to_path_buf(),
            line: line_no,
            value: raw.to_string(),
        })?,
        None => DEFAULT_TOLERANCE,
    };

    let ref_value = parts.get(3).map(|s| s.to_string()).unwrap_or_default();

    Ok((
        parts[0].to_string(),
        TestDef {
            test_type,
            flags: flags.to_vec(),
            tolerance,
            ref_value,
        },
    ))
}

/// Parse the `TEST_FILES` of `dir` into `catalog`.
pub fn parse_test_files(
    catalog: &mut TestCatalog,
    dir: &TestDir,
    content: &str,
    source: &Path,
) -> Result<usize, CatalogError> {
    let mut count = 0;
    for (line_no, line) in content_lines(content) {
        let (file, def) = parse_test_record(line, &dir.flags, source, line_no)?;
        catalog.insert(&format!("{}/{}", dir.path, file), def);
        count += 1;
    }
    Ok(count)
}

/// Parse `TEST_TYPES`. Index 0 is the non-numeric type and has no title.
pub fn parse_test_types(content: &str, source: &Path) -> Result<Vec<String>, CatalogError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or("").trim();
    let count: usize = header.parse().map_err(|_| CatalogError::TypeCount {
        path: source.to_path_buf(),
        value: header.to_string(),
    })?;

    let mut types = vec![String::new()];
    types.extend(lines.take(count).map(type_title));
    if types.len() <= count {
        warn!(
            "{} declares {} types but lists {}",
            source.display(),
            count,
            types.len() - 1
        );
    }
    Ok(types)
}

/// Display title of a taxonomy line: the pattern before any `!` comment.
fn type_title(line: &str) -> String {
    line.split('!').next().unwrap_or("").trim().to_string()
}

fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loader for a test-suite tree.
pub struct CatalogLoader {
    tests_root: PathBuf,
}

impl CatalogLoader {
    pub fn new(tests_root: PathBuf) -> Self {
        Self { tests_root }
    }

    /// Load every test directory named in `TEST_DIRS`.
    pub fn load(&self) -> Result<TestCatalog, CatalogError> {
        let dirs_path = self.tests_root.join(TEST_DIRS_FILE);
        let dirs = parse_test_dirs(&read(&dirs_path)?);
        debug!("{} lists {} test directories", dirs_path.display(), dirs.len());

        let mut catalog = TestCatalog::default();
        for dir in &dirs {
            let files_path = self.tests_root.join(&dir.path).join(TEST_FILES_FILE);
            let n = parse_test_files(&mut catalog, dir, &read(&files_path)?, &files_path)?;
            debug!("Loaded {} tests from {}", n, files_path.display());
        }

        info!(
            "Loaded {} test cases from {} directories",
            catalog.len(),
            dirs.len()
        );
        Ok(catalog)
    }

    /// Load the type taxonomy. A missing file yields an empty taxonomy.
    pub fn load_types(&self) -> Result<Vec<String>, CatalogError> {
        let path = self.tests_root.join(TEST_TYPES_FILE);
        if !path.exists() {
            warn!("No {} found, type titles disabled", path.display());
            return Ok(Vec::new());
        }
        parse_test_types(&read(&path)?, &path)
    }
}
