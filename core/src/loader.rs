use crate::record::{BenchmarkRecord, RecordError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename markers of security-scan output that lives next to benchmark results.
pub const SECURITY_SCAN_MARKERS: &[&str] = &["trivy", "sbom", "security"];

/// Result layouts the CI pipelines upload, relative to the repository root.
pub const DEFAULT_SEARCH_PATTERNS: &[&str] = &[
    "results-github/*/*.json",
    "results-gitlab/*/*.json",
    "results-gitlab-public/*/*.json",
    "results/*.json",
    "final-results/*.json",
];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unusable record in {path:?}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: RecordError,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Serializes as the plain list of active markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExclusionRules {
    markers: Vec<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            markers: SECURITY_SCAN_MARKERS.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

impl ExclusionRules {
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for marker in markers {
            let marker = marker.as_ref().trim().to_lowercase();
            if !marker.is_empty() && !self.markers.contains(&marker) {
                self.markers.push(marker);
            }
        }
        self
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Matches on the file name only, so a `security/` parent directory does
    /// not hide the results stored inside it.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        self.markers.iter().any(|marker| name.contains(marker.as_str()))
    }
}

/// Where `merge` looks for results. Usually read from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPlan {
    pub patterns: Vec<String>,
    pub exclude: Vec<String>,
    pub output_dir: Option<PathBuf>,
}

impl Default for SearchPlan {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_SEARCH_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
            exclude: Vec::new(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub records: Vec<BenchmarkRecord>,
    pub skipped: Vec<SkippedFile>,
}

impl LoadOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Finds every JSON file below `dir`, at any depth.
pub fn discover(dir: &Path, rules: &ExclusionRules) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "results directory does not exist");
        return Ok(Vec::new());
    }
    discover_patterns(dir, &["*.json", "**/*.json"], rules)
}

/// Expands `patterns` relative to `root`; absolute patterns are used as-is.
pub fn discover_patterns<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    rules: &ExclusionRules,
) -> Result<Vec<PathBuf>, LoadError> {
    let mut found = BTreeSet::new();
    let escaped_root = PathBuf::from(glob::Pattern::escape(&root.to_string_lossy()));

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            escaped_root.join(pattern)
        };
        let full = full.to_string_lossy().to_string();
        let entries = glob::glob(&full).map_err(|source| LoadError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %err.path().display(), "cannot access path: {}", err.error());
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if rules.is_excluded(&path) {
                debug!(path = %path.display(), "skipping security scan artifact");
                continue;
            }
            found.insert(path);
        }
    }

    Ok(found.into_iter().collect())
}

pub fn load_file(path: &Path) -> Result<BenchmarkRecord, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let source_file = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    BenchmarkRecord::from_value(&value, source_file).map_err(|source| LoadError::Record {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads every result file found by [`discover`].
pub fn load_results(dir: &Path, rules: &ExclusionRules) -> Result<LoadOutcome, LoadError> {
    let paths = discover(dir, rules)?;
    Ok(load_paths(paths))
}

pub fn load_patterns<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    rules: &ExclusionRules,
) -> Result<LoadOutcome, LoadError> {
    let paths = discover_patterns(root, patterns, rules)?;
    Ok(load_paths(paths))
}

fn load_paths(paths: Vec<PathBuf>) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    for path in paths {
        match load_file(&path) {
            Ok(record) => {
                debug!(path = %path.display(), tool = %record.tool, "loaded result");
                outcome.records.push(record);
            }
            Err(err) => {
                warn!("could not load {}: {err}", path.display());
                outcome.skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }

    outcome
}
