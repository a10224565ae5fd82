use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One benchmark run, flattened from the nested JSON written by the CI jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub tool: String,
    pub service: String,
    pub dockerfile_type: String,
    pub cache_scenario: String,
    pub run_number: Option<i64>,
    pub timestamp: String,
    pub ci_system: String,
    pub build_duration_seconds: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub cpu_user_seconds: Option<f64>,
    pub cpu_system_seconds: Option<f64>,
    pub memory_peak_mb: Option<f64>,
    pub image_size: String,
    pub image_size_bytes: Option<u64>,
    pub cache_hits: Option<u64>,
    pub cache_total_steps: Option<u64>,
    pub cache_hit_ratio: Option<f64>,
    pub exit_code: i64,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

impl BenchmarkRecord {
    /// Flattens a parsed result document.
    ///
    /// Metrics are taken from the nested `performance` object; older result
    /// files carry them at the top level, which is used when that object is
    /// absent.
    pub fn from_value(value: &Value, source_file: impl Into<String>) -> Result<Self, RecordError> {
        let root = value
            .as_object()
            .ok_or_else(|| RecordError::NotAnObject(json_kind(value)))?;
        let perf = match root.get("performance") {
            Some(Value::Object(perf)) => perf,
            Some(Value::Null) | None => root,
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: "performance",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            tool: text(root, "tool")?,
            service: text(root, "service")?,
            dockerfile_type: text(root, "dockerfile_type")?,
            cache_scenario: text(root, "cache_scenario")?,
            run_number: integer(root, "run_number")?,
            timestamp: text(root, "timestamp")?,
            ci_system: text(root, "ci_system")?,
            build_duration_seconds: float(perf, "build_duration_seconds")?,
            cpu_percent: float(perf, "cpu_percent")?,
            cpu_user_seconds: float(perf, "cpu_user_seconds")?,
            cpu_system_seconds: float(perf, "cpu_system_seconds")?,
            memory_peak_mb: float(perf, "memory_peak_mb")?,
            image_size: text(perf, "image_size")?,
            image_size_bytes: unsigned(perf, "image_size_bytes")?,
            cache_hits: unsigned(perf, "cache_hits")?,
            cache_total_steps: unsigned(perf, "cache_total_steps")?,
            cache_hit_ratio: float(perf, "cache_hit_ratio")?,
            exit_code: integer(root, "exit_code")?.unwrap_or(0),
            source_file: source_file.into(),
        })
    }

    pub fn group_value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::CiSystem => &self.ci_system,
            Dimension::Tool => &self.tool,
            Dimension::Service => &self.service,
            Dimension::DockerfileType => &self.dockerfile_type,
            Dimension::CacheScenario => &self.cache_scenario,
        }
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::BuildDurationSeconds => self.build_duration_seconds,
            Metric::CpuPercent => self.cpu_percent,
            Metric::CpuUserSeconds => self.cpu_user_seconds,
            Metric::CpuSystemSeconds => self.cpu_system_seconds,
            Metric::MemoryPeakMb => self.memory_peak_mb,
            Metric::ImageSizeBytes => self.image_size_bytes.map(|v| v as f64),
            Metric::CacheHits => self.cache_hits.map(|v| v as f64),
            Metric::CacheTotalSteps => self.cache_total_steps.map(|v| v as f64),
            Metric::CacheHitRatio => self.cache_hit_ratio,
        }
    }

    /// Renders a single field as it appears in the records CSV.
    pub fn field_text(&self, column: Column) -> String {
        match column {
            Column::Tool => self.tool.clone(),
            Column::Service => self.service.clone(),
            Column::DockerfileType => self.dockerfile_type.clone(),
            Column::CacheScenario => self.cache_scenario.clone(),
            Column::RunNumber => optional(self.run_number),
            Column::Timestamp => self.timestamp.clone(),
            Column::CiSystem => self.ci_system.clone(),
            Column::BuildDurationSeconds => optional(self.build_duration_seconds),
            Column::CpuPercent => optional(self.cpu_percent),
            Column::CpuUserSeconds => optional(self.cpu_user_seconds),
            Column::CpuSystemSeconds => optional(self.cpu_system_seconds),
            Column::MemoryPeakMb => optional(self.memory_peak_mb),
            Column::ImageSize => self.image_size.clone(),
            Column::ImageSizeBytes => optional(self.image_size_bytes),
            Column::CacheHits => optional(self.cache_hits),
            Column::CacheTotalSteps => optional(self.cache_total_steps),
            Column::CacheHitRatio => optional(self.cache_hit_ratio),
            Column::ExitCode => self.exit_code.to_string(),
            Column::SourceFile => self.source_file.clone(),
        }
    }
}

/// Categorical fields records can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    CiSystem,
    Tool,
    Service,
    DockerfileType,
    CacheScenario,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::CiSystem => "ci_system",
            Dimension::Tool => "tool",
            Dimension::Service => "service",
            Dimension::DockerfileType => "dockerfile_type",
            Dimension::CacheScenario => "cache_scenario",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric fields statistics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    BuildDurationSeconds,
    CpuPercent,
    CpuUserSeconds,
    CpuSystemSeconds,
    MemoryPeakMb,
    ImageSizeBytes,
    CacheHits,
    CacheTotalSteps,
    CacheHitRatio,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::BuildDurationSeconds => "build_duration_seconds",
            Metric::CpuPercent => "cpu_percent",
            Metric::CpuUserSeconds => "cpu_user_seconds",
            Metric::CpuSystemSeconds => "cpu_system_seconds",
            Metric::MemoryPeakMb => "memory_peak_mb",
            Metric::ImageSizeBytes => "image_size_bytes",
            Metric::CacheHits => "cache_hits",
            Metric::CacheTotalSteps => "cache_total_steps",
            Metric::CacheHitRatio => "cache_hit_ratio",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns of the flat records CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Tool,
    Service,
    DockerfileType,
    CacheScenario,
    RunNumber,
    Timestamp,
    CiSystem,
    BuildDurationSeconds,
    CpuPercent,
    CpuUserSeconds,
    CpuSystemSeconds,
    MemoryPeakMb,
    ImageSize,
    ImageSizeBytes,
    CacheHits,
    CacheTotalSteps,
    CacheHitRatio,
    ExitCode,
    SourceFile,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Tool => "tool",
            Column::Service => "service",
            Column::DockerfileType => "dockerfile_type",
            Column::CacheScenario => "cache_scenario",
            Column::RunNumber => "run_number",
            Column::Timestamp => "timestamp",
            Column::CiSystem => "ci_system",
            Column::BuildDurationSeconds => "build_duration_seconds",
            Column::CpuPercent => "cpu_percent",
            Column::CpuUserSeconds => "cpu_user_seconds",
            Column::CpuSystemSeconds => "cpu_system_seconds",
            Column::MemoryPeakMb => "memory_peak_mb",
            Column::ImageSize => "image_size",
            Column::ImageSizeBytes => "image_size_bytes",
            Column::CacheHits => "cache_hits",
            Column::CacheTotalSteps => "cache_total_steps",
            Column::CacheHitRatio => "cache_hit_ratio",
            Column::ExitCode => "exit_code",
            Column::SourceFile => "source_file",
        }
    }
}

/// Column order of `collect` output.
pub const COLLECT_COLUMNS: &[Column] = &[
    Column::Tool,
    Column::Service,
    Column::DockerfileType,
    Column::CacheScenario,
    Column::RunNumber,
    Column::Timestamp,
    Column::CiSystem,
    Column::BuildDurationSeconds,
    Column::CpuPercent,
    Column::CpuUserSeconds,
    Column::CpuSystemSeconds,
    Column::MemoryPeakMb,
    Column::ImageSize,
    Column::ImageSizeBytes,
    Column::CacheHits,
    Column::CacheTotalSteps,
    Column::CacheHitRatio,
    Column::ExitCode,
];

/// Column order of `merge` output.
pub const MERGE_COLUMNS: &[Column] = &[
    Column::Tool,
    Column::Service,
    Column::DockerfileType,
    Column::CacheScenario,
    Column::RunNumber,
    Column::Timestamp,
    Column::CiSystem,
    Column::BuildDurationSeconds,
    Column::CpuPercent,
    Column::CpuUserSeconds,
    Column::CpuSystemSeconds,
    Column::MemoryPeakMb,
    Column::ImageSize,
    Column::ImageSizeBytes,
    Column::CacheHits,
    Column::CacheTotalSteps,
    Column::CacheHitRatio,
    Column::ExitCode,
    Column::SourceFile,
];

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid(field: &'static str, value: &Value) -> RecordError {
    RecordError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn text(map: &Map<String, Value>, field: &'static str) -> Result<String, RecordError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(invalid(field, other)),
    }
}

fn float(map: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, RecordError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(field, value)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value @ Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
        Some(other) => Err(invalid(field, other)),
    }
}

fn integer(map: &Map<String, Value>, field: &'static str) -> Result<Option<i64>, RecordError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                whole(n.as_f64())
                    .filter(|f| (-I64_BOUND..I64_BOUND).contains(f))
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value @ Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(field, value)),
        Some(other) => Err(invalid(field, other)),
    }
}

fn unsigned(map: &Map<String, Value>, field: &'static str) -> Result<Option<u64>, RecordError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                whole(n.as_f64())
                    .filter(|f| (0.0..U64_BOUND).contains(f))
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value @ Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(field, value)),
        Some(other) => Err(invalid(field, other)),
    }
}

// 2^63 and 2^64; both are exact in f64 and exclusive upper bounds.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

fn whole(value: Option<f64>) -> Option<f64> {
    value.filter(|f| f.is_finite() && f.fract() == 0.0)
}
