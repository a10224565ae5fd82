use crate::record::{BenchmarkRecord, Dimension, Metric};
use crate::stats::{Statistic, Summary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatColumn {
    pub metric: Metric,
    pub statistic: Statistic,
    /// Display name overriding `<metric>_<statistic>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl StatColumn {
    pub fn new(metric: Metric, statistic: Statistic) -> Self {
        Self {
            metric,
            statistic,
            label: None,
        }
    }

    pub fn labeled(metric: Metric, statistic: Statistic, label: impl Into<String>) -> Self {
        Self {
            metric,
            statistic,
            label: Some(label.into()),
        }
    }

    pub fn header(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{}_{}", self.metric, self.statistic),
        }
    }
}

/// A group-by over records with a fixed set of statistic columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// File stem the table is written under.
    pub name: String,
    pub title: String,
    pub group_by: Vec<Dimension>,
    pub columns: Vec<StatColumn>,
    /// Decimal places used when the table is rendered.
    pub precision: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub key: Vec<String>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsTable {
    pub name: String,
    pub title: String,
    pub group_by: Vec<Dimension>,
    pub columns: Vec<StatColumn>,
    pub precision: u32,
    pub rows: Vec<StatsRow>,
}

impl StatsTable {
    pub fn headers(&self) -> Vec<String> {
        self.group_by
            .iter()
            .map(|dimension| dimension.as_str().to_string())
            .chain(self.columns.iter().map(StatColumn::header))
            .collect()
    }
}

impl Aggregation {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        group_by: &[Dimension],
        columns: Vec<StatColumn>,
        precision: u32,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            group_by: group_by.to_vec(),
            columns,
            precision,
        }
    }

    pub fn aggregate(&self, records: &[BenchmarkRecord]) -> StatsTable {
        let groups = group_records(records, &self.group_by);

        let rows = groups
            .into_iter()
            .map(|(key, members)| {
                let mut summaries: HashMap<Metric, Summary> = HashMap::new();
                let values = self
                    .columns
                    .iter()
                    .map(|column| {
                        summaries
                            .entry(column.metric)
                            .or_insert_with(|| summarize(&members, column.metric))
                            .get(column.statistic)
                    })
                    .collect();
                StatsRow { key, values }
            })
            .collect();

        StatsTable {
            name: self.name.clone(),
            title: self.title.clone(),
            group_by: self.group_by.clone(),
            columns: self.columns.clone(),
            precision: self.precision,
            rows,
        }
    }
}

/// Groups records by the given dimensions. Keys are ordered and each
/// group keeps its records in input order.
pub fn group_records<'a>(
    records: &'a [BenchmarkRecord],
    group_by: &[Dimension],
) -> BTreeMap<Vec<String>, Vec<&'a BenchmarkRecord>> {
    let mut groups: BTreeMap<Vec<String>, Vec<&BenchmarkRecord>> = BTreeMap::new();
    for record in records {
        let key = group_by
            .iter()
            .map(|dimension| record.group_value(*dimension).to_string())
            .collect();
        groups.entry(key).or_default().push(record);
    }
    groups
}

pub fn summarize(records: &[&BenchmarkRecord], metric: Metric) -> Summary {
    let values: Vec<f64> = records.iter().filter_map(|r| r.metric(metric)).collect();
    Summary::from_values(&values)
}

const CI_TOOL_SCENARIO: &[Dimension] = &[
    Dimension::CiSystem,
    Dimension::Tool,
    Dimension::CacheScenario,
];

const VARIANT: &[Dimension] = &[
    Dimension::Tool,
    Dimension::Service,
    Dimension::DockerfileType,
    Dimension::CacheScenario,
];

fn spread(metric: Metric) -> Vec<StatColumn> {
    [Statistic::Mean, Statistic::Std, Statistic::Min, Statistic::Max]
        .into_iter()
        .map(|statistic| StatColumn::new(metric, statistic))
        .collect()
}

/// The reports produced by `merge`, in output order.
pub fn merge_aggregations() -> Vec<Aggregation> {
    let mut duration = spread(Metric::BuildDurationSeconds);
    duration.push(StatColumn::new(Metric::BuildDurationSeconds, Statistic::Count));

    let mut cache = spread(Metric::CacheHitRatio);
    cache.push(StatColumn::new(Metric::CacheHits, Statistic::Mean));
    cache.push(StatColumn::new(Metric::CacheTotalSteps, Statistic::Mean));

    vec![
        Aggregation::new(
            "stats_build_duration",
            "BUILD DURATION (seconds)",
            CI_TOOL_SCENARIO,
            duration,
            2,
        ),
        Aggregation::new(
            "stats_image_size",
            "IMAGE SIZE (bytes)",
            &[Dimension::Tool, Dimension::Service, Dimension::DockerfileType],
            [Statistic::Mean, Statistic::Min, Statistic::Max]
                .into_iter()
                .map(|statistic| StatColumn::new(Metric::ImageSizeBytes, statistic))
                .collect(),
            0,
        ),
        Aggregation::new(
            "stats_memory",
            "PEAK MEMORY USAGE (MB)",
            CI_TOOL_SCENARIO,
            spread(Metric::MemoryPeakMb),
            2,
        ),
        Aggregation::new(
            "stats_cpu",
            "CPU USAGE (%)",
            CI_TOOL_SCENARIO,
            spread(Metric::CpuPercent),
            2,
        ),
        Aggregation::new("stats_cache", "CACHE HIT RATIO", CI_TOOL_SCENARIO, cache, 4),
        Aggregation::new(
            "thesis_summary_table",
            "SUMMARY TABLE",
            CI_TOOL_SCENARIO,
            vec![
                StatColumn::labeled(Metric::BuildDurationSeconds, Statistic::Mean, "Duration (s)"),
                StatColumn::labeled(Metric::MemoryPeakMb, Statistic::Mean, "Memory (MB)"),
                StatColumn::labeled(Metric::CpuPercent, Statistic::Mean, "CPU (%)"),
                StatColumn::labeled(Metric::ImageSizeBytes, Statistic::First, "Image Size (bytes)"),
                StatColumn::labeled(Metric::CacheHitRatio, Statistic::Mean, "Cache Hit Ratio"),
            ],
            2,
        ),
    ]
}

/// One line of the `collect` console summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub tool: String,
    pub service: String,
    pub dockerfile_type: String,
    pub cache_scenario: String,
    pub duration_mean: Option<f64>,
    pub cpu_mean: Option<f64>,
    pub memory_mean: Option<f64>,
    pub cache_hit_ratio_mean: Option<f64>,
    pub runs: usize,
}

/// Per-variant means over the runs that recorded a build duration.
pub fn group_by_variant(records: &[BenchmarkRecord]) -> Vec<VariantSummary> {
    let timed: Vec<BenchmarkRecord> = records
        .iter()
        .filter(|record| record.build_duration_seconds.is_some())
        .cloned()
        .collect();

    group_records(&timed, VARIANT)
        .into_iter()
        .map(|(key, members)| {
            let mut key = key.into_iter();
            let mut next = || key.next().unwrap_or_default();
            VariantSummary {
                tool: next(),
                service: next(),
                dockerfile_type: next(),
                cache_scenario: next(),
                duration_mean: summarize(&members, Metric::BuildDurationSeconds).mean,
                cpu_mean: summarize(&members, Metric::CpuPercent).mean,
                memory_mean: summarize(&members, Metric::MemoryPeakMb).mean,
                cache_hit_ratio_mean: summarize(&members, Metric::CacheHitRatio).mean,
                runs: members.len(),
            }
        })
        .collect()
}

/// Orders records by CI system, tool, service, dockerfile type, cache
/// scenario and run number.
pub fn sort_records(records: &mut [BenchmarkRecord]) {
    records.sort_by(|a, b| {
        (
            &a.ci_system,
            &a.tool,
            &a.service,
            &a.dockerfile_type,
            &a.cache_scenario,
            a.run_number,
        )
            .cmp(&(
                &b.ci_system,
                &b.tool,
                &b.service,
                &b.dockerfile_type,
                &b.cache_scenario,
                b.run_number,
            ))
    });
}

/// Distinct values seen across a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub ci_systems: Vec<String>,
    pub tools: Vec<String>,
    pub services: Vec<String>,
    pub cache_scenarios: Vec<String>,
    pub run_numbers: Vec<i64>,
    pub total: usize,
}

impl Overview {
    pub fn from_records(records: &[BenchmarkRecord]) -> Self {
        let mut overview = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut runs = BTreeSet::new();

        for record in records {
            push_unique(&mut overview.ci_systems, &record.ci_system);
            push_unique(&mut overview.tools, &record.tool);
            push_unique(&mut overview.services, &record.service);
            push_unique(&mut overview.cache_scenarios, &record.cache_scenario);
            if let Some(run) = record.run_number {
                runs.insert(run);
            }
        }

        overview.run_numbers = runs.into_iter().collect();
        overview
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  CI Systems: {}", self.ci_systems.join(", "))?;
        writeln!(f, "  Tools: {}", self.tools.join(", "))?;
        writeln!(f, "  Services: {}", self.services.join(", "))?;
        writeln!(f, "  Cache Scenarios: {}", self.cache_scenarios.join(", "))?;
        let runs: Vec<String> = self.run_numbers.iter().map(i64::to_string).collect();
        writeln!(f, "  Run Numbers: {}", runs.join(", "))?;
        write!(f, "  Total Records: {}", self.total)
    }
}
