pub mod aggregate;
pub mod loader;
pub mod record;
pub mod report;
pub mod stats;

pub use aggregate::{
    group_by_variant, group_records, merge_aggregations, sort_records, Aggregation, Overview,
    StatColumn, StatsRow, StatsTable, VariantSummary,
};
pub use loader::{
    discover, discover_patterns, load_file, load_patterns, load_results, ExclusionRules,
    LoadError, LoadOutcome, SearchPlan, SkippedFile, DEFAULT_SEARCH_PATTERNS,
    SECURITY_SCAN_MARKERS,
};
pub use record::{
    BenchmarkRecord, Column, Dimension, Metric, RecordError, COLLECT_COLUMNS, MERGE_COLUMNS,
};
pub use report::{
    generated_at, render_stats_table, render_variant_summary, write_records_csv, write_stats_csv,
    ReportError,
};
pub use stats::{format_value, round_to, Statistic, Summary};
