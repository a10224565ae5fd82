use anyhow::Context;
use buildstat_core::{
    generated_at, group_by_variant, load_patterns, load_results, merge_aggregations,
    render_stats_table, render_variant_summary, sort_records, write_records_csv, write_stats_csv,
    ExclusionRules, LoadOutcome, Overview, SearchPlan, StatsTable, COLLECT_COLUMNS,
    MERGE_COLUMNS,
};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const NO_RESULTS: &str = "No benchmark results found!";
const MERGED_RECORDS_FILE: &str = "all_benchmark_results.csv";

#[derive(Debug, Parser)]
#[command(author, version, about = "Aggregates container build benchmark results")]
struct BuildstatCli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Flatten every result below a directory into one CSV and print per-variant means
    Collect {
        /// Directory searched recursively for JSON results
        #[arg(long, env = "RESULTS_DIR", default_value = "./results")]
        results_dir: PathBuf,
        /// Destination CSV (defaults to <results-dir>/benchmark_results.csv)
        #[arg(long, env = "OUTPUT_CSV")]
        output: Option<PathBuf>,
        /// Extra filename marker to exclude. Repeat for multiple markers.
        #[arg(long = "exclude", value_name = "MARKER", action = ArgAction::Append)]
        exclude: Vec<String>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Merge results from every CI system and write the statistics tables
    Merge {
        /// Directory the search patterns are resolved against
        #[arg(long, env = "BUILDSTAT_ROOT", default_value = ".")]
        root: PathBuf,
        /// Glob pattern for result files. Repeat for multiple patterns.
        #[arg(long = "pattern", value_name = "GLOB", action = ArgAction::Append)]
        patterns: Vec<String>,
        /// Directory the CSV files are written to
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
        /// YAML search plan (patterns, exclude, output_dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extra filename marker to exclude. Repeat for multiple markers.
        #[arg(long = "exclude", value_name = "MARKER", action = ArgAction::Append)]
        exclude: Vec<String>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = BuildstatCli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Collect {
            results_dir,
            output,
            exclude,
            json,
        } => {
            let output = output.unwrap_or_else(|| results_dir.join("benchmark_results.csv"));
            let rules = ExclusionRules::default().with_markers(&exclude);
            run_collect(&results_dir, &output, &rules, json)?;
        }
        Command::Merge {
            root,
            patterns,
            output_dir,
            config,
            exclude,
            json,
        } => {
            let plan = match config {
                Some(path) => load_search_plan(&path)?,
                None => SearchPlan::default(),
            };
            let patterns = if patterns.is_empty() {
                plan.patterns
            } else {
                patterns
            };
            let output_dir = output_dir
                .or(plan.output_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            let rules = ExclusionRules::default()
                .with_markers(["benchmark"])
                .with_markers(&plan.exclude)
                .with_markers(&exclude);
            run_merge(&root, &patterns, &output_dir, &rules, json)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn load_search_plan(path: &Path) -> anyhow::Result<SearchPlan> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read search plan {}", path.display()))?;
    let plan: SearchPlan = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid search plan {}", path.display()))?;
    debug!(path = %path.display(), patterns = plan.patterns.len(), "loaded search plan");
    Ok(plan)
}

fn run_collect(
    results_dir: &Path,
    output: &Path,
    rules: &ExclusionRules,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        println!("Loading results from: {}", results_dir.display());
    }
    let outcome = load_results(results_dir, rules)?;

    if outcome.is_empty() {
        if json {
            print_empty_json(&outcome, rules)?;
        } else {
            println!("{NO_RESULTS}");
        }
        return Ok(());
    }

    write_records_csv(output, &outcome.records, COLLECT_COLUMNS)
        .with_context(|| format!("failed to export {}", output.display()))?;
    let summary = group_by_variant(&outcome.records);

    if json {
        let payload = json!({
            "generated_at": generated_at(),
            "results_dir": results_dir,
            "output": output,
            "loaded": outcome.records.len(),
            "skipped": outcome.skipped,
            "exclude": rules,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("Loaded {} result files", outcome.records.len());
    print_skipped(&outcome);
    println!(
        "Exported {} results to {}",
        outcome.records.len(),
        output.display()
    );
    println!("\nBENCHMARK SUMMARY");
    println!("{}", render_variant_summary(&summary));

    Ok(())
}

fn run_merge(
    root: &Path,
    patterns: &[String],
    output_dir: &Path,
    rules: &ExclusionRules,
    json: bool,
) -> anyhow::Result<()> {
    let mut outcome = load_patterns(root, patterns, rules)?;

    if outcome.is_empty() {
        if json {
            print_empty_json(&outcome, rules)?;
        } else {
            println!("{NO_RESULTS}");
            println!("Searched in: {}", patterns.join(", "));
        }
        return Ok(());
    }

    sort_records(&mut outcome.records);
    let merged_path = output_dir.join(MERGED_RECORDS_FILE);
    write_records_csv(&merged_path, &outcome.records, MERGE_COLUMNS)
        .with_context(|| format!("failed to write {}", merged_path.display()))?;

    let overview = Overview::from_records(&outcome.records);
    let tables: Vec<StatsTable> = merge_aggregations()
        .iter()
        .map(|aggregation| aggregation.aggregate(&outcome.records))
        .collect();

    let mut written = vec![merged_path.clone()];
    for table in &tables {
        let path = output_dir.join(format!("{}.csv", table.name));
        write_stats_csv(&path, table)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }

    if json {
        let payload = json!({
            "generated_at": generated_at(),
            "root": root,
            "patterns": patterns,
            "loaded": outcome.records.len(),
            "skipped": outcome.skipped,
            "exclude": rules,
            "overview": overview,
            "tables": tables,
            "outputs": written,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!(
        "Merged {} records into {}",
        outcome.records.len(),
        merged_path.display()
    );
    print_skipped(&outcome);
    println!("\n{overview}");

    println!("\n{}", "=".repeat(80));
    println!("STATISTICS BY TOOL & CACHE SCENARIO");
    println!("{}", "=".repeat(80));
    for table in &tables {
        println!("\n{}", table.title);
        println!("{}", render_stats_table(table));
    }

    println!("\nAll statistics saved:");
    for path in &written {
        println!("  - {}", path.display());
    }

    Ok(())
}

fn print_empty_json(outcome: &LoadOutcome, rules: &ExclusionRules) -> anyhow::Result<()> {
    let payload = json!({
        "generated_at": generated_at(),
        "loaded": 0,
        "skipped": outcome.skipped,
        "exclude": rules,
        "message": NO_RESULTS,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn print_skipped(outcome: &LoadOutcome) {
    if outcome.skipped.is_empty() {
        return;
    }
    println!("[warn] skipped {} unreadable file(s):", outcome.skipped.len());
    for skipped in &outcome.skipped {
        println!("  - {}: {}", skipped.path.display(), skipped.reason);
    }
}
