use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn buildstat() -> Command {
    let mut cmd = Command::cargo_bin("buildstat").expect("binary built");
    cmd.env_remove("RESULTS_DIR")
        .env_remove("OUTPUT_CSV")
        .env_remove("OUTPUT_DIR")
        .env_remove("BUILDSTAT_ROOT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(path, contents).expect("write fixture");
}

fn result_json(ci: &str, tool: &str, scenario: &str, run: u32, duration: f64) -> String {
    format!(
        r#"{{
  "tool": "{tool}",
  "service": "service-go",
  "dockerfile_type": "multistage",
  "cache_scenario": "{scenario}",
  "run_number": {run},
  "timestamp": "2025-03-0{run}T12:00:00Z",
  "ci_system": "{ci}",
  "exit_code": 0,
  "performance": {{
    "build_duration_seconds": {duration},
    "cpu_percent": 75.5,
    "memory_peak_mb": 256,
    "image_size": "12MB",
    "image_size_bytes": 12582912,
    "cache_hits": 3,
    "cache_total_steps": 6,
    "cache_hit_ratio": 0.5
  }}
}}"#
    )
}

#[test]
fn collect_writes_csv_and_prints_summary() {
    let dir = TempDir::new().expect("tempdir");
    let results = dir.path().join("results");
    write_file(&results, "kaniko/run1.json", &result_json("github", "kaniko", "cold", 1, 40.0));
    write_file(&results, "kaniko/run2.json", &result_json("github", "kaniko", "cold", 2, 44.0));
    write_file(&results, "trivy-kaniko.json", "{ \"Results\": [] }");
    write_file(&results, "broken.json", "{");

    buildstat()
        .arg("collect")
        .arg("--results-dir")
        .arg(&results)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 result files"))
        .stdout(predicate::str::contains("42.00"))
        .stdout(predicate::str::contains("broken.json"));

    let csv = fs::read_to_string(results.join("benchmark_results.csv")).expect("csv written");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some(
            "tool,service,dockerfile_type,cache_scenario,run_number,timestamp,ci_system,\
build_duration_seconds,cpu_percent,cpu_user_seconds,cpu_system_seconds,memory_peak_mb,\
image_size,image_size_bytes,cache_hits,cache_total_steps,cache_hit_ratio,exit_code"
        )
    );
    assert_eq!(
        lines.next(),
        Some("kaniko,service-go,multistage,cold,1,2025-03-01T12:00:00Z,github,40,75.5,,,256,12MB,12582912,3,6,0.5,0")
    );
    assert_eq!(lines.count(), 1);
    assert!(!csv.contains("trivy"));
}

#[test]
fn collect_reads_paths_from_environment() {
    let dir = TempDir::new().expect("tempdir");
    let results = dir.path().join("bench");
    let output = dir.path().join("out/summary.csv");
    write_file(&results, "run1.json", &result_json("gitlab", "buildah", "warm", 1, 12.5));

    buildstat()
        .arg("collect")
        .env("RESULTS_DIR", &results)
        .env("OUTPUT_CSV", &output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 results"));

    assert!(output.exists(), "expected csv at {:?}", output);
}

#[test]
fn empty_directory_reports_no_results() {
    let dir = TempDir::new().expect("tempdir");

    buildstat()
        .arg("collect")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No benchmark results found!"));

    assert!(!dir.path().join("benchmark_results.csv").exists());
}

#[test]
fn merge_writes_every_statistics_file() {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    write_file(root, "results-github/kaniko/run1.json", &result_json("github", "kaniko", "cold", 1, 10.0));
    write_file(root, "results-github/kaniko/run2.json", &result_json("github", "kaniko", "cold", 2, 14.0));
    write_file(root, "results-gitlab/buildkit/run1.json", &result_json("gitlab", "buildkit", "warm", 1, 6.0));
    write_file(root, "results-github/kaniko/sbom-kaniko.json", "{}");
    write_file(root, "final-results/benchmark_index.json", &result_json("github", "ghost", "cold", 9, 1.0));

    let out = root.join("stats");
    buildstat()
        .current_dir(root)
        .arg("merge")
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 3 records"))
        .stdout(predicate::str::contains("BUILD DURATION (seconds)"))
        .stdout(predicate::str::contains("Total Records: 3"));

    for name in [
        "all_benchmark_results.csv",
        "stats_build_duration.csv",
        "stats_image_size.csv",
        "stats_memory.csv",
        "stats_cpu.csv",
        "stats_cache.csv",
        "thesis_summary_table.csv",
    ] {
        assert!(out.join(name).exists(), "missing {name}");
    }

    let merged = fs::read_to_string(out.join("all_benchmark_results.csv")).expect("merged csv");
    assert!(!merged.contains("ghost"));
    let rows: Vec<&str> = merged.lines().skip(1).collect();
    assert!(rows[0].starts_with("kaniko,service-go,multistage,cold,1,"));
    assert!(rows[0].ends_with(",run1.json"));
    assert!(rows[2].starts_with("buildkit,"));

    let duration = fs::read_to_string(out.join("stats_build_duration.csv")).expect("duration csv");
    assert!(duration.contains("github,kaniko,cold,12.00,2.83,10.00,14.00,2"));
}

#[test]
fn merge_uses_search_plan_file() {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    write_file(root, "runs/a/one.json", &result_json("github", "kaniko", "cold", 1, 10.0));
    write_file(root, "runs/a/draft-two.json", &result_json("github", "kaniko", "cold", 2, 99.0));
    write_file(
        root,
        "plan.yaml",
        "patterns:\n  - \"runs/*/*.json\"\nexclude:\n  - draft\noutput_dir: planned\n",
    );

    let output = buildstat()
        .current_dir(root)
        .args(["merge", "--json", "--config", "plan.yaml"])
        .output()
        .expect("spawn merge");
    assert!(
        output.status.success(),
        "merge failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json payload");
    assert_eq!(payload["loaded"], 1);
    assert_eq!(payload["overview"]["tools"][0], "kaniko");
    assert_eq!(payload["tables"].as_array().map(Vec::len), Some(6));
    assert!(root.join("planned/thesis_summary_table.csv").exists());
}

#[test]
fn merge_rejects_invalid_pattern() {
    let dir = TempDir::new().expect("tempdir");

    buildstat()
        .current_dir(dir.path())
        .args(["merge", "--pattern", "results/[.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid glob pattern"));
}

#[test]
fn merge_flags_override_search_plan() {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    write_file(root, "runs/a/one.json", &result_json("github", "kaniko", "cold", 1, 10.0));
    write_file(root, "picked/two.json", &result_json("gitlab", "buildah", "warm", 2, 20.0));
    write_file(root, "picked/draft-three.json", &result_json("gitlab", "buildah", "warm", 3, 30.0));
    write_file(root, "picked/nightly-four.json", &result_json("gitlab", "buildah", "warm", 4, 40.0));
    write_file(
        root,
        "plan.yaml",
        "patterns:\n  - \"runs/*/*.json\"\nexclude:\n  - draft\noutput_dir: planned\n",
    );

    let output = buildstat()
        .current_dir(root)
        .args(["merge", "--json", "--config", "plan.yaml"])
        .args(["--pattern", "picked/*.json"])
        .args(["--output-dir", "flagged"])
        .args(["--exclude", "nightly"])
        .output()
        .expect("spawn merge");
    assert!(
        output.status.success(),
        "merge failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json payload");
    assert_eq!(payload["loaded"], 1);
    assert_eq!(payload["overview"]["tools"][0], "buildah");
    assert_eq!(payload["patterns"][0], "picked/*.json");
    let markers: Vec<&str> = payload["exclude"]
        .as_array()
        .expect("marker list")
        .iter()
        .filter_map(|m| m.as_str())
        .collect();
    assert!(markers.contains(&"draft"));
    assert!(markers.contains(&"nightly"));
    assert!(markers.contains(&"benchmark"));

    assert!(root.join("flagged/all_benchmark_results.csv").exists());
    assert!(!root.join("planned").exists());
}

#[test]
fn collect_honours_extra_exclusions() {
    let dir = TempDir::new().expect("tempdir");
    let results = dir.path().join("results");
    write_file(&results, "run1.json", &result_json("github", "kaniko", "cold", 1, 40.0));
    write_file(&results, "warmup-run0.json", &result_json("github", "kaniko", "cold", 2, 400.0));

    buildstat()
        .arg("collect")
        .arg("--results-dir")
        .arg(&results)
        .args(["--exclude", "WARMUP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 1 result files"))
        .stdout(predicate::str::contains("40.00"));

    let csv = fs::read_to_string(results.join("benchmark_results.csv")).expect("csv written");
    assert_eq!(csv.lines().count(), 2);
    assert!(!csv.contains(",400,"));
}

#[test]
fn merge_reads_root_and_output_from_environment() {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path().join("repo");
    let out = dir.path().join("report");
    write_file(&root, "results/run1.json", &result_json("github", "kaniko", "cold", 1, 10.0));

    buildstat()
        .current_dir(dir.path())
        .arg("merge")
        .env("BUILDSTAT_ROOT", &root)
        .env("OUTPUT_DIR", &out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 1 records"));

    assert!(out.join("all_benchmark_results.csv").exists());
    assert!(out.join("stats_cache.csv").exists());
    assert!(!dir.path().join("all_benchmark_results.csv").exists());
}
