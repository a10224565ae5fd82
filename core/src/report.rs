use crate::aggregate::{StatsTable, VariantSummary};
use crate::record::{BenchmarkRecord, Column};
use crate::stats::{format_value, Statistic};
use comfy_table::{presets::ASCII_FULL, Table};
use std::fs;
use std::path::{Path, PathBuf};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to flush {path:?}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn generated_at() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>, ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    csv::Writer::from_path(path).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

fn finish(mut writer: csv::Writer<fs::File>, path: &Path) -> Result<(), ReportError> {
    writer.flush().map_err(|source| ReportError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes one row per record with the given column order.
pub fn write_records_csv(
    path: &Path,
    records: &[BenchmarkRecord],
    columns: &[Column],
) -> Result<(), ReportError> {
    let mut writer = create_writer(path)?;
    let csv_err = |source: csv::Error| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    writer
        .write_record(columns.iter().map(Column::as_str))
        .map_err(csv_err)?;
    for record in records {
        writer
            .write_record(columns.iter().map(|column| record.field_text(*column)))
            .map_err(csv_err)?;
    }
    finish(writer, path)?;

    info!(path = %path.display(), records = records.len(), "wrote records csv");
    Ok(())
}

pub fn write_stats_csv(path: &Path, table: &StatsTable) -> Result<(), ReportError> {
    let mut writer = create_writer(path)?;
    let csv_err = |source: csv::Error| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    writer.write_record(table.headers()).map_err(csv_err)?;
    for row in stats_cells(table) {
        writer.write_record(row).map_err(csv_err)?;
    }
    finish(writer, path)?;

    info!(path = %path.display(), groups = table.rows.len(), "wrote statistics csv");
    Ok(())
}

fn stats_cells(table: &StatsTable) -> Vec<Vec<String>> {
    table
        .rows
        .iter()
        .map(|row| {
            row.key
                .iter()
                .cloned()
                .chain(row.values.iter().zip(&table.columns).map(|(value, column)| {
                    let places = match column.statistic {
                        Statistic::Count => 0,
                        _ => table.precision,
                    };
                    format_value(*value, places)
                }))
                .collect()
        })
        .collect()
}

pub fn render_stats_table(table: &StatsTable) -> String {
    let mut display = Table::new();
    display.load_preset(ASCII_FULL);
    display.set_header(table.headers());
    for row in stats_cells(table) {
        display.add_row(row);
    }
    display.to_string()
}

pub fn render_variant_summary(rows: &[VariantSummary]) -> String {
    let mut display = Table::new();
    display.load_preset(ASCII_FULL);
    display.set_header(vec![
        "Tool", "Service", "Type", "Scenario", "Duration", "CPU%", "MemMB", "Cache", "N",
    ]);

    for row in rows {
        display.add_row(vec![
            row.tool.clone(),
            row.service.clone(),
            row.dockerfile_type.clone(),
            row.cache_scenario.clone(),
            format_value(Some(row.duration_mean.unwrap_or(0.0)), 2),
            format_value(Some(row.cpu_mean.unwrap_or(0.0)), 1),
            format_value(Some(row.memory_mean.unwrap_or(0.0)), 1),
            format_value(Some(row.cache_hit_ratio_mean.unwrap_or(0.0)), 4),
            row.runs.to_string(),
        ]);
    }

    display.to_string()
}
