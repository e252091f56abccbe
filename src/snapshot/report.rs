// results.csv: one row per device that produced an outcome.

use crate::models::{FleetRun, REPORT_COLUMNS};
use anyhow::Context;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub const REPORT_FILE: &str = "results.csv";

/// Fixed columns, then the sorted union of every outcome's extension keys.
pub fn report_columns(run: &FleetRun) -> Vec<String> {
    let extra: BTreeSet<&str> = run
        .outcomes()
        .flat_map(|(_, o)| o.extra.keys().map(String::as_str))
        .filter(|k| !REPORT_COLUMNS.contains(k))
        .collect();
    REPORT_COLUMNS
        .iter()
        .copied()
        .chain(extra)
        .map(str::to_string)
        .collect()
}

/// Write the report; returns the number of data rows.
pub fn write_report_to<W: Write>(writer: W, run: &FleetRun) -> anyhow::Result<usize> {
    let columns = report_columns(run);
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&columns)?;

    let mut rows = 0;
    for (device, result) in &run.results {
        let Some(outcome) = result.outcome() else {
            warn!(device = %device, "no outcome recorded; omitted from report");
            continue;
        };
        let mut record = outcome.report_values();
        record.extend(
            columns[REPORT_COLUMNS.len()..]
                .iter()
                .map(|key| outcome.extra_value(key)),
        );
        csv.write_record(&record)?;
        rows += 1;
    }
    csv.flush()?;
    Ok(rows)
}

pub fn write_report(path: &Path, run: &FleetRun) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating report {}", path.display()))?;
    write_report_to(file, run).with_context(|| format!("writing report {}", path.display()))
}
