use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::warn;

use crate::domain::KeyKind;
use crate::error::PipelineError;
use crate::table::{Table, Value};

/// One external call per row, producing zero or more derived fields.
///
/// Implementations never see the rest of the table; every failure they
/// return is caught at the row boundary and mapped to the sentinel.
pub trait RowTransform {
    /// Derived column names, in output order. In discover mode this is the
    /// lower bound; columns found on any page are added after buffering.
    fn derived_columns(&self) -> Vec<String>;

    /// Columns the transform reads from each row, validated eagerly.
    fn required_columns(&self) -> Vec<String>;

    fn transform(&self, row: &crate::table::Row) -> Result<BTreeMap<String, Value>, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Column holding the row key (CASRN or ChemSpider link).
    pub key_column: String,
    pub key_kind: KeyKind,
    /// Full-table rewrite after every this many rows.
    pub checkpoint_interval: usize,
    /// Pause after each periodic checkpoint, to stay polite to the endpoint.
    pub pause: Duration,
    pub sentinel: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rows: usize,
    pub transformed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub checkpoints: usize,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn report(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

/// Run `transform` over every row of `table`, merging derived fields under
/// pre-declared column names and checkpointing the whole table every
/// `checkpoint_interval` rows plus once, unconditionally, at the end.
///
/// A row with a missing or malformed key is skipped with a warning; its
/// derived cells stay `Missing` and render as the sentinel. A transform
/// failure is logged with the row key and becomes the sentinel for that
/// row only. Neither aborts the batch.
pub fn run_declared(
    table: &mut Table,
    transform: &dyn RowTransform,
    options: &PipelineOptions,
    output: &Utf8PathBuf,
    sink: &dyn ProgressSink,
) -> Result<RunSummary, PipelineError> {
    let mut required = vec![options.key_column.clone()];
    required.extend(transform.required_columns());
    let required_refs = required.iter().map(String::as_str).collect::<Vec<_>>();
    table.require_columns(&required_refs)?;

    let derived = transform.derived_columns();
    for column in &derived {
        table.ensure_column(column);
    }
    let order = table.columns().to_vec();

    let mut summary = RunSummary {
        rows: table.row_count(),
        transformed: 0,
        failed: 0,
        skipped: 0,
        checkpoints: 0,
        output: output.to_string(),
    };

    for index in 0..table.row_count() {
        match row_key(table, index, options) {
            Some(key) => {
                report(sink, format!("row {index} ({key}): transforming"));
                let result = table
                    .row(index)
                    .map(|row| transform.transform(row))
                    .unwrap_or_else(|| Ok(BTreeMap::new()));
                match result {
                    Ok(fields) => {
                        summary.transformed += 1;
                        for column in &derived {
                            let value = fields.get(column).cloned().unwrap_or(Value::Missing);
                            table.set_cell(index, column, value);
                        }
                    }
                    Err(err) => {
                        warn!(row = index, key = %key, error = %err, "transform failed");
                        report(sink, format!("row {index} ({key}): failed: {err}"));
                        summary.failed += 1;
                        for column in &derived {
                            table.set_cell(index, column, Value::Missing);
                        }
                    }
                }
            }
            None => {
                summary.skipped += 1;
                for column in &derived {
                    table.set_cell(index, column, Value::Missing);
                }
            }
        }

        if (index + 1) % options.checkpoint_interval == 0 && index + 1 < table.row_count() {
            table.write_csv(output, &order, &options.sentinel)?;
            summary.checkpoints += 1;
            report(
                sink,
                format!("checkpoint after {} rows -> {output}", index + 1),
            );
            thread::sleep(options.pause);
        }
    }

    table.write_csv(output, &order, &options.sentinel)?;
    summary.checkpoints += 1;
    report(
        sink,
        format!("final write of {} rows -> {output}", table.row_count()),
    );
    Ok(summary)
}

/// Two-pass variant: buffer every row's derived mapping, compute the sorted
/// union of discovered column names, then emit once.
///
/// Nothing can be written before the full column set is known, so this mode
/// never checkpoints mid-run and holds all results in memory.
pub fn run_discover(
    table: &mut Table,
    transform: &dyn RowTransform,
    options: &PipelineOptions,
    output: &Utf8PathBuf,
    sink: &dyn ProgressSink,
) -> Result<RunSummary, PipelineError> {
    let mut required = vec![options.key_column.clone()];
    required.extend(transform.required_columns());
    let required_refs = required.iter().map(String::as_str).collect::<Vec<_>>();
    table.require_columns(&required_refs)?;

    let base_order = table.columns().to_vec();
    let mut summary = RunSummary {
        rows: table.row_count(),
        transformed: 0,
        failed: 0,
        skipped: 0,
        checkpoints: 0,
        output: output.to_string(),
    };

    let mut buffered: Vec<Option<BTreeMap<String, Value>>> = Vec::with_capacity(table.row_count());
    let mut discovered = BTreeSet::new();

    for index in 0..table.row_count() {
        match row_key(table, index, options) {
            Some(key) => {
                report(sink, format!("row {index} ({key}): transforming"));
                let result = table
                    .row(index)
                    .map(|row| transform.transform(row))
                    .unwrap_or_else(|| Ok(BTreeMap::new()));
                match result {
                    Ok(fields) => {
                        summary.transformed += 1;
                        discovered.extend(fields.keys().cloned());
                        buffered.push(Some(fields));
                    }
                    Err(err) => {
                        warn!(row = index, key = %key, error = %err, "transform failed");
                        report(sink, format!("row {index} ({key}): failed: {err}"));
                        summary.failed += 1;
                        buffered.push(None);
                    }
                }
            }
            None => {
                summary.skipped += 1;
                buffered.push(None);
            }
        }
    }

    let mut order = base_order;
    for column in &discovered {
        if !order.iter().any(|existing| existing == column) {
            order.push(column.clone());
        }
    }

    for (index, fields) in buffered.into_iter().enumerate() {
        let fields = fields.unwrap_or_default();
        for column in &discovered {
            let value = fields.get(column).cloned().unwrap_or(Value::Missing);
            table.set_cell(index, column, value);
        }
    }

    table.write_csv(output, &order, &options.sentinel)?;
    summary.checkpoints += 1;
    report(
        sink,
        format!("final write of {} rows -> {output}", table.row_count()),
    );
    Ok(summary)
}

/// The row key, or `None` (with a warning) when the key cell is blank or
/// fails validation for the pipeline's key kind.
fn row_key(table: &Table, index: usize, options: &PipelineOptions) -> Option<String> {
    let raw = table
        .row(index)
        .and_then(|row| row.text(&options.key_column))
        .map(str::to_string);
    let Some(raw) = raw else {
        warn!(row = index, column = %options.key_column, "row key missing, skipping");
        return None;
    };
    if let Err(err) = options.key_kind.validate(&raw) {
        warn!(row = index, key = %raw, error = %err, "row key malformed, skipping");
        return None;
    }
    Some(raw)
}

/// Sink for runs where progress output is suppressed.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn event(&self, _event: ProgressEvent) {}
}
