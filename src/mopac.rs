//! Harvest MOPAC `.out` files into a descriptor table.
//!
//! The CASRN is the file stem; molecular weight and the HOMO/LUMO pair are
//! pulled from the output text by pattern. Files missing any of the three
//! values are logged and dropped, so the table only carries complete rows.

use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::warn;

use crate::error::PipelineError;
use crate::table::{Row, Table, Value};

pub const OUTPUT_COLUMNS: [&str; 4] = ["CASRN", "Molecular Weight", "HOMO", "LUMO"];

#[derive(Debug, Clone, PartialEq)]
pub struct MopacRecord {
    pub casrn: String,
    pub molecular_weight: f64,
    pub homo: f64,
    pub lumo: f64,
}

static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MOLECULAR WEIGHT\s*=\s*([\d.]+)").unwrap());
static HOMO_LUMO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HOMO LUMO ENERGIES.*=\s*([-.\d]+)\s+([-.\d]+)").unwrap());

pub fn parse_mopac_output(content: &str) -> Option<(f64, f64, f64)> {
    let mut molecular_weight = None;
    let mut homo_lumo = None;
    for line in content.lines() {
        if let Some(captures) = WEIGHT_RE.captures(line) {
            molecular_weight = captures[1].parse::<f64>().ok();
        }
        if let Some(captures) = HOMO_LUMO_RE.captures(line) {
            let homo = captures[1].parse::<f64>().ok();
            let lumo = captures[2].parse::<f64>().ok();
            if let (Some(homo), Some(lumo)) = (homo, lumo) {
                homo_lumo = Some((homo, lumo));
            }
        }
    }
    let (homo, lumo) = homo_lumo?;
    Some((molecular_weight?, homo, lumo))
}

/// Scan `input_dir` for `*.out` files and collect every complete record,
/// sorted by file name so output order is stable across filesystems.
pub fn harvest_directory(input_dir: &Utf8Path) -> Result<Vec<MopacRecord>, PipelineError> {
    let entries = fs::read_dir(input_dir.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

    let mut out_files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let path = entry.path();
        let is_out = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("out"))
            .unwrap_or(false);
        if path.is_file() && is_out {
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|path| PipelineError::Filesystem(format!("non-UTF8 path: {path:?}")))?;
            out_files.push(path);
        }
    }
    out_files.sort();

    let mut records = Vec::new();
    for path in out_files {
        let Some(casrn) = path.file_stem() else {
            continue;
        };
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        match parse_mopac_output(&content) {
            Some((molecular_weight, homo, lumo)) => records.push(MopacRecord {
                casrn: casrn.to_string(),
                molecular_weight,
                homo,
                lumo,
            }),
            None => {
                warn!(file = %path, "unable to extract all values, dropping file");
            }
        }
    }
    Ok(records)
}

pub fn records_to_table(records: &[MopacRecord]) -> Table {
    let columns = OUTPUT_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    let mut table = Table::new(columns);
    for record in records {
        let mut row = Row::new();
        row.set("CASRN", Value::text(record.casrn.clone()));
        row.set("Molecular Weight", Value::Number(record.molecular_weight));
        row.set("HOMO", Value::Number(record.homo));
        row.set("LUMO", Value::Number(record.lumo));
        table.push_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = "\
          MOLECULAR WEIGHT         =        414.0687\n\
          something else\n\
          HOMO LUMO ENERGIES (EV)  =        -11.292   0.676\n";

    #[test]
    fn parses_complete_output() {
        let (weight, homo, lumo) = parse_mopac_output(COMPLETE).unwrap();
        assert_eq!(weight, 414.0687);
        assert_eq!(homo, -11.292);
        assert_eq!(lumo, 0.676);
    }

    #[test]
    fn incomplete_output_is_rejected() {
        assert!(parse_mopac_output("MOLECULAR WEIGHT = 414.07\n").is_none());
        assert!(parse_mopac_output("HOMO LUMO ENERGIES (EV) = -11.3 0.7\n").is_none());
        assert!(parse_mopac_output("").is_none());
    }

    #[test]
    fn records_render_in_fixed_order() {
        let records = vec![MopacRecord {
            casrn: "335-67-1".to_string(),
            molecular_weight: 414.07,
            homo: -11.292,
            lumo: 0.676,
        }];
        let table = records_to_table(&records);
        assert_eq!(table.columns(), OUTPUT_COLUMNS);
        assert_eq!(table.row_count(), 1);
        assert_eq!(
            table.row(0).unwrap().get("HOMO"),
            Some(&Value::Number(-11.292))
        );
    }
}
