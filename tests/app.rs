use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use pfas_screen_pipeline::app::{App, RunSettings};
use pfas_screen_pipeline::chemspider::ChemSpiderClient;
use pfas_screen_pipeline::convert::ObabelClient;
use pfas_screen_pipeline::domain::{Casrn, ChemSpiderLink, Smiles};
use pfas_screen_pipeline::error::PipelineError;
use pfas_screen_pipeline::pipeline::SilentSink;
use pfas_screen_pipeline::workflow::{FukuiData, FukuiResult, WorkflowClient};

#[derive(Default)]
struct MockChemSpider {
    links: BTreeMap<String, String>,
    smiles: BTreeMap<String, String>,
    properties: BTreeMap<String, BTreeMap<String, String>>,
    calls: Mutex<usize>,
}

impl ChemSpiderClient for MockChemSpider {
    fn search_link(&self, casrn: &Casrn) -> Result<ChemSpiderLink, PipelineError> {
        *self.calls.lock().unwrap() += 1;
        self.links
            .get(casrn.as_str())
            .ok_or_else(|| PipelineError::Extraction(format!("no result for {casrn}")))?
            .parse()
    }

    fn fetch_smiles(&self, link: &ChemSpiderLink) -> Result<Smiles, PipelineError> {
        *self.calls.lock().unwrap() += 1;
        self.smiles
            .get(link.as_str())
            .ok_or_else(|| PipelineError::Extraction(format!("no SMILES at {link}")))?
            .parse()
    }

    fn fetch_properties(
        &self,
        link: &ChemSpiderLink,
    ) -> Result<BTreeMap<String, String>, PipelineError> {
        *self.calls.lock().unwrap() += 1;
        self.properties
            .get(link.as_str())
            .cloned()
            .ok_or_else(|| PipelineError::Extraction(format!("no properties at {link}")))
    }
}

struct MockWorkflow {
    values: BTreeMap<String, Vec<f64>>,
}

impl WorkflowClient for MockWorkflow {
    fn fukui(&self, _name: &str, smiles: &Smiles) -> Result<FukuiResult, PipelineError> {
        match self.values.get(smiles.as_str()) {
            Some(values) => Ok(FukuiResult {
                object_status: 2,
                object_data: Some(FukuiData {
                    fukui_positive: values.clone(),
                }),
            }),
            None => Ok(FukuiResult {
                object_status: 0,
                object_data: None,
            }),
        }
    }
}

/// Writes a placeholder output file instead of running the real tool.
struct MockObabel {
    fail_on: Option<String>,
}

impl ObabelClient for MockObabel {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let stem = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        if self.fail_on.as_deref() == Some(stem) {
            return Err(PipelineError::Conversion(format!("mock failure on {stem}")));
        }
        fs::write(output, b"REMARK converted\n")
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    fn tool_version(&self) -> Option<String> {
        Some("mock obabel 3.1.1".to_string())
    }
}

fn settings() -> RunSettings {
    RunSettings {
        checkpoint_interval: 5,
        pause: Duration::ZERO,
        sentinel: "NA".to_string(),
    }
}

fn workdir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

fn write_csv(path: &Utf8Path, content: &str) {
    fs::write(path.as_std_path(), content).unwrap();
}

fn read_rows(path: &Utf8Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path.as_std_path()).unwrap();
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

fn app_with_chemspider(
    chemspider: MockChemSpider,
) -> App<MockChemSpider, MockWorkflow, MockObabel> {
    App::new(
        chemspider,
        MockWorkflow {
            values: BTreeMap::new(),
        },
        MockObabel { fail_on: None },
        settings(),
    )
}

#[test]
fn link_pipeline_checkpoints_and_fills_column() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");

    let mut content = String::from("CASRN,Name\n");
    let mut chemspider = MockChemSpider::default();
    for i in 0..7 {
        let casrn = format!("100{i}-10-{i}");
        content.push_str(&format!("{casrn},mol{i}\n"));
        chemspider.links.insert(
            casrn,
            format!("https://legacy.chemspider.com/Chemical-Structure.{i}.html"),
        );
    }
    write_csv(&input, &content);

    let app = app_with_chemspider(chemspider);
    let summary = app
        .link(&input, &output, "CASRN", "ChemSpider Link", &SilentSink)
        .unwrap();

    // 7 rows at interval 5: one periodic write after row 5, one final.
    assert_eq!(summary.rows, 7);
    assert_eq!(summary.transformed, 7);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.checkpoints, 2);

    let (header, rows) = read_rows(&output);
    assert_eq!(header, ["CASRN", "Name", "ChemSpider Link"]);
    assert_eq!(rows.len(), 7);
    assert_eq!(
        rows[3][2],
        "https://legacy.chemspider.com/Chemical-Structure.3.html"
    );
}

#[test]
fn failed_row_gets_sentinel_without_aborting() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(&input, "CASRN\n1001-10-1\n2002-20-2\n3003-30-3\n");

    let mut chemspider = MockChemSpider::default();
    chemspider
        .links
        .insert("1001-10-1".to_string(), "https://x.test/1".to_string());
    chemspider
        .links
        .insert("3003-30-3".to_string(), "https://x.test/3".to_string());

    let app = app_with_chemspider(chemspider);
    let summary = app
        .link(&input, &output, "CASRN", "ChemSpider Link", &SilentSink)
        .unwrap();
    assert_eq!(summary.transformed, 2);
    assert_eq!(summary.failed, 1);

    let (_, rows) = read_rows(&output);
    assert_eq!(rows[0][1], "https://x.test/1");
    assert_eq!(rows[1][1], "NA");
    assert_eq!(rows[2][1], "https://x.test/3");
}

#[test]
fn malformed_key_is_skipped() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(&input, "CASRN\n1001-10-1\nnot-a-casrn\n");

    let mut chemspider = MockChemSpider::default();
    chemspider
        .links
        .insert("1001-10-1".to_string(), "https://x.test/1".to_string());

    let app = app_with_chemspider(chemspider);
    let summary = app
        .link(&input, &output, "CASRN", "ChemSpider Link", &SilentSink)
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.transformed, 1);

    let (_, rows) = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "NA");
}

#[test]
fn missing_required_column_is_fatal() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(&input, "Name\nPFOA\n");

    let app = app_with_chemspider(MockChemSpider::default());
    let err = app
        .smiles(&input, &output, "ChemSpider Link", &SilentSink)
        .unwrap_err();
    assert_matches!(err, PipelineError::MissingColumn(column) if column == "ChemSpider Link");
    assert!(!output.as_std_path().exists());
}

#[test]
fn smiles_scrape_fills_column() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(
        &input,
        "CASRN,ChemSpider Link\n335-67-1,https://x.test/9554\n",
    );

    let mut chemspider = MockChemSpider::default();
    chemspider.smiles.insert(
        "https://x.test/9554".to_string(),
        "C(=O)(C(C(F)(F)F)(F)F)O".to_string(),
    );

    let app = app_with_chemspider(chemspider);
    let summary = app
        .smiles(&input, &output, "ChemSpider Link", &SilentSink)
        .unwrap();
    assert_eq!(summary.transformed, 1);

    let (header, rows) = read_rows(&output);
    assert_eq!(header, ["CASRN", "ChemSpider Link", "SMILES"]);
    assert_eq!(rows[0][2], "C(=O)(C(C(F)(F)F)(F)F)O");
}

#[test]
fn fixed_properties_reduce_to_numbers() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(&input, "ChemSpider Link\nhttps://x.test/1\n");

    let mut chemspider = MockChemSpider::default();
    chemspider.properties.insert(
        "https://x.test/1".to_string(),
        BTreeMap::from([
            ("Boiling Point".to_string(), "192.4±35.0 °C".to_string()),
            ("Density".to_string(), "1.8±0.1 g/cm3".to_string()),
            ("Unrelated".to_string(), "42".to_string()),
        ]),
    );

    let app = app_with_chemspider(chemspider);
    app.properties(&input, &output, "ChemSpider Link", false, &SilentSink)
        .unwrap();

    let (header, rows) = read_rows(&output);
    // Fixed mode declares all eleven columns regardless of what the page had.
    assert_eq!(header.len(), 1 + 11);
    assert!(!header.contains(&"Unrelated".to_string()));
    let boiling = header.iter().position(|c| c == "Boiling Point").unwrap();
    let density = header.iter().position(|c| c == "Density").unwrap();
    let logp = header.iter().position(|c| c == "ACD/LogP").unwrap();
    assert_eq!(rows[0][boiling], "192.4");
    assert_eq!(rows[0][density], "1.8");
    assert_eq!(rows[0][logp], "NA");
}

#[test]
fn discover_mode_unions_columns_across_rows() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(
        &input,
        "ChemSpider Link\nhttps://x.test/1\nhttps://x.test/2\n",
    );

    let mut chemspider = MockChemSpider::default();
    chemspider.properties.insert(
        "https://x.test/1".to_string(),
        BTreeMap::from([("Flash Point".to_string(), "77.7 °C".to_string())]),
    );
    chemspider.properties.insert(
        "https://x.test/2".to_string(),
        BTreeMap::from([("Molar Volume".to_string(), "230.1 cm3".to_string())]),
    );

    let app = app_with_chemspider(chemspider);
    let summary = app
        .properties(&input, &output, "ChemSpider Link", true, &SilentSink)
        .unwrap();
    // Discover mode buffers everything and writes exactly once.
    assert_eq!(summary.checkpoints, 1);

    let (header, rows) = read_rows(&output);
    assert_eq!(header, ["ChemSpider Link", "Flash Point", "Molar Volume"]);
    assert_eq!(rows[0][1], "77.7");
    assert_eq!(rows[0][2], "NA");
    assert_eq!(rows[1][1], "NA");
    assert_eq!(rows[1][2], "230.1");
}

#[test]
fn fukui_records_highest_value() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let output = root.join("output.csv");
    write_csv(&input, "SMILES\nC(F)(F)F\nFAILME\n");

    let workflow = MockWorkflow {
        values: BTreeMap::from([("C(F)(F)F".to_string(), vec![0.04, 0.27, 0.13])]),
    };
    let app = App::new(
        MockChemSpider::default(),
        workflow,
        MockObabel { fail_on: None },
        settings(),
    );
    let summary = app.fukui(&input, &output, "SMILES", &SilentSink).unwrap();
    assert_eq!(summary.transformed, 1);
    assert_eq!(summary.failed, 1);

    let (header, rows) = read_rows(&output);
    assert_eq!(header, ["SMILES", "F+"]);
    assert_eq!(rows[0][1], "0.27");
    assert_eq!(rows[1][1], "NA");
}

#[test]
fn structures_write_pdb_per_row() {
    let (_dir, root) = workdir();
    let input = root.join("input.csv");
    let out_dir = root.join("structures");
    write_csv(
        &input,
        "Name,SMILES\nTFA,C(=O)(C(F)(F)F)O\nbroken,((((\n",
    );

    let app = app_with_chemspider(MockChemSpider::default());
    let result = app
        .structures(&input, &out_dir, "Name", "SMILES", &SilentSink)
        .unwrap();
    assert_eq!(result.written.len(), 1);
    assert_eq!(result.failed, 1);

    let pdb = out_dir.join("TFA.pdb");
    assert!(pdb.as_std_path().exists());
    let content = fs::read_to_string(pdb.as_std_path()).unwrap();
    assert!(content.starts_with("COMPND"));
    assert!(content.contains("HETATM"));
    assert!(content.trim_end().ends_with("END"));
}

#[test]
fn convert_runs_per_file_and_counts_failures() {
    let (_dir, root) = workdir();
    let in_dir = root.join("pdb");
    let out_dir = root.join("pdbqt");
    fs::create_dir_all(in_dir.as_std_path()).unwrap();
    for name in ["a.pdb", "b.pdb", "notes.txt"] {
        fs::write(in_dir.join(name).as_std_path(), b"HETATM\n").unwrap();
    }

    let app = App::new(
        MockChemSpider::default(),
        MockWorkflow {
            values: BTreeMap::new(),
        },
        MockObabel {
            fail_on: Some("b".to_string()),
        },
        settings(),
    );
    let result = app.convert(&in_dir, &out_dir, &SilentSink).unwrap();
    assert_eq!(result.converted.len(), 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.tool_version.as_deref(), Some("mock obabel 3.1.1"));
    assert!(out_dir.join("a.pdbqt").as_std_path().exists());
    assert!(!out_dir.join("b.pdbqt").as_std_path().exists());
    assert!(!out_dir.join("notes.pdbqt").as_std_path().exists());
}

#[test]
fn mopac_harvest_drops_incomplete_files() {
    let (_dir, root) = workdir();
    let in_dir = root.join("mopac");
    let output = root.join("table.csv");
    fs::create_dir_all(in_dir.as_std_path()).unwrap();
    fs::write(
        in_dir.join("335-67-1.out").as_std_path(),
        "MOLECULAR WEIGHT         =        414.0687\n\
         HOMO LUMO ENERGIES (EV)  =        -11.292   0.676\n",
    )
    .unwrap();
    fs::write(
        in_dir.join("1763-23-1.out").as_std_path(),
        "MOLECULAR WEIGHT         =        500.13\n",
    )
    .unwrap();

    let app = app_with_chemspider(MockChemSpider::default());
    let result = app.mopac(&in_dir, &output, &SilentSink).unwrap();
    assert_eq!(result.rows, 1);

    let (header, rows) = read_rows(&output);
    assert_eq!(header, ["CASRN", "Molecular Weight", "HOMO", "LUMO"]);
    assert_eq!(rows[0], ["335-67-1", "414.0687", "-11.292", "0.676"]);
}
