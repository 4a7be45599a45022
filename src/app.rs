use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::warn;

use crate::chem::embed;
use crate::chem::optimize::{OptimizeConfig, optimize_geometry};
use crate::chem::pdbfile;
use crate::chem::smiles::parse_smiles;
use crate::chemspider::{ChemSpiderClient, FIXED_PROPERTIES};
use crate::config::ResolvedConfig;
use crate::convert::ObabelClient;
use crate::domain::{Casrn, ChemSpiderLink, KeyKind, Smiles};
use crate::error::PipelineError;
use crate::extract;
use crate::mopac;
use crate::pipeline::{
    PipelineOptions, ProgressEvent, ProgressSink, RowTransform, RunSummary, run_declared,
    run_discover,
};
use crate::table::{Row, Table, Value};
use crate::workflow::WorkflowClient;

pub const DEFAULT_KEY_COLUMN: &str = "CASRN";
pub const DEFAULT_LINK_COLUMN: &str = "ChemSpider Link";
pub const DEFAULT_SMILES_COLUMN: &str = "SMILES";
pub const DEFAULT_NAME_COLUMN: &str = "Name";
pub const FUKUI_COLUMN: &str = "F+";

/// Engine settings shared by every table operation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub checkpoint_interval: usize,
    pub pause: Duration,
    pub sentinel: String,
}

impl From<&ResolvedConfig> for RunSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval,
            pause: config.pause,
            sentinel: config.sentinel.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuresResult {
    pub written: Vec<String>,
    pub failed: usize,
    pub skipped: usize,
    pub out_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResult {
    pub converted: Vec<String>,
    pub failed: usize,
    pub out_dir: String,
    pub tool_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MopacResult {
    pub rows: usize,
    pub output: String,
}

/// The operations, generic over the service clients so tests inject mocks.
pub struct App<C: ChemSpiderClient, W: WorkflowClient, B: ObabelClient> {
    chemspider: C,
    workflow: W,
    obabel: B,
    settings: RunSettings,
}

impl<C: ChemSpiderClient, W: WorkflowClient, B: ObabelClient> App<C, W, B> {
    pub fn new(chemspider: C, workflow: W, obabel: B, settings: RunSettings) -> Self {
        Self {
            chemspider,
            workflow,
            obabel,
            settings,
        }
    }

    fn pipeline_options(&self, key_column: &str, key_kind: KeyKind) -> PipelineOptions {
        PipelineOptions {
            key_column: key_column.to_string(),
            key_kind,
            checkpoint_interval: self.settings.checkpoint_interval,
            pause: self.settings.pause,
            sentinel: self.settings.sentinel.clone(),
        }
    }

    /// Resolve each row's CASRN to a ChemSpider record link.
    pub fn link(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        key_column: &str,
        link_column: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut table = Table::load_csv(input)?;
        let transform = LinkLookupTransform {
            client: &self.chemspider,
            key_column: key_column.to_string(),
            link_column: link_column.to_string(),
        };
        run_declared(
            &mut table,
            &transform,
            &self.pipeline_options(key_column, KeyKind::Casrn),
            &output.to_path_buf(),
            sink,
        )
    }

    /// Scrape the SMILES string from each row's record page.
    pub fn smiles(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        link_column: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut table = Table::load_csv(input)?;
        let transform = SmilesScrapeTransform {
            client: &self.chemspider,
            link_column: link_column.to_string(),
        };
        run_declared(
            &mut table,
            &transform,
            &self.pipeline_options(link_column, KeyKind::Link),
            &output.to_path_buf(),
            sink,
        )
    }

    /// Scrape chemical descriptors from each row's record page. Fixed mode
    /// keeps the declared eleven columns; discover mode buffers all rows
    /// and emits the sorted union of every property found.
    pub fn properties(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        link_column: &str,
        discover: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut table = Table::load_csv(input)?;
        let options = self.pipeline_options(link_column, KeyKind::Link);
        let output = output.to_path_buf();
        if discover {
            let transform = PropertiesDiscoverTransform {
                client: &self.chemspider,
                link_column: link_column.to_string(),
            };
            run_discover(&mut table, &transform, &options, &output, sink)
        } else {
            let transform = PropertiesFixedTransform {
                client: &self.chemspider,
                link_column: link_column.to_string(),
            };
            run_declared(&mut table, &transform, &options, &output, sink)
        }
    }

    /// Submit each row's SMILES to the workflow service and record the
    /// highest condensed Fukui f(+) value.
    pub fn fukui(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        smiles_column: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut table = Table::load_csv(input)?;
        let transform = FukuiTransform {
            client: &self.workflow,
            smiles_column: smiles_column.to_string(),
        };
        run_declared(
            &mut table,
            &transform,
            &self.pipeline_options(smiles_column, KeyKind::Smiles),
            &output.to_path_buf(),
            sink,
        )
    }

    /// Embed and optimize a 3D structure for every row, writing one
    /// `{Name}.pdb` per molecule. Rows that fail any stage are skipped;
    /// there is no table output to carry a sentinel.
    pub fn structures(
        &self,
        input: &Utf8Path,
        out_dir: &Utf8Path,
        name_column: &str,
        smiles_column: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StructuresResult, PipelineError> {
        let table = Table::load_csv(input)?;
        table.require_columns(&[name_column, smiles_column])?;
        fs::create_dir_all(out_dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        let mut result = StructuresResult {
            written: Vec::new(),
            failed: 0,
            skipped: 0,
            out_dir: out_dir.to_string(),
        };

        for (index, row) in table.rows().iter().enumerate() {
            let (Some(name), Some(raw_smiles)) =
                (row.text(name_column), row.text(smiles_column))
            else {
                warn!(row = index, "name or SMILES missing, skipping");
                result.skipped += 1;
                continue;
            };
            report(sink, format!("row {index} ({name}): building structure"));
            match self.build_structure(name, raw_smiles, out_dir) {
                Ok(path) => result.written.push(path.to_string()),
                Err(err) => {
                    warn!(row = index, name = %name, error = %err, "structure generation failed");
                    report(sink, format!("row {index} ({name}): failed: {err}"));
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    fn build_structure(
        &self,
        name: &str,
        raw_smiles: &str,
        out_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let smiles = Smiles::sanitized(raw_smiles)?;
        let mol = parse_smiles(&smiles, name)?.with_explicit_hydrogens();
        let coords = embed::embed_molecule(&mol, embed::DEFAULT_SEED)?;
        let optimized = optimize_geometry(&mol, &coords, &OptimizeConfig::default())?;
        let path = out_dir.join(format!("{name}.pdb"));
        pdbfile::write_pdb(&mol, &optimized.coordinates, &path)?;
        Ok(path)
    }

    /// Convert every `.pdb` in `input_dir` to a `.pdbqt` in `out_dir` via
    /// the external converter. Per-file failures are logged and counted.
    pub fn convert(
        &self,
        input_dir: &Utf8Path,
        out_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertResult, PipelineError> {
        fs::create_dir_all(out_dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        let mut inputs = Vec::new();
        let entries = fs::read_dir(input_dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let path = entry.path();
            let is_pdb = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdb"))
                .unwrap_or(false);
            if path.is_file() && is_pdb {
                let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
                    PipelineError::Filesystem(format!("non-UTF8 path: {path:?}"))
                })?;
                inputs.push(path);
            }
        }
        inputs.sort();

        let tool_version = self.obabel.tool_version();
        if let Some(version) = &tool_version {
            report(sink, format!("using {version}"));
        }
        let mut result = ConvertResult {
            converted: Vec::new(),
            failed: 0,
            out_dir: out_dir.to_string(),
            tool_version,
        };
        for input in inputs {
            let Some(stem) = input.file_stem() else {
                continue;
            };
            let output = out_dir.join(format!("{stem}.pdbqt"));
            report(sink, format!("converting {input} -> {output}"));
            match self.obabel.convert(input.as_std_path(), output.as_std_path()) {
                Ok(()) => result.converted.push(output.to_string()),
                Err(err) => {
                    warn!(file = %input, error = %err, "conversion failed");
                    report(sink, format!("{input}: failed: {err}"));
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    /// Harvest MOPAC `.out` files into a CASRN/MW/HOMO/LUMO table.
    pub fn mopac(
        &self,
        input_dir: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<MopacResult, PipelineError> {
        let records = mopac::harvest_directory(input_dir)?;
        let table = mopac::records_to_table(&records);
        let order = mopac::OUTPUT_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .collect::<Vec<_>>();
        table.write_csv(output, &order, &self.settings.sentinel)?;
        report(
            sink,
            format!("wrote {} rows -> {output}", table.row_count()),
        );
        Ok(MopacResult {
            rows: table.row_count(),
            output: output.to_string(),
        })
    }
}

fn report(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

struct LinkLookupTransform<'a, C: ChemSpiderClient> {
    client: &'a C,
    key_column: String,
    link_column: String,
}

impl<C: ChemSpiderClient> RowTransform for LinkLookupTransform<'_, C> {
    fn derived_columns(&self) -> Vec<String> {
        vec![self.link_column.clone()]
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.key_column.clone()]
    }

    fn transform(&self, row: &Row) -> Result<BTreeMap<String, Value>, PipelineError> {
        let casrn = required_cell(row, &self.key_column)?.parse::<Casrn>()?;
        let link = self.client.search_link(&casrn)?;
        Ok(BTreeMap::from([(
            self.link_column.clone(),
            Value::text(link.as_str()),
        )]))
    }
}

struct SmilesScrapeTransform<'a, C: ChemSpiderClient> {
    client: &'a C,
    link_column: String,
}

impl<C: ChemSpiderClient> RowTransform for SmilesScrapeTransform<'_, C> {
    fn derived_columns(&self) -> Vec<String> {
        vec![DEFAULT_SMILES_COLUMN.to_string()]
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.link_column.clone()]
    }

    fn transform(&self, row: &Row) -> Result<BTreeMap<String, Value>, PipelineError> {
        let link = required_cell(row, &self.link_column)?.parse::<ChemSpiderLink>()?;
        let smiles = self.client.fetch_smiles(&link)?;
        Ok(BTreeMap::from([(
            DEFAULT_SMILES_COLUMN.to_string(),
            Value::text(smiles.as_str()),
        )]))
    }
}

struct PropertiesFixedTransform<'a, C: ChemSpiderClient> {
    client: &'a C,
    link_column: String,
}

impl<C: ChemSpiderClient> RowTransform for PropertiesFixedTransform<'_, C> {
    fn derived_columns(&self) -> Vec<String> {
        FIXED_PROPERTIES
            .iter()
            .map(|property| property.to_string())
            .collect()
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.link_column.clone()]
    }

    fn transform(&self, row: &Row) -> Result<BTreeMap<String, Value>, PipelineError> {
        let link = required_cell(row, &self.link_column)?.parse::<ChemSpiderLink>()?;
        let properties = self.client.fetch_properties(&link)?;
        let mut fields = BTreeMap::new();
        for property in FIXED_PROPERTIES {
            // A property the page doesn't offer stays Missing for this row.
            let Some(raw) = properties.get(property) else {
                continue;
            };
            if let Some(number) = extract::first_number(raw) {
                fields.insert(property.to_string(), Value::Number(number));
            }
        }
        Ok(fields)
    }
}

struct PropertiesDiscoverTransform<'a, C: ChemSpiderClient> {
    client: &'a C,
    link_column: String,
}

impl<C: ChemSpiderClient> RowTransform for PropertiesDiscoverTransform<'_, C> {
    fn derived_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.link_column.clone()]
    }

    fn transform(&self, row: &Row) -> Result<BTreeMap<String, Value>, PipelineError> {
        let link = required_cell(row, &self.link_column)?.parse::<ChemSpiderLink>()?;
        let properties = self.client.fetch_properties(&link)?;
        let mut fields = BTreeMap::new();
        for (title, raw) in properties {
            if let Some(number) = extract::first_number_str(&raw) {
                fields.insert(title, Value::text(number));
            }
        }
        Ok(fields)
    }
}

struct FukuiTransform<'a, W: WorkflowClient> {
    client: &'a W,
    smiles_column: String,
}

impl<W: WorkflowClient> RowTransform for FukuiTransform<'_, W> {
    fn derived_columns(&self) -> Vec<String> {
        vec![FUKUI_COLUMN.to_string()]
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.smiles_column.clone()]
    }

    fn transform(&self, row: &Row) -> Result<BTreeMap<String, Value>, PipelineError> {
        let smiles = required_cell(row, &self.smiles_column)?.parse::<Smiles>()?;
        let name = format!("Fukui_{}", smiles.as_str());
        let result = self.client.fukui(&name, &smiles)?;
        let highest = result.max_fukui_positive()?;
        Ok(BTreeMap::from([(
            FUKUI_COLUMN.to_string(),
            Value::Number(highest),
        )]))
    }
}

fn required_cell<'a>(row: &'a Row, column: &str) -> Result<&'a str, PipelineError> {
    row.text(column)
        .ok_or_else(|| PipelineError::Extraction(format!("cell '{column}' is empty")))
}
