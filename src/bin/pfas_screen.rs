use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pfas_screen_pipeline::app::{
    App, DEFAULT_KEY_COLUMN, DEFAULT_LINK_COLUMN, DEFAULT_NAME_COLUMN, DEFAULT_SMILES_COLUMN,
    RunSettings,
};
use pfas_screen_pipeline::chemspider::{ChemSpiderClient, ChemSpiderHttpClient};
use pfas_screen_pipeline::config::{ConfigLoader, ResolvedConfig};
use pfas_screen_pipeline::convert::{ObabelClient, ObabelStatus, SystemObabelClient};
use pfas_screen_pipeline::domain::{Casrn, ChemSpiderLink, Smiles};
use pfas_screen_pipeline::error::PipelineError;
use pfas_screen_pipeline::output::{ConsoleOutput, JsonOutput, OutputMode};
use pfas_screen_pipeline::pipeline::{ProgressSink, RunSummary};
use pfas_screen_pipeline::workflow::{FukuiResult, WorkflowClient, WorkflowHttpClient};

#[derive(Parser)]
#[command(name = "pfas-screen")]
#[command(about = "Batch scrape-transform-checkpoint pipelines for PFAS ligand screening")]
#[command(version, author)]
struct Cli {
    /// Print one JSON document to stdout and suppress progress lines.
    #[arg(long, global = true)]
    json: bool,

    /// Path to pfas-screen.json (defaults apply when the default file is absent).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the checkpoint interval from configuration.
    #[arg(long, global = true)]
    interval: Option<usize>,

    /// Override the missing-value sentinel from configuration.
    #[arg(long, global = true)]
    sentinel: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve CASRNs to ChemSpider record links")]
    Link(LinkArgs),
    #[command(about = "Scrape SMILES strings from ChemSpider record pages")]
    Smiles(SmilesArgs),
    #[command(about = "Scrape chemical descriptors from ChemSpider record pages")]
    Properties(PropertiesArgs),
    #[command(about = "Generate optimized 3D structures (PDB) from SMILES")]
    Structures(StructuresArgs),
    #[command(about = "Convert a directory of PDB files to PDBQT via obabel")]
    Convert(ConvertArgs),
    #[command(about = "Harvest MOPAC .out files into a descriptor table")]
    Mopac(MopacArgs),
    #[command(about = "Compute highest Fukui f(+) per molecule via the workflow service")]
    Fukui(FukuiArgs),
}

#[derive(Args)]
struct LinkArgs {
    #[arg(long)]
    input: Utf8PathBuf,
    #[arg(long)]
    output: Utf8PathBuf,
    #[arg(long, default_value = DEFAULT_KEY_COLUMN)]
    key_column: String,
    #[arg(long, default_value = DEFAULT_LINK_COLUMN)]
    link_column: String,
}

#[derive(Args)]
struct SmilesArgs {
    #[arg(long)]
    input: Utf8PathBuf,
    #[arg(long)]
    output: Utf8PathBuf,
    #[arg(long, default_value = DEFAULT_LINK_COLUMN)]
    link_column: String,
}

#[derive(Args)]
struct PropertiesArgs {
    #[arg(long)]
    input: Utf8PathBuf,
    #[arg(long)]
    output: Utf8PathBuf,
    #[arg(long, default_value = DEFAULT_LINK_COLUMN)]
    link_column: String,
    /// Keep every property found on any page instead of the fixed set.
    /// Buffers all rows; no mid-run checkpoints.
    #[arg(long)]
    discover: bool,
}

#[derive(Args)]
struct StructuresArgs {
    #[arg(long)]
    input: Utf8PathBuf,
    #[arg(long)]
    out_dir: Utf8PathBuf,
    #[arg(long, default_value = DEFAULT_NAME_COLUMN)]
    name_column: String,
    #[arg(long, default_value = DEFAULT_SMILES_COLUMN)]
    smiles_column: String,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(long)]
    input_dir: Utf8PathBuf,
    #[arg(long)]
    out_dir: Utf8PathBuf,
}

#[derive(Args)]
struct MopacArgs {
    #[arg(long)]
    input_dir: Utf8PathBuf,
    #[arg(long)]
    output: Utf8PathBuf,
}

#[derive(Args)]
struct FukuiArgs {
    #[arg(long)]
    input: Utf8PathBuf,
    #[arg(long)]
    output: Utf8PathBuf,
    #[arg(long, default_value = DEFAULT_SMILES_COLUMN)]
    smiles_column: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code_for(&err);
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}

/// 2 for input/configuration faults, 3 for network/tool faults surfaced
/// at startup, 1 for anything else.
fn exit_code_for(err: &PipelineError) -> u8 {
    match err {
        PipelineError::MissingColumn(_)
        | PipelineError::MissingConfig(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::MissingApiKey
        | PipelineError::InvalidCasrn(_)
        | PipelineError::InvalidLink(_)
        | PipelineError::InvalidSmiles(_)
        | PipelineError::Csv(_) => 2,
        PipelineError::ChemSpiderHttp(_)
        | PipelineError::ChemSpiderStatus { .. }
        | PipelineError::WorkflowHttp(_)
        | PipelineError::WorkflowStatus { .. }
        | PipelineError::MissingTool(_)
        | PipelineError::Conversion(_) => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(interval) = cli.interval {
        if interval == 0 {
            return Err(PipelineError::ConfigParse(
                "checkpoint interval must be at least 1".to_string(),
            ));
        }
        config.checkpoint_interval = interval;
    }
    if let Some(sentinel) = cli.sentinel {
        if sentinel.is_empty() {
            return Err(PipelineError::ConfigParse(
                "sentinel must not be empty".to_string(),
            ));
        }
        config.sentinel = sentinel;
    }

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    run_command(cli.command, &config, output_mode)
}

fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> Result<(), PipelineError> {
    let settings = RunSettings::from(config);
    match command {
        Commands::Link(args) => {
            let chemspider = ChemSpiderHttpClient::new(&config.chemspider_base_url)?;
            let app = App::new(chemspider, NopWorkflow, NopObabel, settings);
            let summary = with_sink(output_mode, |sink| {
                app.link(
                    &args.input,
                    &args.output,
                    &args.key_column,
                    &args.link_column,
                    sink,
                )
            })?;
            print_summary(output_mode, &summary)
        }
        Commands::Smiles(args) => {
            let chemspider = ChemSpiderHttpClient::new(&config.chemspider_base_url)?;
            let app = App::new(chemspider, NopWorkflow, NopObabel, settings);
            let summary = with_sink(output_mode, |sink| {
                app.smiles(&args.input, &args.output, &args.link_column, sink)
            })?;
            print_summary(output_mode, &summary)
        }
        Commands::Properties(args) => {
            let chemspider = ChemSpiderHttpClient::new(&config.chemspider_base_url)?;
            let app = App::new(chemspider, NopWorkflow, NopObabel, settings);
            let summary = with_sink(output_mode, |sink| {
                app.properties(
                    &args.input,
                    &args.output,
                    &args.link_column,
                    args.discover,
                    sink,
                )
            })?;
            print_summary(output_mode, &summary)
        }
        Commands::Structures(args) => {
            let app = App::new(NopChemSpider, NopWorkflow, NopObabel, settings);
            let result = with_sink(output_mode, |sink| {
                app.structures(
                    &args.input,
                    &args.out_dir,
                    &args.name_column,
                    &args.smiles_column,
                    sink,
                )
            })?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_result(&result)
                    .map_err(|err| PipelineError::Filesystem(err.to_string())),
                OutputMode::Text => {
                    println!(
                        "wrote {} structures to {} ({} failed, {} skipped)",
                        result.written.len(),
                        result.out_dir,
                        result.failed,
                        result.skipped
                    );
                    Ok(())
                }
            }
        }
        Commands::Convert(args) => {
            let obabel = match &config.obabel_path {
                Some(path) => SystemObabelClient::with_path(path.clone()),
                None => SystemObabelClient::new(),
            };
            if let ObabelStatus::Missing { message } = obabel.tool_status() {
                return Err(PipelineError::MissingTool(message));
            }
            let app = App::new(NopChemSpider, NopWorkflow, obabel, settings);
            let result = with_sink(output_mode, |sink| {
                app.convert(&args.input_dir, &args.out_dir, sink)
            })?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_result(&result)
                    .map_err(|err| PipelineError::Filesystem(err.to_string())),
                OutputMode::Text => {
                    println!(
                        "converted {} files to {} ({} failed)",
                        result.converted.len(),
                        result.out_dir,
                        result.failed
                    );
                    Ok(())
                }
            }
        }
        Commands::Mopac(args) => {
            let app = App::new(NopChemSpider, NopWorkflow, NopObabel, settings);
            let result = with_sink(output_mode, |sink| {
                app.mopac(&args.input_dir, &args.output, sink)
            })?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_result(&result)
                    .map_err(|err| PipelineError::Filesystem(err.to_string())),
                OutputMode::Text => {
                    println!("wrote {} rows to {}", result.rows, result.output);
                    Ok(())
                }
            }
        }
        Commands::Fukui(args) => {
            let api_key = config.require_api_key()?.to_string();
            let workflow = WorkflowHttpClient::new(&config.workflow_base_url, api_key)?;
            let app = App::new(NopChemSpider, workflow, NopObabel, settings);
            let summary = with_sink(output_mode, |sink| {
                app.fukui(&args.input, &args.output, &args.smiles_column, sink)
            })?;
            print_summary(output_mode, &summary)
        }
    }
}

fn with_sink<T>(
    output_mode: OutputMode,
    run: impl FnOnce(&dyn ProgressSink) -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    match output_mode {
        OutputMode::Text => run(&ConsoleOutput),
        OutputMode::Json => run(&JsonOutput),
    }
}

fn print_summary(output_mode: OutputMode, summary: &RunSummary) -> Result<(), PipelineError> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_result(summary)
            .map_err(|err| PipelineError::Filesystem(err.to_string())),
        OutputMode::Text => {
            println!(
                "{} rows ({} transformed, {} failed, {} skipped), output written to {}",
                summary.rows, summary.transformed, summary.failed, summary.skipped, summary.output
            );
            Ok(())
        }
    }
}

#[derive(Clone, Copy)]
struct NopChemSpider;
#[derive(Clone, Copy)]
struct NopWorkflow;
#[derive(Clone, Copy)]
struct NopObabel;

impl ChemSpiderClient for NopChemSpider {
    fn search_link(&self, _casrn: &Casrn) -> Result<ChemSpiderLink, PipelineError> {
        Err(PipelineError::ChemSpiderHttp(
            "ChemSpider client not configured".to_string(),
        ))
    }

    fn fetch_smiles(&self, _link: &ChemSpiderLink) -> Result<Smiles, PipelineError> {
        Err(PipelineError::ChemSpiderHttp(
            "ChemSpider client not configured".to_string(),
        ))
    }

    fn fetch_properties(
        &self,
        _link: &ChemSpiderLink,
    ) -> Result<std::collections::BTreeMap<String, String>, PipelineError> {
        Err(PipelineError::ChemSpiderHttp(
            "ChemSpider client not configured".to_string(),
        ))
    }
}

impl WorkflowClient for NopWorkflow {
    fn fukui(&self, _name: &str, _smiles: &Smiles) -> Result<FukuiResult, PipelineError> {
        Err(PipelineError::WorkflowHttp(
            "workflow client not configured".to_string(),
        ))
    }
}

impl ObabelClient for NopObabel {
    fn convert(
        &self,
        _input: &std::path::Path,
        _output: &std::path::Path,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::MissingTool("obabel".to_string()))
    }

    fn tool_version(&self) -> Option<String> {
        None
    }
}
