use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid CASRN: {0}")]
    InvalidCasrn(String),

    #[error("invalid ChemSpider link: {0}")]
    InvalidLink(String),

    #[error("invalid SMILES: {0}")]
    InvalidSmiles(String),

    #[error("required column missing from input: {0}")]
    MissingColumn(String),

    #[error("missing config file {}", .0.display())]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {}", .0.display())]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("workflow API key not configured (set workflow.api_key in pfas-screen.json)")]
    MissingApiKey,

    #[error("ChemSpider request failed: {0}")]
    ChemSpiderHttp(String),

    #[error("ChemSpider returned status {status}: {message}")]
    ChemSpiderStatus { status: u16, message: String },

    #[error("workflow request failed: {0}")]
    WorkflowHttp(String),

    #[error("workflow returned status {status}: {message}")]
    WorkflowStatus { status: u16, message: String },

    #[error("{0}")]
    Extraction(String),

    #[error("{0}")]
    Chem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("format conversion failed: {0}")]
    Conversion(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
