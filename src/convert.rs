use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PipelineError;

/// External command-line converter for PDB -> PDBQT.
pub trait ObabelClient: Send + Sync {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError>;
    fn tool_version(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub enum ObabelStatus {
    Ready,
    Missing { message: String },
}

#[derive(Clone)]
pub struct SystemObabelClient {
    obabel: Option<PathBuf>,
}

impl SystemObabelClient {
    pub fn new() -> Self {
        Self {
            obabel: find_in_path("obabel"),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            obabel: Some(path),
        }
    }

    pub fn tool_status(&self) -> ObabelStatus {
        match &self.obabel {
            Some(_) => ObabelStatus::Ready,
            None => ObabelStatus::Missing {
                message: "missing obabel (OpenBabel)".to_string(),
            },
        }
    }

    fn require_obabel(&self) -> Result<&PathBuf, PipelineError> {
        self.obabel
            .as_ref()
            .ok_or_else(|| PipelineError::MissingTool("obabel".to_string()))
    }
}

impl Default for SystemObabelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ObabelClient for SystemObabelClient {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let obabel = self.require_obabel()?;
        let args = vec![
            input.to_string_lossy().to_string(),
            "-O".to_string(),
            output.to_string_lossy().to_string(),
        ];
        let result = Command::new(obabel)
            .args(&args)
            .output()
            .map_err(|err| PipelineError::Conversion(err.to_string()))?;
        if result.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("obabel failed on {}", input.display())
        } else {
            stderr
        };
        Err(PipelineError::Conversion(message))
    }

    fn tool_version(&self) -> Option<String> {
        let obabel = self.obabel.as_ref()?;
        let output = Command::new(obabel).arg("-V").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() { None } else { Some(stdout) }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
