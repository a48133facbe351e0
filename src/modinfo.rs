//! Kernel module metadata lookups through the `modinfo` command.

use crate::core::ModuleFieldLookup;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum ModinfoError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("modinfo field `{field}` exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("status {}", c)))]
    Exit {
        field: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("modinfo field `{field}` is not valid UTF-8")]
    Encoding { field: String },
}

/// Runs `modinfo -F <field> <module>` for every lookup.
#[derive(Debug, Clone)]
pub struct ModinfoCommand {
    program: PathBuf,
}

impl ModinfoCommand {
    /// Creates a lookup that invokes the given `modinfo` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ModuleFieldLookup for ModinfoCommand {
    fn lookup(&self, module: &str, field: &str) -> Result<String, ModinfoError> {
        trace!(program = %self.program.display(), module, field, "Running modinfo");
        let output = Command::new(&self.program)
            .args(["-F", field, module])
            .output()
            .map_err(|source| ModinfoError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ModinfoError::Exit {
                field: field.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ModinfoError::Encoding {
            field: field.to_string(),
        })
    }
}
