//! Runs a rendered batch script through the external `sbebatch` program.
//!
//! The script is written to a uniquely named temp file that lives only for
//! the duration of one `execute` call. The child blocks the caller until it
//! exits; there is no timeout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{BatchError, Result};

/// Program invoked with the script path as its only argument.
pub const DEFAULT_PROGRAM: &str = "sbebatch";
/// Suffix of the temporary script file.
pub const DEFAULT_SUFFIX: &str = ".txt";

const TEMP_PREFIX: &str = "sbebatch-";

/// How a batch script gets handed to the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRunner {
    program: String,
    args: Vec<String>,
    suffix: String,
    temp_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: Vec::new(),
            suffix: DEFAULT_SUFFIX.to_string(),
            temp_dir: None,
            working_dir: None,
        }
    }
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the script path, for launchers such as
    /// `wine sbebatch.exe`.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Directory the temp script is created in. Defaults to the system
    /// temp dir.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Working directory of the child. Stage outputs are threaded by file
    /// name only, so this is where intermediate files are resolved.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Write `script` to a temp file and run the program against it.
    ///
    /// The temp file is removed before this returns, whatever the outcome.
    pub fn execute(&self, script: &str) -> Result<()> {
        let script_file = self.write_script(script)?;
        self.invoke(script_file.path())
    }

    fn write_script(&self, script: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(&self.suffix);
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(script.as_bytes())?;
        file.flush()?;
        file.as_file().sync_all()?;
        debug!(path = %file.path().display(), bytes = script.len(), "wrote batch script");
        Ok(file)
    }

    fn invoke(&self, script_path: &Path) -> Result<()> {
        let mut command_line = self.program.clone();
        for arg in &self.args {
            command_line.push(' ');
            command_line.push_str(arg);
        }
        command_line.push_str(&format!(" {}", script_path.display()));

        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(script_path);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        info!(command = %command_line, "running batch");
        let status = command.status().map_err(|source| BatchError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !status.success() {
            return Err(BatchError::ProcessFailure {
                command: command_line,
                code: status.code(),
            });
        }

        info!(command = %command_line, "batch finished");
        Ok(())
    }
}
