//! Stage trait and the Sea-Bird module stage.
//!
//! A `Stage` is opaque to the batch builder: it only knows how to render
//! itself as a command line for a given input pattern and where its output
//! will land. What the flags mean is up to the stage.

use crate::error::StageError;
use crate::pipeline::base_name;

/// One processing step in a batch.
pub trait Stage {
    /// The command line that runs this stage against `input_pattern`.
    ///
    /// With `batch_mode` set the string is meant to be one line of an
    /// `sbebatch` script; otherwise it is a standalone invocation.
    fn exec_str(&self, input_pattern: &str, batch_mode: bool) -> Result<String, StageError>;

    /// Path of the file this stage writes when fed `input_pattern`.
    /// May include directory components.
    fn output_file_path(&self, input_pattern: &str) -> Result<String, StageError>;

    /// Display name of this stage, used in logs and errors.
    fn name(&self) -> &str {
        "stage"
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn exec_str(&self, input_pattern: &str, batch_mode: bool) -> Result<String, StageError> {
        (**self).exec_str(input_pattern, batch_mode)
    }

    fn output_file_path(&self, input_pattern: &str) -> Result<String, StageError> {
        (**self).output_file_path(input_pattern)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// Sea-Bird module stage
// ---------------------------------------------------------------------------

/// Default extension of files written by the Sea-Bird processing modules.
pub const DEFAULT_EXTENSION: &str = "cnv";

/// A Sea-Bird Data Processing module (`datcnv`, `filter`, `binavg`, ...).
///
/// Renders the module's `/i /c /p /o /f /a` switches. Unset options are
/// left out so the module falls back to what its setup file says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStage {
    module: String,
    psa: Option<String>,
    xmlcon: Option<String>,
    output_dir: Option<String>,
    output_name: Option<String>,
    append: Option<String>,
    extension: String,
}

impl ModuleStage {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_lowercase(),
            psa: None,
            xmlcon: None,
            output_dir: None,
            output_name: None,
            append: None,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Program setup (`.psa`) file.
    pub fn psa(mut self, path: impl Into<String>) -> Self {
        self.psa = Some(path.into());
        self
    }

    /// Instrument configuration (`.xmlcon`/`.con`) file.
    pub fn xmlcon(mut self, path: impl Into<String>) -> Self {
        self.xmlcon = Some(path.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Fixed output file name, overriding the name derived from the input.
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Text appended to the derived output base name.
    pub fn append(mut self, suffix: impl Into<String>) -> Self {
        self.append = Some(suffix.into());
        self
    }

    /// Output extension, with or without the leading dot.
    pub fn extension(mut self, ext: &str) -> Self {
        self.extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Windows executable name used outside of batch scripts, e.g. `DatcnvW`.
    fn standalone_program(&self) -> String {
        let mut chars = self.module.chars();
        match chars.next() {
            Some(first) => format!("{}{}W", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }

    fn output_name_for(&self, input_pattern: &str) -> String {
        if let Some(name) = &self.output_name {
            return name.clone();
        }
        let leaf = base_name(input_pattern);
        let stem = match leaf.rfind('.') {
            Some(idx) if idx > 0 => &leaf[..idx],
            _ => leaf.as_str(),
        };
        format!(
            "{}{}.{}",
            stem,
            self.append.as_deref().unwrap_or(""),
            self.extension
        )
    }
}

fn check_input(input_pattern: &str) -> Result<(), StageError> {
    if input_pattern.trim().is_empty() {
        Err(StageError::EmptyInput)
    } else {
        Ok(())
    }
}

/// Script lines are newline-separated, so no rendered value may span lines.
fn check_single_line(what: &str, value: &str) -> Result<(), StageError> {
    if value.contains(['\n', '\r']) {
        Err(StageError::Invalid(format!("{what} contains a line break")))
    } else {
        Ok(())
    }
}

fn join_dir(dir: &str, name: &str) -> String {
    if dir.ends_with('/') || dir.ends_with('\\') {
        format!("{dir}{name}")
    } else if dir.contains('\\') && !dir.contains('/') {
        format!("{dir}\\{name}")
    } else {
        format!("{dir}/{name}")
    }
}

impl Stage for ModuleStage {
    fn exec_str(&self, input_pattern: &str, batch_mode: bool) -> Result<String, StageError> {
        check_input(input_pattern)?;
        if self.module.is_empty() {
            return Err(StageError::Invalid("module name is empty".to_string()));
        }
        check_single_line("module name", &self.module)?;
        check_single_line("input pattern", input_pattern)?;

        let program = if batch_mode {
            self.module.clone()
        } else {
            self.standalone_program()
        };

        let mut parts = vec![program, format!("/i{input_pattern}")];
        let switches = [
            ('c', &self.xmlcon),
            ('p', &self.psa),
            ('o', &self.output_dir),
            ('f', &self.output_name),
            ('a', &self.append),
        ];
        for (flag, value) in switches {
            if let Some(v) = value {
                check_single_line(&format!("/{flag} value"), v)?;
                parts.push(format!("/{flag}{v}"));
            }
        }
        if !batch_mode {
            parts.push("/s".to_string());
        }

        Ok(parts.join(" "))
    }

    fn output_file_path(&self, input_pattern: &str) -> Result<String, StageError> {
        check_input(input_pattern)?;
        let name = self.output_name_for(input_pattern);
        Ok(match &self.output_dir {
            Some(dir) if !dir.is_empty() => join_dir(dir, &name),
            _ => name,
        })
    }

    fn name(&self) -> &str {
        &self.module
    }
}
