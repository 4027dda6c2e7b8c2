//! Parser for batch definition files.
//!
//! Format, one module per line:
//! ```text
//! # CTD processing chain
//! datcnv   psa=DatCnv.psa xmlcon=SBE911.xmlcon out=converted
//! filter   psa=Filter.psa
//! binavg   psa=BinAvg.psa append=_1m ext=cnv
//! ```
//!
//! - The first word is the module name (case-insensitive)
//! - The remaining words are `key=value` options
//! - Values containing spaces are double-quoted: `out="C:\My Data"`
//! - Lines starting with `#` are comments
//!
//! Supported keys:
//! - `psa` - program setup file
//! - `xmlcon` - instrument configuration file
//! - `out` - output directory
//! - `name` - fixed output file name
//! - `append` - text appended to the derived output name
//! - `ext` - output extension (default `cnv`)

use crate::error::{BatchError, Result};
use crate::pipeline::Batch;
use crate::stage::{ModuleStage, Stage};

/// Parse definition text into module stages, in file order.
pub fn parse_stages(text: &str) -> Result<Vec<ModuleStage>> {
    let mut stages = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let stage = parse_stage(line).map_err(|message| BatchError::Parse {
            line: line_num + 1,
            message,
        })?;
        stages.push(stage);
    }

    Ok(stages)
}

/// Parse definition text straight into a runnable batch.
pub fn parse_batch(text: &str) -> Result<Batch> {
    Ok(parse_stages(text)?
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Stage>)
        .collect())
}

/// Parse a single module line.
fn parse_stage(line: &str) -> std::result::Result<ModuleStage, String> {
    let mut tokens = tokenize(line)?.into_iter();
    let module = match tokens.next() {
        Some(m) if !m.contains('=') => m,
        Some(m) => return Err(format!("Expected module name, found option '{m}'")),
        None => return Err("Expected module name".to_string()),
    };

    let mut stage = ModuleStage::new(&module);
    let mut seen: Vec<String> = Vec::new();

    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, found '{token}'"))?;
        let key = key.to_lowercase();
        if seen.contains(&key) {
            return Err(format!("Duplicate option '{key}'"));
        }
        if value.is_empty() {
            return Err(format!("Option '{key}' has no value"));
        }

        stage = match key.as_str() {
            "psa" => stage.psa(value),
            "xmlcon" => stage.xmlcon(value),
            "out" => stage.output_dir(value),
            "name" => stage.output_name(value),
            "append" => stage.append(value),
            "ext" => stage.extension(value),
            _ => return Err(format!("Unknown option '{key}' for {module}")),
        };
        seen.push(key);
    }

    Ok(stage)
}

/// Split a line on whitespace. A value may be double-quoted to contain
/// spaces, as in `out="C:\My Data"`; quotes anywhere else are an error.
/// Quotes are stripped from the result.
fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut closed = false;

    for c in line.chars() {
        if in_quotes {
            if c == '"' {
                in_quotes = false;
                closed = true;
            } else {
                current.push(c);
            }
        } else if c.is_whitespace() {
            if closed || !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
                closed = false;
            }
        } else if closed {
            return Err(format!("Unexpected text after closing quote in '{current}'"));
        } else if c == '"' {
            // Only directly after the first '=' of a token.
            if !current.ends_with('=') || current.find('=') != Some(current.len() - 1) {
                return Err("Quotes may only start an option value".to_string());
            }
            in_quotes = true;
        } else {
            current.push(c);
        }
    }

    if in_quotes {
        return Err("Unclosed quote".to_string());
    }
    if closed || !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
