//! # seabird-batch
//!
//! Chain Sea-Bird Data Processing modules into a single `sbebatch` script
//! and run it.
//!
//! ## Overview
//!
//! Each processing module writes a file that the next module reads. Rather
//! than running modules one at a time, a [`Batch`] renders every module as
//! one line of a batch script, threading each module's output file name
//! into the next module's input, and hands the script to `sbebatch`:
//! - **Stages**: anything implementing [`Stage`], e.g. [`ModuleStage`]
//! - **Rendering**: [`Batch::render`] is pure and can be inspected
//! - **Running**: [`Batch::run`] writes a temp script and blocks on `sbebatch`
//!
//! ## Example
//!
//! ```
//! use seabird_batch::{Batch, ModuleStage};
//!
//! let batch = Batch::default()
//!     .push(ModuleStage::new("datcnv").psa("DatCnv.psa").output_dir("converted"))
//!     .push(ModuleStage::new("filter").psa("Filter.psa"));
//!
//! let script = batch.render("raw*.hex").unwrap();
//! assert_eq!(
//!     script,
//!     "@ Generated by the seabird-processing Python package\n\
//!      datcnv /iraw*.hex /pDatCnv.psa /oconverted\n\
//!      filter /iraw*.cnv /pFilter.psa"
//! );
//! ```

pub mod dsl;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod stage;

pub use dsl::{parse_batch, parse_stages};
pub use error::{BatchError, Result, StageError};
pub use executor::{BatchRunner, DEFAULT_PROGRAM};
pub use pipeline::{Batch, CONFIG_HEADER_COMMENT, base_name};
pub use stage::{ModuleStage, Stage};
