#![warn(missing_docs)]

//! STEP (ISO 10303-21) import and export for the dcad codec.
//!
//! Reading goes lexer → entity graph → realizer → [`dcad_model::Model`];
//! writing walks the model and emits AP203 or AP214 records with fresh
//! monotonic ids. Both directions are deterministic; recoverable problems
//! surface as warnings rather than failures.
//!
//! # Example
//!
//! ```no_run
//! use dcad_step::{read_step, write_step, StepReadOptions, StepWriteOptions};
//!
//! let import = read_step("part.step", &StepReadOptions::default()).unwrap();
//! write_step(&import.model, "out.step", &StepWriteOptions::default()).unwrap();
//! ```

mod entities;
mod error;
mod graph;
mod lexer;
mod reader;
mod writer;

pub use error::StepError;
pub use graph::{EntityGraph, RawEntity, StepValue, MAX_RECORD_BYTES};
pub use reader::{read_step, read_step_from_buffer, StepImport, StepReadOptions};
pub use writer::{
    write_step, write_step_to_string, StepSchema, StepUnit, StepWriteOptions,
};
