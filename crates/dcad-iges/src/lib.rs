#![warn(missing_docs)]

//! IGES import and export for the dcad codec.
//!
//! Reading splits the fixed 80-column sections, parses the global section
//! (delimiters, Hollerith strings, units), walks directory entries with
//! their parameter data, and realizes curves and surfaces into a
//! [`dcad_model::Model`]. Writing emits the inverse: start, global,
//! directory, parameter, and terminate sections with back-references.
//!
//! # Example
//!
//! ```no_run
//! use dcad_iges::{read_iges, write_iges, IgesReadOptions, IgesWriteOptions};
//!
//! let import = read_iges("part.igs", &IgesReadOptions::default()).unwrap();
//! write_iges(&import.model, "out.igs", &IgesWriteOptions::default()).unwrap();
//! ```

mod error;
mod reader;
mod sections;
mod writer;

pub use error::IgesError;
pub use reader::{read_iges, read_iges_from_buffer, IgesImport, IgesReadOptions};
pub use sections::{GlobalSection, Sections};
pub use writer::{write_iges, write_iges_to_string, IgesUnit, IgesWriteOptions};
