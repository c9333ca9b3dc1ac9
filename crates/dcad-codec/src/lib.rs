#![warn(missing_docs)]

//! CAD interchange codec facade for the dcad application.
//!
//! One importer and one exporter cover STEP (AP203/AP214), IGES, the
//! native DCA container, and the tessellated STL/OBJ formats. The codec
//! runs single-threaded on the caller's thread, takes no locks, and
//! publishes no globals; long operations honor a cooperative
//! [`dcad_model::CancelToken`] and an optional progress sink.
//!
//! # Example
//!
//! ```no_run
//! use dcad_codec::{Exporter, ExportOptions, Format, Importer, ImportOptions};
//!
//! let mut importer = Importer::new();
//! let model = importer
//!     .import_file("part.step", &ImportOptions::default())
//!     .expect("import failed");
//!
//! let mut exporter = Exporter::new();
//! let options = ExportOptions { format: Format::Iges, ..Default::default() };
//! assert!(exporter.export_model(&model, "part.igs", &options));
//! ```

pub use dcad_archive;
pub use dcad_iges;
pub use dcad_math;
pub use dcad_model;
pub use dcad_nurbs;
pub use dcad_step;
pub use dcad_tessellate;

mod export;
mod exporter;
mod importer;
mod options;

pub use dcad_math::CoordinateSystem;
pub use dcad_model::{CancelToken, Color, Model, ProgressFn};
pub use dcad_tessellate::{MeshData, Quality};
pub use exporter::Exporter;
pub use importer::{import_buffer, Importer, ImportStats};
pub use options::{ExportOptions, Format, ImportOptions, Units};
