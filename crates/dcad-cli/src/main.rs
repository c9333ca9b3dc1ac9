//! dcad CLI - convert and inspect CAD interchange files.
//!
//! Supports STEP (.step/.stp), IGES (.igs/.iges), the native container
//! (.dca), and tessellated STL/OBJ output.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use dcad_codec::{ExportOptions, Exporter, Format, ImportOptions, Importer, Units};

#[derive(Parser)]
#[command(name = "dcad")]
#[command(about = "Convert and inspect CAD interchange files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file to another format (determined by extension)
    Convert {
        /// Input file (.step, .stp, .igs, .iges, .dca)
        input: PathBuf,
        /// Output file (.step, .igs, .stl, .obj, .dca)
        output: PathBuf,
        /// Output length unit
        #[arg(short, long, value_enum, default_value_t = UnitArg::Mm)]
        units: UnitArg,
        /// Skip presentation colors
        #[arg(long)]
        no_colors: bool,
    },
    /// Display information about a file
    Info {
        /// Path to the file
        file: PathBuf,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum UnitArg {
    Mm,
    Cm,
    M,
    In,
    Ft,
}

impl From<UnitArg> for Units {
    fn from(u: UnitArg) -> Units {
        match u {
            UnitArg::Mm => Units::Millimetres,
            UnitArg::Cm => Units::Centimetres,
            UnitArg::M => Units::Metres,
            UnitArg::In => Units::Inches,
            UnitArg::Ft => Units::Feet,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            units,
            no_colors,
        } => convert(&input, &output, units.into(), !no_colors),
        Commands::Info { file } => info(&file),
    }
}

fn convert(input: &Path, output: &Path, units: Units, colors: bool) -> Result<()> {
    let mut importer = Importer::new();
    let import_options = ImportOptions {
        import_colors: colors,
        ..ImportOptions::default()
    };
    let Some(model) = importer.import_file(input, &import_options) else {
        bail!("import failed: {}", importer.error_message());
    };
    for warning in &importer.stats().warnings {
        eprintln!("warning: {warning}");
    }

    let format = Format::from_path(output)
        .with_context(|| format!("unrecognized output extension: {}", output.display()))?;
    let export_options = ExportOptions {
        format,
        units,
        include_colors: colors,
        iges_include_colors: colors,
        ..ExportOptions::default()
    };

    let mut exporter = Exporter::new();
    if !exporter.export_model(&model, output, &export_options) {
        bail!("export failed: {}", exporter.error_message());
    }

    println!(
        "{} -> {} ({} bodies, {} faces)",
        input.display(),
        output.display(),
        model.bodies.len(),
        model.face_count(),
    );
    Ok(())
}

fn info(file: &Path) -> Result<()> {
    let mut importer = Importer::new();
    let Some(model) = importer.import_file(file, &ImportOptions::default()) else {
        bail!("import failed: {}", importer.error_message());
    };
    let stats = importer.stats();

    println!("File:      {}", file.display());
    println!("Model:     {}", model.name);
    println!("Entities:  {}", stats.entity_count);
    println!("Scale:     {} mm/unit", stats.unit_scale);
    println!("Bodies:    {}", model.bodies.len());
    for (i, body) in model.bodies.iter().enumerate() {
        println!(
            "  [{i}] {:<24} {} faces, {}",
            body.name,
            body.faces.len(),
            if body.is_solid { "solid" } else { "open shell" },
        );
    }
    if !stats.warnings.is_empty() {
        println!("Warnings:  {}", stats.warnings.len());
        for warning in &stats.warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}
