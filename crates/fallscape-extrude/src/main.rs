use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use fallscape_extrude::{ExtrudeOptions, convert_directory};

#[derive(Parser, Debug)]
#[command(name = "fallscape-extrude")]
#[command(about = "Extrude SVG outlines into GLB models for fallscape")]
struct Cli {
    /// Directory holding the .svg files
    input: PathBuf,

    /// Directory the .glb files are written to
    #[arg(default_value = "models")]
    output: PathBuf,

    /// Extrusion depth in SVG user units
    #[arg(long, default_value_t = 130.0)]
    height: f32,

    /// Curve flattening tolerance in SVG user units
    #[arg(long, default_value_t = 0.1)]
    tolerance: f32,

    /// Coarsen outlines until a model has at most this many triangles
    #[arg(long, default_value_t = 5000)]
    target_faces: usize,

    /// Keep every outline at full detail
    #[arg(long)]
    no_simplify: bool,

    /// Keep SVG coordinates instead of centering each model on the origin
    #[arg(long)]
    keep_origin: bool,
}

impl Cli {
    fn options(&self) -> ExtrudeOptions {
        ExtrudeOptions {
            height: self.height,
            tolerance: self.tolerance,
            target_faces: (!self.no_simplify).then_some(self.target_faces),
            center: !self.keep_origin,
        }
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let report = convert_directory(&cli.input, &cli.output, &cli.options())?;
    println!(
        "{} converted, {} failed, output in {}",
        report.converted.len(),
        report.failed.len(),
        cli.output.display()
    );
    Ok(if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
