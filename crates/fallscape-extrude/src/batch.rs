use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use log::{info, warn};

use crate::extrude::{ExtrudeOptions, extrude, face_count};
use crate::glb::encode_glb;
use crate::svg::parse_svg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertStats {
    pub vertices: usize,
    pub faces: usize,
    pub bytes: usize,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<(PathBuf, ConvertStats)>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

/// Reads one SVG, extrudes every filled shape in it into a single mesh and
/// writes it to `glb`.
pub fn convert_file(svg: &Path, glb: &Path, options: &ExtrudeOptions) -> Result<ConvertStats> {
    let src = fs::read_to_string(svg).with_context(|| format!("failed to read {}", svg.display()))?;
    let contours = parse_svg(&src)?;
    ensure!(!contours.is_empty(), "no filled shapes found");

    let mesh = extrude(&contours, options)?;
    let name = svg
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = encode_glb(&mesh, &name)?;

    if let Some(parent) = glb.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(glb, &bytes).with_context(|| format!("failed to write {}", glb.display()))?;

    Ok(ConvertStats {
        vertices: mesh.vertex_count(),
        faces: face_count(&mesh),
        bytes: bytes.len(),
    })
}

/// `.svg` files directly inside `dir`, sorted.
pub fn svg_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Converts every SVG in `input` to `<stem>.glb` in `output`. A file that
/// fails is logged and reported; the rest still convert.
pub fn convert_directory(input: &Path, output: &Path, options: &ExtrudeOptions) -> Result<BatchReport> {
    let files = svg_files(input)?;
    let mut report = BatchReport::default();
    if files.is_empty() {
        warn!("no SVG files in {}", input.display());
        return Ok(report);
    }

    fs::create_dir_all(output).with_context(|| format!("failed to create {}", output.display()))?;
    info!(
        "converting {} SVG files from {} into {}, height {}",
        files.len(),
        input.display(),
        output.display(),
        options.height
    );

    let total = files.len();
    for (i, svg) in files.into_iter().enumerate() {
        let stem = svg.file_stem().unwrap_or_default().to_string_lossy();
        let glb = output.join(format!("{stem}.glb"));
        match convert_file(&svg, &glb, options) {
            Ok(stats) => {
                info!(
                    "[{}/{total}] {} -> {}: {} vertices, {} faces, {:.1} KiB",
                    i + 1,
                    svg.display(),
                    glb.display(),
                    stats.vertices,
                    stats.faces,
                    stats.bytes as f64 / 1024.0
                );
                report.converted.push((glb, stats));
            }
            Err(err) => {
                warn!("[{}/{total}] {}: {err:#}", i + 1, svg.display());
                report.failed.push((svg, err));
            }
        }
    }
    Ok(report)
}
