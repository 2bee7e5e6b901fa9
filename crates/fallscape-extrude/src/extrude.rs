//! Filled outlines to closed prism meshes: two caps and a wall per edge.

use anyhow::{Result, anyhow, ensure};
use fallscape_3d::{Aabb, MeshData};
use glam::{DVec2, Vec2, Vec3};
use log::{debug, warn};
use lyon::math::{Point, point};
use lyon::path::iterator::PathIterator;
use lyon::path::{Path, PathEvent};
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};

use crate::svg::{Contour, Segment};

/// Coarsening stops after this many tolerance doublings.
const MAX_COARSENING: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtrudeOptions {
    /// Depth along +z, in SVG user units.
    pub height: f32,
    /// Largest allowed distance between a curve and its flattened outline.
    pub tolerance: f32,
    /// Coarsen the outline until the mesh has at most this many triangles.
    pub target_faces: Option<usize>,
    /// Move the center of the bounding box to the origin.
    pub center: bool,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self {
            height: 130.0,
            tolerance: 0.1,
            target_faces: Some(5000),
            center: true,
        }
    }
}

pub fn face_count(mesh: &MeshData) -> usize {
    mesh.indices.len() / 3
}

/// One lyon path for all contours. SVG y points down, so it is flipped to
/// keep the artwork upright.
pub fn outline_path(contours: &[Contour]) -> Path {
    let to_point = |p: DVec2| point(p.x as f32, -p.y as f32);
    let mut builder = Path::builder();
    for contour in contours.iter().filter(|c| !c.segments.is_empty()) {
        builder.begin(to_point(contour.start));
        for segment in &contour.segments {
            match *segment {
                Segment::Line(to) => {
                    builder.line_to(to_point(to));
                }
                Segment::Quad(ctrl, to) => {
                    builder.quadratic_bezier_to(to_point(ctrl), to_point(to));
                }
                Segment::Cubic(c1, c2, to) => {
                    builder.cubic_bezier_to(to_point(c1), to_point(c2), to_point(to));
                }
            }
        }
        builder.end(true);
    }
    builder.build()
}

fn signed_area(ring: &[Vec2]) -> f32 {
    let mut twice = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        twice += a.perp_dot(b);
    }
    twice * 0.5
}

/// Even-odd point in polygon.
fn contains(ring: &[Vec2], p: Vec2) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for (i, &a) in ring.iter().enumerate() {
        let b = ring[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Closed polylines of `path` within `tolerance`. Repeated points and rings
/// without area are dropped.
pub fn flatten(path: &Path, tolerance: f32) -> Vec<Vec<Vec2>> {
    let mut rings = Vec::new();
    let mut ring: Vec<Vec2> = Vec::new();
    for event in path.iter().flattened(tolerance) {
        match event {
            PathEvent::Begin { at } => {
                ring.clear();
                ring.push(Vec2::new(at.x, at.y));
            }
            PathEvent::Line { to, .. } => {
                let to = Vec2::new(to.x, to.y);
                if ring.last() != Some(&to) {
                    ring.push(to);
                }
            }
            PathEvent::End { .. } => {
                while ring.len() > 1 && ring.first() == ring.last() {
                    ring.pop();
                }
                if ring.len() >= 3 && signed_area(&ring) != 0.0 {
                    rings.push(std::mem::take(&mut ring));
                }
                ring.clear();
            }
            PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => {}
        }
    }
    rings
}

/// Outer rings counter-clockwise, holes clockwise, so every wall faces away
/// from the solid.
fn orient_rings(rings: &mut [Vec<Vec2>]) {
    let holes: Vec<bool> = rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            let first = ring[0];
            let depth = rings
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && contains(other, first))
                .count();
            depth % 2 == 1
        })
        .collect();
    for (ring, hole) in rings.iter_mut().zip(holes) {
        if (signed_area(ring) > 0.0) == hole {
            ring.reverse();
        }
    }
}

fn polygon_path(rings: &[Vec<Vec2>]) -> Path {
    let mut builder = Path::builder();
    for ring in rings {
        let mut points = ring.iter().map(|p| point(p.x, p.y));
        let Some(first) = points.next() else {
            continue;
        };
        builder.begin(first);
        for p in points {
            builder.line_to(p);
        }
        builder.end(true);
    }
    builder.build()
}

fn fill(path: &Path, tolerance: f32) -> Result<VertexBuffers<Point, u32>> {
    let mut buffers: VertexBuffers<Point, u32> = VertexBuffers::new();
    FillTessellator::new()
        .tessellate_path(
            path,
            &FillOptions::tolerance(tolerance).with_fill_rule(FillRule::EvenOdd),
            &mut BuffersBuilder::new(&mut buffers, |vertex: FillVertex| vertex.position()),
        )
        .map_err(|err| anyhow!("failed to tessellate outline: {err:?}"))?;
    Ok(buffers)
}

fn cap(
    tessellated: &VertexBuffers<Point, u32>,
    z: f32,
    up: bool,
    uv: impl Fn(Vec2) -> [f32; 2],
) -> MeshData {
    let flat: Vec<Vec2> = tessellated.vertices.iter().map(|p| Vec2::new(p.x, p.y)).collect();
    let mut indices = Vec::with_capacity(tessellated.indices.len());
    for tri in tessellated.indices.chunks_exact(3) {
        let (a, mut b, mut c) = (tri[0], tri[1], tri[2]);
        let pa = flat[a as usize];
        let cross = (flat[b as usize] - pa).perp_dot(flat[c as usize] - pa);
        if cross == 0.0 {
            continue;
        }
        if (cross > 0.0) != up {
            std::mem::swap(&mut b, &mut c);
        }
        indices.extend([a, b, c]);
    }
    let uvs = flat.iter().map(|&p| uv(p)).collect();
    let positions = flat.into_iter().map(|p| [p.x, p.y, z]).collect();
    MeshData::new(positions, indices).with_uvs(uvs)
}

fn walls(rings: &[Vec<Vec2>], height: f32) -> MeshData {
    let edge_total: usize = rings.iter().map(Vec::len).sum();
    let mut positions = Vec::with_capacity(edge_total * 4);
    let mut uvs = Vec::with_capacity(edge_total * 4);
    let mut indices = Vec::with_capacity(edge_total * 6);

    for ring in rings {
        let edges = || ring.iter().zip(ring.iter().cycle().skip(1));
        let perimeter: f32 = edges().map(|(a, b)| a.distance(*b)).sum();
        let mut run = 0.0;
        for (a, b) in edges() {
            let base = positions.len() as u32;
            let len = a.distance(*b);
            let (u0, u1) = (run / perimeter, (run + len) / perimeter);
            positions.extend([
                [a.x, a.y, 0.0],
                [b.x, b.y, 0.0],
                [b.x, b.y, height],
                [a.x, a.y, height],
            ]);
            uvs.extend([[u0, 0.0], [u1, 0.0], [u1, 1.0], [u0, 1.0]]);
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
            run += len;
        }
    }
    MeshData::new(positions, indices).with_uvs(uvs)
}

fn extrude_path(path: &Path, height: f32, tolerance: f32) -> Result<MeshData> {
    let mut rings = flatten(path, tolerance);
    ensure!(!rings.is_empty(), "outline encloses no area");
    orient_rings(&mut rings);

    let caps = fill(&polygon_path(&rings), tolerance)?;
    ensure!(!caps.indices.is_empty(), "outline encloses no area");

    let (mut min, mut max) = (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN));
    for p in rings.iter().flatten() {
        min = min.min(*p);
        max = max.max(*p);
    }
    let size = (max - min).max(Vec2::splat(f32::EPSILON));
    let planar = |p: Vec2| ((p - min) / size).to_array();

    let top = cap(&caps, height, true, planar);
    let bottom = cap(&caps, 0.0, false, planar);
    MeshData::merge(&[top, bottom, walls(&rings, height)])
}

fn center_on_origin(mesh: &mut MeshData) {
    let Some(bounds) = Aabb::from_points(&mesh.positions) else {
        return;
    };
    let offset = bounds.center();
    for p in &mut mesh.positions {
        *p = (Vec3::from_array(*p) - offset).to_array();
    }
}

/// Extrudes filled SVG outlines into one mesh with normals and planar UVs.
///
/// When `target_faces` is set the flattening tolerance is doubled until the
/// mesh fits. Straight edges cannot be coarsened this way, so a warning is
/// logged if the target stays out of reach.
pub fn extrude(contours: &[Contour], options: &ExtrudeOptions) -> Result<MeshData> {
    ensure!(
        options.height.is_finite() && options.height > 0.0,
        "extrusion height must be positive, got {}",
        options.height
    );
    ensure!(
        options.tolerance.is_finite() && options.tolerance > 0.0,
        "tolerance must be positive, got {}",
        options.tolerance
    );

    let path = outline_path(contours);
    let mut tolerance = options.tolerance;
    let mut mesh = extrude_path(&path, options.height, tolerance)?;

    if let Some(target) = options.target_faces {
        let original = face_count(&mesh);
        let mut rounds = 0;
        while face_count(&mesh) > target {
            if rounds == MAX_COARSENING {
                warn!("stopped coarsening at {} faces, target {target}", face_count(&mesh));
                break;
            }
            tolerance *= 2.0;
            rounds += 1;
            match extrude_path(&path, options.height, tolerance) {
                Ok(coarser) => mesh = coarser,
                Err(err) => {
                    warn!("stopped coarsening at tolerance {tolerance}: {err:#}");
                    break;
                }
            }
        }
        if rounds > 0 {
            debug!(
                "coarsened from {original} to {} faces at tolerance {tolerance}",
                face_count(&mesh)
            );
        }
    }

    if options.center {
        center_on_origin(&mut mesh);
    }
    mesh.compute_bounds();
    Ok(mesh)
}
