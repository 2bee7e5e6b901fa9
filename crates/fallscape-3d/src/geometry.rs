//! CPU-side mesh data: merging, normal generation and bounds.

use anyhow::{Context, Result, ensure};
use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box enclosing `points`, `None` when there are no points.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut min = Vec3::from_array(*first);
        let mut max = min;
        for p in rest {
            let v = Vec3::from_array(*p);
            min = min.min(v);
            max = max.max(v);
        }
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Triangle mesh with optional normals and texture coordinates.
///
/// Indices always describe a triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
    pub bounds: Option<Aabb>,
}

impl MeshData {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals: None,
            uvs: None,
            indices,
            bounds: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Checks attribute lengths and index ranges.
    pub fn validate(&self) -> Result<()> {
        let count = self.vertex_count();
        if let Some(normals) = &self.normals {
            ensure!(
                normals.len() == count,
                "{} normals for {count} positions",
                normals.len()
            );
        }
        if let Some(uvs) = &self.uvs {
            ensure!(uvs.len() == count, "{} uvs for {count} positions", uvs.len());
        }
        ensure!(
            self.indices.len() % 3 == 0,
            "index count {} is not a triangle list",
            self.indices.len()
        );
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            anyhow::bail!("index {bad} out of range for {count} vertices");
        }
        Ok(())
    }

    /// Smooth per-vertex normals from the triangle list, area weighted.
    ///
    /// Replaces any normals already present.
    pub fn compute_vertex_normals(&mut self) {
        let mut acc = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(pa), Some(pb), Some(pc)) = (
                self.positions.get(a),
                self.positions.get(b),
                self.positions.get(c),
            ) else {
                continue;
            };
            let pa = Vec3::from_array(*pa);
            let face = (Vec3::from_array(*pb) - pa).cross(Vec3::from_array(*pc) - pa);
            acc[a] += face;
            acc[b] += face;
            acc[c] += face;
        }
        self.normals = Some(
            acc.into_iter()
                .map(|n| n.normalize_or_zero().to_array())
                .collect(),
        );
    }

    /// Computes normals only if the mesh has none. Returns whether it did.
    pub fn ensure_normals(&mut self) -> bool {
        if self.normals.is_some() {
            return false;
        }
        self.compute_vertex_normals();
        true
    }

    pub fn compute_bounds(&mut self) {
        self.bounds = Aabb::from_points(&self.positions);
    }

    /// Sphere around the bounding box, as used for culling and sizing.
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        let bounds = self.bounds.or_else(|| Aabb::from_points(&self.positions))?;
        Some(BoundingSphere {
            center: bounds.center(),
            radius: bounds.size().length() * 0.5,
        })
    }

    /// Concatenates several meshes into one without transforming vertices.
    ///
    /// Normals survive only if every part has them, otherwise the merged
    /// normals are recomputed. UVs survive only if every part has them.
    pub fn merge(parts: &[MeshData]) -> Result<MeshData> {
        ensure!(!parts.is_empty(), "no geometry to merge");

        let vertex_total: usize = parts.iter().map(MeshData::vertex_count).sum();
        ensure!(
            u32::try_from(vertex_total).is_ok(),
            "{vertex_total} vertices cannot be addressed with u32 indices"
        );
        let index_total: usize = parts.iter().map(|p| p.indices.len()).sum();

        let mut positions = Vec::with_capacity(vertex_total);
        let mut indices = Vec::with_capacity(index_total);
        let mut normals = parts
            .iter()
            .all(|p| p.normals.is_some())
            .then(|| Vec::with_capacity(vertex_total));
        let mut uvs = parts
            .iter()
            .all(|p| p.uvs.is_some())
            .then(|| Vec::with_capacity(vertex_total));

        for (i, part) in parts.iter().enumerate() {
            part.validate()
                .with_context(|| format!("mesh part {i} is malformed"))?;

            let base = positions.len() as u32;
            positions.extend_from_slice(&part.positions);
            indices.extend(part.indices.iter().map(|index| index + base));
            if let (Some(acc), Some(part_normals)) = (normals.as_mut(), part.normals.as_ref()) {
                acc.extend_from_slice(part_normals);
            }
            if let (Some(acc), Some(part_uvs)) = (uvs.as_mut(), part.uvs.as_ref()) {
                acc.extend_from_slice(part_uvs);
            }
        }

        let mut merged = MeshData {
            positions,
            normals,
            uvs,
            indices,
            bounds: None,
        };
        merged.ensure_normals();
        merged.compute_bounds();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> MeshData {
        MeshData::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        )
        .with_normals(vec![[0.0, 0.0, 1.0]; 3])
        .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]])
    }

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                [2.0, 2.0, 5.0],
                [3.0, 2.0, 5.0],
                [3.0, 3.0, 5.0],
                [2.0, 3.0, 5.0],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .with_normals(vec![[0.0, 0.0, 1.0]; 4])
        .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
    }

    #[test]
    fn merge_concatenates_attributes_in_order() {
        let a = triangle();
        let b = quad();
        let merged = MeshData::merge(&[a.clone(), b.clone()]).unwrap();

        assert_eq!(merged.vertex_count(), 7);
        assert_eq!(&merged.positions[..3], &a.positions[..]);
        assert_eq!(&merged.positions[3..], &b.positions[..]);
        assert_eq!(merged.normals.as_ref().unwrap().len(), 7);
        assert_eq!(&merged.uvs.as_ref().unwrap()[3..], &b.uvs.unwrap()[..]);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);

        let bounds = merged.bounds.unwrap();
        for p in &merged.positions {
            assert!(bounds.contains(Vec3::from_array(*p)));
        }
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(3.0, 3.0, 5.0));
    }

    #[test]
    fn merge_recomputes_normals_when_a_part_lacks_them() {
        let mut a = triangle();
        // Deliberately wrong normals: they must not survive the merge.
        a.normals = Some(vec![[1.0, 0.0, 0.0]; 3]);
        let mut b = quad();
        b.normals = None;

        let merged = MeshData::merge(&[a, b]).unwrap();
        let normals = merged.normals.unwrap();
        assert_eq!(normals.len(), 7);
        for n in normals {
            assert_relative_eq!(n[0], 0.0);
            assert_relative_eq!(n[1], 0.0);
            assert_relative_eq!(n[2], 1.0);
        }
    }

    #[test]
    fn merge_drops_uvs_unless_every_part_has_them() {
        let mut b = quad();
        b.uvs = None;
        let merged = MeshData::merge(&[triangle(), b]).unwrap();
        assert!(merged.uvs.is_none());
        assert_eq!(merged.vertex_count(), 7);
    }

    #[test]
    fn merge_rejects_malformed_parts() {
        let mut bad = quad();
        bad.indices.push(9);
        bad.indices.extend([0, 1]);
        assert!(MeshData::merge(&[triangle(), bad]).is_err());

        let mut short = quad();
        short.normals = Some(vec![[0.0, 0.0, 1.0]; 2]);
        assert!(MeshData::merge(&[triangle(), short]).is_err());

        assert!(MeshData::merge(&[]).is_err());
    }

    #[test]
    fn ensure_normals_leaves_existing_normals_alone() {
        let mut mesh = triangle();
        mesh.normals = Some(vec![[0.0, 1.0, 0.0]; 3]);
        let before_ptr = mesh.normals.as_ref().unwrap().as_ptr();
        let before = mesh.normals.clone();

        assert!(!mesh.ensure_normals());
        assert_eq!(mesh.normals.as_ref().unwrap().as_ptr(), before_ptr);
        assert_eq!(mesh.normals, before);
    }

    #[test]
    fn ensure_normals_fills_missing_normals() {
        let mut mesh = MeshData::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
            vec![0, 1, 2],
        );
        assert!(mesh.ensure_normals());
        for n in mesh.normals.unwrap() {
            assert_relative_eq!(n[1], 1.0);
        }
    }

    #[test]
    fn bounding_sphere_covers_the_box_diagonal() {
        let mut mesh = quad();
        mesh.compute_bounds();
        let sphere = mesh.bounding_sphere().unwrap();
        assert_eq!(sphere.center, Vec3::new(2.5, 2.5, 5.0));
        assert_relative_eq!(sphere.radius, 2.0_f32.sqrt() * 0.5);
    }
}
