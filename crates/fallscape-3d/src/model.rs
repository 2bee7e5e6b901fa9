use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::Deserialize;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, Device};

use crate::geometry::MeshData;

/// A model that survived acquisition: its identifier and merged geometry.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub id: String,
    pub mesh: Arc<MeshData>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Interleaves mesh attributes. Missing normals or uvs become zero.
    pub fn interleave(mesh: &MeshData) -> Vec<Vertex> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                position: *position,
                normal: mesh
                    .normals
                    .as_ref()
                    .and_then(|n| n.get(i).copied())
                    .unwrap_or_default(),
                uv: mesh
                    .uvs
                    .as_ref()
                    .and_then(|uv| uv.get(i).copied())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// Per-instance model matrix, one `Mat4` per slot, bound at vertex slot 1.
pub struct InstanceTransform;

impl InstanceTransform {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Mat4>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-instance linear RGBA color, bound at vertex slot 2.
pub struct InstanceColor;

impl InstanceColor {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![7 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn new(view_proj: Mat4, eye: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            eye: eye.extend(1.0).to_array(),
        }
    }
}

/// Shading model selected in the fragment shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    /// Unlit instance color.
    Basic,
    /// Diffuse only.
    Lambert,
    /// Diffuse plus Blinn-Phong highlights.
    #[default]
    Phong,
    /// Surface normals as color.
    Normal,
}

impl MaterialKind {
    fn shader_id(self) -> u32 {
        match self {
            MaterialKind::Basic => 0,
            MaterialKind::Lambert => 1,
            MaterialKind::Phong => 2,
            MaterialKind::Normal => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Material {
    pub kind: MaterialKind,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Phong,
            shininess: 30.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialUniform {
    pub kind: u32,
    pub shininess: f32,
    pub _pad: [f32; 2],
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            kind: material.kind.shader_id(),
            shininess: material.shininess.max(1.0),
            _pad: [0.0; 2],
        }
    }
}

pub fn create_material_ubo(
    device: &Device,
    material_bgl: &BindGroupLayout,
    material: &Material,
) -> (Buffer, BindGroup) {
    let uniform = MaterialUniform::from(material);
    let buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("material_ubo"),
        contents: bytemuck::bytes_of(&uniform),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("material_bg"),
        layout: material_bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buf.as_entire_binding(),
        }],
    });
    (buf, bind_group)
}

/// Vertex and index buffers for one mesh.
pub struct GpuMesh {
    pub vbuf: Buffer,
    pub ibuf: Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn from_mesh(device: &Device, label: &str, mesh: &MeshData) -> Self {
        let vertices = Vertex::interleave(mesh);
        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vbuf")),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ibuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_ibuf")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vbuf,
            ibuf,
            index_count: mesh.indices.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_fills_missing_attributes_with_zero() {
        let mesh = MeshData::new(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], vec![])
            .with_uvs(vec![[0.5, 0.5], [1.0, 0.0]]);
        let vertices = Vertex::interleave(&mesh);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(vertices[1].normal, [0.0; 3]);
        assert_eq!(vertices[0].uv, [0.5, 0.5]);
    }

    #[test]
    fn gpu_layouts_match_uniform_sizes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 16);
    }
}
