//! Debug axis indicators.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Text drawn next to an axis tip by the overlay layer.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisLabel {
    pub text: &'static str,
    pub position: Vec3,
    pub color: [f32; 4],
}

/// X (red), Y (green) and Z (blue) segments from the origin.
#[derive(Clone, Debug)]
pub struct AxesHelper {
    vertices: Vec<LineVertex>,
    labels: Vec<AxisLabel>,
}

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

impl AxesHelper {
    pub fn new(size: f32) -> Self {
        let axes = [("X", Vec3::X, RED), ("Y", Vec3::Y, GREEN), ("Z", Vec3::Z, BLUE)];

        let mut vertices = Vec::with_capacity(axes.len() * 2);
        let mut labels = Vec::with_capacity(axes.len());
        for (text, axis, color) in axes {
            let tip = axis * size;
            vertices.push(LineVertex::new([0.0; 3], color));
            vertices.push(LineVertex::new(tip.to_array(), color));
            // a little past the tip so the glyph does not sit on the line
            labels.push(AxisLabel {
                text,
                position: axis * size * 1.08,
                color,
            });
        }

        Self { vertices, labels }
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn labels(&self) -> &[AxisLabel] {
        &self.labels
    }
}
