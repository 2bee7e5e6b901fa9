use crate::depth::create_depth;
use crate::geometry::MeshData;
use crate::helpers::{AxesHelper, LineVertex};
use crate::lights::LightsUniform;
use crate::model::{GpuMesh, Material, create_material_ubo};
use crate::pipeline::{
    FrameBindings, Layouts, create_frame_bindings, create_line_pipeline, create_pipeline,
};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::*;

/// GPU half of an instanced batch: shared mesh, instance buffers, material.
pub struct GpuBatch {
    pub mesh: GpuMesh,
    pub transform_buf: Buffer,
    pub color_buf: Buffer,
    pub instance_count: u32,
    pub material_buf: Buffer,
    pub material_bg: BindGroup,
}

impl GpuBatch {
    pub fn new(
        device: &Device,
        layouts: &Layouts,
        label: &str,
        mesh: &MeshData,
        capacity: usize,
        material: &Material,
    ) -> Self {
        let instance_count = capacity as u32;
        // zero-sized vertex buffers cannot be bound
        let capacity = capacity.max(1) as u64;
        let transform_buf = device.create_buffer(&BufferDescriptor {
            label: Some(&format!("{label}_transforms")),
            size: capacity * std::mem::size_of::<Mat4>() as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let color_buf = device.create_buffer(&BufferDescriptor {
            label: Some(&format!("{label}_colors")),
            size: capacity * std::mem::size_of::<[f32; 4]>() as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let (material_buf, material_bg) =
            create_material_ubo(device, &layouts.material_bgl, material);

        Self {
            mesh: GpuMesh::from_mesh(device, label, mesh),
            transform_buf,
            color_buf,
            instance_count,
            material_buf,
            material_bg,
        }
    }

    pub fn write_transforms(&self, queue: &Queue, transforms: &[Mat4]) {
        let n = transforms.len().min(self.instance_count as usize);
        queue.write_buffer(&self.transform_buf, 0, bytemuck::cast_slice(&transforms[..n]));
    }

    pub fn write_colors(&self, queue: &Queue, colors: &[[f32; 4]]) {
        let n = colors.len().min(self.instance_count as usize);
        queue.write_buffer(&self.color_buf, 0, bytemuck::cast_slice(&colors[..n]));
    }
}

struct GpuLines {
    vbuf: Buffer,
    count: u32,
}

pub struct Renderer3D {
    pub render_pipeline: RenderPipeline,
    pub line_pipeline: RenderPipeline,
    pub depth_view: TextureView,
    pub depth_tex: Texture,
    pub frame: FrameBindings,
    pub batches: Vec<GpuBatch>,
    pub clear_color: Color,
    axes: Option<GpuLines>,
}

impl Renderer3D {
    pub fn new(
        device: &Device,
        surface_format: TextureFormat,
        width: u32,
        height: u32,
        lights: &LightsUniform,
        clear_color: [f32; 3],
        layouts: &Layouts,
    ) -> Self {
        let (depth_view, depth_tex) = create_depth(device, width, height);
        let render_pipeline = create_pipeline(device, surface_format, layouts);
        let line_pipeline = create_line_pipeline(device, surface_format, layouts);
        let frame = create_frame_bindings(device, layouts, lights);
        let [r, g, b] = clear_color.map(f64::from);

        Self {
            render_pipeline,
            line_pipeline,
            depth_view,
            depth_tex,
            frame,
            batches: Vec::new(),
            clear_color: Color { r, g, b, a: 1.0 },
            axes: None,
        }
    }

    pub fn camera_buf(&self) -> &Buffer {
        &self.frame.camera_buf
    }

    pub fn add_batch(&mut self, batch: GpuBatch) {
        self.batches.push(batch);
    }

    pub fn set_axes(&mut self, device: &Device, axes: &AxesHelper) {
        let vertices: &[LineVertex] = axes.vertices();
        let vbuf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("axes_vbuf"),
            contents: bytemuck::cast_slice(vertices),
            usage: BufferUsages::VERTEX,
        });
        self.axes = Some(GpuLines {
            vbuf,
            count: vertices.len() as u32,
        });
    }

    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        let (dv, dt) = create_depth(device, width, height);
        self.depth_view = dv;
        self.depth_tex = dt;
    }

    /// Draws every batch as one instanced call, then the axes.
    pub fn render(&self, encoder: &mut CommandEncoder, target_view: &TextureView) {
        let mut r_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target_view,
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(self.clear_color),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        r_pass.set_pipeline(&self.render_pipeline);
        r_pass.set_bind_group(0, &self.frame.bind_group, &[]);

        for batch in &self.batches {
            if batch.instance_count == 0 || batch.mesh.index_count == 0 {
                continue;
            }
            r_pass.set_bind_group(1, &batch.material_bg, &[]);
            r_pass.set_vertex_buffer(0, batch.mesh.vbuf.slice(..));
            r_pass.set_vertex_buffer(1, batch.transform_buf.slice(..));
            r_pass.set_vertex_buffer(2, batch.color_buf.slice(..));
            r_pass.set_index_buffer(batch.mesh.ibuf.slice(..), IndexFormat::Uint32);
            r_pass.draw_indexed(0..batch.mesh.index_count, 0, 0..batch.instance_count);
        }

        if let Some(axes) = &self.axes {
            r_pass.set_pipeline(&self.line_pipeline);
            r_pass.set_bind_group(0, &self.frame.bind_group, &[]);
            r_pass.set_vertex_buffer(0, axes.vbuf.slice(..));
            r_pass.draw(0..axes.count, 0..1);
        }
    }
}
