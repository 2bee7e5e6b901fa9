use wgpu::util::DeviceExt;
use wgpu::*;

use crate::depth::DEPTH_FORMAT;
use crate::helpers::LineVertex;
use crate::lights::LightsUniform;
use crate::model::{CameraUniform, InstanceColor, InstanceTransform, Vertex};

/// Group 0 holds camera and lights, group 1 a batch's material.
pub struct Layouts {
    pub frame_bgl: BindGroupLayout,
    pub material_bgl: BindGroupLayout,
}

fn uniform_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn create_bind_group_layouts(device: &Device) -> Layouts {
    let frame_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("frame_bgl"),
        entries: &[
            uniform_entry(0, ShaderStages::VERTEX_FRAGMENT),
            uniform_entry(1, ShaderStages::FRAGMENT),
        ],
    });
    let material_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("material_bgl"),
        entries: &[uniform_entry(0, ShaderStages::FRAGMENT)],
    });
    Layouts {
        frame_bgl,
        material_bgl,
    }
}

/// Camera and light buffers plus the bind group exposing them.
pub struct FrameBindings {
    pub bind_group: BindGroup,
    pub camera_buf: Buffer,
    pub lights_buf: Buffer,
}

pub fn create_frame_bindings(
    device: &Device,
    layouts: &Layouts,
    lights: &LightsUniform,
) -> FrameBindings {
    let camera_buf = device.create_buffer(&BufferDescriptor {
        label: Some("camera_ubo"),
        size: std::mem::size_of::<CameraUniform>() as BufferAddress,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let lights_buf = device.create_buffer_init(&util::BufferInitDescriptor {
        label: Some("lights_ubo"),
        contents: bytemuck::bytes_of(lights),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });
    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame_bg"),
        layout: &layouts.frame_bgl,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: camera_buf.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: lights_buf.as_entire_binding(),
            },
        ],
    });
    FrameBindings {
        bind_group,
        camera_buf,
        lights_buf,
    }
}

fn depth_state(write: bool) -> DepthStencilState {
    DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: CompareFunction::Less,
        stencil: StencilState::default(),
        bias: DepthBiasState::default(),
    }
}

/// Instanced mesh pipeline: mesh vertices at slot 0, transforms at slot 1,
/// colors at slot 2.
pub fn create_pipeline(
    device: &Device,
    surface_format: TextureFormat,
    layouts: &Layouts,
) -> RenderPipeline {
    let shader = device.create_shader_module(include_wgsl!("shader.wgsl"));
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("instanced_layout"),
        bind_group_layouts: &[&layouts.frame_bgl, &layouts.material_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("instanced_pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: PipelineCompilationOptions::default(),
            buffers: &[
                Vertex::layout(),
                InstanceTransform::layout(),
                InstanceColor::layout(),
            ],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: PipelineCompilationOptions::default(),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            // models are shaded from both sides
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(true)),
        multisample: MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub fn create_line_pipeline(
    device: &Device,
    surface_format: TextureFormat,
    layouts: &Layouts,
) -> RenderPipeline {
    let shader = device.create_shader_module(include_wgsl!("lines.wgsl"));
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("line_layout"),
        bind_group_layouts: &[&layouts.frame_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("line_pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: PipelineCompilationOptions::default(),
            buffers: &[LineVertex::layout()],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: PipelineCompilationOptions::default(),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::LineList,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(true)),
        multisample: MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
