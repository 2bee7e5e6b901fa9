pub mod color;
pub mod depth;
pub mod geometry;
pub mod helpers;
pub mod lights;
pub mod model;
pub mod pipeline;
pub mod render;

pub use color::{hex_to_linear, hex_to_linear_rgba};
pub use depth::create_depth;
pub use geometry::{Aabb, BoundingSphere, MeshData};
pub use helpers::{AxesHelper, AxisLabel, LineVertex};
pub use lights::{LightingConfig, LightsUniform};
pub use model::{
    CameraUniform, GpuMesh, LoadedModel, Material, MaterialKind, Vertex, create_material_ubo,
};
pub use pipeline::{Layouts, create_bind_group_layouts, create_pipeline};
pub use render::{GpuBatch, Renderer3D};
