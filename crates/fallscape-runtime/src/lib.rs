pub mod animation;
pub mod config;
pub mod limiter;

use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use glam::Vec2;
use log::{debug, info, warn};
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, WindowEvent},
    event_loop::EventLoopProxy,
    window::Window,
};

use wgpu::{
    CommandEncoder, CommandEncoderDescriptor, Device, ExperimentalFeatures, Features, Instance,
    Limits, MemoryHints, PowerPreference, Queue, RequestAdapterOptions, Surface, SurfaceConfiguration,
    SurfaceError, TextureView, TextureViewDescriptor,
};

use fallscape_3d::{
    AxesHelper, AxisLabel, GpuBatch, Layouts, LightsUniform, Renderer3D, create_bind_group_layouts,
    hex_to_linear,
};
use fallscape_camera::{Camera, CameraController, PanConfig, project_to_screen, update_camera_buffer};

pub use animation::{Animation, load_models};
pub use config::Config;
pub use limiter::FrameLimiter;

pub type RcWindow = Arc<Window>;

/// An axis label placed in window pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenLabel {
    pub text: &'static str,
    pub position: Vec2,
    pub color: [f32; 4],
}

/// Loads the models, sets up the GPU and the scene, then hands the result to
/// the event loop.
pub async fn create_graphics(
    window: RcWindow,
    proxy: EventLoopProxy<Graphics>,
    config: Config,
) -> Result<()> {
    let models = load_models(&config);
    let animation = Animation::new(&models, &config, config.rng());

    let instance = Instance::default();
    let surface = instance
        .create_surface(Arc::clone(&window))
        .context("failed to create surface")?;

    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .context("could not get an adapter (GPU)")?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: Features::empty(),
            required_limits: Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
            memory_hints: MemoryHints::Performance,
            trace: Default::default(),
            experimental_features: ExperimentalFeatures::disabled(),
        })
        .await
        .context("failed to get device")?;

    let size = window.inner_size();
    let surface_config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .context("surface is not supported by the adapter")?;
    surface.configure(&device, &surface_config);
    info!(
        "surface {}x{} {:?}",
        surface_config.width, surface_config.height, surface_config.format
    );

    let layouts: Layouts = create_bind_group_layouts(&device);
    let mut renderer = Renderer3D::new(
        &device,
        surface_config.format,
        surface_config.width,
        surface_config.height,
        &LightsUniform::from_config(&config.lights),
        hex_to_linear(config.scene.background),
        &layouts,
    );

    if let Some(pool) = animation.pool() {
        for batch in &pool.batches {
            renderer.add_batch(GpuBatch::new(
                &device,
                &layouts,
                batch.model_id(),
                batch.mesh(),
                batch.count(),
                batch.material(),
            ));
        }
    }

    let mut axis_labels = Vec::new();
    if config.helpers.axes {
        let axes = AxesHelper::new(config.helpers.axes_size);
        renderer.set_axes(&device, &axes);
        if config.helpers.axis_labels {
            axis_labels = axes.labels().to_vec();
        }
    }

    let camera = Camera::from_config(&config.camera);
    let controller = config
        .controls
        .enabled
        .then(|| CameraController::new(config.controls.speed));

    let now = Instant::now();
    let gfx = Graphics {
        window,
        surface,
        surface_config,
        device,
        queue,
        renderer,
        camera,
        controller,
        pan: config.camera.pan,
        animation,
        axis_labels,
        started: now,
        last_frame_time: now,
    };

    if proxy.send_event(gfx).is_err() {
        warn!("event loop closed before graphics were ready");
    }
    Ok(())
}

pub struct Graphics {
    window: RcWindow,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    device: Device,
    queue: Queue,
    renderer: Renderer3D,
    camera: Camera,
    controller: Option<CameraController>,
    pan: PanConfig,
    animation: Animation,
    axis_labels: Vec<AxisLabel>,
    started: Instant,
    last_frame_time: Instant,
}

impl Graphics {
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface_config.width = new_size.width.max(1);
        self.surface_config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.renderer.resize(
            &self.device,
            self.surface_config.width,
            self.surface_config.height,
        );
    }

    /// Advances the animation by one frame and draws it. `overlay` records
    /// extra passes on top of the scene before submission. False when the
    /// surface gave no texture and nothing was drawn.
    pub fn frame<F>(&mut self, overlay: F) -> bool
    where
        F: FnOnce(&mut Self, &TextureView, &mut CommandEncoder),
    {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                debug!("{err}, reconfiguring surface");
                self.surface.configure(&self.device, &self.surface_config);
                return false;
            }
            Err(err) => {
                warn!("skipping frame: {err}");
                return false;
            }
        };

        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32().min(0.1);
        self.last_frame_time = now;
        if let Some(controller) = &mut self.controller {
            controller.update(&mut self.camera, dt);
        }
        self.camera.pan_offset = self.pan.offset((now - self.started).as_secs_f32());

        self.animation.step();
        self.animation.sync(&self.queue, &self.renderer.batches);
        update_camera_buffer(
            &self.queue,
            self.renderer.camera_buf(),
            &self.camera,
            self.surface_config.width,
            self.surface_config.height,
        );

        let swap_view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        self.renderer.render(&mut encoder, &swap_view);
        overlay(self, &swap_view, &mut encoder);
        self.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        true
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let Some(controller) = &mut self.controller {
            controller.handle_window_event(event);
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let Some(controller) = &mut self.controller {
            controller.handle_device_event(event, &mut self.camera);
        }
    }

    /// Axis labels visible from the current camera, in window pixels.
    pub fn screen_labels(&self) -> Vec<ScreenLabel> {
        let (width, height) = (self.surface_config.width, self.surface_config.height);
        let view_proj = self.camera.view_proj(width, height);
        self.axis_labels
            .iter()
            .filter_map(|label| {
                let position = project_to_screen(view_proj, label.position, width, height)?;
                Some(ScreenLabel {
                    text: label.text,
                    position,
                    color: label.color,
                })
            })
            .collect()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn surface_config(&self) -> &SurfaceConfiguration {
        &self.surface_config
    }
}
