use fallscape_runtime::{Config, FrameLimiter, Graphics, RcWindow, ScreenLabel, create_graphics};
use log::error;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

const LABEL_FONT_SIZE: f32 = 16.0;

enum State {
    Ready(ReadyState),
    Init(Option<EventLoopProxy<Graphics>>),
}

struct ReadyState {
    gfx: Graphics,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

pub struct App {
    state: State,
    config: Config,
    limiter: FrameLimiter,
}

impl App {
    pub fn new(event_loop: &EventLoop<Graphics>, config: Config) -> Self {
        Self {
            state: State::Init(Some(event_loop.create_proxy())),
            limiter: FrameLimiter::from_config(&config.animation),
            config,
        }
    }

    fn init_egui_for_graphics(
        gfx: &Graphics,
    ) -> (egui::Context, egui_winit::State, egui_wgpu::Renderer) {
        let egui_ctx = egui::Context::default();
        let viewport_id = egui_ctx.viewport_id();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            viewport_id,
            gfx.window(),
            None,
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            gfx.device(),
            gfx.surface_config().format,
            egui_wgpu::RendererOptions::default(),
        );

        (egui_ctx, egui_state, egui_renderer)
    }

    fn resized(&mut self, size: PhysicalSize<u32>) {
        if let State::Ready(ready) = &mut self.state {
            ready.gfx.resize(size);
        }
    }

    fn request_redraw(&self) {
        if let State::Ready(ready) = &self.state {
            ready.gfx.request_redraw();
        }
    }

    /// Runs a frame when the limiter allows it. Only presented frames count
    /// towards the limit; a lost surface retries on the next redraw.
    fn redraw(&mut self) {
        let State::Ready(ready) = &mut self.state else {
            return;
        };
        let now = Instant::now();
        if self.limiter.due(now) {
            if Self::draw_frame(ready) {
                self.limiter.record(now);
            } else {
                ready.gfx.request_redraw();
            }
        }
        if !self.limiter.is_limited() {
            ready.gfx.request_redraw();
        }
    }

    fn draw_frame(ready: &mut ReadyState) -> bool {
        let raw_input = ready.egui_state.take_egui_input(ready.gfx.window());
        let labels = ready.gfx.screen_labels();
        let full_output = ready.egui_ctx.run(raw_input, |ctx| paint_labels(ctx, &labels));

        let egui::FullOutput {
            platform_output,
            textures_delta,
            shapes,
            pixels_per_point,
            ..
        } = full_output;

        ready
            .egui_state
            .handle_platform_output(ready.gfx.window(), platform_output);

        let paint_jobs = ready.egui_ctx.tessellate(shapes, pixels_per_point);

        ready.gfx.frame(|gfx_inner, swap_view, encoder| {
            for (id, image_delta) in &textures_delta.set {
                ready.egui_renderer.update_texture(
                    gfx_inner.device(),
                    gfx_inner.queue(),
                    *id,
                    image_delta,
                );
            }
            for id in &textures_delta.free {
                ready.egui_renderer.free_texture(id);
            }

            let screen_descriptor = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [
                    gfx_inner.surface_config().width,
                    gfx_inner.surface_config().height,
                ],
                pixels_per_point,
            };

            ready.egui_renderer.update_buffers(
                gfx_inner.device(),
                gfx_inner.queue(),
                encoder,
                &paint_jobs,
                &screen_descriptor,
            );

            let rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui_overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: swap_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut rpass = rpass.forget_lifetime();
            ready
                .egui_renderer
                .render(&mut rpass, &paint_jobs, &screen_descriptor);
        })
    }
}

/// Draws the axis labels straight onto the foreground layer.
fn paint_labels(ctx: &egui::Context, labels: &[ScreenLabel]) {
    if labels.is_empty() {
        return;
    }
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Foreground,
        egui::Id::new("axis_labels"),
    ));
    let scale = ctx.pixels_per_point();
    for label in labels {
        let [r, g, b, a] = label.color;
        painter.text(
            egui::pos2(label.position.x / scale, label.position.y / scale),
            egui::Align2::CENTER_CENTER,
            label.text,
            egui::FontId::proportional(LABEL_FONT_SIZE),
            egui::Rgba::from_rgba_unmultiplied(r, g, b, a).into(),
        );
    }
}

impl ApplicationHandler<Graphics> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let State::Init(proxy) = &mut self.state else {
            return;
        };
        let Some(proxy) = proxy.take() else {
            return;
        };

        let mut win_attr = Window::default_attributes().with_title(self.config.scene.title.clone());
        if self.config.scene.fullscreen {
            win_attr = win_attr.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window: RcWindow = match event_loop.create_window(win_attr) {
            Ok(window) => std::sync::Arc::new(window),
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };
        if let Err(err) = pollster::block_on(create_graphics(window, proxy, self.config.clone())) {
            error!("{err:#}");
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, graphics: Graphics) {
        let (egui_ctx, egui_state, egui_renderer) = App::init_egui_for_graphics(&graphics);

        graphics.request_redraw();
        self.state = State::Ready(ReadyState {
            gfx: graphics,
            egui_ctx,
            egui_state,
            egui_renderer,
        });
    }

    fn new_events(&mut self, _event_loop: &ActiveEventLoop, cause: StartCause) {
        if let StartCause::ResumeTimeReached { .. } = cause {
            self.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::Resized(size) => {
                self.resized(size);
                self.request_redraw();
            }
            WindowEvent::RedrawRequested => self.redraw(),
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event: ref key_event,
                ..
            } if key_event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                && key_event.state == ElementState::Pressed =>
            {
                event_loop.exit();
            }
            other => {
                if let State::Ready(ready) = &mut self.state {
                    let response = ready.egui_state.on_window_event(ready.gfx.window(), &other);
                    if !response.consumed {
                        ready.gfx.handle_window_event(&other);
                    }
                }
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let State::Ready(ready) = &mut self.state {
            ready.gfx.handle_device_event(&event);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match self.limiter.next_deadline() {
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}
