use fallscape_3d::CameraUniform;
use glam::{Mat4, Vec2, Vec3};
use serde::Deserialize;
use wgpu::{Buffer, Queue};
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::KeyCode;

pub fn forward_from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
    let cp = pitch.cos();
    let sp = pitch.sin();
    let cy = yaw.cos();
    let sy = yaw.sin();
    Vec3::new(cy * cp, sp, -sy * cp)
}

/// Inverse of [`forward_from_yaw_pitch`] for a non-zero direction.
pub fn yaw_pitch_towards(direction: Vec3) -> (f32, f32) {
    let d = direction.normalize_or(Vec3::NEG_Z);
    let pitch = d.y.clamp(-1.0, 1.0).asin();
    let yaw = (-d.z).atan2(d.x);
    (yaw, pitch)
}

/// Side-to-side drift of the camera around its configured position.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PanConfig {
    pub enabled: bool,
    /// Peak offset along X in world units.
    pub amplitude: f32,
    /// Angular speed of the sway in radians per second.
    pub speed: f32,
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amplitude: 40.0,
            speed: 0.15,
        }
    }
}

impl PanConfig {
    pub fn offset(&self, elapsed_secs: f32) -> Vec3 {
        if !self.enabled {
            return Vec3::ZERO;
        }
        Vec3::X * self.amplitude * (elapsed_secs * self.speed).sin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub pan: PanConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 2000.0,
            position: [0.0, 0.0, 400.0],
            target: [0.0, 0.0, 0.0],
            pan: PanConfig::default(),
        }
    }
}

pub struct Camera {
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Added to `eye` when building the view, see [`PanConfig::offset`].
    pub pan_offset: Vec3,
}

impl Camera {
    pub fn from_config(config: &CameraConfig) -> Self {
        let eye = Vec3::from_array(config.position);
        let (yaw, pitch) = yaw_pitch_towards(Vec3::from_array(config.target) - eye);
        Self {
            eye,
            yaw,
            pitch,
            fov_y: config.fov.to_radians(),
            near: config.near,
            far: config.far,
            pan_offset: Vec3::ZERO,
        }
    }

    pub fn view_eye(&self) -> Vec3 {
        self.eye + self.pan_offset
    }

    pub fn view_proj(&self, width: u32, height: u32) -> Mat4 {
        let eye = self.view_eye();
        let target = eye + forward_from_yaw_pitch(self.yaw, self.pitch);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let aspect = (width.max(1) as f32) / (height.max(1) as f32);
        let proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj * view
    }
}

/// Fly controls: WASD to move, J/K down and up, Shift to boost, drag with
/// the left mouse button to look around.
pub struct CameraController {
    move_forward: bool,
    move_back: bool,
    move_left: bool,
    move_right: bool,
    move_up: bool,
    move_down: bool,
    boost_speed: bool,
    looking: bool,
    base_speed: f32,
}

impl CameraController {
    pub fn new(base_speed: f32) -> Self {
        Self {
            move_forward: false,
            move_back: false,
            move_left: false,
            move_right: false,
            move_up: false,
            move_down: false,
            boost_speed: false,
            looking: false,
            base_speed,
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: winit::keyboard::PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if *repeat {
                    return;
                }
                let pressed = *state == ElementState::Pressed;
                match code {
                    KeyCode::KeyW => self.move_forward = pressed,
                    KeyCode::KeyS => self.move_back = pressed,
                    KeyCode::KeyA => self.move_left = pressed,
                    KeyCode::KeyD => self.move_right = pressed,
                    KeyCode::KeyJ => self.move_down = pressed,
                    KeyCode::KeyK => self.move_up = pressed,
                    KeyCode::ShiftLeft => self.boost_speed = pressed,
                    _ => {}
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.looking = *state == ElementState::Pressed,
            WindowEvent::Focused(false) => *self = Self::new(self.base_speed),
            _ => {}
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent, cam: &mut Camera) {
        if !self.looking {
            return;
        }
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            let sensitivity = 0.0025;
            cam.yaw -= (*dx as f32) * sensitivity;
            cam.pitch -= (*dy as f32) * sensitivity;
            let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
            cam.pitch = cam.pitch.clamp(-max_pitch, max_pitch);
        }
    }

    pub fn update(&mut self, cam: &mut Camera, dt: f32) {
        let mut movement = Vec3::ZERO;

        let forward = forward_from_yaw_pitch(cam.yaw, cam.pitch);
        let mut flat_forward = Vec3::new(forward.x, 0.0, forward.z);
        if flat_forward.length_squared() > 0.0 {
            flat_forward = flat_forward.normalize();
        }

        let mut right = flat_forward.cross(Vec3::Y);
        if right.length_squared() > 0.0 {
            right = right.normalize();
        }

        if self.move_forward {
            movement += flat_forward;
        }
        if self.move_back {
            movement -= flat_forward;
        }
        if self.move_right {
            movement += right;
        }
        if self.move_left {
            movement -= right;
        }
        if self.move_up {
            movement += Vec3::Y;
        }
        if self.move_down {
            movement -= Vec3::Y;
        }

        if movement.length_squared() > 0.0 {
            movement = movement.normalize();
            let mut speed = self.base_speed;
            if self.boost_speed {
                speed *= 5.0;
            }
            cam.eye += movement * speed * dt;
        }
    }
}

pub fn update_camera_buffer(
    queue: &Queue,
    camera_buf: &Buffer,
    camera: &Camera,
    width: u32,
    height: u32,
) {
    let uniform = CameraUniform::new(camera.view_proj(width, height), camera.view_eye());
    queue.write_buffer(camera_buf, 0, bytemuck::bytes_of(&uniform));
}

/// World position to window pixels (origin top-left), `None` when the point
/// is behind the camera or outside the depth range.
pub fn project_to_screen(view_proj: Mat4, point: Vec3, width: u32, height: u32) -> Option<Vec2> {
    let clip = view_proj * point.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if !(0.0..=1.0).contains(&ndc.z) {
        return None;
    }
    Some(Vec2::new(
        (ndc.x * 0.5 + 0.5) * width as f32,
        (0.5 - ndc.y * 0.5) * height as f32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn yaw_pitch_round_trips_through_forward() {
        let dir = Vec3::new(0.3, -0.4, -0.8).normalize();
        let (yaw, pitch) = yaw_pitch_towards(dir);
        let back = forward_from_yaw_pitch(yaw, pitch);
        assert_relative_eq!(back.x, dir.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, dir.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, dir.z, epsilon = 1e-5);
    }

    #[test]
    fn configured_camera_looks_at_its_target() {
        let camera = Camera::from_config(&CameraConfig::default());
        let forward = forward_from_yaw_pitch(camera.yaw, camera.pitch);
        assert_relative_eq!(forward.z, -1.0, epsilon = 1e-5);

        let center = project_to_screen(camera.view_proj(800, 600), Vec3::ZERO, 800, 600).unwrap();
        assert_relative_eq!(center.x, 400.0, epsilon = 1e-3);
        assert_relative_eq!(center.y, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn points_behind_the_camera_do_not_project() {
        let camera = Camera::from_config(&CameraConfig::default());
        let behind = Vec3::new(0.0, 0.0, 500.0);
        assert!(project_to_screen(camera.view_proj(800, 600), behind, 800, 600).is_none());
    }

    #[test]
    fn points_above_center_land_in_the_upper_half() {
        let camera = Camera::from_config(&CameraConfig::default());
        let above = project_to_screen(camera.view_proj(800, 600), Vec3::Y * 50.0, 800, 600).unwrap();
        assert!(above.y < 300.0);
    }

    #[test]
    fn pan_is_zero_when_disabled() {
        let pan = PanConfig::default();
        assert_eq!(pan.offset(12.0), Vec3::ZERO);

        let pan = PanConfig {
            enabled: true,
            amplitude: 10.0,
            speed: 1.0,
        };
        assert_relative_eq!(pan.offset(std::f32::consts::FRAC_PI_2).x, 10.0, epsilon = 1e-5);
    }
}
