//! Static scene lights and their uniform packing.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::warn;
use serde::Deserialize;

use crate::color::hex_to_linear;

/// Lights of each kind the shader iterates over.
pub const MAX_LIGHTS_PER_KIND: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AmbientLight {
    pub color: u32,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 0.4,
        }
    }
}

/// Shines from `position` towards the origin.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirectionalLight {
    pub color: u32,
    pub intensity: f32,
    pub position: [f32; 3],
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 0.8,
            position: [1.0, 1.0, 1.0],
        }
    }
}

/// `distance == 0` means unlimited range; `decay == 0` disables falloff.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PointLight {
    pub color: u32,
    pub intensity: f32,
    pub position: [f32; 3],
    pub distance: f32,
    pub decay: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 1.0,
            position: [0.0, 0.0, 0.0],
            distance: 0.0,
            decay: 0.0,
        }
    }
}

/// Cone light aimed at `target`. `angle` is the half-angle in radians,
/// `penumbra` the fraction of the cone that fades out.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpotLight {
    pub color: u32,
    pub intensity: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub angle: f32,
    pub penumbra: f32,
    pub distance: f32,
    pub decay: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 1.0,
            position: [0.0, 300.0, 0.0],
            target: [0.0, 0.0, 0.0],
            angle: std::f32::consts::FRAC_PI_6,
            penumbra: 0.2,
            distance: 0.0,
            decay: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: AmbientLight,
    pub directional: Vec<DirectionalLight>,
    pub point: Vec<PointLight>,
    pub spot: Vec<SpotLight>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: AmbientLight::default(),
            directional: vec![
                DirectionalLight::default(),
                DirectionalLight {
                    color: 0x8899ff,
                    intensity: 0.4,
                    position: [-1.0, -0.5, -1.0],
                },
            ],
            point: vec![PointLight {
                color: 0xffaa66,
                intensity: 0.6,
                position: [0.0, 0.0, 150.0],
                distance: 600.0,
                decay: 0.0,
            }],
            spot: vec![SpotLight::default()],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    /// Unit vector from the surface towards the light.
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuPointLight {
    /// xyz position, w range.
    pub position: [f32; 4],
    /// rgb radiance, w decay.
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuSpotLight {
    /// xyz position, w range.
    pub position: [f32; 4],
    /// xyz unit axis of the cone, w cosine of the outer angle.
    pub direction: [f32; 4],
    /// rgb radiance, w decay.
    pub color: [f32; 4],
    /// x cosine of the inner angle.
    pub cone: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightsUniform {
    pub ambient: [f32; 4],
    /// Directional, point and spot counts.
    pub counts: [u32; 4],
    pub directional: [GpuDirectionalLight; MAX_LIGHTS_PER_KIND],
    pub point: [GpuPointLight; MAX_LIGHTS_PER_KIND],
    pub spot: [GpuSpotLight; MAX_LIGHTS_PER_KIND],
}

fn radiance(color: u32, intensity: f32) -> Vec3 {
    Vec3::from_array(hex_to_linear(color)) * intensity
}

fn take_limited<'a, T>(kind: &str, lights: &'a [T]) -> &'a [T] {
    if lights.len() > MAX_LIGHTS_PER_KIND {
        warn!(
            "{} {kind} lights configured, only the first {MAX_LIGHTS_PER_KIND} are used",
            lights.len()
        );
    }
    &lights[..lights.len().min(MAX_LIGHTS_PER_KIND)]
}

impl LightsUniform {
    pub fn from_config(config: &LightingConfig) -> Self {
        let mut uniform = Self::zeroed();
        uniform.ambient = radiance(config.ambient.color, config.ambient.intensity)
            .extend(1.0)
            .to_array();

        let directional = take_limited("directional", &config.directional);
        for (slot, light) in uniform.directional.iter_mut().zip(directional) {
            *slot = GpuDirectionalLight {
                direction: Vec3::from_array(light.position)
                    .normalize_or(Vec3::Y)
                    .extend(0.0)
                    .to_array(),
                color: radiance(light.color, light.intensity).extend(1.0).to_array(),
            };
        }

        let point = take_limited("point", &config.point);
        for (slot, light) in uniform.point.iter_mut().zip(point) {
            *slot = GpuPointLight {
                position: Vec3::from_array(light.position)
                    .extend(light.distance.max(0.0))
                    .to_array(),
                color: radiance(light.color, light.intensity)
                    .extend(light.decay.max(0.0))
                    .to_array(),
            };
        }

        let spot = take_limited("spot", &config.spot);
        for (slot, light) in uniform.spot.iter_mut().zip(spot) {
            let position = Vec3::from_array(light.position);
            let axis = (Vec3::from_array(light.target) - position).normalize_or(Vec3::NEG_Y);
            let outer = light.angle.clamp(0.0, std::f32::consts::FRAC_PI_2);
            let inner = outer * (1.0 - light.penumbra.clamp(0.0, 1.0));
            *slot = GpuSpotLight {
                position: position.extend(light.distance.max(0.0)).to_array(),
                direction: axis.extend(outer.cos()).to_array(),
                color: radiance(light.color, light.intensity)
                    .extend(light.decay.max(0.0))
                    .to_array(),
                // keep the smoothstep edges apart when penumbra is zero
                cone: [inner.cos().max(outer.cos() + 1e-4), 0.0, 0.0, 0.0],
            };
        }

        uniform.counts = [
            directional.len() as u32,
            point.len() as u32,
            spot.len() as u32,
            0,
        ];
        uniform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn packs_counts_and_directions() {
        let uniform = LightsUniform::from_config(&LightingConfig::default());
        assert_eq!(uniform.counts, [2, 1, 1, 0]);

        let dir = Vec3::from_slice(&uniform.directional[0].direction[..3]);
        assert_relative_eq!(dir.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(dir.x, 1.0 / 3.0_f32.sqrt(), epsilon = 1e-6);

        let spot = uniform.spot[0];
        assert_eq!(&spot.direction[..3], &[0.0, -1.0, 0.0]);
        assert!(spot.cone[0] > spot.direction[3], "inner cone must be narrower");
    }

    #[test]
    fn extra_lights_are_dropped() {
        let config = LightingConfig {
            point: vec![PointLight::default(); MAX_LIGHTS_PER_KIND + 2],
            ..LightingConfig::default()
        };
        let uniform = LightsUniform::from_config(&config);
        assert_eq!(uniform.counts[1], MAX_LIGHTS_PER_KIND as u32);
    }

    #[test]
    fn uniform_size_is_a_multiple_of_sixteen() {
        assert_eq!(std::mem::size_of::<LightsUniform>() % 16, 0);
    }
}
