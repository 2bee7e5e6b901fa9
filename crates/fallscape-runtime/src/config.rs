//! `fallscape.toml`: every section optional, read once at startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use fallscape_3d::{LightingConfig, Material};
use fallscape_camera::CameraConfig;
use fallscape_gltf::ModelsConfig;
use fallscape_scene::FieldConfig;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::limiter::FrameLimiter;

pub const CONFIG_ENV: &str = "FALLSCAPE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fallscape.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// `0xRRGGBB` clear color.
    pub background: u32,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
    pub fullscreen: bool,
    pub title: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            background: 0x1a1a2e,
            seed: None,
            fullscreen: false,
            title: "Fallscape".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub limit_fps: bool,
    pub target_fps: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            limit_fps: false,
            target_fps: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HelpersConfig {
    pub axes: bool,
    pub axes_size: f32,
    pub axis_labels: bool,
}

impl Default for HelpersConfig {
    fn default() -> Self {
        Self {
            axes: true,
            axes_size: 100.0,
            axis_labels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub enabled: bool,
    /// Fly speed in units per second.
    pub speed: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 60.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scene: SceneConfig,
    pub camera: CameraConfig,
    pub field: FieldConfig,
    pub animation: AnimationConfig,
    pub material: Material,
    pub lights: LightingConfig,
    pub helpers: HelpersConfig,
    pub controls: ControlsConfig,
    pub models: ModelsConfig,
}

impl Config {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: Config = toml::from_str(src).context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// `$FALLSCAPE_CONFIG`, else `fallscape.toml`. A missing default file is
    /// silently replaced by defaults; any other problem is logged first.
    pub fn load_or_default() -> Self {
        let (path, explicit) = match std::env::var_os(CONFIG_ENV) {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !explicit && !path.exists() {
            info!("no {DEFAULT_CONFIG_PATH} found, using defaults");
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("loaded configuration from {}", path.display());
                config
            }
            Err(err) => {
                error!("{err:#}; using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let field = &self.field;
        for (name, value) in [
            ("x_spread", field.x_spread),
            ("y_spread", field.y_spread),
            ("z_spread", field.z_spread),
            ("y_offset", field.y_offset),
            ("min_scale", field.min_scale),
            ("max_scale", field.max_scale),
            ("density", field.density),
            ("fall_speed", field.fall_speed),
            ("max_rotation_speed", field.max_rotation_speed),
            ("rotation_multiplier", field.rotation_multiplier),
            ("recycle_margin", field.recycle_margin),
        ] {
            ensure!(value.is_finite(), "field.{name} must be finite, got {value}");
        }
        ensure!(
            field.x_spread >= 0.0 && field.y_spread >= 0.0 && field.z_spread >= 0.0,
            "field spreads must not be negative"
        );
        ensure!(
            field.min_scale <= field.max_scale,
            "field.min_scale ({}) exceeds field.max_scale ({})",
            field.min_scale,
            field.max_scale
        );
        ensure!(field.density >= 0.0, "field.density must not be negative");
        ensure!(field.recycle_margin >= 0.0, "field.recycle_margin must not be negative");
        let requested = field.requested_objects().round();
        ensure!(
            requested <= field.max_objects as f64,
            "field holds {requested} objects, more than field.max_objects ({})",
            field.max_objects
        );

        ensure!(
            FrameLimiter::interval_for(self.animation.target_fps).is_some(),
            "animation.target_fps must be a positive, finite rate, got {}",
            self.animation.target_fps
        );

        let camera = &self.camera;
        let camera_values = [
            camera.fov,
            camera.near,
            camera.far,
            camera.pan.amplitude,
            camera.pan.speed,
        ]
        .into_iter()
        .chain(camera.position)
        .chain(camera.target);
        for value in camera_values {
            ensure!(value.is_finite(), "camera values must be finite, got {value}");
        }
        ensure!(
            camera.near > 0.0 && camera.far > camera.near,
            "camera planes must satisfy 0 < near < far"
        );
        ensure!(
            camera.fov > 0.0 && camera.fov < 180.0,
            "camera.fov must be between 0 and 180 degrees"
        );
        ensure!(
            camera.position != camera.target,
            "camera.position and camera.target must differ"
        );

        ensure!(
            self.helpers.axes_size.is_finite() && self.controls.speed.is_finite(),
            "helpers.axes_size and controls.speed must be finite"
        );
        ensure!(
            self.material.shininess.is_finite(),
            "material.shininess must be finite"
        );
        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        match self.scene.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallscape_3d::MaterialKind;
    use rand::Rng;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.field.x_spread, 200.0);
        assert_eq!(config.camera.position, [0.0, 0.0, 400.0]);
        assert!(!config.animation.limit_fps);
        assert_eq!(config.material.kind, MaterialKind::Phong);
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = Config::from_toml_str(
            r#"
            [scene]
            seed = 7

            [field]
            density = 8.0
            palette = [0xffffff]

            [animation]
            limit_fps = true
            target_fps = 30

            [material]
            kind = "lambert"

            [models]
            directory = "https://example.com/models/"
            "#,
        )
        .unwrap();

        assert_eq!(config.scene.seed, Some(7));
        assert_eq!(config.scene.background, SceneConfig::default().background);
        assert_eq!(config.field.density, 8.0);
        assert_eq!(config.field.palette, vec![0xffffff]);
        assert_eq!(config.field.y_spread, 600.0);
        assert!(config.animation.limit_fps);
        assert_eq!(config.animation.target_fps, 30.0);
        assert_eq!(config.material.kind, MaterialKind::Lambert);
        assert_eq!(config.models.directory, "https://example.com/models/");
        assert_eq!(config.models.extensions, vec!["glb".to_string()]);
    }

    #[test]
    fn lights_section_replaces_light_lists() {
        let config = Config::from_toml_str(
            r#"
            [lights.ambient]
            color = 0x202020
            intensity = 0.3

            [[lights.point]]
            position = [0.0, 50.0, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.lights.ambient.color, 0x202020);
        assert_eq!(config.lights.point.len(), 1);
        assert_eq!(config.lights.point[0].position, [0.0, 50.0, 0.0]);
        assert_eq!(config.lights.directional, LightingConfig::default().directional);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for src in [
            "[field]\nmin_scale = 20.0\nmax_scale = 10.0",
            "[field]\nx_spread = -1.0",
            "[animation]\ntarget_fps = 0",
            "[camera]\nnear = 10.0\nfar = 5.0",
            "[camera]\nposition = [0.0, 0.0, 0.0]\ntarget = [0.0, 0.0, 0.0]",
            "[scene\nseed = 1",
            "[field]\nmax_rotation_speed = inf",
            "[field]\nmin_scale = inf\nmax_scale = inf",
            "[field]\nmax_scale = inf",
            "[field]\nfall_speed = nan",
            "[field]\nx_spread = 1e20",
            "[field]\nmax_objects = 47",
            "[animation]\nlimit_fps = true\ntarget_fps = 1e-30",
            "[animation]\ntarget_fps = inf",
            "[camera]\nfar = inf",
            "[camera]\nposition = [0.0, nan, 400.0]",
            "[camera.pan]\namplitude = -inf",
        ] {
            assert!(Config::from_toml_str(src).is_err(), "accepted {src:?}");
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let config = Config::from_toml_str("[scene]\nseed = 42").unwrap();
        let a: u64 = config.rng().r#gen();
        let b: u64 = config.rng().r#gen();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Path::new("/definitely/not/here/fallscape.toml")).is_err());
    }
}
