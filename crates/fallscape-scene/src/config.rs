use serde::Deserialize;

/// Extents, sizes and motion of the falling objects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub x_spread: f32,
    pub y_spread: f32,
    pub z_spread: f32,
    /// Vertical center of the field.
    pub y_offset: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Objects per million cubic units.
    pub density: f32,
    /// `0xRRGGBB` colors picked per object.
    pub palette: Vec<u32>,
    /// Units fallen per frame.
    pub fall_speed: f32,
    /// Rotation speeds are drawn from `[-max/2, max/2]`.
    pub max_rotation_speed: f32,
    pub rotation_multiplier: f32,
    /// How far below the field an object may drop before it is recycled.
    pub recycle_margin: f32,
    /// Upper bound on the derived object count.
    pub max_objects: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            x_spread: 200.0,
            y_spread: 600.0,
            z_spread: 100.0,
            y_offset: 0.0,
            min_scale: 5.0,
            max_scale: 15.0,
            density: 4.0,
            palette: vec![0xff6b6b, 0x4ecdc4, 0xffe66d, 0x95e1d3, 0xf38181, 0xaa96da],
            fall_speed: 0.5,
            max_rotation_speed: 2.0,
            rotation_multiplier: 0.01,
            recycle_margin: 10.0,
            max_objects: 100_000,
        }
    }
}

impl FieldConfig {
    /// Unrounded, uncapped object count for the field's volume.
    pub fn requested_objects(&self) -> f64 {
        f64::from(self.x_spread)
            * f64::from(self.y_spread)
            * f64::from(self.z_spread)
            * f64::from(self.density)
            / 1_000_000.0
    }

    /// Height at which recycled objects reappear.
    pub fn top(&self) -> f32 {
        self.y_offset + self.y_spread / 2.0
    }

    /// Objects strictly below this height are recycled.
    pub fn recycle_threshold(&self) -> f32 {
        self.y_offset - self.y_spread / 2.0 - self.recycle_margin
    }
}
