use std::f32::consts::PI;
use std::sync::Arc;

use fallscape_3d::{LoadedModel, Material, MeshData, hex_to_linear_rgba};
use glam::{EulerRot, Mat4, Quat, Vec3};
use log::{debug, info, warn};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::FieldConfig;

/// Number of objects the field should hold, derived from its volume and
/// capped at `max_objects`.
pub fn object_count(field: &FieldConfig) -> usize {
    let count = field.requested_objects().round();
    if !(count.is_finite() && count > 0.0) {
        return 0;
    }
    if count > field.max_objects as f64 {
        warn!(
            "field asks for {count} objects, capping at {}",
            field.max_objects
        );
        return field.max_objects;
    }
    count as usize
}

/// Splits `total` objects over `models` models as evenly as possible; the
/// last models absorb the shortfall and may receive nothing.
pub fn partition(total: usize, models: usize) -> Vec<usize> {
    if models == 0 {
        return Vec::new();
    }
    let per_model = total.div_ceil(models);
    let mut assigned = 0;
    (0..models)
        .map(|_| {
            let n = per_model.min(total - assigned);
            assigned += n;
            n
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub position: Vec3,
    /// Euler angles, XYZ order.
    pub rotation: Vec3,
    pub scale: f32,
    pub rotation_speed_x: f32,
    pub rotation_speed_z: f32,
    /// Index of the owning batch in [`Pool::batches`].
    pub batch: usize,
    /// Slot of this object inside its batch.
    pub slot: usize,
}

impl ObjectState {
    pub fn transform(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), rotation, self.position)
    }
}

/// Instance arrays for one model. Capacity is fixed at creation.
pub struct InstanceBatch {
    model_id: String,
    mesh: Arc<MeshData>,
    material: Material,
    transforms: Vec<Mat4>,
    colors: Vec<[f32; 4]>,
    transforms_dirty: bool,
    colors_dirty: bool,
}

impl InstanceBatch {
    pub fn new(model_id: impl Into<String>, mesh: Arc<MeshData>, material: Material, capacity: usize) -> Self {
        Self {
            model_id: model_id.into(),
            mesh,
            material,
            transforms: vec![Mat4::IDENTITY; capacity],
            colors: vec![[1.0; 4]; capacity],
            transforms_dirty: true,
            colors_dirty: true,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn mesh(&self) -> &Arc<MeshData> {
        &self.mesh
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn count(&self) -> usize {
        self.transforms.len()
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn colors(&self) -> &[[f32; 4]] {
        &self.colors
    }

    /// Out-of-range slots are ignored.
    pub fn set_transform_at(&mut self, slot: usize, transform: Mat4) {
        if let Some(t) = self.transforms.get_mut(slot) {
            *t = transform;
            self.transforms_dirty = true;
        }
    }

    pub fn set_color_at(&mut self, slot: usize, color: [f32; 4]) {
        if let Some(c) = self.colors.get_mut(slot) {
            *c = color;
            self.colors_dirty = true;
        }
    }

    pub fn transforms_dirty(&self) -> bool {
        self.transforms_dirty
    }

    pub fn colors_dirty(&self) -> bool {
        self.colors_dirty
    }

    /// Returns whether the transforms need uploading and clears the flag.
    pub fn take_transforms_dirty(&mut self) -> bool {
        std::mem::take(&mut self.transforms_dirty)
    }

    pub fn take_colors_dirty(&mut self) -> bool {
        std::mem::take(&mut self.colors_dirty)
    }
}

#[derive(Default)]
pub struct Pool {
    pub objects: Vec<ObjectState>,
    pub batches: Vec<InstanceBatch>,
}

impl Pool {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Writes `object`'s transform into its batch slot.
    pub(crate) fn write_transform(&mut self, index: usize) {
        let object = self.objects[index];
        if let Some(batch) = self.batches.get_mut(object.batch) {
            batch.set_transform_at(object.slot, object.transform());
        }
    }
}

/// Uniform in `[-extent/2, extent/2]`.
pub(crate) fn sample_centered<R: Rng + ?Sized>(rng: &mut R, extent: f32) -> f32 {
    let half = extent.abs() / 2.0;
    rng.gen_range(-half..=half)
}

fn sample_object<R: Rng + ?Sized>(
    rng: &mut R,
    field: &FieldConfig,
    batch: usize,
    slot: usize,
) -> ObjectState {
    let position = Vec3::new(
        sample_centered(rng, field.x_spread),
        sample_centered(rng, field.y_spread) + field.y_offset,
        sample_centered(rng, field.z_spread),
    );
    let rotation = Vec3::new(
        rng.gen_range(0.0..=PI),
        rng.gen_range(0.0..=PI),
        rng.gen_range(0.0..=PI),
    );
    let (lo, hi) = if field.min_scale <= field.max_scale {
        (field.min_scale, field.max_scale)
    } else {
        (field.max_scale, field.min_scale)
    };
    ObjectState {
        position,
        rotation,
        scale: rng.gen_range(lo..=hi),
        rotation_speed_x: sample_centered(rng, field.max_rotation_speed),
        rotation_speed_z: sample_centered(rng, field.max_rotation_speed),
        batch,
        slot,
    }
}

/// Creates one batch per model that receives objects and fills every slot
/// with a randomized object.
pub fn build_pool<R: Rng + ?Sized>(
    models: &[LoadedModel],
    total: usize,
    field: &FieldConfig,
    material: &Material,
    rng: &mut R,
) -> Pool {
    let mut pool = Pool::default();

    for (model, count) in models.iter().zip(partition(total, models.len())) {
        if count == 0 {
            debug!("model {} gets no objects, skipping its batch", model.id);
            continue;
        }

        let batch_index = pool.batches.len();
        let mut batch = InstanceBatch::new(&model.id, Arc::clone(&model.mesh), *material, count);
        for slot in 0..count {
            let object = sample_object(rng, field, batch_index, slot);
            let color = field
                .palette
                .choose(rng)
                .map_or([1.0; 4], |&hex| hex_to_linear_rgba(hex));
            batch.set_transform_at(slot, object.transform());
            batch.set_color_at(slot, color);
            pool.objects.push(object);
        }
        pool.batches.push(batch);
    }

    info!(
        "built {} objects in {} batches from {} models",
        pool.objects.len(),
        pool.batches.len(),
        models.len()
    );
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn models(n: usize) -> Vec<LoadedModel> {
        let mesh = Arc::new(MeshData::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        ));
        (0..n)
            .map(|i| LoadedModel {
                id: format!("model-{i}.glb"),
                mesh: Arc::clone(&mesh),
            })
            .collect()
    }

    #[test]
    fn object_count_follows_volume_and_density() {
        assert_eq!(object_count(&FieldConfig::default()), 48);

        let sparse = FieldConfig {
            density: 0.0,
            ..FieldConfig::default()
        };
        assert_eq!(object_count(&sparse), 0);

        let rounded = FieldConfig {
            x_spread: 100.0,
            y_spread: 100.0,
            z_spread: 100.0,
            density: 2.5,
            ..FieldConfig::default()
        };
        // 2.5 rounds half away from zero
        assert_eq!(object_count(&rounded), 3);
    }

    #[test]
    fn object_count_is_capped() {
        let huge = FieldConfig {
            x_spread: 1e20,
            ..FieldConfig::default()
        };
        assert_eq!(object_count(&huge), huge.max_objects);

        let capped = FieldConfig {
            max_objects: 10,
            ..FieldConfig::default()
        };
        assert_eq!(object_count(&capped), 10);
    }

    #[test]
    fn volume_is_multiplied_in_double_precision() {
        // 4097^3 needs 37 bits of mantissa
        let field = FieldConfig {
            x_spread: 4097.0,
            y_spread: 4097.0,
            z_spread: 4097.0,
            density: 1.0,
            max_objects: usize::MAX,
            ..FieldConfig::default()
        };
        assert_eq!(field.requested_objects(), 68_769.820_673);
        assert_eq!(object_count(&field), 68_770);
    }

    #[test]
    fn partition_spreads_evenly_with_a_short_tail() {
        assert_eq!(partition(48, 5), vec![10, 10, 10, 10, 8]);
        assert_eq!(partition(10, 4), vec![3, 3, 3, 1]);
        assert_eq!(partition(3, 5), vec![1, 1, 1, 0, 0]);
        assert_eq!(partition(0, 2), vec![0, 0]);
        assert!(partition(7, 0).is_empty());

        for total in 0..60 {
            for m in 1..8 {
                let parts = partition(total, m);
                assert_eq!(parts.iter().sum::<usize>(), total);
                assert!(parts.iter().all(|&p| p <= total.div_ceil(m)));
            }
        }
    }

    #[test]
    fn build_pool_fills_every_batch_slot() {
        let field = FieldConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let pool = build_pool(&models(5), 48, &field, &Material::default(), &mut rng);

        assert_eq!(pool.len(), 48);
        let counts: Vec<_> = pool.batches.iter().map(InstanceBatch::count).collect();
        assert_eq!(counts, vec![10, 10, 10, 10, 8]);

        for object in &pool.objects {
            let batch = &pool.batches[object.batch];
            assert_eq!(batch.transforms()[object.slot], object.transform());
            assert!(batch.transforms_dirty() && batch.colors_dirty());
        }
    }

    #[test]
    fn sampled_values_stay_in_range() {
        let field = FieldConfig {
            y_offset: 50.0,
            ..FieldConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let pool = build_pool(&models(2), 200, &field, &Material::default(), &mut rng);
        let palette: Vec<_> = field.palette.iter().map(|&c| hex_to_linear_rgba(c)).collect();

        for object in &pool.objects {
            assert!(object.position.x.abs() <= 100.0);
            assert!((object.position.y - 50.0).abs() <= 300.0);
            assert!(object.position.z.abs() <= 50.0);
            assert!((0.0..=PI).contains(&object.rotation.x));
            assert!((0.0..=PI).contains(&object.rotation.y));
            assert!((0.0..=PI).contains(&object.rotation.z));
            assert!((5.0..=15.0).contains(&object.scale));
            assert!(object.rotation_speed_x.abs() <= 1.0);
            assert!(object.rotation_speed_z.abs() <= 1.0);

            let color = pool.batches[object.batch].colors()[object.slot];
            assert!(palette.contains(&color));
        }
    }

    #[test]
    fn models_without_objects_get_no_batch() {
        let mut rng = StdRng::seed_from_u64(1);
        let pool = build_pool(&models(5), 3, &FieldConfig::default(), &Material::default(), &mut rng);
        assert_eq!(pool.batches.len(), 3);
        assert_eq!(pool.batches[2].model_id(), "model-2.glb");
    }

    #[test]
    fn same_seed_builds_the_same_pool() {
        let field = FieldConfig::default();
        let a = build_pool(&models(3), 20, &field, &Material::default(), &mut StdRng::seed_from_u64(42));
        let b = build_pool(&models(3), 20, &field, &Material::default(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a.objects, b.objects);
    }

    #[test]
    fn empty_palette_falls_back_to_white() {
        let field = FieldConfig {
            palette: Vec::new(),
            ..FieldConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let pool = build_pool(&models(1), 4, &field, &Material::default(), &mut rng);
        assert!(pool.batches[0].colors().iter().all(|c| *c == [1.0; 4]));
    }
}
