use rand::Rng;

use crate::config::FieldConfig;
use crate::pool::{ObjectState, Pool, sample_centered};

/// Moves an object that dropped below the field back to the top with a fresh
/// horizontal position. Scale, spin and color are kept.
pub fn recycle_if_below<R: Rng + ?Sized>(
    object: &mut ObjectState,
    field: &FieldConfig,
    rng: &mut R,
) -> bool {
    if object.position.y >= field.recycle_threshold() {
        return false;
    }
    object.position.y = field.top();
    object.position.x = sample_centered(rng, field.x_spread);
    object.position.z = sample_centered(rng, field.z_spread);
    true
}

/// One frame of motion for every object. Returns how many were recycled.
pub fn advance<R: Rng + ?Sized>(pool: &mut Pool, field: &FieldConfig, rng: &mut R) -> usize {
    let mut recycled = 0;
    for index in 0..pool.objects.len() {
        let object = &mut pool.objects[index];
        object.position.y -= field.fall_speed;
        object.rotation.x += object.rotation_speed_x * field.rotation_multiplier;
        object.rotation.z += object.rotation_speed_z * field.rotation_multiplier;
        if recycle_if_below(object, field, rng) {
            recycled += 1;
        }
        pool.write_transform(index);
    }
    recycled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{InstanceBatch, build_pool};
    use approx::assert_relative_eq;
    use fallscape_3d::{LoadedModel, Material, MeshData};
    use glam::Vec3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    fn object_at(y: f32) -> ObjectState {
        ObjectState {
            position: Vec3::new(12.0, y, -7.0),
            rotation: Vec3::ZERO,
            scale: 3.0,
            rotation_speed_x: 0.5,
            rotation_speed_z: -0.25,
            batch: 0,
            slot: 0,
        }
    }

    fn single_object_pool(object: ObjectState) -> Pool {
        let mesh = Arc::new(MeshData::default());
        Pool {
            objects: vec![object],
            batches: vec![InstanceBatch::new("m.glb", mesh, Material::default(), 1)],
        }
    }

    #[test]
    fn recycles_only_below_the_threshold() {
        let field = FieldConfig::default();
        assert_eq!(field.recycle_threshold(), -310.0);
        let mut rng = StdRng::seed_from_u64(5);

        let mut above = object_at(-309.0);
        assert!(!recycle_if_below(&mut above, &field, &mut rng));
        assert_eq!(above.position, Vec3::new(12.0, -309.0, -7.0));

        let mut exact = object_at(-310.0);
        assert!(!recycle_if_below(&mut exact, &field, &mut rng));

        let mut below = object_at(-311.0);
        assert!(recycle_if_below(&mut below, &field, &mut rng));
        assert_eq!(below.position.y, 300.0);
        assert!(below.position.x.abs() <= 100.0);
        assert!(below.position.z.abs() <= 50.0);
        assert_eq!(below.scale, 3.0);
        assert_eq!(below.rotation_speed_x, 0.5);
    }

    #[test]
    fn advance_moves_spins_and_writes_back() {
        let field = FieldConfig::default();
        let mut pool = single_object_pool(object_at(0.0));
        pool.batches[0].take_transforms_dirty();

        let recycled = advance(&mut pool, &field, &mut StdRng::seed_from_u64(0));

        assert_eq!(recycled, 0);
        let object = pool.objects[0];
        assert_relative_eq!(object.position.y, -0.5);
        assert_relative_eq!(object.rotation.x, 0.005);
        assert_relative_eq!(object.rotation.y, 0.0);
        assert_relative_eq!(object.rotation.z, -0.0025);
        assert!(pool.batches[0].transforms_dirty());
        assert_eq!(pool.batches[0].transforms()[0], object.transform());
    }

    #[test]
    fn crossing_the_threshold_resets_once() {
        let field = FieldConfig {
            fall_speed: 2.0,
            ..FieldConfig::default()
        };
        let mut pool = single_object_pool(object_at(-309.0));
        let mut rng = StdRng::seed_from_u64(9);

        assert_eq!(advance(&mut pool, &field, &mut rng), 1);
        assert_eq!(pool.objects[0].position.y, 300.0);
        assert_eq!(pool.batches[0].transforms()[0], pool.objects[0].transform());

        assert_eq!(advance(&mut pool, &field, &mut rng), 0);
        assert_relative_eq!(pool.objects[0].position.y, 298.0);
    }

    #[test]
    fn frames_accumulate_fall_distance() {
        let field = FieldConfig {
            fall_speed: 1.0,
            ..FieldConfig::default()
        };
        let mesh = Arc::new(MeshData::default());
        let models = vec![LoadedModel {
            id: "a.glb".into(),
            mesh,
        }];
        let mut rng = StdRng::seed_from_u64(21);
        let mut pool = build_pool(&models, 30, &field, &Material::default(), &mut rng);
        let start: Vec<f32> = pool.objects.iter().map(|o| o.position.y).collect();

        for _ in 0..5 {
            advance(&mut pool, &field, &mut rng);
        }

        for (object, y0) in pool.objects.iter().zip(start) {
            assert_relative_eq!(object.position.y, y0 - 5.0, epsilon = 1e-3);
        }
    }
}
