use fallscape_3d::{GpuBatch, LoadedModel};
use fallscape_scene::{FieldConfig, Pool, advance, build_pool, object_count};
use log::{debug, error, info};
use rand::rngs::StdRng;
use wgpu::Queue;

use crate::config::Config;

/// Lists and loads the configured models. Never fails: an empty list means
/// there is nothing to animate.
pub fn load_models(config: &Config) -> Vec<LoadedModel> {
    match fallscape_gltf::acquire(&config.models) {
        Ok(models) => models,
        Err(err) => {
            error!("{err:#}");
            Vec::new()
        }
    }
}

/// The falling objects and the state needed to advance them.
pub struct Animation {
    pool: Option<Pool>,
    field: FieldConfig,
    rng: StdRng,
    frames: u64,
}

impl Animation {
    pub fn new(models: &[LoadedModel], config: &Config, mut rng: StdRng) -> Self {
        let pool = if models.is_empty() {
            error!("no models loaded, nothing will fall");
            None
        } else {
            let total = object_count(&config.field);
            let pool = build_pool(models, total, &config.field, &config.material, &mut rng);
            info!(
                "{} objects over {} batches from {} models",
                pool.len(),
                pool.batches.len(),
                models.len()
            );
            Some(pool)
        };

        Self {
            pool,
            field: config.field.clone(),
            rng,
            frames: 0,
        }
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advances every object by one frame.
    pub fn step(&mut self) {
        let Some(pool) = &mut self.pool else {
            return;
        };
        let recycled = advance(pool, &self.field, &mut self.rng);
        if recycled > 0 {
            debug!("frame {}: recycled {recycled} objects", self.frames);
        }
        self.frames += 1;
    }

    /// Uploads instance arrays changed since the last call. `gpu` pairs
    /// index-for-index with the pool's batches.
    pub fn sync(&mut self, queue: &Queue, gpu: &[GpuBatch]) {
        let Some(pool) = &mut self.pool else {
            return;
        };
        for (batch, gpu_batch) in pool.batches.iter_mut().zip(gpu) {
            if batch.take_transforms_dirty() {
                gpu_batch.write_transforms(queue, batch.transforms());
            }
            if batch.take_colors_dirty() {
                gpu_batch.write_colors(queue, batch.colors());
            }
        }
    }
}
