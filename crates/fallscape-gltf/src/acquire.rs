use std::sync::Arc;

use anyhow::{Context, Result, bail};
use fallscape_3d::{LoadedModel, MeshData};
use log::{debug, info, warn};
use reqwest::blocking::Client;

use crate::decode::decode_gltf;
use crate::listing::{ModelsConfig, fetch_model_bytes, resolve_model_ids};

fn single_part(mut mesh: MeshData) -> Result<MeshData> {
    mesh.validate()?;
    mesh.ensure_normals();
    if mesh.bounds.is_none() {
        mesh.compute_bounds();
    }
    Ok(mesh)
}

/// Turns the meshes of one model file into a single geometry.
///
/// A failed merge is not an error: the first mesh is used instead.
pub fn combine_parts(id: &str, mut parts: Vec<MeshData>) -> Result<MeshData> {
    match parts.len() {
        0 => bail!("{id} contains no triangle meshes"),
        1 => single_part(parts.swap_remove(0)).with_context(|| format!("{id} is malformed")),
        n => match MeshData::merge(&parts) {
            Ok(merged) => {
                debug!("merged {n} meshes of {id} into {} vertices", merged.vertex_count());
                Ok(merged)
            }
            Err(err) => {
                warn!("merging {n} meshes of {id} failed, using the first one: {err:#}");
                single_part(parts.swap_remove(0))
                    .with_context(|| format!("first mesh of {id} is malformed"))
            }
        },
    }
}

/// Loads every id concurrently and waits for all of them. Failed loads are
/// logged and left out; the survivors keep the order of `ids`.
///
/// Errors only when nothing could be loaded.
pub fn acquire_models<F>(ids: &[String], load: F) -> Result<Vec<LoadedModel>>
where
    F: Fn(&str) -> Result<Vec<MeshData>> + Sync,
{
    let load = &load;
    let settled: Vec<Option<LoadedModel>> = std::thread::scope(|scope| {
        let pending: Vec<_> = ids
            .iter()
            .map(|id| {
                let handle = scope.spawn(move || load(id).and_then(|parts| combine_parts(id, parts)));
                (id, handle)
            })
            .collect();

        pending
            .into_iter()
            .map(|(id, handle)| match handle.join() {
                Ok(Ok(mesh)) => Some(LoadedModel {
                    id: id.clone(),
                    mesh: Arc::new(mesh),
                }),
                Ok(Err(err)) => {
                    warn!("skipping model {id}: {err:#}");
                    None
                }
                Err(_) => {
                    warn!("skipping model {id}: loader panicked");
                    None
                }
            })
            .collect()
    });

    let models: Vec<LoadedModel> = settled.into_iter().flatten().collect();
    if models.is_empty() {
        bail!("none of the {} requested models could be loaded", ids.len());
    }
    info!("loaded {} of {} models", models.len(), ids.len());
    Ok(models)
}

/// Lists, downloads, decodes and merges the configured models.
pub fn acquire(config: &ModelsConfig) -> Result<Vec<LoadedModel>> {
    let client = Client::builder()
        .build()
        .context("failed to create HTTP client")?;
    let ids = resolve_model_ids(config, &client);
    acquire_models(&ids, |id| {
        let bytes = fetch_model_bytes(&client, id)?;
        decode_gltf(&bytes).with_context(|| format!("failed to decode {id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(z: f32) -> MeshData {
        MeshData::new(
            vec![[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]],
            vec![0, 1, 2],
        )
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_mesh_gets_normals_and_bounds() {
        let mesh = combine_parts("one.glb", vec![triangle(0.0)]).unwrap();
        assert_eq!(mesh.normals.as_ref().unwrap().len(), 3);
        assert!(mesh.bounds.is_some());
    }

    #[test]
    fn multiple_meshes_are_merged() {
        let mesh = combine_parts("two.glb", vec![triangle(0.0), triangle(1.0)]).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn failed_merge_falls_back_to_the_first_mesh() {
        let mut broken = triangle(1.0);
        broken.indices = vec![0, 1, 7];
        let mesh = combine_parts("mixed.glb", vec![triangle(0.0), broken]).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.positions[0], [0.0, 0.0, 0.0]);
        assert!(mesh.normals.is_some());
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(combine_parts("empty.glb", Vec::new()).is_err());
    }

    #[test]
    fn failed_loads_are_left_out() {
        let models = acquire_models(&ids(&["a.glb", "bad.glb", "b.glb", "empty.glb"]), |id| {
            match id {
                "bad.glb" => bail!("404"),
                "empty.glb" => Ok(Vec::new()),
                _ => Ok(vec![triangle(0.0)]),
            }
        })
        .unwrap();

        let loaded: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(loaded, ["a.glb", "b.glb"]);
    }

    #[test]
    fn panicking_loader_is_treated_as_missing() {
        let models = acquire_models(&ids(&["ok.glb", "boom.glb"]), |id| {
            if id == "boom.glb" {
                panic!("loader exploded");
            }
            Ok(vec![triangle(0.0)])
        })
        .unwrap();
        assert_eq!(models.len(), 1);
    }

    #[test]
    fn nothing_loaded_is_an_error() {
        let result = acquire_models(&ids(&["x.glb", "y.glb"]), |_| bail!("offline"));
        assert!(result.is_err());
        assert!(acquire_models(&[], |_| Ok(vec![triangle(0.0)])).is_err());
    }
}
