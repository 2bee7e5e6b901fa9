use anyhow::{Context, Result};
use fallscape_3d::MeshData;
use gltf::mesh::Mode;
use log::debug;

/// Every triangle primitive of every mesh in a glTF/GLB file, untransformed.
pub fn decode_gltf(bytes: &[u8]) -> Result<Vec<MeshData>> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).context("failed to parse glTF")?;

    let mut parts = Vec::new();
    for mesh in document.meshes() {
        let name = mesh.name().unwrap_or("unnamed");
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                debug!("skipping {:?} primitive of mesh {name}", primitive.mode());
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
            let Some(positions) = reader.read_positions() else {
                debug!("skipping primitive without positions in mesh {name}");
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            parts.push(MeshData {
                normals: reader.read_normals().map(Iterator::collect),
                uvs: reader.read_tex_coords(0).map(|uv| uv.into_f32().collect()),
                positions,
                indices,
                bounds: None,
            });
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One mesh, two triangle primitives sharing an accessor, plus a point
    // primitive that must be ignored.
    const TRIANGLES: &str = r#"{
        "asset": { "version": "2.0" },
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }],
        "meshes": [{
            "name": "pair",
            "primitives": [
                { "attributes": { "POSITION": 0 } },
                { "attributes": { "POSITION": 0 }, "mode": 4 },
                { "attributes": { "POSITION": 0 }, "mode": 0 }
            ]
        }],
        "nodes": [{ "mesh": 0 }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    }"#;

    #[test]
    fn every_triangle_primitive_becomes_a_part() {
        let parts = decode_gltf(TRIANGLES.as_bytes()).unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert_eq!(part.positions[1], [1.0, 0.0, 0.0]);
            assert_eq!(part.indices, vec![0, 1, 2]);
            assert!(part.normals.is_none());
            assert!(part.uvs.is_none());
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_gltf(b"not a model").is_err());
    }
}
