//! Binary glTF 2.0 writer for one triangle mesh.

use anyhow::{Context, Result, ensure};
use fallscape_3d::{Aabb, MeshData};
use serde_json::{Map, Value, json};

const MAGIC: &[u8; 4] = b"glTF";
const VERSION: u32 = 2;
const CHUNK_JSON: &[u8; 4] = b"JSON";
const CHUNK_BIN: &[u8; 4] = b"BIN\0";

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const TRIANGLES: u32 = 4;

#[derive(Default)]
struct Blob {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl Blob {
    fn push<T: Copy, const N: usize>(
        &mut self,
        items: &[T],
        to_le: impl Fn(T) -> [[u8; 4]; N],
        target: u32,
        mut accessor: Value,
    ) -> usize {
        let offset = self.bin.len();
        for &item in items {
            for word in to_le(item) {
                self.bin.extend_from_slice(&word);
            }
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": self.bin.len() - offset,
            "target": target,
        }));
        accessor["bufferView"] = json!(self.views.len() - 1);
        accessor["count"] = json!(items.len());
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }
}

fn floats<const N: usize>(v: [f32; N]) -> [[u8; 4]; N] {
    v.map(f32::to_le_bytes)
}

/// Encodes `mesh` as a self-contained `.glb` with one node. Positions,
/// indices and, when present, normals and UVs are stored.
pub fn encode_glb(mesh: &MeshData, name: &str) -> Result<Vec<u8>> {
    mesh.validate().context("cannot export malformed mesh")?;
    ensure!(!mesh.indices.is_empty(), "cannot export a mesh without triangles");
    let bounds = Aabb::from_points(&mesh.positions).context("cannot export a mesh without vertices")?;

    let mut blob = Blob::default();
    let mut attributes = Map::new();
    let position = blob.push(
        &mesh.positions,
        floats,
        ARRAY_BUFFER,
        json!({
            "componentType": FLOAT,
            "type": "VEC3",
            "min": bounds.min.to_array(),
            "max": bounds.max.to_array(),
        }),
    );
    attributes.insert("POSITION".into(), json!(position));
    if let Some(normals) = &mesh.normals {
        let normal = blob.push(
            normals,
            floats,
            ARRAY_BUFFER,
            json!({ "componentType": FLOAT, "type": "VEC3" }),
        );
        attributes.insert("NORMAL".into(), json!(normal));
    }
    if let Some(uvs) = &mesh.uvs {
        let uv = blob.push(
            uvs,
            floats,
            ARRAY_BUFFER,
            json!({ "componentType": FLOAT, "type": "VEC2" }),
        );
        attributes.insert("TEXCOORD_0".into(), json!(uv));
    }
    let indices = blob.push(
        &mesh.indices,
        |i: u32| [i.to_le_bytes()],
        ELEMENT_ARRAY_BUFFER,
        json!({ "componentType": UNSIGNED_INT, "type": "SCALAR" }),
    );

    let document = json!({
        "asset": { "version": "2.0", "generator": "fallscape-extrude" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "name": name }],
        "meshes": [{
            "name": name,
            "primitives": [{ "attributes": attributes, "indices": indices, "mode": TRIANGLES }],
        }],
        "buffers": [{ "byteLength": blob.bin.len() }],
        "bufferViews": blob.views,
        "accessors": blob.accessors,
    });

    let mut json = serde_json::to_vec(&document).context("failed to serialize glTF JSON")?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = blob.bin;
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let total = u32::try_from(total).context("model too large for GLB")?;
    let chunk_len = |len: usize| u32::try_from(len).context("GLB chunk too large");

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&chunk_len(json.len())?.to_le_bytes());
    out.extend_from_slice(CHUNK_JSON);
    out.extend_from_slice(&json);
    out.extend_from_slice(&chunk_len(bin.len())?.to_le_bytes());
    out.extend_from_slice(CHUNK_BIN);
    out.extend_from_slice(&bin);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallscape_gltf::decode_gltf;

    fn tetrahedron() -> MeshData {
        MeshData::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
        )
        .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.5, 0.5]])
    }

    #[test]
    fn header_and_chunks_are_aligned() {
        let glb = encode_glb(&tetrahedron(), "tetra").unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(glb[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize, glb.len());

        let json_len = u32::from_le_bytes(glb[12..16].try_into().unwrap()) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(&glb[16..20], b"JSON");
        let bin_header = 20 + json_len;
        assert_eq!(&glb[bin_header + 4..bin_header + 8], b"BIN\0");
        // 4 positions, 4 uvs, 12 indices
        let bin_len = u32::from_le_bytes(glb[bin_header..bin_header + 4].try_into().unwrap());
        assert_eq!(bin_len, 4 * 12 + 4 * 8 + 12 * 4);
    }

    #[test]
    fn decoder_reads_back_what_was_written() {
        let mut mesh = tetrahedron();
        mesh.compute_vertex_normals();
        let glb = encode_glb(&mesh, "tetra").unwrap();

        let parts = decode_gltf(&glb).unwrap();
        assert_eq!(parts.len(), 1);
        let part = &parts[0];
        assert_eq!(part.positions, mesh.positions);
        assert_eq!(part.normals, mesh.normals);
        assert_eq!(part.uvs, mesh.uvs);
        assert_eq!(part.indices, mesh.indices);
    }

    #[test]
    fn optional_attributes_are_left_out() {
        let bare = MeshData::new(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0, 1, 2]);
        let parts = decode_gltf(&encode_glb(&bare, "bare").unwrap()).unwrap();
        assert_eq!(parts[0].normals, None);
        assert_eq!(parts[0].uvs, None);
    }

    #[test]
    fn empty_or_malformed_meshes_are_rejected() {
        assert!(encode_glb(&MeshData::new(Vec::new(), Vec::new()), "empty").is_err());
        assert!(encode_glb(&MeshData::new(vec![[0.0; 3]], vec![0, 1, 2]), "bad").is_err());
    }
}
