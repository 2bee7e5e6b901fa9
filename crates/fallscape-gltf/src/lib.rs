//! Model acquisition: listing a model directory, downloading the files and
//! decoding them into one mesh per model.

pub mod acquire;
pub mod decode;
pub mod listing;

pub use acquire::{acquire, acquire_models, combine_parts};
pub use decode::decode_gltf;
pub use listing::{ModelsConfig, fetch_model_bytes, parse_directory_index, resolve_model_ids};
