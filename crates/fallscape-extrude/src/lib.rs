//! Turns traced SVG artwork into extruded `.glb` models that fallscape can
//! drop: outlines are read, flattened, capped, walled and written out.

pub mod batch;
pub mod extrude;
pub mod glb;
pub mod svg;

pub use batch::{BatchReport, ConvertStats, convert_directory, convert_file, svg_files};
pub use extrude::{ExtrudeOptions, extrude, face_count};
pub use glb::encode_glb;
pub use svg::{Contour, Segment, parse_path_data, parse_svg};
