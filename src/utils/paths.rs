//! Output file naming.
//!
//! Everything a run writes lives under `<output_dir>/<sanitized_identifier>_`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Replaces `.` and `/` with `_` so the identifier can be used as a file stem.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier.replace(['.', '/'], "_")
}

/// `<sanitized>_`, the common prefix of every raster written for a parcel.
pub fn output_prefix(identifier: &str) -> String {
    format!("{}_", sanitize_identifier(identifier))
}

/// `<prefix><layer_name>.<ext>`
pub fn layer_file_name(identifier: &str, layer_name: &str, extension: &str) -> String {
    format!("{}{}.{}", output_prefix(identifier), layer_name, extension)
}

pub fn drawing_file_name(identifier: &str) -> String {
    format!("{}.dxf", sanitize_identifier(identifier))
}

/// Inserts the EPSG code between the file stem and its extension:
/// `dir/x_ortofotoHQ.jpeg` -> `dir/x_ortofotoHQ2177.jpeg`.
pub fn raster_sibling_path(path: &Path, epsg: u32) -> PathBuf {
    let mut file_name = OsString::new();
    if let Some(stem) = path.file_stem() {
        file_name.push(stem);
    }
    file_name.push(epsg.to_string());
    if let Some(ext) = path.extension() {
        file_name.push(".");
        file_name.push(ext);
    }
    path.with_file_name(file_name)
}

/// ESRI world file next to a raster (`.jpeg` -> `.jgw`, `.png` -> `.pgw`).
pub fn world_file_path(path: &Path) -> PathBuf {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let world_ext = match extension.as_deref() {
        Some("jpeg") | Some("jpg") => "jgw".to_string(),
        Some("png") => "pgw".to_string(),
        Some("tif") | Some("tiff") => "tfw".to_string(),
        Some(other) if other.len() >= 2 => {
            let mut chars = other.chars();
            let first = chars.next().unwrap_or('x');
            let last = chars.last().unwrap_or('x');
            format!("{}{}w", first, last)
        }
        _ => "wld".to_string(),
    };
    path.with_extension(world_ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("123456_45/2.1"), "123456_45_2_1");
        assert_eq!(sanitize_identifier("123456_1"), "123456_1");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for id in ["123456_45/2.1", "141201_1.0001.6509", "123456_1/2", "plain"] {
            let once = sanitize_identifier(id);
            assert_eq!(sanitize_identifier(&once), once);
        }
    }

    #[test]
    fn test_layer_and_drawing_names() {
        assert_eq!(
            layer_file_name("123456_1/2", "mpzp", "png"),
            "123456_1_2_mpzp.png"
        );
        assert_eq!(drawing_file_name("123456_1/2"), "123456_1_2.dxf");
    }

    #[test]
    fn test_raster_sibling_path() {
        let path = Path::new("out/123456_1_2_ortofotoHQ.jpeg");
        assert_eq!(
            raster_sibling_path(path, 2177),
            PathBuf::from("out/123456_1_2_ortofotoHQ2177.jpeg")
        );
    }

    #[test]
    fn test_raster_sibling_path_keeps_dotted_directories() {
        let path = Path::new("some.dir/raster.png");
        assert_eq!(
            raster_sibling_path(path, 2180),
            PathBuf::from("some.dir/raster2180.png")
        );
    }

    #[test]
    fn test_world_file_path() {
        assert_eq!(
            world_file_path(Path::new("a/b2177.jpeg")),
            PathBuf::from("a/b2177.jgw")
        );
        assert_eq!(
            world_file_path(Path::new("a/b2177.png")),
            PathBuf::from("a/b2177.pgw")
        );
    }
}
