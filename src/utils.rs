use std::path::Path;

use chrono::Utc;
use rand::Rng;

/// Extracts the file extension from a filename and converts it to lowercase.
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Generates a collision-resistant stored filename:
/// `<field>-<epochMillis>-<randomInt>.<ext>`.
///
/// The original extension is preserved (lowercased); files without an
/// extension get none.
pub fn unique_filename(field: &str, original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);

    match get_file_extension(original_name) {
        Some(ext) => format!("{}-{}-{}.{}", field, millis, suffix, ext),
        None => format!("{}-{}-{}", field, millis, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(get_file_extension("Movie.MP4"), Some("mp4".to_string()));
        assert_eq!(get_file_extension("photo.jpeg"), Some("jpeg".to_string()));
        assert_eq!(get_file_extension("noext"), None);
    }

    #[test]
    fn unique_filename_keeps_field_and_extension() {
        let name = unique_filename("files", "holiday.MOV");
        assert!(name.starts_with("files-"));
        assert!(name.ends_with(".mov"));
    }

    #[test]
    fn unique_filename_does_not_collide() {
        let names: HashSet<String> = (0..200)
            .map(|_| unique_filename("file", "same.jpg"))
            .collect();
        assert_eq!(names.len(), 200);
    }
}
