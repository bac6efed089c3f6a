//! Item manifest ingestion (§6 Inputs): scans a directory of scanned
//! images, each filename encoding a barcode and an image role
//! (`<digits>{a|b|c}.{png|jpg|jpeg}`), into the `ManifestEntry` list the
//! `WorkflowStore` expects. Filenames with spaces are renamed (spaces
//! stripped) before ingestion; anything else unrecognized is reported and
//! ingestion fails closed until corrected or skipped.

use camino::{Utf8Path, Utf8PathBuf};
use mediacat_store::{ImageRef, ImageRole, MediaKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static FILENAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{10,15})([abc])\.(png|jpe?g)$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{} file(s) in {dir} did not match the manifest naming convention: {}", invalid.len(), invalid.join(", "))]
    InvalidNames { dir: String, invalid: Vec<String> },
}

fn role_for(letter: &str) -> ImageRole {
    match letter.to_ascii_lowercase().as_str() {
        "a" => ImageRole::Front,
        "b" => ImageRole::Back,
        _ => ImageRole::Additional,
    }
}

/// Barcodes are a plain digit string per §3; `MediaKind` is not encoded in
/// the filename convention, so every barcode scanned through the directory
/// source defaults to CD unless overridden by the caller (e.g. a second
/// manifest pass for an LP batch, or a config-level override per run).
pub fn scan_item_directory(dir: &Utf8Path, media_kind: MediaKind) -> Result<Vec<mediacat_store::ManifestEntry>, ManifestError> {
    let entries = std::fs::read_dir(dir.as_std_path()).map_err(|source| ManifestError::ReadDir {
        path: dir.to_string(),
        source,
    })?;

    let mut by_barcode: BTreeMap<String, Vec<ImageRef>> = BTreeMap::new();
    let mut invalid = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| ManifestError::ReadDir {
            path: dir.to_string(),
            source,
        })?;
        let file_name = entry.file_name();
        let Some(original_name) = file_name.to_str() else {
            invalid.push(format!("{:?}", file_name));
            continue;
        };

        let normalized_name = if original_name.contains(' ') {
            let without_spaces = original_name.replace(' ', "");
            let from = entry.path();
            let to = from.with_file_name(&without_spaces);
            std::fs::rename(&from, &to).map_err(|source| ManifestError::Rename {
                from: from.display().to_string(),
                to: to.display().to_string(),
                source,
            })?;
            without_spaces
        } else {
            original_name.to_string()
        };

        let Some(caps) = FILENAME_PATTERN.captures(&normalized_name) else {
            invalid.push(normalized_name);
            continue;
        };
        let barcode = caps[1].to_string();
        let role = role_for(&caps[2]);
        let path = dir.join(&normalized_name);

        by_barcode.entry(barcode).or_default().push(ImageRef {
            role,
            path: Utf8PathBuf::from(path).to_string(),
        });
    }

    if !invalid.is_empty() {
        return Err(ManifestError::InvalidNames {
            dir: dir.to_string(),
            invalid,
        });
    }

    let mut manifest: Vec<mediacat_store::ManifestEntry> = by_barcode
        .into_iter()
        .map(|(barcode, mut images)| {
            images.sort_by_key(|i| match i.role {
                ImageRole::Front => 0,
                ImageRole::Back => 1,
                ImageRole::Additional => 2,
            });
            mediacat_store::ManifestEntry {
                barcode,
                media_kind,
                images,
            }
        })
        .collect();
    manifest.sort_by(|a, b| a.barcode.cmp(&b.barcode));
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn groups_images_by_barcode_and_orders_roles() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("059173017359115b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("059173017359115a.png"), b"x").unwrap();

        let manifest = scan_item_directory(&path, MediaKind::Cd).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].barcode, "059173017359115");
        assert_eq!(manifest[0].images[0].role, ImageRole::Front);
        assert_eq!(manifest[0].images[1].role, ImageRole::Back);
    }

    #[test]
    fn spaces_in_filenames_are_stripped_before_ingestion() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("0591730173591 15a.png"), b"x").unwrap();

        let manifest = scan_item_directory(&path, MediaKind::Cd).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].barcode, "059173017359115");
    }

    #[test]
    fn invalid_names_fail_closed() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("not_a_valid_name.png"), b"x").unwrap();

        let result = scan_item_directory(&path, MediaKind::Cd);
        assert!(matches!(result, Err(ManifestError::InvalidNames { .. })));
    }
}
