//! Resolution of spreadsheet image references to files under the image root.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Outcome of resolving one cell: files that exist, and candidates that don't.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageResolution {
    pub found: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl ImageResolution {
    pub fn extend(&mut self, other: ImageResolution) {
        self.found.extend(other.found);
        self.missing.extend(other.missing);
    }
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    root: PathBuf,
}

impl ImageResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves every image reference listed in `raw`, one per line.
    ///
    /// Lines that do not name a `.jpg`, `.jpeg` or `.png` file are skipped.
    /// Objects whose identifier carries a four-digit year segment
    /// (`2023/001`) are looked up in that year's subdirectory.
    pub fn resolve(&self, raw: &str, object_id: &str) -> ImageResolution {
        let mut resolution = ImageResolution::default();
        let year = year_segment(object_id);

        let cleaned = raw.replace("\\\\", "\\").replace('\r', "");
        for line in cleaned.trim().lines() {
            let Some(file_name) = image_file_name(line) else {
                continue;
            };

            let mut candidate = self.root.clone();
            if let Some(year) = year {
                candidate.push(year);
            }
            candidate.push(file_name);

            if candidate.exists() {
                resolution.found.push(candidate);
            } else {
                resolution.missing.push(candidate);
            }
        }

        resolution
    }
}

/// Base file name of a reference, if it has a supported image extension.
fn image_file_name(line: &str) -> Option<&str> {
    let line = line.trim();
    let base = line
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(line)
        .trim();
    let lower = base.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
        .then_some(base)
}

/// First `/`-separated segment made of exactly four ASCII digits.
pub fn year_segment(object_id: &str) -> Option<&str> {
    object_id
        .split('/')
        .find(|segment| segment.len() == 4 && segment.bytes().all(|b| b.is_ascii_digit()))
}
