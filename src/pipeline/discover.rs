//! Discovery and pairing: turn an image directory into an ordered card list.
//!
//! ## Pairing is positional
//!
//! Cards are photographed front, then back, so consecutive files in sorted
//! order belong together. Nothing looks at pixel content: `IMG_0001` and
//! `IMG_0002` are one card because they sort adjacently. Sorting by file name
//! makes the plan a pure function of the directory listing, so a rerun on an
//! unchanged directory pairs identically.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One image file. The extension is what the file *claims* to be; the
/// normaliser sniffs the header before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImageAsset {
    pub path: PathBuf,
}

impl ImageAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File name without directory, e.g. `IMG_6165.HEIC`.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Declared extension with its original case and no dot, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    /// Whether the declared extension is `.heic` in any case.
    pub fn claims_heic(&self) -> bool {
        self.extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("heic"))
    }
}

/// One recipe card: a front photo and, normally, a back photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePair {
    pub front: ImageAsset,
    pub back: Option<ImageAsset>,
}

impl ImagePair {
    pub fn is_single(&self) -> bool {
        self.back.is_none()
    }

    /// `"front.jpg + back.jpg"` or `"front.jpg"`.
    pub fn label(&self) -> String {
        match &self.back {
            Some(back) => format!("{} + {}", self.front.name(), back.name()),
            None => self.front.name(),
        }
    }
}

/// List recognised image files in `dir`, sorted by file name.
///
/// Not recursive. Entries whose extension is not in
/// [`ExtractionConfig::extensions`] (compared case-insensitively) are skipped.
pub fn discover_images(
    dir: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<ImageAsset>, ExtractError> {
    if !dir.exists() {
        return Err(ExtractError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(ExtractError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::ReadDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let recognised = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_image_extension(e));
        if recognised {
            images.push(ImageAsset::new(path));
        } else {
            debug!("Skipping non-image file: {}", path.display());
        }
    }

    images.sort_by_key(|a| a.name());
    debug!("Discovered {} images in {}", images.len(), dir.display());
    Ok(images)
}

/// Group sorted images two at a time; an odd last image becomes a singleton.
pub fn pair_images(images: Vec<ImageAsset>) -> Vec<ImagePair> {
    if images.len() % 2 != 0 {
        warn!(
            "Odd number of images ({}). Last image will be processed alone.",
            images.len()
        );
    }

    let mut pairs = Vec::with_capacity(images.len().div_ceil(2));
    let mut iter = images.into_iter();
    while let Some(front) = iter.next() {
        pairs.push(ImagePair {
            front,
            back: iter.next(),
        });
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(names: &[&str]) -> Vec<ImageAsset> {
        names.iter().map(|n| ImageAsset::new(*n)).collect()
    }

    #[test]
    fn pairs_even_count() {
        let pairs = pair_images(assets(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]));
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].label(), "a.jpg + b.jpg");
        assert_eq!(pairs[1].label(), "c.jpg + d.jpg");
        assert!(pairs.iter().all(|p| !p.is_single()));
    }

    #[test]
    fn odd_count_ends_with_singleton() {
        for n in 0..9usize {
            let names: Vec<String> = (0..n).map(|i| format!("IMG_{i:04}.jpg")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let pairs = pair_images(assets(&refs));
            assert_eq!(pairs.len(), n.div_ceil(2), "n = {n}");
            let last_single = pairs.last().map(ImagePair::is_single).unwrap_or(false);
            assert_eq!(last_single, n % 2 == 1, "n = {n}");
            assert_eq!(pairs.iter().filter(|p| p.is_single()).count(), n % 2);
        }
    }

    #[test]
    fn heic_claim_is_case_insensitive() {
        assert!(ImageAsset::new("/x/IMG_1.HEIC").claims_heic());
        assert!(ImageAsset::new("photo.heic").claims_heic());
        assert!(!ImageAsset::new("photo.jpg").claims_heic());
        assert!(!ImageAsset::new("heic").claims_heic());
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.JPG", "a.heic", "notes.txt", "b.png", "d.webp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let config = ExtractionConfig::default();
        let found = discover_images(dir.path(), &config).unwrap();
        let names: Vec<String> = found.iter().map(ImageAsset::name).collect();
        assert_eq!(names, vec!["a.heic", "b.png", "c.JPG"]);
    }

    #[test]
    fn discover_missing_directory() {
        let err = discover_images(Path::new("/definitely/not/here"), &ExtractionConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::DirectoryNotFound { .. }));
    }

    #[test]
    fn discover_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["IMG_3.jpg", "IMG_1.jpg", "IMG_2.jpg", "IMG_10.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let config = ExtractionConfig::default();
        let first = pair_images(discover_images(dir.path(), &config).unwrap());
        let second = pair_images(discover_images(dir.path(), &config).unwrap());
        assert_eq!(first, second);
        // Lexicographic, not numeric.
        assert_eq!(first[0].label(), "IMG_1.jpg + IMG_10.jpg");
    }
}
