//! Reference store directory layout: one `<identity>.<ext>` image per identity.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Image extensions accepted in the reference store (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

/// A reference image on disk and the identity it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub identity: String,
    pub path: PathBuf,
}

/// Lowercased extension of `path` if it is a supported image type.
pub fn supported_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Identity label of a reference file: file name without directory and extension.
pub fn identity_label(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Scan `dir` for reference images, one per identity, sorted by identity.
///
/// When several files share a label, the one with the lexicographically
/// smallest lowercase extension wins (ties broken by full path); the others
/// are logged and skipped.
pub fn scan_reference_dir(dir: &Path) -> io::Result<Vec<ReferenceImage>> {
    // identity -> (extension, path)
    let mut found: BTreeMap<String, (String, PathBuf)> = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let (Some(ext), Some(identity)) = (supported_extension(&path), identity_label(&path)) else {
            continue;
        };

        let replace = match found.get(&identity) {
            Some((kept_ext, kept_path)) if (kept_ext, kept_path) <= (&ext, &path) => {
                tracing::warn!(
                    identity = %identity,
                    kept = %kept_path.display(),
                    shadowed = %path.display(),
                    "duplicate reference image for identity"
                );
                false
            }
            Some((_, shadowed)) => {
                tracing::warn!(
                    identity = %identity,
                    kept = %path.display(),
                    shadowed = %shadowed.display(),
                    "duplicate reference image for identity"
                );
                true
            }
            None => true,
        };
        if replace {
            found.insert(identity, (ext, path));
        }
    }

    Ok(found
        .into_iter()
        .map(|(identity, (_, path))| ReferenceImage { identity, path })
        .collect())
}
