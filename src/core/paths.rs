//! Store-key derivation: root-relative, `/`-separated, Unicode-normalized.

use std::env;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Unicode normalization form applied to store keys.
///
/// The same file name can arrive precomposed or decomposed depending on the
/// filesystem that wrote it; normalizing keeps a tree that moved between
/// filesystems from looking entirely renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    Nfkd,
    Nfc,
    None,
}

impl Normalization {
    /// Apply this normalization form to `text`.
    #[must_use]
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Nfkd => text.nfkd().collect(),
            Self::Nfc => text.nfc().collect(),
            Self::None => text.to_string(),
        }
    }
}

/// Derive the store key for `path` under `root`.
///
/// Returns `None` when a component is not valid Unicode; such files cannot be
/// keyed and are skipped by the scanner. Paths outside `root` keep their
/// own components (minus any `.` prefix).
#[must_use]
pub fn store_key(root: &Path, path: &Path, normalization: Normalization) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::ParentDir => parts.push(".."),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(normalization.apply(&parts.join("/")))
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_relative_and_slash_separated() {
        let root = Path::new("/data/photos");
        let path = root.join("2024").join("img.jpg");
        assert_eq!(
            store_key(root, &path, Normalization::None).as_deref(),
            Some("2024/img.jpg")
        );
    }

    #[test]
    fn key_strips_current_dir_prefix() {
        let path = Path::new("./docs/a.txt");
        assert_eq!(
            store_key(Path::new("/elsewhere"), path, Normalization::None).as_deref(),
            Some("docs/a.txt")
        );
    }

    #[test]
    fn nfkd_decomposes_precomposed_names() {
        let root = Path::new("/r");
        let composed = root.join("caf\u{e9}.txt");
        let decomposed = root.join("cafe\u{301}.txt");
        let a = store_key(root, &composed, Normalization::Nfkd);
        let b = store_key(root, &decomposed, Normalization::Nfkd);
        assert_eq!(a, b);
        assert_eq!(a.as_deref(), Some("cafe\u{301}.txt"));
    }

    #[test]
    fn nfc_composes_decomposed_names() {
        assert_eq!(Normalization::Nfc.apply("cafe\u{301}"), "caf\u{e9}");
        assert_eq!(Normalization::None.apply("cafe\u{301}"), "cafe\u{301}");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_component_has_no_key() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let root = Path::new("/r");
        let path = root.join(OsStr::from_bytes(b"bad\xffname"));
        assert!(store_key(root, &path, Normalization::Nfkd).is_none());
    }

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn handles_parent_at_root() {
        #[cfg(unix)]
        {
            let resolved = normalize_syntactic(Path::new("/../foo"));
            assert_eq!(resolved, Path::new("/foo"));
        }
    }
}
