use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;

/// Public URL prefix under which the root directory is browsable.
pub const MOUNT: &str = "/home";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),
    #[error("path escapes the root directory: {0}")]
    OutsideRoot(PathBuf),
    #[error("could not resolve '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Maps public URL paths onto the local root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` must already be absolute and canonical.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically resolves a URL path to a local path under the root.
    ///
    /// Paths starting with the mount prefix have it stripped, anything else is
    /// taken as relative to the root. `..` never climbs above the root.
    pub fn resolve(&self, url_path: &str) -> PathBuf {
        self.root.join(relative_path(url_path))
    }

    /// Like [`resolve`](Self::resolve) but percent-decodes the input first.
    pub fn resolve_encoded(&self, raw: &str) -> PathBuf {
        self.resolve(&decode(raw))
    }

    /// Canonicalizes an existing path (following symlinks) and checks it is
    /// still inside the root. Used before reading.
    pub fn canonical(&self, path: &Path) -> Result<PathBuf, ResolveError> {
        let canonical = path.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ResolveError::NotFound(path.to_path_buf()),
            _ => ResolveError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(ResolveError::OutsideRoot(path.to_path_buf()))
        }
    }

    /// Confines a mutation target to the root.
    ///
    /// The deepest existing ancestor is canonicalized and the remaining
    /// components are re-appended, so the target itself need not exist and a
    /// trailing symlink is not followed.
    pub fn confine(&self, path: &Path) -> Result<PathBuf, ResolveError> {
        if path == self.root {
            return Ok(self.root.clone());
        }
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(ResolveError::OutsideRoot(path.to_path_buf()));
        };

        let mut existing = parent;
        let mut tail = vec![name];
        let base = loop {
            match existing.canonicalize() {
                Ok(canonical) => break canonical,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    match (existing.parent(), existing.file_name()) {
                        (Some(up), Some(component)) => {
                            tail.push(component);
                            existing = up;
                        }
                        _ => return Err(ResolveError::NotFound(path.to_path_buf())),
                    }
                }
                Err(e) => {
                    return Err(ResolveError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        };

        let confined = tail.iter().rev().fold(base, |acc, c| acc.join(c));
        if confined.starts_with(&self.root) {
            Ok(confined)
        } else {
            Err(ResolveError::OutsideRoot(path.to_path_buf()))
        }
    }

    /// Public URL for a local path under the root, each segment percent-encoded.
    pub fn url_for(&self, local: &Path) -> Option<String> {
        let rel = local.strip_prefix(&self.root).ok()?;
        let mut url = String::from(MOUNT);
        for component in rel.components() {
            if let Component::Normal(segment) = component {
                url.push('/');
                url.push_str(&urlencoding::encode(&segment.to_string_lossy()));
            }
        }
        if url == MOUNT {
            url.push('/');
        }
        Some(url)
    }
}

/// Percent-decodes a URL path, falling back to the raw string when the
/// escapes are malformed.
pub fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Strips the mount prefix (on a segment boundary) and normalizes the rest into
/// a clean relative path. The result never contains `..`, `.` or a root.
pub fn relative_path(url_path: &str) -> PathBuf {
    let rest = match url_path.strip_prefix(MOUNT) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => url_path,
    };

    let mut clean = PathBuf::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(segment) => clean.push(segment),
            Component::ParentDir => {
                clean.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> (TempDir, PathResolver) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        (tmp, PathResolver::new(root))
    }

    #[test]
    fn strips_mount_prefix() {
        let (_tmp, r) = resolver();
        assert_eq!(r.resolve("/home/a/b.txt"), r.root().join("a/b.txt"));
        assert_eq!(r.resolve("/home"), r.root().to_path_buf());
        assert_eq!(r.resolve("/home/"), r.root().to_path_buf());
    }

    #[test]
    fn unprefixed_paths_are_relative_to_root() {
        let (_tmp, r) = resolver();
        assert_eq!(r.resolve("a/b"), r.root().join("a/b"));
        assert_eq!(r.resolve("/etc/passwd"), r.root().join("etc/passwd"));
        assert_eq!(r.resolve("/homework/x"), r.root().join("homework/x"));
    }

    #[test]
    fn parent_segments_never_escape_root() {
        let (_tmp, r) = resolver();
        for input in [
            "/home/../../etc/passwd",
            "../../../",
            "/home/a/../../..",
            "a/./b/../../../../c",
            "/home/%2e%2e/%2e%2e/x",
            "..",
        ] {
            let resolved = r.resolve_encoded(input);
            assert!(
                resolved.starts_with(r.root()),
                "{input} resolved to {}",
                resolved.display()
            );
            assert!(!resolved
                .components()
                .any(|c| matches!(c, Component::ParentDir)));
        }
        assert_eq!(r.resolve("/home/a/../b"), r.root().join("b"));
    }

    #[test]
    fn decode_falls_back_to_raw() {
        assert_eq!(decode("/home/a%20b"), "/home/a b");
        assert_eq!(decode("/home/%E4%B8%AD"), "/home/中");
        // invalid UTF-8 after decoding
        assert_eq!(decode("/home/%FF"), "/home/%FF");
    }

    #[test]
    fn canonical_reports_missing_paths() {
        let (_tmp, r) = resolver();
        let missing = r.resolve("/home/nope");
        assert!(matches!(r.canonical(&missing), Err(ResolveError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn canonical_rejects_symlink_out_of_root() {
        let (_tmp, r) = resolver();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), r.root().join("escape")).unwrap();
        let link = r.resolve("/home/escape");
        assert!(matches!(r.canonical(&link), Err(ResolveError::OutsideRoot(_))));
        // the link itself can still be confined as a mutation target
        assert_eq!(r.confine(&link).unwrap(), r.root().join("escape"));
        assert!(matches!(
            r.confine(&link.join("inner")),
            Err(ResolveError::OutsideRoot(_))
        ));
    }

    #[test]
    fn confine_accepts_missing_tails() {
        let (_tmp, r) = resolver();
        std::fs::create_dir(r.root().join("a")).unwrap();
        let target = r.resolve("/home/a/b/c");
        assert_eq!(r.confine(&target).unwrap(), r.root().join("a/b/c"));
        assert_eq!(r.confine(r.root()).unwrap(), r.root().to_path_buf());
    }

    #[test]
    fn url_for_encodes_segments() {
        let (_tmp, r) = resolver();
        assert_eq!(r.url_for(&r.root().join("a b/c")).unwrap(), "/home/a%20b/c");
        assert_eq!(r.url_for(r.root()).unwrap(), "/home/");
        assert!(r.url_for(Path::new("/elsewhere")).is_none());
    }
}
