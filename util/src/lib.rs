mod timer;
pub use timer::{format_duration, Timer};

#[derive(thiserror::Error, Debug)]
#[error("Filesystem path is not valid UTF-8")]
pub struct PathEncodingError;

pub type Hasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
pub type HashMap<K, V> = std::collections::HashMap<K, V, Hasher>;
pub type HashSet<T> = std::collections::HashSet<T, Hasher>;

/// Convert a path to `&str`, failing on non-UTF-8 paths.
pub fn path_str(path: &std::path::Path) -> Result<&str, PathEncodingError> {
    path.to_str().ok_or(PathEncodingError)
}
