//! Path derivation for the disk store.

use std::path::{Path, PathBuf};

use crate::digest::sha256_hex;
use crate::types::{CacheKey, Generation};

pub(crate) const CURRENT_FILE: &str = "CURRENT";
pub(crate) const MANIFEST_FILE: &str = "generation.json";
pub(crate) const ENTRIES_DIR: &str = "entries";

pub(crate) fn generation_dir(root: &Path, generation: &Generation) -> PathBuf {
    root.join(generation.as_str())
}

pub(crate) fn entries_dir(root: &Path, generation: &Generation) -> PathBuf {
    generation_dir(root, generation).join(ENTRIES_DIR)
}

/// Keys contain URLs, so entries are named by the key's hash.
pub(crate) fn entry_path(root: &Path, generation: &Generation, key: &CacheKey) -> PathBuf {
    entries_dir(root, generation).join(format!("{}.json", sha256_hex(key.as_str().as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use url::Url;

    #[test]
    fn test_entry_path_is_stable_and_scoped_to_generation() {
        let root = Path::new("/var/cache/sf");
        let v7 = Generation::new("square-foot-v7").unwrap();
        let v8 = Generation::new("square-foot-v8").unwrap();
        let key = CacheKey::new(&Method::GET, &Url::parse("http://localhost/app.js").unwrap());

        let a = entry_path(root, &v7, &key);
        assert_eq!(a, entry_path(root, &v7, &key));
        assert!(a.starts_with("/var/cache/sf/square-foot-v7/entries"));
        assert_ne!(a, entry_path(root, &v8, &key));
    }
}
