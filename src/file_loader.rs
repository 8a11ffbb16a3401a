// Asset file loading
//
// Paths are tried as given, then one directory up, so the binary finds
// `res/` both from the repository root and from a build directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Read a whole file, trying `path` then `../path`
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let candidates = candidates(path);

    for candidate in &candidates {
        if candidate.is_file() {
            log::debug!("Loading {:?}", candidate);
            return std::fs::read(candidate)
                .with_context(|| format!("Failed to read {:?}", candidate));
        }
    }

    anyhow::bail!("File not found: {:?} (tried {:?})", path, candidates)
}

fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    if path.is_relative() {
        candidates.push(Path::new("..").join(path));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("vulkan-template-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_existing_file() {
        let dir = scratch_dir("direct");
        let file = dir.join("blob.bin");
        std::fs::write(&file, [1u8, 2, 3, 4]).unwrap();

        assert_eq!(load(&file).unwrap(), vec![1, 2, 3, 4]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn relative_paths_also_try_parent_directory() {
        let tried = candidates(Path::new("res/shader.vert.spv"));
        assert_eq!(
            tried,
            vec![
                PathBuf::from("res/shader.vert.spv"),
                PathBuf::from("../res/shader.vert.spv"),
            ]
        );
    }

    #[test]
    fn absolute_paths_are_tried_once() {
        let dir = scratch_dir("absolute");
        let tried = candidates(&dir.join("x.png"));
        assert_eq!(tried.len(), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_file_names_every_candidate() {
        let err = load("no/such/asset.spv").unwrap_err().to_string();
        assert!(err.contains("no/such/asset.spv"));
        assert!(err.contains("../no/such/asset.spv"));
    }
}
