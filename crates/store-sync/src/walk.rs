//! Recursive directory enumeration for the publish side.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// One file under `root`, with its path relative to `root` using forward
/// slashes regardless of host path separator.
pub struct WalkedFile {
    pub absolute: PathBuf,
    pub relative: String,
}

pub async fn walk_files(root: &Path) -> Result<Vec<WalkedFile>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .expect("walked path is under root")
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push(WalkedFile {
                    absolute: path,
                    relative,
                });
            }
        }
    }
    out.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walk_collects_nested_files_sorted_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"b").await.unwrap();
        tokio::fs::write(dir.path().join("sub/a.txt"), b"a").await.unwrap();

        let files = walk_files(dir.path()).await.unwrap();
        let relatives: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relatives, vec!["b.txt", "sub/a.txt"]);
    }

    #[tokio::test]
    async fn walk_of_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk_files(dir.path()).await.unwrap().is_empty());
    }
}
