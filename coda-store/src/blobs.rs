//! Content-addressed blob files on local disk.
//!
//! Layout: `<root>/<CID>` for single files and `<root>/<dirCID>/<CID>` for
//! entries inside an image directory. Writes are idempotent by content
//! address: storing the same CID twice is a no-op.

use std::path::{Path, PathBuf};

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::error::Result;

const RAW: u64 = 0x55;

/// Compute the CID for a blob of bytes.
pub fn cid_for(bytes: &[u8]) -> String {
    let hash = Code::Sha2_256.digest(bytes);
    Cid::new_v1(RAW, hash).to_string()
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(BlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, cid: &str) -> PathBuf {
        self.root.join(cid)
    }

    pub fn path_for_dir_entry(&self, dir_cid: &str, cid: &str) -> PathBuf {
        self.root.join(dir_cid).join(cid)
    }

    pub async fn contains(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    /// Store a blob under its CID. Returns the storage path.
    pub async fn put(&self, cid: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(cid);
        self.write_idempotent(&path, bytes).await?;
        Ok(path)
    }

    /// Store a directory entry blob under `<dirCID>/<CID>`.
    pub async fn put_dir_entry(&self, dir_cid: &str, cid: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.root.join(dir_cid);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(cid);
        self.write_idempotent(&path, bytes).await?;
        Ok(path)
    }

    async fn write_idempotent(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if self.contains(path).await {
            trace!(path = %path.display(), "blob already on disk");
            return Ok(());
        }
        // Write to a sibling temp file and rename, so a crash mid-write
        // never leaves a truncated blob under a valid CID.
        let tmp = path.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::open(dir.path()).await.unwrap();

        let data = b"some track segment";
        let cid = cid_for(data);
        let path = blobs.put(&cid, data).await.unwrap();
        assert!(blobs.contains(&path).await);

        // second write is a no-op in effect
        let path2 = blobs.put(&cid, data).await.unwrap();
        assert_eq!(path, path2);
        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&on_disk, data);
    }

    #[tokio::test]
    async fn test_dir_entries() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::open(dir.path()).await.unwrap();

        let data = b"resized image";
        let cid = cid_for(data);
        let dir_cid = cid_for(b"the directory");
        let path = blobs.put_dir_entry(&dir_cid, &cid, data).await.unwrap();
        assert_eq!(path, blobs.path_for_dir_entry(&dir_cid, &cid));
        assert!(blobs.contains(&path).await);
    }

    #[test]
    fn test_cid_is_stable() {
        let a = cid_for(b"hello");
        let b = cid_for(b"hello");
        let c = cid_for(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with('b'), "cidv1 base32: {}", a);
    }
}
