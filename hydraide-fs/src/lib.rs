//! The filesystem adapter (spec §4.B): directory creation, atomic writes,
//! and chunk I/O. This layer never looks inside a chunk — bytes in, bytes
//! out — compression is the only thing it does to them, and that is opaque
//! to every caller above it (§4.E: "Chunk-level compression is opaque to the
//! rest of the system").

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use hydraide_base::{err, Result};
use tracing::{debug, warn};

/// Default zstd compression level for chunk bodies.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// `mkdir -p` equivalent; idempotent.
pub fn mkdir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| err(format!("mkdir_all({}): {e}", path.display())))
}

/// Writes `bytes` to `dst` via a temp file in the same directory followed by
/// an atomic rename, so a crash mid-write never leaves `dst` truncated or
/// corrupt. `dst`'s parent directory must already exist; `dst` itself may or
/// may not exist (the rename replaces it).
pub fn atomic_write(dst: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| err(format!("path '{}' has no parent directory", dst.display())))?;
    let tmp_name = format!(
        ".{}.{}.tmp",
        dst.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("chunk"),
        uuid::Uuid::new_v4()
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| err(format!("create temp file '{}': {e}", tmp_path.display())))?;
        f.write_all(bytes)
            .map_err(|e| err(format!("write temp file '{}': {e}", tmp_path.display())))?;
        f.sync_all()
            .map_err(|e| err(format!("fsync temp file '{}': {e}", tmp_path.display())))?;
    }

    fs::rename(&tmp_path, dst).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        err(format!(
            "atomic rename '{}' -> '{}': {e}",
            tmp_path.display(),
            dst.display()
        ))
    })
}

/// Reads and decompresses a chunk file written by [`write_chunk`].
pub fn read_chunk(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).map_err(|e| err(format!("open chunk '{}': {e}", path.display())))?;
    let mut compressed = Vec::new();
    f.read_to_end(&mut compressed)
        .map_err(|e| err(format!("read chunk '{}': {e}", path.display())))?;
    zstd::decode_all(compressed.as_slice())
        .map_err(|e| err(format!("decompress chunk '{}': {e}", path.display())))
}

/// Compresses `bytes` and writes them atomically to `path`.
pub fn write_chunk(path: &Path, bytes: &[u8]) -> Result<()> {
    write_chunk_leveled(path, bytes, DEFAULT_COMPRESSION_LEVEL)
}

pub fn write_chunk_leveled(path: &Path, bytes: &[u8], level: i32) -> Result<()> {
    let compressed = zstd::encode_all(bytes, level)
        .map_err(|e| err(format!("compress chunk '{}': {e}", path.display())))?;
    atomic_write(path, &compressed)
}

/// Removes a chunk file. Not an error if it is already gone (the caller may
/// be retrying after a partial flush).
pub fn remove_chunk(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(err(format!("remove chunk '{}': {e}", path.display()))),
    }
}

/// Removes `dir` iff it exists and is empty. Used to implement the
/// "empty Swamp folder disappears" rule (spec §3, §4.E, §8 invariant 10).
pub fn remove_dir_if_empty(dir: &Path) -> Result<()> {
    let mut entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(err(format!("read_dir '{}': {e}", dir.display()))),
    };
    if entries.next().is_some() {
        debug!(dir = %dir.display(), "not removing non-empty swamp directory");
        return Ok(());
    }
    match fs::remove_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to remove empty swamp directory");
            Err(err(format!("remove_dir '{}': {e}", dir.display())))
        }
    }
}

/// Lists the chunk files directly inside `dir`, sorted by chunk number
/// (ascending), used during hydration. Returns an empty vec if `dir` does
/// not exist.
pub fn list_chunks(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(err(format!("read_dir '{}': {e}", dir.display()))),
    };
    let mut chunks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| err(format!("read_dir entry in '{}': {e}", dir.display())))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("bin") {
            chunks.push(path);
        }
    }
    chunks.sort_by_key(|p| chunk_number(p).unwrap_or(u64::MAX));
    Ok(chunks)
}

/// Parses the `N` out of a `chunk-N.bin` filename.
pub fn chunk_number(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("chunk-")?
        .parse()
        .ok()
}

/// Builds `<root>/<island_id>/<sanctuary>/<realm>/<swamp>/`, the on-disk
/// layout from spec §6.
pub fn island_swamp_dir(root: &Path, island_id: u64, name: &hydraide_base::Name) -> PathBuf {
    root.join(island_id.to_string())
        .join(name.sanctuary())
        .join(name.realm())
        .join(name.swamp())
}

pub fn chunk_path(swamp_dir: &Path, chunk_num: u64) -> PathBuf {
    swamp_dir.join(format!("chunk-{chunk_num}.bin"))
}

#[cfg(test)]
mod test {
    use super::*;
    use hydraide_base::Name;
    use test_log::test;

    #[test]
    fn atomic_write_then_read_chunk_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk-0.bin");
        write_chunk(&path, b"hello treasure").unwrap();
        let got = read_chunk(&path).unwrap();
        assert_eq!(got, b"hello treasure");
    }

    #[test]
    fn remove_dir_if_empty_removes_only_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let swamp_dir = dir.path().join("swamp");
        mkdir_all(&swamp_dir).unwrap();
        write_chunk(&swamp_dir.join("chunk-0.bin"), b"x").unwrap();

        remove_dir_if_empty(&swamp_dir).unwrap();
        assert!(swamp_dir.exists(), "non-empty dir must survive");

        remove_chunk(&swamp_dir.join("chunk-0.bin")).unwrap();
        remove_dir_if_empty(&swamp_dir).unwrap();
        assert!(!swamp_dir.exists(), "empty dir must be removed");
    }

    #[test]
    fn remove_dir_if_empty_on_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_if_empty(&dir.path().join("never-existed")).unwrap();
    }

    #[test]
    fn island_swamp_dir_matches_layout() {
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();
        let root = Path::new("/data/hydraide");
        let dir = island_swamp_dir(root, 7, &name);
        assert_eq!(dir, root.join("7/dizzlets/testing/set-and-get"));
    }

    #[test]
    fn list_chunks_is_sorted_and_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_chunk(&dir.path().join("chunk-2.bin"), b"b").unwrap();
        write_chunk(&dir.path().join("chunk-10.bin"), b"c").unwrap();
        write_chunk(&dir.path().join("chunk-1.bin"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let chunks = list_chunks(dir.path()).unwrap();
        let names: Vec<_> = chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["chunk-1.bin", "chunk-2.bin", "chunk-10.bin"]);
    }
}
