//! Transport packaging for output artifacts and log bundles.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{CoreError, Result};

/// How an artifact leaves the system: inline when it fits the transport's
/// attachment limit, zipped when the compressed copy fits, or reported as
/// untransportable. `TooLarge` is a message to the requester, not a job
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPayload {
    File(PathBuf),
    Zipped(PathBuf),
    TooLarge { size: u64, limit: u64 },
}

/// Packages `path` for delivery under `limit` bytes. Zip archives land in
/// `buffer_dir` with a random suffix; a zip that still exceeds the limit
/// is removed before `TooLarge` is returned.
pub fn package(path: &Path, limit: u64, buffer_dir: &Path) -> Result<TransportPayload> {
    let size = std::fs::metadata(path)?.len();
    if size <= limit {
        return Ok(TransportPayload::File(path.to_path_buf()));
    }

    std::fs::create_dir_all(buffer_dir)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    let zip_path = buffer_dir.join(format!("{stem}_{suffix}.zip"));
    zip_files(&zip_path, [path])?;

    let zipped_size = std::fs::metadata(&zip_path)?.len();
    if zipped_size <= limit {
        Ok(TransportPayload::Zipped(zip_path))
    } else {
        let _ = std::fs::remove_file(&zip_path);
        Ok(TransportPayload::TooLarge {
            size: zipped_size,
            limit,
        })
    }
}

/// Writes a deflate-compressed archive containing the given files, each
/// stored under its file name.
pub fn zip_files<'a>(dest: &Path, files: impl IntoIterator<Item = &'a Path>) -> Result<()> {
    let out = File::create(dest)?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Other(format!("unusable file name: {}", file.display())))?;
        writer.start_file(name.to_string(), options)?;
        let mut contents = Vec::new();
        File::open(file)?.read_to_end(&mut contents)?;
        writer.write_all(&contents)?;
    }
    writer.finish()?;
    Ok(())
}

/// Bundles every regular file in `dir` (skipping existing `.zip` files)
/// into one archive. Used for log folder retrieval.
pub fn zip_dir(dest: &Path, dir: &Path) -> Result<()> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(true, |ext| ext != "zip") {
            files.push(path);
        }
    }
    files.sort();
    zip_files(dest, files.iter().map(PathBuf::as_path))
}
