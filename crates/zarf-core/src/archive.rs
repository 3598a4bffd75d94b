//! Archive packing, unpacking and fixed-size splitting
//!
//! Packages travel as `.tar.zst` (or plain `.tar` when the package opts out
//! of compression) and may be split into fixed-size parts for sneakernet
//! media. `part000` carries a JSON header describing the reassembled
//! payload; the data lives in `part001…partNNN`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::checksums::sha256_of_file;
use crate::error::{CoreError, Result};

/// Extension of a compressed package archive
pub const TAR_ZST_EXT: &str = ".tar.zst";

/// Extension of an uncompressed package archive
pub const TAR_EXT: &str = ".tar";

/// Header written into `part000` of a split archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitHeader {
    /// Number of data parts following the header
    pub count: usize,

    /// Total size of the reassembled payload in bytes
    pub bytes: u64,

    /// sha256 of the reassembled payload
    pub sha256_sum: String,
}

/// Tar a directory's contents into `out`, paths relative to `src`
pub fn tar_directory(src: &Path, out: &Path) -> Result<()> {
    let file = File::create(out)?;
    let mut builder = tar::Builder::new(file);
    append_dir_contents(&mut builder, src)?;
    builder.finish()?;
    Ok(())
}

/// Tar and zstd-compress a directory's contents into `out`
pub fn tar_zst_directory(src: &Path, out: &Path) -> Result<()> {
    let file = File::create(out)?;
    let encoder =
        zstd::stream::write::Encoder::new(file, 0).map_err(|e| CoreError::Archive(e.to_string()))?;
    let mut builder = tar::Builder::new(encoder);
    append_dir_contents(&mut builder, src)?;
    let encoder = builder.into_inner()?;
    encoder
        .finish()
        .map_err(|e| CoreError::Archive(e.to_string()))?;
    Ok(())
}

fn append_dir_contents<W: Write>(builder: &mut tar::Builder<W>, src: &Path) -> Result<()> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Archive(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| CoreError::Archive(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), rel)?;
        }
    }
    Ok(())
}

/// Unpack a `.tar` or `.tar.zst` archive into `dest`
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;

    let name = archive.to_string_lossy();
    if name.ends_with(TAR_ZST_EXT) || name.ends_with(".zst") {
        let decoder =
            zstd::stream::read::Decoder::new(file).map_err(|e| CoreError::Archive(e.to_string()))?;
        tar::Archive::new(decoder).unpack(dest)?;
    } else if name.ends_with(TAR_EXT) {
        tar::Archive::new(file).unpack(dest)?;
    } else {
        return Err(CoreError::Archive(format!(
            "unrecognized archive extension for {name:?}"
        )));
    }
    Ok(())
}

/// Whether a location looks like a package archive we can unpack
pub fn is_archive_path(location: &str) -> bool {
    location.ends_with(TAR_ZST_EXT) || location.ends_with(TAR_EXT)
}

/// Split an archive into `part000` (header) plus fixed-size data parts.
///
/// Returns the part paths in order. The original archive is removed once the
/// parts are on disk.
pub fn split(archive: &Path, chunk_size: usize) -> Result<Vec<PathBuf>> {
    if chunk_size == 0 {
        return Err(CoreError::Archive("split chunk size must be non-zero".into()));
    }

    let sha256_sum = sha256_of_file(archive)?;
    let bytes = archive.metadata()?.len();

    let mut reader = File::open(archive)?;
    let mut parts = Vec::new();
    let mut index = 1usize;
    let mut buffer = vec![0u8; chunk_size];

    loop {
        let mut filled = 0usize;
        while filled < chunk_size {
            let n = reader.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }

        let part = part_path(archive, index);
        std::fs::write(&part, &buffer[..filled])?;
        parts.push(part);
        index += 1;

        if filled < chunk_size {
            break;
        }
    }

    let header = SplitHeader {
        count: parts.len(),
        bytes,
        sha256_sum,
    };
    let header_path = part_path(archive, 0);
    std::fs::write(&header_path, serde_json::to_vec(&header)?)?;

    std::fs::remove_file(archive)?;

    let mut all = vec![header_path];
    all.extend(parts);
    Ok(all)
}

/// Reassemble a split archive from its `part000` path.
///
/// Validates the part count and the sha256 of the reassembled payload, then
/// writes the payload to `out`.
pub fn reassemble(part000: &Path, out: &Path) -> Result<()> {
    let header: SplitHeader = serde_json::from_slice(&std::fs::read(part000)?)?;

    let base = part000
        .to_string_lossy()
        .trim_end_matches(".part000")
        .to_string();

    let mut writer = File::create(out)?;
    for index in 1..=header.count {
        let part = PathBuf::from(format!("{base}.part{index:03}"));
        if !part.is_file() {
            return Err(CoreError::integrity(
                part.to_string_lossy(),
                "split archive part is missing",
            ));
        }
        let data = std::fs::read(&part)?;
        writer.write_all(&data)?;
    }
    writer.flush()?;

    let actual = sha256_of_file(out)?;
    if actual != header.sha256_sum {
        return Err(CoreError::integrity(
            out.to_string_lossy(),
            format!(
                "reassembled archive mismatch: expected {}, got {actual}",
                header.sha256_sum
            ),
        ));
    }

    Ok(())
}

fn part_path(archive: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.part{index:03}", archive.to_string_lossy()))
}
