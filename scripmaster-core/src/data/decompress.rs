//! Gzip detection and decompression for compressed scrip masters.

use super::error::DataError;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True when the file starts with the gzip magic bytes.
pub fn is_gzip(path: &Path) -> Result<bool, DataError> {
    let mut file = open_input(path)?;
    let mut magic = [0u8; 2];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..]) {
            Ok(0) => return Ok(false),
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DataError::io(path, e)),
        }
    }
    Ok(magic == GZIP_MAGIC)
}

/// Decompress `src` into `dst`, returning the decompressed size in bytes.
pub fn gunzip_file(src: &Path, dst: &Path) -> Result<u64, DataError> {
    tracing::info!(src = %src.display(), dst = %dst.display(), "decompressing feed");

    let input = open_input(src)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let output = File::create(dst).map_err(|e| DataError::io(dst, e))?;
    let mut writer = BufWriter::new(output);

    let written = std::io::copy(&mut decoder, &mut writer).map_err(|e| {
        DataError::Decompression {
            path: src.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    writer.flush().map_err(|e| DataError::io(dst, e))?;

    tracing::info!(bytes = written, "decompressed feed");
    Ok(written)
}

fn open_input(path: &Path) -> Result<File, DataError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => DataError::io(path, e),
    })
}
