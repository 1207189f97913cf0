//! Symbol container loading: plain JSON and `.json.xz` files, bytes, strings.

use crate::config::Options;
use crate::container::SymbolContainer;
use crate::error::{IsfError, IsfResult};
use crate::raw;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use xz2::read::XzDecoder;

/// Load and build a symbol container from a filesystem path.
///
/// Automatically detects compression:
/// - `.json.xz` or `.xz` → LZMA decompression then JSON parse
/// - `.json` or anything else → direct JSON parse
pub fn parse_isf_file(path: impl AsRef<Path>, options: &Options) -> IsfResult<SymbolContainer> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(IsfError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path).map_err(|e| IsfError::Io(format!("opening {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let mut buf = Vec::new();

    let path_str = path.to_string_lossy().to_lowercase();
    if path_str.ends_with(".xz") {
        XzDecoder::new(reader)
            .read_to_end(&mut buf)
            .map_err(|e| IsfError::Decompression(format!("{}: {}", path.display(), e)))?;
    } else {
        let mut reader = reader;
        reader
            .read_to_end(&mut buf)
            .map_err(|e| IsfError::Io(format!("reading {}: {}", path.display(), e)))?;
    }
    debug!(path = %path.display(), bytes = buf.len(), "read symbol container file");

    parse_isf_bytes(&buf, options)
}

/// Build from raw JSON bytes (already decompressed).
pub fn parse_isf_bytes(json_bytes: &[u8], options: &Options) -> IsfResult<SymbolContainer> {
    let doc = raw::decode_slice(json_bytes).map_err(|e| IsfError::JsonParse(e.to_string()))?;
    SymbolContainer::build(&doc.value, doc.duplicates, options)
}

/// Build from a JSON string.
pub fn parse_isf_str(json_str: &str, options: &Options) -> IsfResult<SymbolContainer> {
    let doc = raw::decode_str(json_str).map_err(|e| IsfError::JsonParse(e.to_string()))?;
    SymbolContainer::build(&doc.value, doc.duplicates, options)
}
