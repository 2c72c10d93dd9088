//! On-disk index format.
//!
//! One JSON document per index. The vectors are included only when the
//! caller asks to persist data; otherwise the loader must bulk-load the same
//! rows before reading the index back.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::{DataLayout, Points};
use crate::distance::Space;
use crate::index::{Method, Structure};
use crate::params::ParamMap;
use crate::{EngineError, Result};

pub(crate) const FORMAT_VERSION: u32 = 1;

/// Borrowed view written by `save`.
#[derive(Serialize)]
pub(crate) struct SavedIndexRef<'a> {
    pub version: u32,
    pub method: Method,
    pub space: &'a str,
    pub layout: DataLayout,
    pub len: usize,
    pub params: &'a ParamMap,
    pub structure: &'a Structure,
    pub points: Option<&'a Points>,
}

/// Owned form read by `load`.
#[derive(Deserialize)]
pub(crate) struct SavedIndex {
    pub version: u32,
    pub method: Method,
    pub space: String,
    pub layout: DataLayout,
    pub len: usize,
    pub params: ParamMap,
    pub structure: Structure,
    pub points: Option<Points>,
}

impl SavedIndex {
    /// The saved index must come from the same method, space and layout.
    pub fn check_matches(&self, method: Method, space: &Space) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(EngineError::IncompatibleIndex(format!(
                "unsupported format version {}",
                self.version
            )));
        }
        if self.method != method {
            return Err(EngineError::IncompatibleIndex(format!(
                "saved by method {}, loading into {method}",
                self.method
            )));
        }
        if self.space != space.name() || self.layout != space.layout() {
            return Err(EngineError::IncompatibleIndex(format!(
                "saved for space {} ({}), loading into {} ({})",
                self.space,
                self.layout,
                space.name(),
                space.layout()
            )));
        }
        Ok(())
    }
}

pub(crate) fn write(path: &Path, saved: &SavedIndexRef<'_>) -> Result<()> {
    let io_err = |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, saved)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

pub(crate) fn read(path: &Path) -> Result<SavedIndex> {
    let file = File::open(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::scan::ScanIndex;

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(EngineError::Io { .. })));
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read(&path), Err(EngineError::Serialization(_))));
    }

    #[test]
    fn test_check_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let params = ParamMap::new();
        let structure = Structure::Scan(ScanIndex::exhaustive());
        write(
            &path,
            &SavedIndexRef {
                version: FORMAT_VERSION,
                method: Method::BruteForce,
                space: "l2",
                layout: DataLayout::Dense,
                len: 0,
                params: &params,
                structure: &structure,
                points: None,
            },
        )
        .unwrap();

        let saved = read(&path).unwrap();
        let l2 = Space::parse("l2", DataLayout::Dense).unwrap();
        let l1 = Space::parse("l1", DataLayout::Dense).unwrap();
        assert!(saved.check_matches(Method::BruteForce, &l2).is_ok());
        assert!(saved.check_matches(Method::SeqSearch, &l2).is_err());
        assert!(saved.check_matches(Method::BruteForce, &l1).is_err());
    }
}
