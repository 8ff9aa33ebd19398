//! Persistent Variant Cache Record
//!
//! Shader compilation (D3DCompile in particular) is slow enough that
//! recompiling every permutation on every launch is not acceptable. The
//! cache record persists, per shader, a djb2 content hash for every source
//! file the build touched and one vertex/pixel bytecode pair per
//! permutation ordinal.
//!
//! File format (JSON, versionless):
//!
//! ```json
//! {
//!   "sourceFiles": [ { "file": "<path>", "hash": 1234 }, ... ],
//!   "shaderBytecodesPerPermutation": [
//!     { "vsDataEncoded": "<base64>", "psDataEncoded": "<base64>" }, ...
//!   ]
//! }
//! ```
//!
//! Pair `i` corresponds to permutation ordinal `i` under the option list
//! the cache was written with. The option list itself is not stored:
//! changing it invalidates the cache only through the pair-count check,
//! not an explicit marker. Content hashes are the sole invalidation
//! mechanism. No timestamps, no version numbers.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::utils::hash::hash_djb2;

#[derive(Serialize, Deserialize)]
struct SourceFileEntry {
    file: String,
    hash: u32,
}

#[derive(Serialize, Deserialize)]
struct EncodedBytecodePair {
    #[serde(rename = "vsDataEncoded")]
    vs_data_encoded: String,
    #[serde(rename = "psDataEncoded")]
    ps_data_encoded: String,
}

#[derive(Serialize, Deserialize)]
struct CacheDocument {
    #[serde(rename = "sourceFiles")]
    source_files: Vec<SourceFileEntry>,
    #[serde(rename = "shaderBytecodesPerPermutation")]
    bytecodes_per_permutation: Vec<EncodedBytecodePair>,
}

/// Compiled bytecode for both stages of one permutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramBytecode {
    pub vs: Vec<u8>,
    pub ps: Vec<u8>,
}

/// One persisted build artifact: dependency hashes plus bytecode per
/// permutation ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantCacheRecord {
    /// Source file path → djb2 hash of its contents at build time.
    pub source_file_hashes: BTreeMap<String, u32>,
    /// One bytecode pair per permutation ordinal.
    pub bytecode_per_permutation: Vec<ProgramBytecode>,
}

impl VariantCacheRecord {
    /// Writes the record, creating parent directories as needed. The
    /// document is written to a temporary sibling and renamed into place
    /// so a crash mid-write never leaves a truncated cache behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let document = CacheDocument {
            source_files: self
                .source_file_hashes
                .iter()
                .map(|(file, &hash)| SourceFileEntry {
                    file: file.clone(),
                    hash,
                })
                .collect(),
            bytecodes_per_permutation: self
                .bytecode_per_permutation
                .iter()
                .map(|pair| EncodedBytecodePair {
                    vs_data_encoded: BASE64.encode(&pair.vs),
                    ps_data_encoded: BASE64.encode(&pair.ps),
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&document)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a record. A missing file, unreadable file or malformed
    /// document all collapse to `None`: a broken cache means "no cache",
    /// never a failure.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                log::debug!("variant cache {}: not readable ({err})", path.display());
                return None;
            }
        };

        let document: CacheDocument = match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(err) => {
                log::debug!("variant cache {}: malformed ({err})", path.display());
                return None;
            }
        };

        let mut record = Self::default();
        for entry in document.source_files {
            record.source_file_hashes.insert(entry.file, entry.hash);
        }
        for pair in document.bytecodes_per_permutation {
            let vs = BASE64.decode(&pair.vs_data_encoded);
            let ps = BASE64.decode(&pair.ps_data_encoded);
            match (vs, ps) {
                (Ok(vs), Ok(ps)) => record.bytecode_per_permutation.push(ProgramBytecode { vs, ps }),
                _ => {
                    log::debug!("variant cache {}: bad base64 payload", path.display());
                    return None;
                }
            }
        }
        Some(record)
    }

    /// Re-hashes every recorded source file from disk right now. Any
    /// missing file or hash mismatch means the record is stale.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        for (file, &recorded_hash) in &self.source_file_hashes {
            let Ok(data) = fs::read(file) else {
                return false;
            };
            if hash_djb2(&data) != recorded_hash {
                return false;
            }
        }
        true
    }
}
