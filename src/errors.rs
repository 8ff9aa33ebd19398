//! Error Types
//!
//! The main error type [`KilnError`] covers the failure modes of the
//! backend core: variant-compiler misconfiguration, cache I/O and the
//! cache-hit device path. Per-permutation compile errors are *not* carried
//! here; they are collected and logged by the variant compiler, which
//! keeps building the remaining permutations (see
//! [`variant::VariantTable::had_errors`](crate::variant::VariantTable::had_errors)).
//!
//! All public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, KilnError>`.

use thiserror::Error;

/// The main error type for the Kiln backend core.
#[derive(Error, Debug)]
pub enum KilnError {
    // ========================================================================
    // Variant compiler
    // ========================================================================
    /// The compile-time option list was empty, or an option had no values.
    #[error("compile-time option space is empty")]
    EmptyOptionSpace,

    /// A uniform request's safety index does not equal its position in the
    /// request list. Programmer error; nothing is compiled.
    #[error("uniform request '{name}' at position {position} carries safety index {safety_index}")]
    SafetyIndexMismatch {
        /// Requested uniform name
        name: String,
        /// Position in the request list
        position: usize,
        /// The mismatched index the request carried
        safety_index: usize,
    },

    /// The device rejected bytecode loaded from a validated cache record.
    ///
    /// This is fatal for the whole `create` call; there is no fallback to
    /// recompiling from source. Delete the cache file to recover.
    #[error("device rejected cached bytecode for permutation {ordinal}: {reason}")]
    DeviceRejectedBytecode {
        /// Ordinal of the permutation being instantiated
        ordinal: usize,
        /// Device diagnostic
        reason: String,
    },

    // ========================================================================
    // I/O & Formats
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
