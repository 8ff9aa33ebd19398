#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Kiln graphics backend core.
//!
//! This crate owns the two pieces of the renderer that sit directly on top
//! of a native graphics API (OpenGL or Direct3D11):
//!
//! - [`state`]: the context state cache. All native calls go through
//!   [`ContextStateCache`], which mirrors the currently bound resources and
//!   pipeline state so redundant API calls are never issued, and which
//!   unbinds deleted resources before their ids can be reused.
//! - [`variant`]: the shader variant compiler. A shader source plus a list
//!   of compile-time options is expanded into every permutation of those
//!   options; compiled bytecode is cached on disk and revalidated by
//!   content-hashing every source dependency.
//!
//! The wire-level API, the HLSL translator and the text preprocessor are
//! consumed through traits ([`NativeContext`], [`ShaderTranslator`],
//! [`SourcePreprocessor`], [`ShaderDevice`]) so the whole crate is testable
//! without a GPU.

pub mod errors;
pub mod state;
pub mod utils;
pub mod variant;

pub use errors::{KilnError, Result};
pub use state::{ContextStateCache, NativeContext};
pub use variant::{
    CompileOption, ShaderDevice, ShaderTranslator, SourcePreprocessor, VariantCompiler,
    VariantSpace, VariantTable,
};
