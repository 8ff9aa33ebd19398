//! Shader variant compilation and caching.
//!
//! - [`space`]: compile-time option permutation space
//! - [`translate`]: injectable preprocessor / translator / device seams
//! - [`store`]: the persistent bytecode cache record
//! - [`compiler`]: [`VariantCompiler`], tying it together
//!
//! Building a shader's variants is a one-time, I/O- and compiler-bound
//! operation at program creation; everything here is synchronous and
//! blocking. Callers wanting parallelism run independent compilers on
//! separate device contexts; the only cross-thread guard in this module
//! is the [`translate::PreprocessorService`] mutex.

pub mod compiler;
pub mod space;
pub mod store;
pub mod translate;

pub use compiler::{
    CompiledVariant, UniformRequest, VariantCompileSettings, VariantCompiler, VariantTable,
};
pub use space::{CompileOption, Permutation, VariantSpace};
pub use store::{ProgramBytecode, VariantCacheRecord};
pub use translate::{
    BindLocation, PreprocessedSource, PreprocessorService, ProgramHandle, ShaderDevice,
    ShaderHandle, ShaderStage, ShaderTranslator, SourcePreprocessor,
};
