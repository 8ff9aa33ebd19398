//! External Compile Services
//!
//! The variant compiler consumes three opaque services, all injected as
//! traits so tests run without a GPU or a real shader toolchain:
//!
//! - [`SourcePreprocessor`]: macro/`#include` expansion. The production
//!   preprocessor keeps process-wide mutable state and is not reentrant,
//!   so it is only ever reached through [`PreprocessorService`], which
//!   serializes every call behind a mutex. This is the only shared mutable
//!   state in the crate.
//! - [`ShaderTranslator`]: HLSL to the context's target language.
//! - [`ShaderDevice`]: compiles translated source to device bytecode,
//!   revives stored bytecode, links programs and reflects uniforms.
//!
//! Service errors are plain diagnostic strings: the compiler collects and
//! logs them, it does not branch on their contents.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Output of preprocessing: the expanded source plus every file the
/// expansion touched (transitively), for cache invalidation.
#[derive(Debug, Clone)]
pub struct PreprocessedSource {
    pub code: String,
    pub included_files: BTreeSet<PathBuf>,
}

/// Macro and `#include` expansion. Not reentrant; call through
/// [`PreprocessorService`].
pub trait SourcePreprocessor {
    fn preprocess(
        &mut self,
        code: &str,
        macros: &[String],
        include_dir: &Path,
    ) -> Result<PreprocessedSource, String>;
}

/// Process-wide owner of the preprocessor. Every call is serialized with a
/// mutex, independent of which thread or subsystem triggered the build.
pub struct PreprocessorService {
    inner: Mutex<Box<dyn SourcePreprocessor + Send>>,
}

impl PreprocessorService {
    pub fn new(preprocessor: Box<dyn SourcePreprocessor + Send>) -> Self {
        Self {
            inner: Mutex::new(preprocessor),
        }
    }

    pub fn preprocess(
        &self,
        code: &str,
        macros: &[String],
        include_dir: &Path,
    ) -> Result<PreprocessedSource, String> {
        self.inner.lock().preprocess(code, macros, include_dir)
    }
}

/// Source-to-target shader translation.
pub trait ShaderTranslator {
    /// Translates preprocessed code for one stage, or returns the
    /// collected diagnostics.
    fn translate(&self, code: &str, stage: ShaderStage) -> Result<String, String>;
}

/// Opaque handle to one compiled shader stage on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Opaque handle to one linked shader program on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque location of a named uniform inside a linked program, resolved by
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindLocation(pub u32);

/// The graphics device's shader factory and reflection surface.
pub trait ShaderDevice {
    /// Compiles translated source for one stage, returning the shader and
    /// its device bytecode (persisted by the variant cache).
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        translated_code: &str,
    ) -> Result<(ShaderHandle, Vec<u8>), String>;

    /// Revives a shader from bytecode produced by an earlier
    /// [`Self::compile_shader`] on a compatible device.
    fn shader_from_bytecode(
        &mut self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<ShaderHandle, String>;

    /// Links a vertex/pixel pair into a program.
    fn link_program(
        &mut self,
        vs: ShaderHandle,
        ps: ShaderHandle,
    ) -> Result<ProgramHandle, String>;

    /// Looks up a uniform on one stage of a linked program. `None` means
    /// the uniform does not exist there (it may have been optimized out).
    fn find_uniform(
        &self,
        program: ProgramHandle,
        name: &str,
        stage: ShaderStage,
    ) -> Option<BindLocation>;
}
