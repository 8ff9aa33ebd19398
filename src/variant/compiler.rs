//! Shader Variant Compiler
//!
//! Builds one shader program per permutation of a shader's compile-time
//! options, preferring the persistent bytecode cache over source
//! compilation.
//!
//! The flow of [`VariantCompiler::create`]:
//!
//! 1. validate the uniform request list (fail fast, nothing compiled);
//! 2. build the [`VariantSpace`];
//! 3. probe the cache: a loadable record whose pair count matches the
//!    permutation count and whose dependency hashes still match disk is a
//!    **cache hit**: every program is revived from bytecode and no
//!    source is ever preprocessed or translated;
//! 4. otherwise compile every permutation from source, collecting
//!    per-permutation failures without stopping, since one broken permutation
//!    must not hide errors in (or block the use of) its siblings;
//! 5. resolve the uniform lookup table of every built program by
//!    reflection;
//! 6. after a fully successful fresh compile, persist a new cache record,
//!    overwriting any prior one.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{KilnError, Result};
use crate::utils::hash::hash_djb2;

use super::space::{CompileOption, Permutation, VariantSpace};
use super::store::{ProgramBytecode, VariantCacheRecord};
use super::translate::{
    BindLocation, PreprocessorService, ProgramHandle, ShaderDevice, ShaderStage, ShaderTranslator,
};

/// Where and how a shader's variants are built.
#[derive(Debug, Clone)]
pub struct VariantCompileSettings {
    /// Name used in diagnostics (usually the source file name).
    pub source_name: String,
    /// Persistent cache location. `None` disables caching entirely.
    pub cache_path: Option<PathBuf>,
    /// Directory `#include` directives resolve against.
    pub include_dir: PathBuf,
    /// Baseline macros defined for every permutation (target language,
    /// platform tier...), on top of the per-permutation option block.
    pub platform_macros: Vec<String>,
}

impl Default for VariantCompileSettings {
    fn default() -> Self {
        Self {
            source_name: "<memory>".to_string(),
            cache_path: None,
            include_dir: PathBuf::from("shaders"),
            platform_macros: Vec::new(),
        }
    }
}

/// One uniform the caller wants resolved in every variant's lookup table.
///
/// `safety_index` must equal the request's position in the list. Callers
/// address the lookup table with the same indices they built this list
/// with; the redundancy exists so a reordered list fails loudly at create
/// time instead of binding the wrong uniform at draw time.
#[derive(Debug, Clone)]
pub struct UniformRequest {
    pub safety_index: usize,
    pub name: String,
    /// Stage the uniform is needed on. A uniform used by both stages is
    /// requested once per stage.
    pub stage: ShaderStage,
}

impl UniformRequest {
    pub fn new(safety_index: usize, name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            safety_index,
            name: name.into(),
            stage,
        }
    }
}

/// One built shader program and its uniform lookup table, aligned 1:1
/// with the request list passed to [`VariantCompiler::create`]. `None`
/// entries are uniforms the program does not use.
#[derive(Debug)]
pub struct CompiledVariant {
    pub program: ProgramHandle,
    pub uniform_lut: Vec<Option<BindLocation>>,
}

/// The result of building a shader's permutation space: one slot per
/// ordinal, `None` where that permutation failed to compile.
#[derive(Debug)]
pub struct VariantTable {
    space: VariantSpace,
    variants: Vec<Option<CompiledVariant>>,
    had_errors: bool,
    included_files: BTreeSet<PathBuf>,
}

impl VariantTable {
    /// The permutation space the table was built over.
    #[must_use]
    pub fn space(&self) -> &VariantSpace {
        &self.space
    }

    /// True when at least one permutation failed to compile. Surviving
    /// permutations are still live and queryable; callers decide whether
    /// a partially built shader is usable.
    #[must_use]
    pub fn had_errors(&self) -> bool {
        self.had_errors
    }

    /// The variant at a permutation ordinal.
    #[must_use]
    pub fn variant(&self, ordinal: usize) -> Option<&CompiledVariant> {
        self.variants.get(ordinal).and_then(Option::as_ref)
    }

    /// The variant for one concrete permutation.
    #[must_use]
    pub fn variant_for(&self, permutation: &Permutation) -> Option<&CompiledVariant> {
        self.variant(self.space.ordinal_of(permutation))
    }

    /// Every file the fresh compile touched (root source file plus
    /// transitive includes). Empty after a cache hit: nothing was
    /// preprocessed, so nothing was discovered.
    #[must_use]
    pub fn included_files(&self) -> &BTreeSet<PathBuf> {
        &self.included_files
    }
}

struct BuiltProgram {
    program: ProgramHandle,
    bytecode: ProgramBytecode,
    included_files: BTreeSet<PathBuf>,
}

/// Entry points for building a [`VariantTable`].
pub struct VariantCompiler;

impl VariantCompiler {
    /// Builds every permutation of `source`. Returns the table, which may
    /// carry per-permutation failures (see [`VariantTable::had_errors`]);
    /// an `Err` means nothing usable was produced (misconfiguration, or
    /// the device rejected cached bytecode).
    pub fn create(
        device: &mut dyn ShaderDevice,
        translator: &dyn ShaderTranslator,
        preprocessor: &PreprocessorService,
        source: &str,
        settings: &VariantCompileSettings,
        options: Vec<CompileOption>,
        uniforms: &[UniformRequest],
    ) -> Result<VariantTable> {
        Self::create_internal(
            device,
            translator,
            preprocessor,
            source,
            None,
            settings,
            options,
            uniforms,
        )
    }

    /// Like [`Self::create`], with the root code read from a file that
    /// then participates in the cache's dependency hashes.
    pub fn create_from_file(
        device: &mut dyn ShaderDevice,
        translator: &dyn ShaderTranslator,
        preprocessor: &PreprocessorService,
        path: &Path,
        settings: &VariantCompileSettings,
        options: Vec<CompileOption>,
        uniforms: &[UniformRequest],
    ) -> Result<VariantTable> {
        let source = fs::read_to_string(path)?;
        Self::create_internal(
            device,
            translator,
            preprocessor,
            &source,
            Some(path),
            settings,
            options,
            uniforms,
        )
    }

    fn create_internal(
        device: &mut dyn ShaderDevice,
        translator: &dyn ShaderTranslator,
        preprocessor: &PreprocessorService,
        source: &str,
        root_file: Option<&Path>,
        settings: &VariantCompileSettings,
        options: Vec<CompileOption>,
        uniforms: &[UniformRequest],
    ) -> Result<VariantTable> {
        for (position, request) in uniforms.iter().enumerate() {
            if request.safety_index != position {
                return Err(KilnError::SafetyIndexMismatch {
                    name: request.name.clone(),
                    position,
                    safety_index: request.safety_index,
                });
            }
        }

        let space = VariantSpace::build(options)?;

        let cache = settings
            .cache_path
            .as_deref()
            .and_then(VariantCacheRecord::load)
            .filter(|record| {
                record.bytecode_per_permutation.len() == space.total() && record.is_up_to_date()
            });

        let mut table = if let Some(record) = cache {
            Self::revive_from_cache(device, &settings.source_name, space, &record)?
        } else {
            Self::compile_fresh(
                device,
                translator,
                preprocessor,
                source,
                root_file,
                settings,
                space,
            )
        };

        // Resolve the uniform lookup tables, aligned 1:1 with the request
        // list, for every program that was built on either path.
        for variant in table.variants.iter_mut().flatten() {
            variant.uniform_lut = uniforms
                .iter()
                .map(|request| device.find_uniform(variant.program, &request.name, request.stage))
                .collect();
        }

        Ok(table)
    }

    fn revive_from_cache(
        device: &mut dyn ShaderDevice,
        source_name: &str,
        space: VariantSpace,
        record: &VariantCacheRecord,
    ) -> Result<VariantTable> {
        log::info!(
            "{source_name}: shader variant cache is valid, loading {} permutations from bytecode",
            space.total()
        );

        let mut variants = Vec::with_capacity(space.total());
        for (ordinal, pair) in record.bytecode_per_permutation.iter().enumerate() {
            // No fallback to source compilation on this path: a validated
            // record the device refuses is a device/driver mismatch.
            let vs = device
                .shader_from_bytecode(ShaderStage::Vertex, &pair.vs)
                .map_err(|reason| KilnError::DeviceRejectedBytecode { ordinal, reason })?;
            let ps = device
                .shader_from_bytecode(ShaderStage::Pixel, &pair.ps)
                .map_err(|reason| KilnError::DeviceRejectedBytecode { ordinal, reason })?;
            let program = device
                .link_program(vs, ps)
                .map_err(|reason| KilnError::DeviceRejectedBytecode { ordinal, reason })?;
            variants.push(Some(CompiledVariant {
                program,
                uniform_lut: Vec::new(),
            }));
        }

        Ok(VariantTable {
            space,
            variants,
            had_errors: false,
            included_files: BTreeSet::new(),
        })
    }

    fn compile_fresh(
        device: &mut dyn ShaderDevice,
        translator: &dyn ShaderTranslator,
        preprocessor: &PreprocessorService,
        source: &str,
        root_file: Option<&Path>,
        settings: &VariantCompileSettings,
        space: VariantSpace,
    ) -> VariantTable {
        log::warn!(
            "{}: no valid shader cache, compiling {} permutations from source",
            settings.source_name,
            space.total()
        );

        let mut dependencies = BTreeSet::new();
        if let Some(root) = root_file {
            dependencies.insert(root.to_path_buf());
        }

        let mut had_errors = false;
        let mut variants = Vec::with_capacity(space.total());
        let mut bytecodes: Vec<Option<ProgramBytecode>> = Vec::with_capacity(space.total());

        for ordinal in 0..space.total() {
            let permutation = space.permutation_at(ordinal);
            let full_source = format!("{}{}", space.macro_block(&permutation), source);
            match Self::build_permutation(device, translator, preprocessor, &full_source, settings)
            {
                Ok(built) => {
                    dependencies.extend(built.included_files);
                    variants.push(Some(CompiledVariant {
                        program: built.program,
                        uniform_lut: Vec::new(),
                    }));
                    bytecodes.push(Some(built.bytecode));
                }
                Err(diagnostics) => {
                    log::error!(
                        "{}: permutation {ordinal} failed to compile:\n{diagnostics}",
                        settings.source_name
                    );
                    had_errors = true;
                    variants.push(None);
                    bytecodes.push(None);
                }
            }
        }

        if !had_errors && let Some(cache_path) = settings.cache_path.as_deref() {
            Self::persist_cache(cache_path, &settings.source_name, &dependencies, bytecodes);
        }

        VariantTable {
            space,
            variants,
            had_errors,
            included_files: dependencies,
        }
    }

    fn build_permutation(
        device: &mut dyn ShaderDevice,
        translator: &dyn ShaderTranslator,
        preprocessor: &PreprocessorService,
        full_source: &str,
        settings: &VariantCompileSettings,
    ) -> std::result::Result<BuiltProgram, String> {
        let preprocessed = preprocessor.preprocess(
            full_source,
            &settings.platform_macros,
            &settings.include_dir,
        )?;

        let vs_code = translator.translate(&preprocessed.code, ShaderStage::Vertex)?;
        let ps_code = translator.translate(&preprocessed.code, ShaderStage::Pixel)?;

        let (vs, vs_bytecode) = device.compile_shader(ShaderStage::Vertex, &vs_code)?;
        let (ps, ps_bytecode) = device.compile_shader(ShaderStage::Pixel, &ps_code)?;
        let program = device.link_program(vs, ps)?;

        Ok(BuiltProgram {
            program,
            bytecode: ProgramBytecode {
                vs: vs_bytecode,
                ps: ps_bytecode,
            },
            included_files: preprocessed.included_files,
        })
    }

    /// Hashes every dependency and writes a fresh record, replacing any
    /// prior cache. Cache I/O trouble is logged and swallowed; a shader
    /// that compiled is usable whether or not its cache could be written.
    fn persist_cache(
        cache_path: &Path,
        source_name: &str,
        dependencies: &BTreeSet<PathBuf>,
        bytecodes: Vec<Option<ProgramBytecode>>,
    ) {
        let mut record = VariantCacheRecord::default();
        for file in dependencies {
            match fs::read(file) {
                Ok(data) => {
                    record
                        .source_file_hashes
                        .insert(file.display().to_string(), hash_djb2(&data));
                }
                Err(err) => {
                    // The record must only hash content that was read.
                    log::warn!(
                        "{source_name}: dependency {} unreadable ({err}); cache not written",
                        file.display()
                    );
                    return;
                }
            }
        }

        record.bytecode_per_permutation = bytecodes.into_iter().flatten().collect();

        if let Err(err) = record.save(cache_path) {
            log::error!(
                "{source_name}: failed to write variant cache {}: {err}",
                cache_path.display()
            );
        }
    }
}
