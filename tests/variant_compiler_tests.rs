//! Shader Variant Compiler Tests
//!
//! Exercises the full create() state machine over mock services:
//! - fresh compile covers every permutation and persists a cache
//! - a valid cache revives programs with zero source compilation
//! - editing any dependency file (or changing the permutation count)
//!   invalidates the cache
//! - per-permutation compile failures are isolated; survivors stay usable
//! - configuration errors fail fast, device rejection of cached bytecode
//!   fails the whole call
//! - the cache record round-trips through its JSON wire format

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use kiln::errors::KilnError;
use kiln::variant::{
    BindLocation, CompileOption, PreprocessedSource, PreprocessorService, ProgramBytecode,
    ProgramHandle, ShaderDevice, ShaderHandle, ShaderStage, ShaderTranslator, SourcePreprocessor,
    UniformRequest, VariantCacheRecord, VariantCompileSettings, VariantCompiler,
};

const SHADER_SOURCE: &str = "float4 psMain() : SV_Target { return tint; }\n";

// ============================================================================
// Mock services
// ============================================================================

/// Passes code through untouched and reports a fixed include set.
struct MockPreprocessor {
    includes: BTreeSet<PathBuf>,
}

impl SourcePreprocessor for MockPreprocessor {
    fn preprocess(
        &mut self,
        code: &str,
        _macros: &[String],
        _include_dir: &Path,
    ) -> Result<PreprocessedSource, String> {
        Ok(PreprocessedSource {
            code: code.to_string(),
            included_files: self.includes.clone(),
        })
    }
}

fn service_with_includes(includes: &[&Path]) -> PreprocessorService {
    PreprocessorService::new(Box::new(MockPreprocessor {
        includes: includes.iter().map(|p| p.to_path_buf()).collect(),
    }))
}

/// Pass-through translator that rejects code containing `fail_marker`.
struct MockTranslator {
    fail_marker: Option<&'static str>,
}

impl MockTranslator {
    fn ok() -> Self {
        Self { fail_marker: None }
    }
}

impl ShaderTranslator for MockTranslator {
    fn translate(&self, code: &str, stage: ShaderStage) -> Result<String, String> {
        if let Some(marker) = self.fail_marker
            && code.contains(marker)
        {
            return Err(format!("translation failed near '{marker}'"));
        }
        Ok(format!("// stage {stage:?}\n{code}"))
    }
}

/// Counts compiles and bytecode loads; bytecode is the translated source
/// itself, and reflection knows a fixed uniform list.
struct MockDevice {
    next_handle: u32,
    compile_calls: usize,
    bytecode_loads: usize,
    reject_bytecode: bool,
    known_uniforms: Vec<&'static str>,
}

impl MockDevice {
    fn new(known_uniforms: &[&'static str]) -> Self {
        Self {
            next_handle: 1,
            compile_calls: 0,
            bytecode_loads: 0,
            reject_bytecode: false,
            known_uniforms: known_uniforms.to_vec(),
        }
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl ShaderDevice for MockDevice {
    fn compile_shader(
        &mut self,
        _stage: ShaderStage,
        translated_code: &str,
    ) -> Result<(ShaderHandle, Vec<u8>), String> {
        self.compile_calls += 1;
        let handle = ShaderHandle(self.next());
        Ok((handle, translated_code.as_bytes().to_vec()))
    }

    fn shader_from_bytecode(
        &mut self,
        _stage: ShaderStage,
        _bytecode: &[u8],
    ) -> Result<ShaderHandle, String> {
        self.bytecode_loads += 1;
        if self.reject_bytecode {
            return Err("bytecode built for an incompatible device".to_string());
        }
        Ok(ShaderHandle(self.next()))
    }

    fn link_program(
        &mut self,
        _vs: ShaderHandle,
        _ps: ShaderHandle,
    ) -> Result<ProgramHandle, String> {
        Ok(ProgramHandle(self.next()))
    }

    fn find_uniform(
        &self,
        _program: ProgramHandle,
        name: &str,
        _stage: ShaderStage,
    ) -> Option<BindLocation> {
        self.known_uniforms
            .iter()
            .position(|known| *known == name)
            .map(|i| BindLocation(i as u32))
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    dir: tempfile::TempDir,
    dep_file: PathBuf,
    settings: VariantCompileSettings,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let dep_file = dir.path().join("lighting_common.hlsl");
        fs::write(&dep_file, "float3 applyFog(float3 c) { return c; }\n").unwrap();
        let settings = VariantCompileSettings {
            source_name: "tinted.hlsl".to_string(),
            cache_path: Some(dir.path().join("cache/tinted.shadercache.json")),
            include_dir: dir.path().to_path_buf(),
            platform_macros: Vec::new(),
        };
        Self {
            dir,
            dep_file,
            settings,
        }
    }

    fn service(&self) -> PreprocessorService {
        service_with_includes(&[self.dep_file.as_path()])
    }

    fn cache_path(&self) -> &Path {
        self.settings.cache_path.as_deref().unwrap()
    }
}

fn quality_fog_options() -> Vec<CompileOption> {
    vec![
        CompileOption::new("QUALITY", &["LOW", "HIGH"]),
        CompileOption::new("FOG", &["OFF", "ON"]),
    ]
}

fn tint_request() -> Vec<UniformRequest> {
    vec![UniformRequest::new(0, "tint", ShaderStage::Pixel)]
}

// ============================================================================
// Fresh compile
// ============================================================================

#[test]
fn fresh_compile_builds_every_permutation_and_writes_the_cache() {
    let fixture = Fixture::new();
    let mut device = MockDevice::new(&["tint"]);

    let table = VariantCompiler::create(
        &mut device,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert!(!table.had_errors());
    assert_eq!(table.space().total(), 4);
    for ordinal in 0..4 {
        let variant = table.variant(ordinal).expect("every permutation built");
        assert_eq!(variant.uniform_lut, vec![Some(BindLocation(0))]);
    }
    // Two stages per permutation.
    assert_eq!(device.compile_calls, 8);
    assert!(fixture.cache_path().exists());
    assert!(table.included_files().contains(&fixture.dep_file));
}

#[test]
fn unknown_uniforms_resolve_to_none_without_misaligning_the_lut() {
    let fixture = Fixture::new();
    let mut device = MockDevice::new(&["tint", "world"]);

    let requests = vec![
        UniformRequest::new(0, "world", ShaderStage::Vertex),
        UniformRequest::new(1, "no_such_uniform", ShaderStage::Pixel),
        UniformRequest::new(2, "tint", ShaderStage::Pixel),
    ];
    let table = VariantCompiler::create(
        &mut device,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &requests,
    )
    .unwrap();

    let lut = &table.variant(0).unwrap().uniform_lut;
    assert_eq!(lut.len(), 3);
    assert_eq!(lut[0], Some(BindLocation(1)));
    assert_eq!(lut[1], None);
    assert_eq!(lut[2], Some(BindLocation(0)));
}

// ============================================================================
// Cache hit and invalidation
// ============================================================================

#[test]
fn valid_cache_revives_programs_with_zero_source_compilation() {
    let fixture = Fixture::new();

    let mut first = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    let mut second = MockDevice::new(&["tint"]);
    let table = VariantCompiler::create(
        &mut second,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert_eq!(second.compile_calls, 0);
    assert_eq!(second.bytecode_loads, 8);
    assert!(!table.had_errors());
    // Reflection still runs on the cache-hit path.
    assert_eq!(
        table.variant(3).unwrap().uniform_lut,
        vec![Some(BindLocation(0))]
    );
    // Nothing was preprocessed, so no includes were discovered.
    assert!(table.included_files().is_empty());
}

#[test]
fn editing_a_dependency_file_invalidates_the_cache() {
    let fixture = Fixture::new();

    let mut first = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    // One changed byte in one dependency is enough.
    let mut contents = fs::read(&fixture.dep_file).unwrap();
    contents[0] ^= 0x20;
    fs::write(&fixture.dep_file, contents).unwrap();

    let mut second = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut second,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert_eq!(second.bytecode_loads, 0);
    assert_eq!(second.compile_calls, 8);
}

#[test]
fn deleting_a_dependency_file_invalidates_the_cache() {
    let fixture = Fixture::new();

    let mut first = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    fs::remove_file(&fixture.dep_file).unwrap();

    let mut second = MockDevice::new(&["tint"]);
    let table = VariantCompiler::create(
        &mut second,
        &MockTranslator::ok(),
        &service_with_includes(&[]),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert_eq!(second.bytecode_loads, 0);
    assert!(!table.had_errors());
}

#[test]
fn permutation_count_mismatch_forces_a_recompile() {
    let fixture = Fixture::new();

    let mut first = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        vec![CompileOption::new("QUALITY", &["LOW", "HIGH"])],
        &tint_request(),
    )
    .unwrap();

    // Same cache file, but the option set now yields four permutations.
    let mut second = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut second,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert_eq!(second.bytecode_loads, 0);
    assert_eq!(second.compile_calls, 8);
}

#[test]
fn device_rejection_of_cached_bytecode_is_fatal() {
    let fixture = Fixture::new();

    let mut first = MockDevice::new(&["tint"]);
    VariantCompiler::create(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    let mut second = MockDevice::new(&["tint"]);
    second.reject_bytecode = true;
    let result = VariantCompiler::create(
        &mut second,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    );

    assert!(matches!(
        result,
        Err(KilnError::DeviceRejectedBytecode { ordinal: 0, .. })
    ));
    // No fallback to source compilation.
    assert_eq!(second.compile_calls, 0);
}

// ============================================================================
// Partial failure
// ============================================================================

#[test]
fn a_failing_permutation_does_not_take_down_its_siblings() {
    let fixture = Fixture::new();
    let mut device = MockDevice::new(&["tint"]);
    let translator = MockTranslator {
        fail_marker: Some("#define QUALITY HIGH"),
    };

    let table = VariantCompiler::create(
        &mut device,
        &translator,
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        vec![CompileOption::new("QUALITY", &["LOW", "HIGH"])],
        &tint_request(),
    )
    .unwrap();

    assert!(table.had_errors());
    assert!(table.variant(1).is_none());

    // The survivor is live with a fully populated lookup table.
    let survivor = table.variant(0).expect("LOW permutation compiled");
    assert_eq!(survivor.uniform_lut, vec![Some(BindLocation(0))]);

    // A partial build must never be persisted.
    assert!(!fixture.cache_path().exists());
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn safety_index_mismatch_fails_before_any_compilation() {
    let fixture = Fixture::new();
    let mut device = MockDevice::new(&["tint"]);

    let requests = vec![
        UniformRequest::new(0, "tint", ShaderStage::Pixel),
        UniformRequest::new(5, "world", ShaderStage::Vertex),
    ];
    let result = VariantCompiler::create(
        &mut device,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        quality_fog_options(),
        &requests,
    );

    assert!(matches!(
        result,
        Err(KilnError::SafetyIndexMismatch {
            position: 1,
            safety_index: 5,
            ..
        })
    ));
    assert_eq!(device.compile_calls, 0);
    assert!(!fixture.cache_path().exists());
}

#[test]
fn an_empty_option_space_fails_fast() {
    let fixture = Fixture::new();
    let mut device = MockDevice::new(&[]);

    let result = VariantCompiler::create(
        &mut device,
        &MockTranslator::ok(),
        &fixture.service(),
        SHADER_SOURCE,
        &fixture.settings,
        Vec::new(),
        &[],
    );

    assert!(matches!(result, Err(KilnError::EmptyOptionSpace)));
    assert_eq!(device.compile_calls, 0);
}

// ============================================================================
// create_from_file
// ============================================================================

#[test]
fn the_root_source_file_participates_in_invalidation() {
    let fixture = Fixture::new();
    let root = fixture.dir.path().join("tinted.hlsl");
    fs::write(&root, SHADER_SOURCE).unwrap();

    let mut first = MockDevice::new(&["tint"]);
    let table = VariantCompiler::create_from_file(
        &mut first,
        &MockTranslator::ok(),
        &fixture.service(),
        &root,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();
    assert!(table.included_files().contains(&root));

    // Editing the root file alone must force a recompile.
    fs::write(&root, format!("{SHADER_SOURCE}// edited\n")).unwrap();
    let mut second = MockDevice::new(&["tint"]);
    VariantCompiler::create_from_file(
        &mut second,
        &MockTranslator::ok(),
        &fixture.service(),
        &root,
        &fixture.settings,
        quality_fog_options(),
        &tint_request(),
    )
    .unwrap();

    assert_eq!(second.bytecode_loads, 0);
    assert_eq!(second.compile_calls, 8);
}

// ============================================================================
// Cache record wire format
// ============================================================================

#[test]
fn cache_record_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.json");

    let mut record = VariantCacheRecord::default();
    record
        .source_file_hashes
        .insert("shaders/a.hlsl".to_string(), 0xDEAD_BEEF);
    record.bytecode_per_permutation.push(ProgramBytecode {
        vs: vec![0, 1, 2, 255],
        ps: vec![42],
    });

    record.save(&path).unwrap();
    let loaded = VariantCacheRecord::load(&path).unwrap();
    assert_eq!(loaded, record);
}

#[test]
fn cache_document_uses_the_stable_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("format.json");

    let mut record = VariantCacheRecord::default();
    record.source_file_hashes.insert("x.hlsl".to_string(), 7);
    record.bytecode_per_permutation.push(ProgramBytecode {
        vs: b"vs".to_vec(),
        ps: b"ps".to_vec(),
    });
    record.save(&path).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(doc["sourceFiles"][0]["file"].is_string());
    assert!(doc["sourceFiles"][0]["hash"].is_u64());
    assert!(doc["shaderBytecodesPerPermutation"][0]["vsDataEncoded"].is_string());
    assert!(doc["shaderBytecodesPerPermutation"][0]["psDataEncoded"].is_string());
}

#[test]
fn missing_and_malformed_cache_files_load_as_absent() {
    let dir = tempfile::tempdir().unwrap();

    assert!(VariantCacheRecord::load(&dir.path().join("nope.json")).is_none());

    let mangled = dir.path().join("mangled.json");
    fs::write(&mangled, "{ \"sourceFiles\": [ oops").unwrap();
    assert!(VariantCacheRecord::load(&mangled).is_none());
}

#[test]
fn is_up_to_date_tracks_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let dep = dir.path().join("dep.hlsl");
    fs::write(&dep, b"v1").unwrap();

    let mut record = VariantCacheRecord::default();
    record
        .source_file_hashes
        .insert(dep.display().to_string(), kiln::utils::hash_djb2(b"v1"));
    assert!(record.is_up_to_date());

    fs::write(&dep, b"v2").unwrap();
    assert!(!record.is_up_to_date());

    fs::remove_file(&dep).unwrap();
    assert!(!record.is_up_to_date());
}
