//! Native Context Abstraction
//!
//! [`NativeContext`] is the seam between the state cache and the real
//! graphics API. Each method corresponds to exactly one native call (for
//! composite state like blending, the one native sequence that applies the
//! whole description). The production implementation forwards to GL or
//! D3D11 FFI and lives with the platform layer; tests substitute a
//! recording mock.
//!
//! Resource ids are the raw numeric handles the native API hands out.
//! `0` always means "no resource". The cache layers generation tracking on
//! top of these ids; implementations here never see generations.

use super::desc::{
    BlendStateDesc, CompareFunc, CullMode, FillMode, ScissorRect, VertexAttribLayout, Viewport,
};

/// Raw native resource id. Zero is the null resource.
pub type RawId = u32;

/// Buffer binding targets tracked by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Vertex data (`GL_ARRAY_BUFFER`).
    Array,
    /// Index data (`GL_ELEMENT_ARRAY_BUFFER`).
    ElementArray,
    /// Shader constants (`GL_UNIFORM_BUFFER`).
    Uniform,
}

impl BufferTarget {
    pub(crate) const COUNT: usize = 3;

    #[inline]
    #[must_use]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Array => 0,
            Self::ElementArray => 1,
            Self::Uniform => 2,
        }
    }
}

/// Texture binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureTarget {
    #[default]
    Tex2D,
    Tex3D,
    Cube,
}

/// Access mode for [`NativeContext::map_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Primitive topology for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Index element format for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

/// The underlying graphics API, one method per call.
///
/// Implementations perform no caching or validation of their own; the
/// whole point of [`ContextStateCache`](super::ContextStateCache) is that
/// it decides *whether* to call, and implementations just do it.
pub trait NativeContext {
    // ── Resource lifetime ────────────────────────────────────────────────

    fn gen_buffers(&mut self, count: usize) -> Vec<RawId>;
    fn delete_buffers(&mut self, ids: &[RawId]);

    fn gen_textures(&mut self, count: usize) -> Vec<RawId>;
    fn delete_textures(&mut self, ids: &[RawId]);

    fn gen_framebuffers(&mut self, count: usize) -> Vec<RawId>;
    fn delete_framebuffers(&mut self, ids: &[RawId]);

    fn create_program(&mut self) -> RawId;
    fn delete_program(&mut self, id: RawId);

    // ── Binds ────────────────────────────────────────────────────────────

    fn bind_buffer(&mut self, target: BufferTarget, id: RawId);
    fn map_buffer(&mut self, target: BufferTarget, access: MapAccess);
    fn unmap_buffer(&mut self, target: BufferTarget);

    fn enable_vertex_attrib(&mut self, index: u32);
    fn disable_vertex_attrib(&mut self, index: u32);
    /// Points the attribute slot at the buffer currently bound to
    /// [`BufferTarget::Array`].
    fn vertex_attrib_pointer(&mut self, index: u32, layout: &VertexAttribLayout);

    fn use_program(&mut self, id: RawId);
    fn bind_uniform_buffer(&mut self, index: u32, id: RawId);

    fn set_active_texture(&mut self, unit: u32);
    /// Binds to the active texture unit.
    fn bind_texture(&mut self, target: TextureTarget, id: RawId);

    fn bind_framebuffer(&mut self, id: RawId);

    // ── Fixed-function state ─────────────────────────────────────────────

    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor_rect(&mut self, rect: ScissorRect);
    fn set_scissor_enabled(&mut self, enabled: bool);

    fn set_cull_mode(&mut self, mode: CullMode);
    fn set_front_face_ccw(&mut self, ccw: bool);
    fn set_fill_mode(&mut self, mode: FillMode);
    fn set_depth_bias(&mut self, constant: f32, slope: f32);

    fn set_depth_test_enabled(&mut self, enabled: bool);
    fn set_depth_write_enabled(&mut self, enabled: bool);
    fn set_depth_compare(&mut self, func: CompareFunc);

    fn set_blend_state(&mut self, desc: &BlendStateDesc);

    // ── Draws ────────────────────────────────────────────────────────────

    fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first_vertex: u32,
        vertex_count: u32,
        instance_count: u32,
    );

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        index_count: u32,
        format: IndexFormat,
        byte_offset: usize,
        instance_count: u32,
    );
}
