//! Pipeline State Descriptors
//!
//! Value-comparable mirrors of the raster, depth-stencil and blend state of
//! a native context, plus viewport/scissor rectangles and the vertex
//! attribute layout. The state cache stores the last-applied value of each
//! and re-issues a native call only when a field actually changes, so every
//! type here derives `PartialEq`.

use bitflags::bitflags;

/// Triangle face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    #[default]
    Back,
}

/// Polygon rasterization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor for source or destination color/alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
}

/// Blend equation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

bitflags! {
    /// Per-channel color write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Rasterizer state.
///
/// Applied aspect-by-aspect: changing only the cull mode issues only the
/// cull-mode call. Depth bias (constant + slope) counts as one aspect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterStateDesc {
    pub cull_mode: CullMode,
    /// Counter-clockwise triangles are front-facing when true.
    pub front_ccw: bool,
    pub fill_mode: FillMode,
    pub depth_bias: f32,
    pub depth_bias_slope: f32,
    pub scissor_enabled: bool,
}

/// Depth-stencil state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilStateDesc {
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunc,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_test_enabled: false,
            depth_write_enabled: true,
            depth_compare: CompareFunc::Less,
        }
    }
}

/// Blend state for the bound render target.
///
/// Unlike the rasterizer, blend state is applied as a single aspect: the
/// native factor/equation calls take every field at once, so any field
/// change re-issues the whole description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendStateDesc {
    pub enabled: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

/// Viewport rectangle in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Scissor rectangle in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Element type of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexElemType {
    #[default]
    F32,
    U8,
    I16,
    /// Integer attributes take the non-normalizing pointer path on GL.
    I32,
    U32,
}

/// Layout of one vertex attribute slot: everything the pointer call takes
/// except the slot index and the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribLayout {
    /// Component count, 1..=4. Zero is not accepted by the native APIs.
    pub components: u8,
    pub elem_type: VertexElemType,
    pub normalized: bool,
    /// Vertex stride in bytes.
    pub stride: u32,
    /// Attribute offset inside the stride, in bytes.
    pub byte_offset: u32,
}

impl Default for VertexAttribLayout {
    fn default() -> Self {
        Self {
            components: 1,
            elem_type: VertexElemType::F32,
            normalized: false,
            stride: 0,
            byte_offset: 0,
        }
    }
}
