//! Native context state caching.
//!
//! - [`api`]: the [`NativeContext`] seam to the real graphics API
//! - [`desc`]: value-comparable pipeline state descriptors
//! - [`cache`]: [`ContextStateCache`], the diff-and-issue wrapper

pub mod api;
pub mod cache;
pub mod desc;

pub use api::{
    BufferTarget, IndexFormat, MapAccess, NativeContext, PrimitiveTopology, RawId, TextureTarget,
};
pub use cache::{
    ContextStateCache, MAX_TEXTURE_UNITS, MAX_UNIFORM_BUFFER_SLOTS, MAX_VERTEX_ATTRIBS,
    VertexAttribBinding,
};
pub use desc::{
    BlendFactor, BlendOp, BlendStateDesc, ColorWriteMask, CompareFunc, CullMode,
    DepthStencilStateDesc, FillMode, RasterStateDesc, ScissorRect, VertexAttribLayout,
    VertexElemType, Viewport,
};
