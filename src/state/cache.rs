//! Context State Cache
//!
//! [`ContextStateCache`] is the wrapper around the native graphics context.
//! Make all native calls through it: it tracks the currently bound
//! resources and pipeline state so that re-applying state that is already
//! bound costs zero native calls, and it unbinds deleted resources from
//! every slot *before* the native delete, so a later resource that reuses
//! the same numeric id is never mistaken for "already bound".
//!
//! Every cached reference is a `SlotRef` carrying the id's generation;
//! deleting a resource retires its generation, so even a slot the scrub
//! pass somehow missed can never compare equal to a reincarnated id.
//!
//! Misuse (mapping an empty target, slot indices out of range) never
//! corrupts the bookkeeping and never panics in release builds: it is
//! asserted in debug builds and logged in all builds. A rendering frame
//! must not die because of a caching-layer mistake.
//!
//! Known problems:
//! - Deleting a framebuffer whose attachments die with it will NOT unbind
//!   those attachments from the texture units they are bound to.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::api::{
    BufferTarget, IndexFormat, MapAccess, NativeContext, PrimitiveTopology, RawId, TextureTarget,
};
use super::desc::{
    BlendStateDesc, DepthStencilStateDesc, RasterStateDesc, ScissorRect, VertexAttribLayout,
    Viewport,
};

/// Vertex attribute slots tracked per context.
pub const MAX_VERTEX_ATTRIBS: usize = 16;
/// Texture units tracked per context.
pub const MAX_TEXTURE_UNITS: usize = 32;
/// Uniform buffer binding points tracked per context.
pub const MAX_UNIFORM_BUFFER_SLOTS: usize = 16;

/// A cached reference to a native resource: the raw id plus the generation
/// it had when bound. Raw id 0 is the unbound state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct SlotRef {
    raw: RawId,
    generation: u32,
}

impl SlotRef {
    const UNBOUND: Self = Self {
        raw: 0,
        generation: 0,
    };

    #[inline]
    fn is_unbound(self) -> bool {
        self.raw == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    Program,
}

/// Generation counter per live-or-retired raw id, one namespace per
/// resource kind (native APIs allocate ids per kind).
#[derive(Debug, Default)]
struct GenerationTable {
    buffers: FxHashMap<RawId, u32>,
    textures: FxHashMap<RawId, u32>,
    framebuffers: FxHashMap<RawId, u32>,
    programs: FxHashMap<RawId, u32>,
}

impl GenerationTable {
    fn map(&self, kind: ResourceKind) -> &FxHashMap<RawId, u32> {
        match kind {
            ResourceKind::Buffer => &self.buffers,
            ResourceKind::Texture => &self.textures,
            ResourceKind::Framebuffer => &self.framebuffers,
            ResourceKind::Program => &self.programs,
        }
    }

    fn map_mut(&mut self, kind: ResourceKind) -> &mut FxHashMap<RawId, u32> {
        match kind {
            ResourceKind::Buffer => &mut self.buffers,
            ResourceKind::Texture => &mut self.textures,
            ResourceKind::Framebuffer => &mut self.framebuffers,
            ResourceKind::Program => &mut self.programs,
        }
    }

    /// The reference a bind of `raw` resolves to right now.
    fn current(&self, kind: ResourceKind, raw: RawId) -> SlotRef {
        if raw == 0 {
            return SlotRef::UNBOUND;
        }
        SlotRef {
            raw,
            generation: self.map(kind).get(&raw).copied().unwrap_or(0),
        }
    }

    /// Retires a deleted id: any future resource with the same raw id gets
    /// a new generation and can never compare equal to old slot refs.
    fn retire(&mut self, kind: ResourceKind, raw: RawId) {
        if raw != 0 {
            *self.map_mut(kind).entry(raw).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BoundBuffer {
    bound: SlotRef,
    mapped: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct VertexAttribSlot {
    enabled: bool,
    buffer: SlotRef,
    layout: VertexAttribLayout,
}

#[derive(Debug, Clone, Copy, Default)]
struct BoundTexture {
    target: TextureTarget,
    bound: SlotRef,
}

/// Requested state for one vertex attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribBinding {
    /// Source vertex buffer.
    pub buffer: RawId,
    pub layout: VertexAttribLayout,
}

/// State cache over one native graphics context.
///
/// Single-threaded by design: drive it only from the thread that owns the
/// context. There is no interior locking.
pub struct ContextStateCache<A: NativeContext> {
    api: A,
    generations: GenerationTable,

    buffers: [BoundBuffer; BufferTarget::COUNT],
    attribs: [VertexAttribSlot; MAX_VERTEX_ATTRIBS],
    textures: [BoundTexture; MAX_TEXTURE_UNITS],
    active_texture: u32,
    uniform_buffers: [SlotRef; MAX_UNIFORM_BUFFER_SLOTS],
    program: SlotRef,
    /// `None` means the bound framebuffer is unknown (the previously bound
    /// one was deleted), so the next bind always issues.
    framebuffer: Option<SlotRef>,

    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    raster: RasterStateDesc,
    depth_stencil: DepthStencilStateDesc,
    blend: BlendStateDesc,
}

impl<A: NativeContext> ContextStateCache<A> {
    /// Wraps a freshly created native context. The initial cached values
    /// mirror the default state of a new context.
    pub fn new(api: A) -> Self {
        Self {
            api,
            generations: GenerationTable::default(),
            buffers: [BoundBuffer::default(); BufferTarget::COUNT],
            attribs: [VertexAttribSlot::default(); MAX_VERTEX_ATTRIBS],
            textures: [BoundTexture::default(); MAX_TEXTURE_UNITS],
            active_texture: 0,
            uniform_buffers: [SlotRef::UNBOUND; MAX_UNIFORM_BUFFER_SLOTS],
            program: SlotRef::UNBOUND,
            framebuffer: Some(SlotRef::UNBOUND),
            viewport: None,
            scissor: None,
            raster: RasterStateDesc::default(),
            depth_stencil: DepthStencilStateDesc::default(),
            blend: BlendStateDesc::default(),
        }
    }

    /// Read access to the wrapped context.
    #[inline]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Consumes the cache, returning the wrapped context.
    pub fn into_inner(self) -> A {
        self.api
    }

    // ── Resource lifetime ────────────────────────────────────────────────

    pub fn gen_buffers(&mut self, count: usize) -> Vec<RawId> {
        self.api.gen_buffers(count)
    }

    pub fn gen_textures(&mut self, count: usize) -> Vec<RawId> {
        self.api.gen_textures(count)
    }

    pub fn gen_framebuffers(&mut self, count: usize) -> Vec<RawId> {
        self.api.gen_framebuffers(count)
    }

    pub fn create_program(&mut self) -> RawId {
        self.api.create_program()
    }

    /// Unbinds every cached reference to the given buffers, then deletes
    /// them. Attribute slots release their buffer through the normal
    /// disable path so the native attribute state stays consistent.
    pub fn delete_buffers(&mut self, ids: &[RawId]) {
        for &id in ids {
            if id == 0 {
                continue;
            }
            for slot in &mut self.buffers {
                if slot.bound.raw == id {
                    if slot.mapped {
                        debug_assert!(false, "deleting buffer {id} while it is mapped");
                        log::error!("deleting buffer {id} while it is mapped");
                        slot.mapped = false;
                    }
                    slot.bound = SlotRef::UNBOUND;
                }
            }
            let stale: SmallVec<[usize; MAX_VERTEX_ATTRIBS]> = self
                .attribs
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.buffer.raw == id)
                .map(|(index, _)| index)
                .collect();
            for index in stale {
                self.set_vertex_attrib(index, None);
            }
            for slot in &mut self.uniform_buffers {
                if slot.raw == id {
                    *slot = SlotRef::UNBOUND;
                }
            }
            self.generations.retire(ResourceKind::Buffer, id);
        }
        self.api.delete_buffers(ids);
    }

    /// Unbinds the given textures from every unit they are bound to, then
    /// deletes them.
    pub fn delete_textures(&mut self, ids: &[RawId]) {
        for &id in ids {
            if id == 0 {
                continue;
            }
            let stale: SmallVec<[(u32, TextureTarget); 4]> = self
                .textures
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.bound.raw == id)
                .map(|(unit, slot)| (unit as u32, slot.target))
                .collect();
            for (unit, target) in stale {
                self.bind_texture_at(target, unit, 0);
            }
            self.generations.retire(ResourceKind::Texture, id);
        }
        self.api.delete_textures(ids);
    }

    /// Deletes framebuffers. If the bound framebuffer is among them the
    /// cached binding becomes unknown and the next bind always issues.
    pub fn delete_framebuffers(&mut self, ids: &[RawId]) {
        for &id in ids {
            if id == 0 {
                continue;
            }
            if self.framebuffer.is_some_and(|slot| slot.raw == id) {
                self.framebuffer = None;
            }
            self.generations.retire(ResourceKind::Framebuffer, id);
        }
        self.api.delete_framebuffers(ids);
    }

    /// Deletes a program, forgetting it if it is the cached bound program.
    /// The native context keeps a deleted program alive until it stops
    /// being current, so no unbind call is issued.
    pub fn delete_program(&mut self, id: RawId) {
        if id == 0 {
            return;
        }
        if self.program.raw == id {
            self.program = SlotRef::UNBOUND;
        }
        self.generations.retire(ResourceKind::Program, id);
        self.api.delete_program(id);
    }

    // ── Buffers ──────────────────────────────────────────────────────────

    /// Binds `buffer` to `target`, skipping the native call when it is
    /// already bound.
    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: RawId) {
        let incoming = self.generations.current(ResourceKind::Buffer, buffer);
        let slot = &mut self.buffers[target.index()];
        if slot.bound == incoming {
            return;
        }
        if slot.mapped {
            // The native API leaves rebinding over a mapped buffer
            // undefined; pass the bind through rather than hide it.
            log::error!("binding buffer {buffer} to {target:?} while the bound buffer is mapped");
        }
        slot.bound = incoming;
        self.api.bind_buffer(target, buffer);
    }

    /// Maps the buffer currently bound to `target`.
    pub fn map_buffer(&mut self, target: BufferTarget, access: MapAccess) {
        let slot = &mut self.buffers[target.index()];
        if slot.bound.is_unbound() {
            debug_assert!(false, "map_buffer with no buffer bound to {target:?}");
            log::error!("map_buffer with no buffer bound to {target:?}");
            return;
        }
        slot.mapped = true;
        self.api.map_buffer(target, access);
    }

    /// Unmaps the buffer currently bound to `target`.
    pub fn unmap_buffer(&mut self, target: BufferTarget) {
        let slot = &mut self.buffers[target.index()];
        if slot.bound.is_unbound() || !slot.mapped {
            debug_assert!(false, "unmap_buffer on {target:?} without a mapped buffer");
            log::error!("unmap_buffer on {target:?} without a mapped buffer");
            slot.mapped = false;
            return;
        }
        slot.mapped = false;
        self.api.unmap_buffer(target);
    }

    // ── Vertex attributes ────────────────────────────────────────────────

    /// Sets one attribute slot: `Some` enables it and points it at the
    /// given buffer/layout, `None` disables it. Enable/disable and the
    /// pointer call are each issued only on an actual change; disabling a
    /// slot invalidates its pointer state, so re-enabling always re-issues
    /// the pointer call.
    pub fn set_vertex_attrib(&mut self, index: usize, binding: Option<VertexAttribBinding>) {
        if index >= MAX_VERTEX_ATTRIBS {
            debug_assert!(false, "vertex attribute index {index} out of range");
            log::error!("vertex attribute index {index} out of range");
            return;
        }

        let enabled = binding.is_some();
        let mut just_enabled = false;
        if self.attribs[index].enabled != enabled {
            self.attribs[index].enabled = enabled;
            if enabled {
                just_enabled = true;
                self.api.enable_vertex_attrib(index as u32);
            } else {
                self.api.disable_vertex_attrib(index as u32);
            }
        }

        let Some(binding) = binding else {
            // Disabled slots hold no resource reference.
            self.attribs[index].buffer = SlotRef::UNBOUND;
            self.attribs[index].layout = VertexAttribLayout::default();
            return;
        };

        let incoming = self.generations.current(ResourceKind::Buffer, binding.buffer);
        let diff = self.attribs[index].buffer != incoming
            || self.attribs[index].layout != binding.layout;

        // The pointer call captures whatever is bound to the array target.
        self.bind_buffer(BufferTarget::Array, binding.buffer);

        if diff || just_enabled {
            let slot = &mut self.attribs[index];
            slot.buffer = incoming;
            slot.layout = binding.layout;
            self.api.vertex_attrib_pointer(index as u32, &binding.layout);
        }
    }

    // ── Programs & uniform buffers ───────────────────────────────────────

    /// Makes `program` current, skipping the native call when it already is.
    pub fn use_program(&mut self, program: RawId) {
        let incoming = self.generations.current(ResourceKind::Program, program);
        if self.program != incoming {
            self.program = incoming;
            self.api.use_program(program);
        }
    }

    /// Binds `buffer` to the indexed uniform-buffer binding point.
    pub fn bind_uniform_buffer(&mut self, index: usize, buffer: RawId) {
        if index >= MAX_UNIFORM_BUFFER_SLOTS {
            debug_assert!(false, "uniform buffer binding index {index} out of range");
            log::error!("uniform buffer binding index {index} out of range");
            return;
        }
        let incoming = self.generations.current(ResourceKind::Buffer, buffer);
        if self.uniform_buffers[index] != incoming {
            self.uniform_buffers[index] = incoming;
            self.api.bind_uniform_buffer(index as u32, buffer);
        }
    }

    // ── Textures ─────────────────────────────────────────────────────────

    /// Selects the active texture unit. Prefer [`Self::bind_texture_at`].
    pub fn set_active_texture(&mut self, unit: u32) {
        if unit as usize >= MAX_TEXTURE_UNITS {
            debug_assert!(false, "texture unit {unit} out of range");
            log::error!("texture unit {unit} out of range");
            return;
        }
        if self.active_texture != unit {
            self.active_texture = unit;
            self.api.set_active_texture(unit);
        }
    }

    /// Binds `texture` on the active unit. Prefer [`Self::bind_texture_at`].
    pub fn bind_texture(&mut self, target: TextureTarget, texture: RawId) {
        let incoming = self.generations.current(ResourceKind::Texture, texture);
        let slot = &mut self.textures[self.active_texture as usize];
        if slot.bound == incoming && slot.target == target {
            return;
        }
        slot.bound = incoming;
        slot.target = target;
        self.api.bind_texture(target, texture);
    }

    /// Shortcut for selecting `unit` and binding `texture` on it.
    pub fn bind_texture_at(&mut self, target: TextureTarget, unit: u32, texture: RawId) {
        self.set_active_texture(unit);
        self.bind_texture(target, texture);
    }

    // ── Framebuffer, viewport, scissor ───────────────────────────────────

    /// Binds a framebuffer (0 is the default framebuffer).
    pub fn bind_framebuffer(&mut self, fbo: RawId) {
        let incoming = self.generations.current(ResourceKind::Framebuffer, fbo);
        if self.framebuffer == Some(incoming) {
            return;
        }
        self.framebuffer = Some(incoming);
        self.api.bind_framebuffer(fbo);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport != Some(viewport) {
            self.viewport = Some(viewport);
            self.api.set_viewport(viewport);
        }
    }

    pub fn apply_scissor_rect(&mut self, rect: ScissorRect) {
        if self.scissor != Some(rect) {
            self.scissor = Some(rect);
            self.api.set_scissor_rect(rect);
        }
    }

    // ── Pipeline state ───────────────────────────────────────────────────

    /// Applies rasterizer state aspect by aspect; unchanged aspects issue
    /// no native calls.
    pub fn apply_raster_state(&mut self, desc: &RasterStateDesc) {
        if self.raster.cull_mode != desc.cull_mode {
            self.raster.cull_mode = desc.cull_mode;
            self.api.set_cull_mode(desc.cull_mode);
        }
        if self.raster.front_ccw != desc.front_ccw {
            self.raster.front_ccw = desc.front_ccw;
            self.api.set_front_face_ccw(desc.front_ccw);
        }
        if self.raster.fill_mode != desc.fill_mode {
            self.raster.fill_mode = desc.fill_mode;
            self.api.set_fill_mode(desc.fill_mode);
        }
        if self.raster.depth_bias != desc.depth_bias
            || self.raster.depth_bias_slope != desc.depth_bias_slope
        {
            self.raster.depth_bias = desc.depth_bias;
            self.raster.depth_bias_slope = desc.depth_bias_slope;
            self.api.set_depth_bias(desc.depth_bias, desc.depth_bias_slope);
        }
        if self.raster.scissor_enabled != desc.scissor_enabled {
            self.raster.scissor_enabled = desc.scissor_enabled;
            self.api.set_scissor_enabled(desc.scissor_enabled);
        }
    }

    /// Toggles depth writes without touching the rest of the depth state.
    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        if self.depth_stencil.depth_write_enabled != enabled {
            self.depth_stencil.depth_write_enabled = enabled;
            self.api.set_depth_write_enabled(enabled);
        }
    }

    /// Applies depth-stencil state aspect by aspect.
    pub fn apply_depth_stencil_state(&mut self, desc: &DepthStencilStateDesc) {
        if self.depth_stencil.depth_test_enabled != desc.depth_test_enabled {
            self.depth_stencil.depth_test_enabled = desc.depth_test_enabled;
            self.api.set_depth_test_enabled(desc.depth_test_enabled);
        }
        self.set_depth_write_enabled(desc.depth_write_enabled);
        if self.depth_stencil.depth_compare != desc.depth_compare {
            self.depth_stencil.depth_compare = desc.depth_compare;
            self.api.set_depth_compare(desc.depth_compare);
        }
    }

    /// Applies blend state. The native factor/equation calls take the whole
    /// description at once, so any field change re-issues all of it.
    pub fn apply_blend_state(&mut self, desc: &BlendStateDesc) {
        if self.blend != *desc {
            self.blend = *desc;
            self.api.set_blend_state(desc);
        }
    }

    // ── Draws ────────────────────────────────────────────────────────────

    pub fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first_vertex: u32,
        vertex_count: u32,
        instance_count: u32,
    ) {
        self.api
            .draw_arrays(topology, first_vertex, vertex_count, instance_count);
    }

    pub fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        index_count: u32,
        format: IndexFormat,
        byte_offset: usize,
        instance_count: u32,
    ) {
        self.api
            .draw_elements(topology, index_count, format, byte_offset, instance_count);
    }
}
