use std::fmt::Debug;

use ash::vk;
use fxhash::FxHashMap;

use crate::pass::{PassBody, RenderingDesc};
use crate::recorder::{ComputeCmds, GraphicsCmds, TransferCmds};
use crate::resource::{BufferBinding, BufferHandle, ImageBinding, ImageHandle, RenderTarget};
use crate::state::{BufferAccess, BufferScope, ImageAccess, ImageScope, PassKind};
use std::sync::Arc;

///Resolved image transition between two adjacent accesses. Always covers the full
/// subresource range of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub src: ImageScope,
    pub dst: ImageScope,
}

impl ImageBarrier {
    pub(crate) fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src.stage)
            .src_access_mask(self.src.access)
            .dst_stage_mask(self.dst.stage)
            .dst_access_mask(self.dst.access)
            .old_layout(self.src.layout)
            .new_layout(self.dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })
    }
}

///Resolved buffer transition between two adjacent accesses, covering the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src: BufferScope,
    pub dst: BufferScope,
}

impl BufferBarrier {
    pub(crate) fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(self.src.stage)
            .src_access_mask(self.src.access)
            .dst_stage_mask(self.dst.stage)
            .dst_access_mask(self.dst.access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }
}

///All barriers inserted immediately before one pass, recorded as a single dependency.
#[derive(Debug, Clone, Default)]
pub struct SyncStep {
    pub image_barriers: Vec<ImageBarrier>,
    pub buffer_barriers: Vec<BufferBarrier>,
}

impl SyncStep {
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }
}

///One compiled pass: the user body plus, for rasterizer passes that declared render
/// targets, the begin/end-rendering scaffolding resolved at build time.
pub struct PassStep<'a> {
    pub(crate) name: String,
    pub(crate) body: PassBody<'a>,
    pub(crate) rendering: Option<RenderingDesc>,
}

impl PassStep<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PassKind {
        self.body.kind()
    }

    ///True if this pass owns begin/end-rendering scaffolding.
    pub fn has_render_targets(&self) -> bool {
        self.rendering.is_some()
    }
}

///One executable step of a compiled graph.
pub enum Step<'a> {
    Sync(SyncStep),
    Pass(PassStep<'a>),
}

///First and last access of one resource within a graph, used to chain graphs or to return
/// an imported resource to a caller-owned state after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryAccess<A> {
    pub first: (PassKind, A),
    pub last: (PassKind, A),
}

///Compiled, immutable render graph. All barriers, layouts and attachments were fixed at
/// build time; [Graph::record] only replays them into a command buffer.
pub struct Graph<'a> {
    pub(crate) steps: Vec<Step<'a>>,
    pub(crate) render_area: vk::Extent2D,
    pub(crate) image_bindings: FxHashMap<ImageHandle, ImageBinding>,
    pub(crate) buffer_bindings: FxHashMap<BufferHandle, BufferBinding>,
    pub(crate) image_boundary: FxHashMap<ImageHandle, BoundaryAccess<ImageAccess>>,
    pub(crate) buffer_boundary: FxHashMap<BufferHandle, BoundaryAccess<BufferAccess>>,
    ///Transient render targets owned by this graph. Dropped (and thereby released) with it.
    pub(crate) transients: Vec<Arc<dyn RenderTarget>>,
}

impl<'a> Graph<'a> {
    ///Records all steps, in order, into `cmd`. The command buffer must be in the recording
    /// state and is left recording; submission and fencing stay with the caller.
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        for step in &self.steps {
            match step {
                Step::Sync(sync) => {
                    let image_barriers: Vec<_> =
                        sync.image_barriers.iter().map(|b| b.to_vk()).collect();
                    let buffer_barriers: Vec<_> =
                        sync.buffer_barriers.iter().map(|b| b.to_vk()).collect();
                    let dependency = vk::DependencyInfo::default()
                        .image_memory_barriers(&image_barriers)
                        .buffer_memory_barriers(&buffer_barriers);
                    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
                }
                Step::Pass(pass) => {
                    if let Some(rendering) = &pass.rendering {
                        Self::begin_rendering(device, cmd, rendering);
                    }
                    match &pass.body {
                        PassBody::Graphics(body) => body(GraphicsCmds::new(device, cmd), self),
                        PassBody::Compute(body) => body(ComputeCmds::new(device, cmd), self),
                        PassBody::Transfer(body) => body(TransferCmds::new(device, cmd), self),
                    }
                    if pass.rendering.is_some() {
                        unsafe { device.cmd_end_rendering(cmd) };
                    }
                }
            }
        }
    }

    fn begin_rendering(device: &ash::Device, cmd: vk::CommandBuffer, rendering: &RenderingDesc) {
        let color_infos: Vec<vk::RenderingAttachmentInfo> = rendering
            .colors
            .iter()
            .map(|att| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(att.view)
                    .image_layout(att.layout)
                    .load_op(att.load)
                    .store_op(att.store)
                    .clear_value(att.clear)
            })
            .collect();

        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: rendering.area,
            })
            .layer_count(1)
            .color_attachments(&color_infos);

        let depth_info = rendering.depth.as_ref().map(|att| {
            vk::RenderingAttachmentInfo::default()
                .image_view(att.view)
                .image_layout(att.layout)
                .load_op(att.load)
                .store_op(att.store)
                .clear_value(att.clear)
        });
        if let Some(depth_info) = depth_info.as_ref() {
            info = info.depth_attachment(depth_info);
        }

        unsafe { device.cmd_begin_rendering(cmd, &info) };
    }

    ///The compiled step sequence, for inspection and debugging.
    pub fn steps(&self) -> &[Step<'a>] {
        &self.steps
    }

    pub fn render_area(&self) -> vk::Extent2D {
        self.render_area
    }

    ///Resolves an image handle to its raw resource, for use inside pass bodies.
    pub fn image_binding(&self, handle: ImageHandle) -> Option<&ImageBinding> {
        self.image_bindings.get(&handle)
    }

    ///Resolves a buffer handle to its raw resource, for use inside pass bodies.
    pub fn buffer_binding(&self, handle: BufferHandle) -> Option<&BufferBinding> {
        self.buffer_bindings.get(&handle)
    }

    ///The (pass kind, intent) of the very first entry in the image's access history. For
    /// imported resources this is the state the caller declared at import time.
    pub fn initial_image_access(&self, handle: ImageHandle) -> Option<(PassKind, ImageAccess)> {
        self.image_boundary.get(&handle).map(|b| b.first)
    }

    ///The (pass kind, intent) the image is left in after the last pass touching it.
    pub fn final_image_access(&self, handle: ImageHandle) -> Option<(PassKind, ImageAccess)> {
        self.image_boundary.get(&handle).map(|b| b.last)
    }

    pub fn initial_buffer_access(&self, handle: BufferHandle) -> Option<(PassKind, BufferAccess)> {
        self.buffer_boundary.get(&handle).map(|b| b.first)
    }

    pub fn final_buffer_access(&self, handle: BufferHandle) -> Option<(PassKind, BufferAccess)> {
        self.buffer_boundary.get(&handle).map(|b| b.last)
    }

    ///Number of transient resources this graph owns.
    pub fn transient_count(&self) -> usize {
        self.transients.len()
    }
}

impl Debug for Graph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Graph:\n")?;
        for step in &self.steps {
            match step {
                Step::Sync(sync) => write!(
                    f,
                    "    Sync[{} image, {} buffer]\n",
                    sync.image_barriers.len(),
                    sync.buffer_barriers.len()
                )?,
                Step::Pass(pass) => {
                    write!(f, "    Pass[{:?}] {}\n", pass.kind(), pass.name())?
                }
            }
        }
        Ok(())
    }
}
