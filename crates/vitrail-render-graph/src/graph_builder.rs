use std::sync::Arc;

use ash::vk;
use fxhash::FxHashMap;
use thiserror::Error;

use crate::graph::{BoundaryAccess, BufferBarrier, Graph, ImageBarrier, PassStep, Step, SyncStep};
use crate::memo::{AccessMemo, AccessRecord, EXTERNAL_PASS};
use crate::pass::{Attachment, PassBody, PassDecl, RenderingDesc, ResolvedAttachment};
use crate::recorder::{ComputeCmds, GraphicsCmds, TransferCmds};
use crate::resource::{
    aspect_for_format, BufferBinding, BufferHandle, ImageBinding, ImageHandle, ImportedBuffer,
    ImportedImage, RenderTarget, RenderTargetDesc, ResourceOrigin, ResourceProvider, SamplerDesc,
};
use crate::state::{
    buffer_transition_needed, image_transition_needed, BufferAccess, ImageAccess, PassKind,
};

#[derive(Debug, Error)]
pub enum BuildError {
    ///The resource provider failed to allocate a requested transient render target. Not
    /// retried, the graph build is abandoned.
    #[error("transient render target allocation failed")]
    Allocation(#[from] anyhow::Error),
}

///Builder for a [Graph]. Resources are declared first (imported or requested), then for each
/// pass its accesses are declared via [GraphBuilder::use_image]/[GraphBuilder::use_buffer]
/// followed by one `record_*` call. [GraphBuilder::build] consumes the builder, resolves the
/// full barrier schedule and allocates all transients.
///
/// Pass order in the compiled graph is exactly declaration order, barriers are inserted
/// between every pair of consecutive accesses to the same resource. No reordering across a
/// single queue is attempted.
pub struct GraphBuilder<'a> {
    provider: &'a dyn ResourceProvider,
    render_area: vk::Extent2D,

    external_images: Vec<ImportedImage>,
    external_buffers: Vec<ImportedBuffer>,
    transient_requests: Vec<(RenderTargetDesc, SamplerDesc, String)>,

    image_memo: AccessMemo<ImageHandle, ImageAccess>,
    buffer_memo: AccessMemo<BufferHandle, BufferAccess>,

    passes: Vec<PassDecl<'a>>,

    //declarations for the pass about to be recorded, drained by each record_* call. Kept for
    // attachment validation.
    pending_images: Vec<(ImageHandle, ImageAccess)>,
    pending_buffers: Vec<(BufferHandle, BufferAccess)>,
}

impl<'a> GraphBuilder<'a> {
    ///Creates a builder. `provider` is the allocation boundary for transient render targets,
    /// `render_area` the extent rasterizer passes with attachments render into (usually the
    /// swapchain extent).
    pub fn new(provider: &'a dyn ResourceProvider, render_area: vk::Extent2D) -> Self {
        GraphBuilder {
            provider,
            render_area,
            external_images: Vec::new(),
            external_buffers: Vec::new(),
            transient_requests: Vec::new(),
            image_memo: AccessMemo::default(),
            buffer_memo: AccessMemo::default(),
            passes: Vec::new(),
            pending_images: Vec::new(),
            pending_buffers: Vec::new(),
        }
    }

    ///Imports a caller-owned image. `prev_access` must accurately describe the access state
    /// the image is in when this graph starts executing; an understated value produces too
    /// few barriers, which fails silently on the GPU side.
    pub fn import_image(&mut self, image: ImportedImage, prev_access: ImageAccess) -> ImageHandle {
        let handle = ImageHandle(ResourceOrigin::External(self.external_images.len() as u32));
        self.external_images.push(image);
        self.image_memo.register_initial(handle, prev_access);
        handle
    }

    ///Imports a caller-owned buffer, see [GraphBuilder::import_image].
    pub fn import_buffer(
        &mut self,
        buffer: ImportedBuffer,
        prev_access: BufferAccess,
    ) -> BufferHandle {
        let handle = BufferHandle(ResourceOrigin::External(self.external_buffers.len() as u32));
        self.external_buffers.push(buffer);
        self.buffer_memo.register_initial(handle, prev_access);
        handle
    }

    ///Requests a transient render target to be allocated at build time and owned by the
    /// compiled graph. The resource does not exist yet, so its initial access is empty.
    pub fn request_render_target(
        &mut self,
        desc: RenderTargetDesc,
        sampler: SamplerDesc,
        name: &str,
    ) -> ImageHandle {
        let handle = ImageHandle(ResourceOrigin::Transient(self.transient_requests.len() as u32));
        self.transient_requests.push((desc, sampler, name.to_string()));
        self.image_memo.register_initial(handle, ImageAccess::empty());
        handle
    }

    ///Declares that the *next* recorded pass accesses `handle` with `access`. Must precede
    /// the matching `record_*` call.
    pub fn use_image(&mut self, handle: ImageHandle, access: ImageAccess) {
        if !self.image_memo.contains(handle) {
            #[cfg(feature = "logging")]
            log::warn!(
                "Access declared for unregistered image handle {:?}, assuming no prior access.",
                handle
            );
            self.image_memo.register_initial(handle, ImageAccess::empty());
        }
        self.image_memo
            .update_last_access(handle, self.passes.len() as i32, access);
        self.pending_images.push((handle, access));
    }

    ///Declares that the *next* recorded pass accesses `handle` with `access`.
    pub fn use_buffer(&mut self, handle: BufferHandle, access: BufferAccess) {
        if !self.buffer_memo.contains(handle) {
            #[cfg(feature = "logging")]
            log::warn!(
                "Access declared for unregistered buffer handle {:?}, assuming no prior access.",
                handle
            );
            self.buffer_memo.register_initial(handle, BufferAccess::empty());
        }
        self.buffer_memo
            .update_last_access(handle, self.passes.len() as i32, access);
        self.pending_buffers.push((handle, access));
    }

    ///Records a rasterizer pass rendering into the given attachments. Begin/end-rendering is
    /// emitted by the graph around the body, with the render area set to the builder's
    /// extent. Every attachment handle must have been declared through
    /// [GraphBuilder::use_image] with the matching attachment-write intent for this pass.
    pub fn record_raster_pass(
        &mut self,
        colors: Vec<Attachment>,
        depth: Option<Attachment>,
        body: impl Fn(GraphicsCmds<'_>, &Graph<'a>) + 'a,
        name: &str,
    ) {
        for color in &colors {
            self.validate_attachment(color, ImageAccess::COLOR_ATTACHMENT_WRITE);
        }
        if let Some(depth) = &depth {
            self.validate_attachment(depth, ImageAccess::DEPTH_ATTACHMENT_WRITE);
        }
        self.push_pass(PassDecl {
            name: name.to_string(),
            body: PassBody::Graphics(Box::new(body)),
            colors,
            depth,
        });
    }

    ///Records a rasterizer pass without render targets, for bodies that only need the
    /// command stream (eg. an overlay compositing onto an already-bound target). No
    /// begin/end-rendering is emitted.
    pub fn record_raster_pass_inline(
        &mut self,
        body: impl Fn(GraphicsCmds<'_>, &Graph<'a>) + 'a,
        name: &str,
    ) {
        self.push_pass(PassDecl {
            name: name.to_string(),
            body: PassBody::Graphics(Box::new(body)),
            colors: Vec::new(),
            depth: None,
        });
    }

    ///Records a pass with compute dispatches.
    pub fn record_compute_pass(
        &mut self,
        body: impl Fn(ComputeCmds<'_>, &Graph<'a>) + 'a,
        name: &str,
    ) {
        self.push_pass(PassDecl {
            name: name.to_string(),
            body: PassBody::Compute(Box::new(body)),
            colors: Vec::new(),
            depth: None,
        });
    }

    ///Records a pass with transfer commands.
    pub fn record_transfer_pass(
        &mut self,
        body: impl Fn(TransferCmds<'_>, &Graph<'a>) + 'a,
        name: &str,
    ) {
        self.push_pass(PassDecl {
            name: name.to_string(),
            body: PassBody::Transfer(Box::new(body)),
            colors: Vec::new(),
            depth: None,
        });
    }

    fn push_pass(&mut self, decl: PassDecl<'a>) {
        self.passes.push(decl);
        self.pending_images.clear();
        self.pending_buffers.clear();
    }

    ///An attachment that was never declared through [GraphBuilder::use_image] for this pass
    /// would render without synchronization, which is undefined behavior on the GPU, not a
    /// recoverable error. Checked in debug builds only.
    fn validate_attachment(&self, attachment: &Attachment, required: ImageAccess) {
        debug_assert!(
            self.pending_images
                .iter()
                .any(|(h, a)| *h == attachment.handle && a.contains(required)),
            "attachment {:?} was not declared via use_image with {:?} for this pass",
            attachment.handle,
            required
        );
        if let Some(format) = self.image_format(attachment.handle) {
            let aspect = aspect_for_format(format);
            if required.contains(ImageAccess::COLOR_ATTACHMENT_WRITE) {
                debug_assert!(
                    aspect.contains(vk::ImageAspectFlags::COLOR),
                    "color attachment {:?} has non-color format {:?}",
                    attachment.handle,
                    format
                );
            } else {
                debug_assert!(
                    aspect.contains(vk::ImageAspectFlags::DEPTH),
                    "depth attachment {:?} has non-depth format {:?}",
                    attachment.handle,
                    format
                );
            }
        }
    }

    fn image_format(&self, handle: ImageHandle) -> Option<vk::Format> {
        match handle.0 {
            ResourceOrigin::External(id) => {
                self.external_images.get(id as usize).map(|img| img.format)
            }
            ResourceOrigin::Transient(id) => {
                self.transient_requests.get(id as usize).map(|(desc, ..)| desc.format)
            }
        }
    }

    ///Pass kind a memoized record belongs to. [EXTERNAL_PASS] maps to the pseudo-kind
    /// [PassKind::None].
    fn pass_kind(&self, pass: i32) -> PassKind {
        if pass == EXTERNAL_PASS {
            PassKind::None
        } else {
            self.passes[pass as usize].body.kind()
        }
    }

    ///Consumes the builder: allocates all requested transients, computes the barrier
    /// schedule from the access histories and wraps attachment passes in their rendering
    /// scaffolding. The builder cannot be reused afterwards.
    pub fn build(mut self) -> Result<Graph<'a>, BuildError> {
        if !self.pending_images.is_empty() || !self.pending_buffers.is_empty() {
            #[cfg(feature = "logging")]
            log::warn!("Leftover resource-use declarations without a recorded pass, dropping them.");
            self.pending_images.clear();
            self.pending_buffers.clear();
            //their memo records point past the last pass and must go with them
            let first_invalid = self.passes.len() as i32;
            self.image_memo.drop_accesses_from(first_invalid);
            self.buffer_memo.drop_accesses_from(first_invalid);
        }

        //allocate transients and resolve every handle to its raw resource
        let mut transients: Vec<Arc<dyn RenderTarget>> =
            Vec::with_capacity(self.transient_requests.len());
        for (desc, sampler, name) in &self.transient_requests {
            let target = self.provider.create_render_target(desc, sampler, name)?;
            transients.push(target);
        }

        let mut image_bindings = FxHashMap::default();
        for (id, image) in self.external_images.iter().enumerate() {
            image_bindings.insert(
                ImageHandle(ResourceOrigin::External(id as u32)),
                ImageBinding {
                    image: image.image,
                    view: image.view,
                    format: image.format,
                    extent: image.extent,
                },
            );
        }
        for (id, target) in transients.iter().enumerate() {
            image_bindings.insert(
                ImageHandle(ResourceOrigin::Transient(id as u32)),
                ImageBinding {
                    image: target.image(),
                    view: target.view(),
                    format: target.format(),
                    extent: target.extent(),
                },
            );
        }

        let mut buffer_bindings = FxHashMap::default();
        for (id, buffer) in self.external_buffers.iter().enumerate() {
            buffer_bindings.insert(
                BufferHandle(ResourceOrigin::External(id as u32)),
                BufferBinding {
                    buffer: buffer.buffer,
                    size: buffer.size,
                },
            );
        }

        //one sync step slot per pass, filled from each resource's adjacent record pairs
        let mut sync_before: Vec<SyncStep> = (0..self.passes.len()).map(|_| SyncStep::default()).collect();
        let mut image_boundary = FxHashMap::default();
        let mut buffer_boundary = FxHashMap::default();

        for (handle, history) in self.image_memo.iter() {
            image_boundary.insert(handle, self.boundary_of(history));
            if history.len() < 2 {
                //only the initial state: untouched by any pass, nothing to synchronize
                continue;
            }
            let Some(binding) = image_bindings.get(&handle) else {
                #[cfg(feature = "logging")]
                log::warn!("No resource bound for image handle {:?}, skipping its barriers.", handle);
                continue;
            };
            let mut aspect = aspect_for_format(binding.format);
            if aspect.is_empty() {
                #[cfg(feature = "logging")]
                log::error!(
                    "Failed to infer the aspect of image handle {:?} (format {:?}), falling back to all aspects.",
                    handle,
                    binding.format
                );
                aspect = vk::ImageAspectFlags::COLOR
                    | vk::ImageAspectFlags::DEPTH
                    | vk::ImageAspectFlags::STENCIL;
            }
            for pair in history.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                if !image_transition_needed(prev.intent, next.intent) {
                    #[cfg(feature = "log_reasoning")]
                    log::trace!(
                        "Skipping barrier for image {:?} before pass {}: identical read-only access {:?}.",
                        handle,
                        next.pass,
                        next.intent
                    );
                    continue;
                }
                #[cfg(feature = "log_reasoning")]
                log::trace!(
                    "Image {:?} before pass {}: {:?} -> {:?}.",
                    handle,
                    next.pass,
                    prev.intent,
                    next.intent
                );
                sync_before[next.pass as usize].image_barriers.push(ImageBarrier {
                    image: binding.image,
                    aspect,
                    src: prev.intent.scope(self.pass_kind(prev.pass)),
                    dst: next.intent.scope(self.pass_kind(next.pass)),
                });
            }
        }

        for (handle, history) in self.buffer_memo.iter() {
            buffer_boundary.insert(handle, self.boundary_of(history));
            if history.len() < 2 {
                continue;
            }
            let Some(binding) = buffer_bindings.get(&handle) else {
                #[cfg(feature = "logging")]
                log::warn!("No resource bound for buffer handle {:?}, skipping its barriers.", handle);
                continue;
            };
            for pair in history.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                if !buffer_transition_needed(prev.intent, next.intent) {
                    #[cfg(feature = "log_reasoning")]
                    log::trace!(
                        "Skipping barrier for buffer {:?} before pass {}: identical read-only access {:?}.",
                        handle,
                        next.pass,
                        next.intent
                    );
                    continue;
                }
                sync_before[next.pass as usize].buffer_barriers.push(BufferBarrier {
                    buffer: binding.buffer,
                    src: prev.intent.scope(self.pass_kind(prev.pass)),
                    dst: next.intent.scope(self.pass_kind(next.pass)),
                });
            }
        }

        //assemble the linear step list: a sync step before each pass that needs one
        let passes = std::mem::take(&mut self.passes);
        let mut steps = Vec::with_capacity(passes.len() * 2);
        for (index, decl) in passes.into_iter().enumerate() {
            let sync = std::mem::take(&mut sync_before[index]);
            if !sync.is_empty() {
                steps.push(Step::Sync(sync));
            }
            let rendering = if decl.colors.is_empty() && decl.depth.is_none() {
                None
            } else {
                Some(RenderingDesc {
                    area: self.render_area,
                    colors: decl
                        .colors
                        .iter()
                        .map(|att| Self::resolve_attachment(att, &image_bindings, ImageAccess::COLOR_ATTACHMENT_WRITE))
                        .collect(),
                    depth: decl
                        .depth
                        .as_ref()
                        .map(|att| Self::resolve_attachment(att, &image_bindings, ImageAccess::DEPTH_ATTACHMENT_WRITE)),
                })
            };
            steps.push(Step::Pass(PassStep {
                name: decl.name,
                body: decl.body,
                rendering,
            }));
        }

        Ok(Graph {
            steps,
            render_area: self.render_area,
            image_bindings,
            buffer_bindings,
            image_boundary,
            buffer_boundary,
            transients,
        })
    }

    ///First and last record of a history together with their pass kinds. Histories always
    /// hold at least the initial record.
    fn boundary_of<A: Copy>(&self, history: &[AccessRecord<A>]) -> BoundaryAccess<A> {
        let first = &history[0];
        let last = &history[history.len() - 1];
        BoundaryAccess {
            first: (self.pass_kind(first.pass), first.intent),
            last: (self.pass_kind(last.pass), last.intent),
        }
    }

    fn resolve_attachment(
        attachment: &Attachment,
        bindings: &FxHashMap<ImageHandle, ImageBinding>,
        intent: ImageAccess,
    ) -> ResolvedAttachment {
        let view = match bindings.get(&attachment.handle) {
            Some(binding) => binding.view,
            None => {
                #[cfg(feature = "logging")]
                log::warn!(
                    "No resource bound for attachment handle {:?}, using a null view.",
                    attachment.handle
                );
                vk::ImageView::null()
            }
        };
        ResolvedAttachment {
            view,
            layout: intent.layout(),
            load: attachment.load.into(),
            store: attachment.store.into(),
            clear: attachment
                .clear
                .map(vk::ClearValue::from)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{LoadOp, StoreOp};

    struct NullTarget {
        format: vk::Format,
        extent: vk::Extent2D,
    }

    impl RenderTarget for NullTarget {
        fn image(&self) -> vk::Image {
            vk::Image::null()
        }
        fn view(&self) -> vk::ImageView {
            vk::ImageView::null()
        }
        fn format(&self) -> vk::Format {
            self.format
        }
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }
    }

    ///Provider that hands out null-handle targets, enough to compile graphs without a
    /// device.
    struct NullProvider;

    impl ResourceProvider for NullProvider {
        fn create_render_target(
            &self,
            desc: &RenderTargetDesc,
            _sampler: &SamplerDesc,
            _name: &str,
        ) -> Result<Arc<dyn RenderTarget>, anyhow::Error> {
            Ok(Arc::new(NullTarget {
                format: desc.format,
                extent: vk::Extent2D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                },
            }))
        }
    }

    struct FailingProvider;

    impl ResourceProvider for FailingProvider {
        fn create_render_target(
            &self,
            _desc: &RenderTargetDesc,
            _sampler: &SamplerDesc,
            _name: &str,
        ) -> Result<Arc<dyn RenderTarget>, anyhow::Error> {
            Err(anyhow::anyhow!("device memory exhausted"))
        }
    }

    fn area() -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }

    fn imported_color_image() -> ImportedImage {
        ImportedImage {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: area(),
        }
    }

    fn imported_buffer() -> ImportedBuffer {
        ImportedBuffer {
            buffer: vk::Buffer::null(),
            size: 1024,
        }
    }

    fn sync_steps<'g>(graph: &'g Graph<'_>) -> Vec<&'g SyncStep> {
        graph
            .steps()
            .iter()
            .filter_map(|step| match step {
                Step::Sync(sync) => Some(sync),
                Step::Pass(_) => None,
            })
            .collect()
    }

    fn pass_names<'g>(graph: &'g Graph<'_>) -> Vec<&'g str> {
        graph
            .steps()
            .iter()
            .filter_map(|step| match step {
                Step::Pass(pass) => Some(pass.name()),
                Step::Sync(_) => None,
            })
            .collect()
    }

    #[test]
    fn passes_execute_in_declaration_order() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        builder.record_transfer_pass(|_, _| {}, "upload");
        builder.record_compute_pass(|_, _| {}, "cull");
        builder.record_raster_pass_inline(|_, _| {}, "forward");
        builder.record_compute_pass(|_, _| {}, "post");
        let graph = builder.build().unwrap();

        assert_eq!(pass_names(&graph), vec!["upload", "cull", "forward", "post"]);
        let kinds: Vec<_> = graph
            .steps()
            .iter()
            .filter_map(|step| match step {
                Step::Pass(pass) => Some(pass.kind()),
                Step::Sync(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![PassKind::Transfer, PassKind::Compute, PassKind::Graphics, PassKind::Compute]
        );
    }

    #[test]
    fn import_roundtrip_read_needs_no_barrier() {
        //an image imported in sampled state and only sampled again stays put
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let image = builder.import_image(imported_color_image(), ImageAccess::SAMPLED_READ);
        builder.use_image(image, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "probe");
        let graph = builder.build().unwrap();

        assert!(sync_steps(&graph).is_empty());
        assert_eq!(
            graph.final_image_access(image),
            Some((PassKind::Compute, ImageAccess::SAMPLED_READ))
        );
    }

    #[test]
    fn untouched_resources_produce_no_barriers() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let _idle = builder.import_image(imported_color_image(), ImageAccess::TRANSFER_WRITE);
        builder.record_compute_pass(|_, _| {}, "unrelated");
        let graph = builder.build().unwrap();
        assert!(sync_steps(&graph).is_empty());
    }

    #[test]
    fn one_barrier_per_changing_access_pair() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let target = builder.request_render_target(
            RenderTargetDesc::new_2d(800, 600, vk::Format::R16G16B16A16_SFLOAT),
            SamplerDesc::default(),
            "hdr",
        );

        builder.use_image(target, ImageAccess::COLOR_ATTACHMENT_WRITE);
        builder.record_raster_pass(
            vec![Attachment::clear_color(target, [0.0; 4])],
            None,
            |_, _| {},
            "draw",
        );
        builder.use_image(target, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "bloom");
        builder.use_image(target, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "tonemap");
        let graph = builder.build().unwrap();

        //empty->write and write->sampled transition, the repeated sampled read does not
        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 2);
        assert_eq!(syncs[0].image_barriers.len(), 1);
        assert_eq!(syncs[1].image_barriers.len(), 1);
        assert_eq!(graph.transient_count(), 1);
    }

    #[test]
    fn identical_write_intents_still_emit_barrier() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let image = builder.import_image(
            ImportedImage {
                format: vk::Format::R32_SFLOAT,
                ..imported_color_image()
            },
            ImageAccess::empty(),
        );

        let access = ImageAccess::STORAGE_WRITE;
        builder.use_image(image, access);
        builder.record_compute_pass(|_, _| {}, "scatter_a");
        builder.use_image(image, access);
        builder.record_compute_pass(|_, _| {}, "scatter_b");
        let graph = builder.build().unwrap();

        //two barriers: empty->write and the write-after-write hazard between the dispatches
        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 2);
        let waw = &syncs[1].image_barriers[0];
        assert_eq!(waw.src.layout, vk::ImageLayout::GENERAL);
        assert_eq!(waw.dst.layout, vk::ImageLayout::GENERAL);
        assert_eq!(waw.src.access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    }

    #[test]
    fn attachment_write_then_compute_sample() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let color = builder.request_render_target(
            RenderTargetDesc::new_2d(800, 600, vk::Format::R8G8B8A8_UNORM),
            SamplerDesc::default(),
            "gbuffer_albedo",
        );
        let depth = builder.request_render_target(
            RenderTargetDesc::new_2d(800, 600, vk::Format::D32_SFLOAT),
            SamplerDesc::default(),
            "gbuffer_depth",
        );

        builder.use_image(color, ImageAccess::COLOR_ATTACHMENT_WRITE);
        builder.use_image(depth, ImageAccess::DEPTH_ATTACHMENT_DEFAULT);
        builder.record_raster_pass(
            vec![Attachment::clear_color(color, [0.0; 4])],
            Some(Attachment::clear_depth(depth, 1.0)),
            |_, _| {},
            "gbuffer",
        );
        builder.use_image(color, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "lighting");
        let graph = builder.build().unwrap();

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 2);

        let transition = syncs[1]
            .image_barriers
            .iter()
            .find(|b| b.dst.layout == vk::ImageLayout::READ_ONLY_OPTIMAL)
            .unwrap();
        assert_eq!(transition.src.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(transition.src.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(transition.src.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(transition.dst.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(transition.dst.access, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(transition.aspect, vk::ImageAspectFlags::COLOR);

        //the depth target stays an attachment, no barrier after the raster pass touches it
        let depth_barriers: Vec<_> = syncs[1]
            .image_barriers
            .iter()
            .filter(|b| b.dst.layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .collect();
        assert!(depth_barriers.is_empty());
    }

    #[test]
    fn imported_sampled_image_becomes_color_attachment() {
        //a caller-owned texture last used for sampling gets drawn into
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let image = builder.import_image(imported_color_image(), ImageAccess::SAMPLED_READ);
        assert!(image.is_external());
        assert!(!image.is_transient());

        builder.use_image(image, ImageAccess::COLOR_ATTACHMENT_WRITE);
        builder.record_raster_pass(
            vec![Attachment::clear_color(image, [0.0; 4])],
            None,
            |_, _| {},
            "repaint",
        );
        let graph = builder.build().unwrap();
        assert_eq!(graph.render_area(), area());

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].image_barriers.len(), 1);
        let barrier = &syncs[0].image_barriers[0];
        assert_eq!(barrier.src.layout, vk::ImageLayout::READ_ONLY_OPTIMAL);
        assert_eq!(barrier.dst.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.dst.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            graph.final_image_access(image),
            Some((PassKind::Graphics, ImageAccess::COLOR_ATTACHMENT_WRITE))
        );
    }

    #[test]
    fn depth_target_write_then_sample_keeps_depth_aspect() {
        //shadow-map shape: render depth, then sample it. Both barriers of the history must
        // carry the depth aspect of the target's format.
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let shadow = builder.request_render_target(
            RenderTargetDesc::new_2d(2048, 2048, vk::Format::D32_SFLOAT),
            SamplerDesc::default(),
            "shadow_map",
        );
        assert!(shadow.is_transient());

        builder.use_image(shadow, ImageAccess::DEPTH_ATTACHMENT_WRITE);
        builder.record_raster_pass(
            Vec::new(),
            Some(Attachment::clear_depth(shadow, 1.0)),
            |_, _| {},
            "shadow",
        );
        builder.use_image(shadow, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "apply_shadow");
        let graph = builder.build().unwrap();

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 2);

        let to_attachment = &syncs[0].image_barriers[0];
        assert_eq!(to_attachment.src.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            to_attachment.dst.layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            to_attachment.dst.stage,
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
        );
        assert_eq!(to_attachment.aspect, vk::ImageAspectFlags::DEPTH);

        let to_sampled = &syncs[1].image_barriers[0];
        assert_eq!(
            to_sampled.src.layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(to_sampled.dst.layout, vk::ImageLayout::READ_ONLY_OPTIMAL);
        assert_eq!(to_sampled.aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn transfer_write_then_vertex_read() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let vertices = builder.import_buffer(imported_buffer(), BufferAccess::empty());
        assert!(vertices.is_external());

        builder.use_buffer(vertices, BufferAccess::TRANSFER_WRITE);
        builder.record_transfer_pass(|_, _| {}, "upload_vertices");
        builder.use_buffer(vertices, BufferAccess::VERTEX_READ | BufferAccess::INDEX_READ);
        builder.record_raster_pass_inline(|_, _| {}, "draw");
        let graph = builder.build().unwrap();

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 2);
        let barrier = &syncs[1].buffer_barriers[0];
        assert_eq!(barrier.src.stage, vk::PipelineStageFlags2::ALL_TRANSFER);
        assert_eq!(barrier.src.access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(barrier.dst.stage, vk::PipelineStageFlags2::VERTEX_INPUT);
        assert_eq!(
            barrier.dst.access,
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ | vk::AccessFlags2::INDEX_READ
        );
    }

    #[test]
    fn imported_state_transitions_from_all_commands() {
        //the first transition away from an imported state sources from the conservative
        // external scope
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let image = builder.import_image(imported_color_image(), ImageAccess::TRANSFER_WRITE);
        builder.use_image(image, ImageAccess::SAMPLED_READ);
        builder.record_compute_pass(|_, _| {}, "consume");
        let graph = builder.build().unwrap();

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 1);
        let barrier = &syncs[0].image_barriers[0];
        assert_eq!(barrier.src.stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.src.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.dst.layout, vk::ImageLayout::READ_ONLY_OPTIMAL);
        assert_eq!(
            graph.initial_image_access(image),
            Some((PassKind::None, ImageAccess::TRANSFER_WRITE))
        );
    }

    #[test]
    fn same_pass_declarations_merge_for_barriers() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let image = builder.import_image(
            ImportedImage {
                format: vk::Format::R32_SFLOAT,
                ..imported_color_image()
            },
            ImageAccess::empty(),
        );

        builder.use_image(image, ImageAccess::STORAGE_READ);
        builder.use_image(image, ImageAccess::STORAGE_WRITE);
        builder.record_compute_pass(|_, _| {}, "inout");
        let graph = builder.build().unwrap();

        let syncs = sync_steps(&graph);
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].image_barriers[0].dst.layout, vk::ImageLayout::GENERAL);
        assert_eq!(
            graph.final_image_access(image),
            Some((PassKind::Compute, ImageAccess::STORAGE_READ | ImageAccess::STORAGE_WRITE))
        );
    }

    #[test]
    fn rendering_scaffold_only_for_attachment_passes() {
        let provider = NullProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let target = builder.request_render_target(
            RenderTargetDesc::new_2d(800, 600, vk::Format::R8G8B8A8_UNORM),
            SamplerDesc::default(),
            "target",
        );

        builder.use_image(target, ImageAccess::COLOR_ATTACHMENT_WRITE);
        builder.record_raster_pass(
            vec![Attachment::new(target, LoadOp::DontCare, StoreOp::Store)],
            None,
            |_, _| {},
            "scene",
        );
        builder.record_raster_pass_inline(|_, _| {}, "overlay");
        builder.record_compute_pass(|_, _| {}, "post");
        let graph = builder.build().unwrap();

        let scaffolds: Vec<_> = graph
            .steps()
            .iter()
            .filter_map(|step| match step {
                Step::Pass(pass) => Some(pass.has_render_targets()),
                Step::Sync(_) => None,
            })
            .collect();
        assert_eq!(scaffolds, vec![true, false, false]);
    }

    #[test]
    fn allocation_failure_aborts_build() {
        let provider = FailingProvider;
        let mut builder = GraphBuilder::new(&provider, area());
        let target = builder.request_render_target(
            RenderTargetDesc::new_2d(16, 16, vk::Format::R8G8B8A8_UNORM),
            SamplerDesc::default(),
            "doomed",
        );
        builder.use_image(target, ImageAccess::COLOR_ATTACHMENT_WRITE);
        builder.record_raster_pass(
            vec![Attachment::clear_color(target, [0.0; 4])],
            None,
            |_, _| {},
            "draw",
        );
        let err = builder.build().unwrap_err();
        assert!(matches!(err, BuildError::Allocation(_)));
    }

    #[cfg(feature = "logging")]
    mod logging {
        use super::*;
        use std::sync::{Mutex, Once};

        struct CapturingLogger;

        static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());
        static LOGGER: CapturingLogger = CapturingLogger;
        static INSTALL: Once = Once::new();

        impl log::Log for CapturingLogger {
            fn enabled(&self, _metadata: &log::Metadata) -> bool {
                true
            }
            fn log(&self, record: &log::Record) {
                MESSAGES.lock().unwrap().push(format!("{}", record.args()));
            }
            fn flush(&self) {}
        }

        fn install() {
            INSTALL.call_once(|| {
                log::set_logger(&LOGGER).unwrap();
                log::set_max_level(log::LevelFilter::Trace);
            });
        }

        fn captured_since(mark: usize, needle: &str) -> usize {
            MESSAGES
                .lock()
                .unwrap()
                .iter()
                .skip(mark)
                .filter(|msg| msg.contains(needle))
                .count()
        }

        fn mark() -> usize {
            MESSAGES.lock().unwrap().len()
        }

        #[test]
        fn unregistered_handle_warns_and_continues() {
            install();
            let provider = NullProvider;
            let mut builder = GraphBuilder::new(&provider, area());
            //a handle from another builder, never declared here
            let stray = ImageHandle(ResourceOrigin::External(99));

            let mark = mark();
            builder.use_image(stray, ImageAccess::SAMPLED_READ);
            builder.record_compute_pass(|_, _| {}, "sample");
            assert!(captured_since(mark, "unregistered image handle") >= 1);

            //the builder recovers: the handle behaves as if freshly registered with no
            // prior access, and having no bound resource skips barrier emission
            let graph = builder.build().unwrap();
            assert!(sync_steps(&graph).is_empty());
            assert_eq!(
                graph.initial_image_access(stray),
                Some((PassKind::None, ImageAccess::empty()))
            );
        }

        #[test]
        fn leftover_declarations_warn_at_build() {
            install();
            let provider = NullProvider;
            let mut builder = GraphBuilder::new(&provider, area());
            let image = builder.import_image(imported_color_image(), ImageAccess::empty());
            builder.use_image(image, ImageAccess::TRANSFER_WRITE);
            builder.record_transfer_pass(|_, _| {}, "fill");
            //declared but never recorded into a pass
            builder.use_image(image, ImageAccess::SAMPLED_READ);

            let mark = mark();
            let graph = builder.build().unwrap();
            assert!(captured_since(mark, "Leftover resource-use declarations") >= 1);
            //the dangling declaration is dropped entirely, only the upload barrier remains
            assert_eq!(sync_steps(&graph).len(), 1);
            assert_eq!(
                graph.final_image_access(image),
                Some((PassKind::Transfer, ImageAccess::TRANSFER_WRITE))
            );
        }
    }
}
