//! # Render graph
//!
//! Declarative, single-queue render graph over [ash]: passes are declared in execution
//! order together with the way each one accesses its resources, the compiled [Graph] then
//! carries the derived pipeline barriers, layout transitions and dynamic-rendering
//! scaffolding, so pass bodies never touch synchronization themselves.
//!
//! # Builder
//! [GraphBuilder] collects resources and passes. Images and buffers that already exist are
//! imported with the access state they are in, render targets the graph should own are
//! requested and allocated through a [ResourceProvider] at build time. Before each
//! `record_*` call the pass's accesses are declared via [GraphBuilder::use_image] /
//! [GraphBuilder::use_buffer].
//!
//! # Graph
//! [GraphBuilder::build] resolves the access histories into a linear list of [Step]s,
//! alternating synchronization and pass execution. [Graph::record] replays them into a
//! caller-provided command buffer, submission and fencing stay with the caller. Passes are
//! never reordered, the graph executes exactly in declaration order.
//!
//! ```no_run
//! # use vitrail_render_graph::*;
//! # use ash::vk;
//! # fn demo(provider: &dyn ResourceProvider, extent: vk::Extent2D) -> Result<(), BuildError> {
//! let mut builder = GraphBuilder::new(provider, extent);
//! let color = builder.request_render_target(
//!     RenderTargetDesc::new_2d(extent.width, extent.height, vk::Format::R8G8B8A8_UNORM),
//!     SamplerDesc::default(),
//!     "scene_color",
//! );
//!
//! builder.use_image(color, ImageAccess::COLOR_ATTACHMENT_WRITE);
//! builder.record_raster_pass(
//!     vec![Attachment::clear_color(color, [0.0, 0.0, 0.0, 1.0])],
//!     None,
//!     |cmds, _graph| {
//!         //bind pipeline, draw..
//!         let _ = cmds;
//!     },
//!     "scene",
//! );
//!
//! builder.use_image(color, ImageAccess::SAMPLED_READ);
//! builder.record_compute_pass(|_cmds, _graph| {}, "post_process");
//!
//! let graph = builder.build()?;
//! //later, per frame: graph.record(&device, cmd);
//! # let _ = graph;
//! # Ok(())
//! # }
//! ```

#![deny(warnings)]

mod graph;
pub use graph::{BoundaryAccess, BufferBarrier, Graph, ImageBarrier, PassStep, Step, SyncStep};

mod graph_builder;
pub use graph_builder::{BuildError, GraphBuilder};

mod memo;
pub use memo::{AccessMemo, AccessRecord, EXTERNAL_PASS};

mod pass;
pub use pass::{Attachment, ClearValue, LoadOp, StoreOp};

mod recorder;
pub use recorder::{ComputeCmds, GraphicsCmds, TransferCmds};

mod resource;
pub use resource::{
    aspect_for_format, BufferBinding, BufferHandle, ImageBinding, ImageHandle, ImportedBuffer,
    ImportedImage, RenderTarget, RenderTargetDesc, ResourceOrigin, ResourceProvider, SamplerDesc,
};

mod state;
pub use state::{BufferAccess, BufferScope, ImageAccess, ImageScope, PassKind};
