use ash::vk;

use crate::graph::Graph;
use crate::recorder::{ComputeCmds, GraphicsCmds, TransferCmds};
use crate::resource::ImageHandle;
use crate::state::PassKind;

///Attachment load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

///Attachment store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

///Clear value used when an attachment loads with [LoadOp::Clear].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl From<LoadOp> for vk::AttachmentLoadOp {
    fn from(op: LoadOp) -> Self {
        match op {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl From<StoreOp> for vk::AttachmentStoreOp {
    fn from(op: StoreOp) -> Self {
        match op {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

impl From<ClearValue> for vk::ClearValue {
    fn from(clear: ClearValue) -> Self {
        match clear {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

///Render target declaration for a rasterizer pass. The referenced handle must additionally
/// be declared via [GraphBuilder::use_image](crate::GraphBuilder::use_image) with a matching
/// attachment-write intent before the pass is recorded.
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub handle: ImageHandle,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: Option<ClearValue>,
}

impl Attachment {
    pub fn new(handle: ImageHandle, load: LoadOp, store: StoreOp) -> Self {
        Attachment {
            handle,
            load,
            store,
            clear: None,
        }
    }

    ///Clear/Store color attachment.
    pub fn clear_color(handle: ImageHandle, color: [f32; 4]) -> Self {
        Attachment {
            handle,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear: Some(ClearValue::Color(color)),
        }
    }

    ///Clear/Store depth attachment.
    pub fn clear_depth(handle: ImageHandle, depth: f32) -> Self {
        Attachment {
            handle,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear: Some(ClearValue::DepthStencil { depth, stencil: 0 }),
        }
    }
}

///User supplied pass body. The wrapper type decides which subset of recording commands a
/// body may issue, there is no common virtual base. Bodies must not insert barriers for
/// resources declared through the builder, the graph owns those.
pub(crate) enum PassBody<'a> {
    Graphics(Box<dyn Fn(GraphicsCmds<'_>, &Graph<'a>) + 'a>),
    Compute(Box<dyn Fn(ComputeCmds<'_>, &Graph<'a>) + 'a>),
    Transfer(Box<dyn Fn(TransferCmds<'_>, &Graph<'a>) + 'a>),
}

impl PassBody<'_> {
    pub fn kind(&self) -> PassKind {
        match self {
            PassBody::Graphics(_) => PassKind::Graphics,
            PassBody::Compute(_) => PassKind::Compute,
            PassBody::Transfer(_) => PassKind::Transfer,
        }
    }
}

///Declared but not yet compiled pass, as collected by the builder.
pub(crate) struct PassDecl<'a> {
    pub name: String,
    pub body: PassBody<'a>,
    pub colors: Vec<Attachment>,
    pub depth: Option<Attachment>,
}

///One attachment of a compiled pass, fully resolved at build time.
#[derive(Clone, Copy)]
pub(crate) struct ResolvedAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load: vk::AttachmentLoadOp,
    pub store: vk::AttachmentStoreOp,
    pub clear: vk::ClearValue,
}

///Begin/end-rendering scaffolding of a compiled rasterizer pass.
pub(crate) struct RenderingDesc {
    pub area: vk::Extent2D,
    pub colors: Vec<ResolvedAttachment>,
    pub depth: Option<ResolvedAttachment>,
}
