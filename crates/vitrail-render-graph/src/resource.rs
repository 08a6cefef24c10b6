use std::sync::Arc;

use ash::vk;

///Where a graph-managed resource comes from. `External` resources are imported, their
/// lifetime is owned by the caller. `Transient` resources are requested from the builder and
/// allocated (and owned) by the compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceOrigin {
    External(u32),
    Transient(u32),
}

///Opaque image handle, only meaningful for the [GraphBuilder](crate::GraphBuilder) that
/// minted it and the [Graph](crate::Graph) built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub(crate) ResourceOrigin);

///Opaque buffer handle, only meaningful for the [GraphBuilder](crate::GraphBuilder) that
/// minted it and the [Graph](crate::Graph) built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) ResourceOrigin);

impl ImageHandle {
    pub fn is_external(&self) -> bool {
        matches!(self.0, ResourceOrigin::External(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.0, ResourceOrigin::Transient(_))
    }
}

impl BufferHandle {
    pub fn is_external(&self) -> bool {
        matches!(self.0, ResourceOrigin::External(_))
    }
}

///Description of a render target texture to be allocated at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
}

impl RenderTargetDesc {
    ///2d single-sampled target without mip chain, the common case for attachments.
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        RenderTargetDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

///Sampler parameters for a requested render target. Consumed opaquely by the
/// [ResourceProvider].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            max_anisotropy: None,
        }
    }
}

///Caller-owned image imported into one graph build. The graph only copies the raw handles,
/// the caller keeps the resource alive (and un-mutated by other code paths) for the graph's
/// lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ImportedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

///Caller-owned buffer imported into one graph build.
#[derive(Debug, Clone, Copy)]
pub struct ImportedBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

///A graph-owned render target as handed out by a [ResourceProvider]. Dropping the trait
/// object releases the resource, so the compiled graph keeps its transients alive exactly as
/// long as itself.
pub trait RenderTarget {
    fn image(&self) -> vk::Image;
    fn view(&self) -> vk::ImageView;
    fn format(&self) -> vk::Format;
    fn extent(&self) -> vk::Extent2D;
}

///Allocation boundary towards the device layer. The graph core calls this once per
/// requested transient at build time and never for imported resources.
pub trait ResourceProvider {
    fn create_render_target(
        &self,
        desc: &RenderTargetDesc,
        sampler: &SamplerDesc,
        name: &str,
    ) -> Result<Arc<dyn RenderTarget>, anyhow::Error>;
}

///Resolved image a handle maps to after building.
#[derive(Debug, Clone, Copy)]
pub struct ImageBinding {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

///Resolved buffer a handle maps to after building.
#[derive(Debug, Clone, Copy)]
pub struct BufferBinding {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

///Image aspect implied by a format, used for barrier subresource ranges. Returns an empty
/// mask for formats it cannot classify (eg. `UNDEFINED`), the barrier path falls back to a
/// conservative mask in that case.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::UNDEFINED => vk::ImageAspectFlags::empty(),
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(ImageHandle: Copy, Send, Sync);
    assert_impl_all!(BufferHandle: Copy, Send, Sync);

    #[test]
    fn aspect_classification() {
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert!(aspect_for_format(vk::Format::UNDEFINED).is_empty());
    }
}
