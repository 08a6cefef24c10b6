use ash::vk;
use bitflags::bitflags;

///Kind of work a recorded pass submits to the queue. [PassKind::None] is reserved for the
/// synthetic "external" pseudo-pass that models the state a resource is in before the first
/// recorded pass touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Graphics,
    Compute,
    Transfer,
    None,
}

bitflags! {
    ///Declared way an image is accessed at one point of the graph. Multiple bits may be set
    /// for documented combinations like a storage image that is read and written by the same
    /// dispatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAccess: u32 {
        ///Attachment read performed during loading, blending etc.
        const COLOR_ATTACHMENT_READ  = 0b1;
        const COLOR_ATTACHMENT_WRITE = 0b10;
        const DEPTH_ATTACHMENT_READ  = 0b100;
        const DEPTH_ATTACHMENT_WRITE = 0b1000;
        const TRANSFER_READ          = 0b1_0000;
        const TRANSFER_WRITE         = 0b10_0000;
        ///Read as a texture through a sampler.
        const SAMPLED_READ           = 0b100_0000;
        ///Random read as a storage image.
        const STORAGE_READ           = 0b1000_0000;
        ///Random write as a storage image.
        const STORAGE_WRITE          = 0b1_0000_0000;

        const COLOR_ATTACHMENT_DEFAULT = Self::COLOR_ATTACHMENT_READ.bits() | Self::COLOR_ATTACHMENT_WRITE.bits();
        const DEPTH_ATTACHMENT_DEFAULT = Self::DEPTH_ATTACHMENT_READ.bits() | Self::DEPTH_ATTACHMENT_WRITE.bits();
    }
}

bitflags! {
    ///Declared way a buffer is accessed at one point of the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferAccess: u32 {
        ///Read as an indirect draw/dispatch argument buffer.
        const INDIRECT_READ  = 0b1;
        const INDEX_READ     = 0b10;
        const VERTEX_READ    = 0b100;
        const UNIFORM_READ   = 0b1000;
        ///Read as a texel uniform buffer through a sampler.
        const SAMPLED_READ   = 0b1_0000;
        const STORAGE_READ   = 0b10_0000;
        const STORAGE_WRITE  = 0b100_0000;
        const TRANSFER_READ  = 0b1000_0000;
        const TRANSFER_WRITE = 0b1_0000_0000;
        ///Access from the CPU side.
        const HOST           = 0b10_0000_0000;
    }
}

///Resolved synchronization scope of one image access: the barrier-side triple an
/// [ImageAccess] maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

///Resolved synchronization scope of one buffer access. Buffers carry no layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

#[cfg(feature = "logging")]
fn warn_invalid_combination(kind: PassKind, what: &str) {
    log::warn!("Ignoring invalid access pattern: {} in a {:?} pass.", what, kind);
}

#[cfg(not(feature = "logging"))]
fn warn_invalid_combination(_kind: PassKind, _what: &str) {}

impl ImageAccess {
    const WRITE_BITS: Self = Self::COLOR_ATTACHMENT_WRITE
        .union(Self::DEPTH_ATTACHMENT_WRITE)
        .union(Self::TRANSFER_WRITE)
        .union(Self::STORAGE_WRITE);

    ///Returns true if any write bit is set.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_BITS)
    }

    pub fn is_read_only(self) -> bool {
        !self.is_write()
    }

    ///Pipeline stages this access happens on when issued from a `kind` pass. Bits that are not
    /// valid for the pass kind contribute no stages and are warned about, they do not fail the
    /// build.
    pub fn stage_mask(self, kind: PassKind) -> vk::PipelineStageFlags2 {
        if self.is_empty() {
            return vk::PipelineStageFlags2::NONE;
        }
        //The external pseudo-pass has no pipeline to pin stages to. Anything the caller imported
        // with a non-empty prior access is treated as "all previous work", which can only
        // over-synchronize the first transition.
        if kind == PassKind::None {
            return vk::PipelineStageFlags2::ALL_COMMANDS;
        }

        let mut stages = vk::PipelineStageFlags2::NONE;
        if self.intersects(Self::COLOR_ATTACHMENT_READ | Self::COLOR_ATTACHMENT_WRITE) {
            if kind == PassKind::Graphics {
                stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
            } else {
                warn_invalid_combination(kind, "color attachment access");
            }
        }
        if self.intersects(Self::DEPTH_ATTACHMENT_READ | Self::DEPTH_ATTACHMENT_WRITE) {
            if kind == PassKind::Graphics {
                stages |= vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
            } else {
                warn_invalid_combination(kind, "depth attachment access");
            }
        }
        if self.intersects(Self::TRANSFER_READ | Self::TRANSFER_WRITE) {
            stages |= vk::PipelineStageFlags2::ALL_TRANSFER;
        }
        if self.intersects(Self::SAMPLED_READ | Self::STORAGE_READ | Self::STORAGE_WRITE) {
            match kind {
                PassKind::Graphics => stages |= vk::PipelineStageFlags2::ALL_GRAPHICS,
                PassKind::Compute => stages |= vk::PipelineStageFlags2::COMPUTE_SHADER,
                _ => warn_invalid_combination(kind, "shader access"),
            }
        }
        stages
    }

    ///Memory access mask of this intent. Pure union over the set bits.
    pub fn access_mask(self) -> vk::AccessFlags2 {
        let mut mask = vk::AccessFlags2::NONE;
        if self.contains(Self::COLOR_ATTACHMENT_READ) {
            mask |= vk::AccessFlags2::COLOR_ATTACHMENT_READ;
        }
        if self.contains(Self::COLOR_ATTACHMENT_WRITE) {
            mask |= vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
        }
        if self.contains(Self::DEPTH_ATTACHMENT_READ) {
            mask |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ;
        }
        if self.contains(Self::DEPTH_ATTACHMENT_WRITE) {
            mask |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        if self.contains(Self::TRANSFER_READ) {
            mask |= vk::AccessFlags2::TRANSFER_READ;
        }
        if self.contains(Self::TRANSFER_WRITE) {
            mask |= vk::AccessFlags2::TRANSFER_WRITE;
        }
        if self.contains(Self::SAMPLED_READ) {
            mask |= vk::AccessFlags2::SHADER_SAMPLED_READ;
        }
        if self.contains(Self::STORAGE_READ) {
            mask |= vk::AccessFlags2::SHADER_STORAGE_READ;
        }
        if self.contains(Self::STORAGE_WRITE) {
            mask |= vk::AccessFlags2::SHADER_STORAGE_WRITE;
        }
        mask
    }

    ///Layout the image has to be in for this access. When multiple bits are set the first
    /// matching rule wins, attachments before transfers before shader reads.
    pub fn layout(self) -> vk::ImageLayout {
        if self.intersects(Self::COLOR_ATTACHMENT_READ | Self::COLOR_ATTACHMENT_WRITE) {
            return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        }
        if self.intersects(Self::DEPTH_ATTACHMENT_READ | Self::DEPTH_ATTACHMENT_WRITE) {
            return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        }
        if self.contains(Self::TRANSFER_READ) {
            return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        }
        if self.contains(Self::TRANSFER_WRITE) {
            return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        }
        //storage access before sampling: a read+write storage image must be GENERAL even if it
        // is also sampled.
        if self.intersects(Self::STORAGE_READ | Self::STORAGE_WRITE) {
            return vk::ImageLayout::GENERAL;
        }
        if self.contains(Self::SAMPLED_READ) {
            return vk::ImageLayout::READ_ONLY_OPTIMAL;
        }
        vk::ImageLayout::UNDEFINED
    }

    ///Full (stage, access, layout) scope of this intent in a `kind` pass.
    pub fn scope(self, kind: PassKind) -> ImageScope {
        ImageScope {
            stage: self.stage_mask(kind),
            access: self.access_mask(),
            layout: self.layout(),
        }
    }
}

impl BufferAccess {
    const WRITE_BITS: Self = Self::STORAGE_WRITE.union(Self::TRANSFER_WRITE).union(Self::HOST);

    ///Returns true if any write bit is set. [BufferAccess::HOST] counts as a write since it
    /// covers both host directions.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_BITS)
    }

    pub fn is_read_only(self) -> bool {
        !self.is_write()
    }

    ///Pipeline stages this access happens on when issued from a `kind` pass.
    pub fn stage_mask(self, kind: PassKind) -> vk::PipelineStageFlags2 {
        if self.is_empty() {
            return vk::PipelineStageFlags2::NONE;
        }
        if kind == PassKind::None {
            return vk::PipelineStageFlags2::ALL_COMMANDS;
        }

        let mut stages = vk::PipelineStageFlags2::NONE;
        if self.intersects(
            Self::UNIFORM_READ | Self::SAMPLED_READ | Self::STORAGE_READ | Self::STORAGE_WRITE,
        ) {
            match kind {
                PassKind::Graphics => stages |= vk::PipelineStageFlags2::ALL_GRAPHICS,
                PassKind::Compute => stages |= vk::PipelineStageFlags2::COMPUTE_SHADER,
                _ => warn_invalid_combination(kind, "shader access"),
            }
        }
        if self.intersects(Self::INDEX_READ | Self::VERTEX_READ) {
            if kind == PassKind::Graphics {
                stages |= vk::PipelineStageFlags2::VERTEX_INPUT;
            } else {
                warn_invalid_combination(kind, "vertex input access");
            }
        }
        if self.contains(Self::INDIRECT_READ) {
            if kind == PassKind::Graphics {
                stages |= vk::PipelineStageFlags2::DRAW_INDIRECT;
            } else {
                warn_invalid_combination(kind, "indirect argument access");
            }
        }
        if self.intersects(Self::TRANSFER_READ | Self::TRANSFER_WRITE) {
            stages |= vk::PipelineStageFlags2::ALL_TRANSFER;
        }
        if self.contains(Self::HOST) {
            stages |= vk::PipelineStageFlags2::HOST;
        }
        stages
    }

    ///Memory access mask of this intent.
    pub fn access_mask(self) -> vk::AccessFlags2 {
        let mut mask = vk::AccessFlags2::NONE;
        if self.contains(Self::INDIRECT_READ) {
            mask |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
        }
        if self.contains(Self::INDEX_READ) {
            mask |= vk::AccessFlags2::INDEX_READ;
        }
        if self.contains(Self::VERTEX_READ) {
            mask |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ;
        }
        if self.contains(Self::UNIFORM_READ) {
            mask |= vk::AccessFlags2::UNIFORM_READ;
        }
        if self.contains(Self::SAMPLED_READ) {
            mask |= vk::AccessFlags2::SHADER_SAMPLED_READ;
        }
        if self.contains(Self::STORAGE_READ) {
            mask |= vk::AccessFlags2::SHADER_STORAGE_READ;
        }
        if self.contains(Self::STORAGE_WRITE) {
            mask |= vk::AccessFlags2::SHADER_STORAGE_WRITE;
        }
        if self.contains(Self::TRANSFER_READ) {
            mask |= vk::AccessFlags2::TRANSFER_READ;
        }
        if self.contains(Self::TRANSFER_WRITE) {
            mask |= vk::AccessFlags2::TRANSFER_WRITE;
        }
        if self.contains(Self::HOST) {
            mask |= vk::AccessFlags2::HOST_READ | vk::AccessFlags2::HOST_WRITE;
        }
        mask
    }

    ///Full (stage, access) scope of this intent in a `kind` pass.
    pub fn scope(self, kind: PassKind) -> BufferScope {
        BufferScope {
            stage: self.stage_mask(kind),
            access: self.access_mask(),
        }
    }
}

///Barrier skip rule for two adjacent image accesses: equal, read-only accesses are already
/// ordered and share a layout, everything else (any write, or differing intents) transitions.
pub(crate) fn image_transition_needed(prev: ImageAccess, next: ImageAccess) -> bool {
    prev != next || prev.is_write() || next.is_write()
}

///Same rule for buffers, minus the layout concern.
pub(crate) fn buffer_transition_needed(prev: BufferAccess, next: BufferAccess) -> bool {
    prev != next || prev.is_write() || next.is_write()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_resolution_is_pure() {
        let a = ImageAccess::STORAGE_READ | ImageAccess::STORAGE_WRITE;
        assert_eq!(a.scope(PassKind::Compute), a.scope(PassKind::Compute));
        let b = BufferAccess::INDEX_READ | BufferAccess::VERTEX_READ;
        assert_eq!(b.scope(PassKind::Graphics), b.scope(PassKind::Graphics));
    }

    #[test]
    fn composite_intents_union_masks() {
        let a = ImageAccess::STORAGE_READ | ImageAccess::STORAGE_WRITE;
        assert_eq!(
            a.access_mask(),
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
        );
        assert_eq!(a.layout(), vk::ImageLayout::GENERAL);
        assert_eq!(a.stage_mask(PassKind::Compute), vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn layout_priority_prefers_attachments() {
        let a = ImageAccess::COLOR_ATTACHMENT_WRITE | ImageAccess::TRANSFER_READ;
        assert_eq!(a.layout(), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(
            ImageAccess::DEPTH_ATTACHMENT_DEFAULT.layout(),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(ImageAccess::empty().layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn invalid_combination_contributes_no_stage() {
        //attachment access in a compute pass is not part of the declared set. It must not
        // produce stages, only a warning.
        let stage = ImageAccess::COLOR_ATTACHMENT_WRITE.stage_mask(PassKind::Compute);
        assert_eq!(stage, vk::PipelineStageFlags2::NONE);
        let stage = BufferAccess::INDEX_READ.stage_mask(PassKind::Transfer);
        assert_eq!(stage, vk::PipelineStageFlags2::NONE);
    }

    #[test]
    fn external_pass_is_conservative() {
        assert_eq!(
            ImageAccess::SAMPLED_READ.stage_mask(PassKind::None),
            vk::PipelineStageFlags2::ALL_COMMANDS
        );
        assert_eq!(ImageAccess::empty().stage_mask(PassKind::None), vk::PipelineStageFlags2::NONE);
    }

    #[test]
    fn transition_rule_skips_only_equal_reads() {
        let read = ImageAccess::SAMPLED_READ;
        let write = ImageAccess::COLOR_ATTACHMENT_WRITE;
        assert!(!image_transition_needed(read, read));
        assert!(image_transition_needed(read, write));
        //equal write intents keep the WAW hazard
        assert!(image_transition_needed(write, write));
        assert!(buffer_transition_needed(BufferAccess::STORAGE_WRITE, BufferAccess::STORAGE_WRITE));
        assert!(!buffer_transition_needed(BufferAccess::UNIFORM_READ, BufferAccess::UNIFORM_READ));
    }

    #[test]
    fn index_read_resolves_to_vertex_input() {
        let s = BufferAccess::INDEX_READ.scope(PassKind::Graphics);
        assert_eq!(s.stage, vk::PipelineStageFlags2::VERTEX_INPUT);
        assert_eq!(s.access, vk::AccessFlags2::INDEX_READ);
    }
}
