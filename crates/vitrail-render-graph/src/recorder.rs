//! Capability-tagged command recording wrappers.
//!
//! Each pass body receives the wrapper matching its pass kind, which statically limits the
//! commands it can issue. None of the wrappers exposes barrier insertion: synchronization of
//! declared resources is owned by the graph.

use ash::vk;

///Commands available to a rasterizer pass body.
pub struct GraphicsCmds<'r> {
    device: &'r ash::Device,
    cmd: vk::CommandBuffer,
}

///Commands available to a compute pass body.
pub struct ComputeCmds<'r> {
    device: &'r ash::Device,
    cmd: vk::CommandBuffer,
}

///Commands available to a transfer pass body.
pub struct TransferCmds<'r> {
    device: &'r ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'r> GraphicsCmds<'r> {
    pub(crate) fn new(device: &'r ash::Device, cmd: vk::CommandBuffer) -> Self {
        GraphicsCmds { device, cmd }
    }

    ///Raw handles, for commands not covered by the wrapper. Do not record barriers or
    /// begin/end rendering through this.
    pub fn raw(&self) -> (&ash::Device, vk::CommandBuffer) {
        (self.device, self.cmd)
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    ///Sets up a full-extent viewport together with the given scissor.
    pub fn setup_viewport(&self, width: u32, height: u32, scissor: vk::Rect2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
    }

    pub fn bind_vertex_buffer(&self, binding: u32, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, binding, &[buffer], &[offset])
        };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, ty: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(self.cmd, buffer, offset, ty) };
    }

    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            )
        };
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(self.cmd, layout, stages, offset, data)
        };
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }
}

impl<'r> ComputeCmds<'r> {
    pub(crate) fn new(device: &'r ash::Device, cmd: vk::CommandBuffer) -> Self {
        ComputeCmds { device, cmd }
    }

    pub fn raw(&self) -> (&ash::Device, vk::CommandBuffer) {
        (self.device, self.cmd)
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, pipeline)
        };
    }

    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::COMPUTE,
                layout,
                first_set,
                sets,
                &[],
            )
        };
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(self.cmd, layout, stages, offset, data)
        };
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(self.cmd, x, y, z) };
    }
}

impl<'r> TransferCmds<'r> {
    pub(crate) fn new(device: &'r ash::Device, cmd: vk::CommandBuffer) -> Self {
        TransferCmds { device, cmd }
    }

    pub fn raw(&self) -> (&ash::Device, vk::CommandBuffer) {
        (self.device, self.cmd)
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.cmd, src, dst, regions) };
    }

    pub fn copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.cmd, src, src_layout, dst, dst_layout, regions)
        };
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(self.cmd, src, dst, dst_layout, regions)
        };
    }

    pub fn blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device
                .cmd_blit_image(self.cmd, src, src_layout, dst, dst_layout, regions, filter)
        };
    }
}
