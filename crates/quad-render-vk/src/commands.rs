// SPDX-License-Identifier: CEPL-1.0
//! Pre-recorded draw commands, one primary buffer per framebuffer.
use ash::vk;

use crate::error::{SetupContext, VkError};
use crate::render_target::RenderTarget;

/// Opaque black.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything the recorded buffers reference besides the render target.
#[derive(Clone, Copy, Debug)]
pub struct DrawInputs {
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

pub struct CommandRecorder {
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    /// Allocates and fully records `framebuffers.len()` buffers. Buffer `i`
    /// renders into framebuffer `i` and is submitted unchanged every time
    /// image `i` is acquired.
    pub fn record(
        device: &ash::Device,
        pool: vk::CommandPool,
        target: &RenderTarget,
        framebuffers: &[vk::Framebuffer],
        extent: vk::Extent2D,
        inputs: &DrawInputs,
    ) -> Result<Self, VkError> {
        let alloc = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);
        let buffers =
            unsafe { device.allocate_command_buffers(&alloc) }.setup("allocate_command_buffers")?;
        let recorder = Self { buffers };

        for (&cmd, &fb) in recorder.buffers.iter().zip(framebuffers) {
            if let Err(err) = unsafe { record_one(device, cmd, target, fb, extent, inputs) } {
                recorder.free(device, pool);
                return Err(err);
            }
        }
        Ok(recorder)
    }

    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn free(self, device: &ash::Device, pool: vk::CommandPool) {
        if !self.buffers.is_empty() {
            unsafe { device.free_command_buffers(pool, &self.buffers) };
        }
    }
}

pub fn clear_values() -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }]
}

unsafe fn record_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &RenderTarget,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    inputs: &DrawInputs,
) -> Result<(), VkError> {
    // The same buffer may be resubmitted while a prior submission is pending.
    let begin = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
    unsafe { device.begin_command_buffer(cmd, &begin) }.setup("begin_command_buffer")?;

    let clear = clear_values();
    let pass = vk::RenderPassBeginInfo::default()
        .render_pass(target.render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear);

    unsafe {
        if let Some(set) = inputs.descriptor_set {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                target.layout,
                0,
                &[set],
                &[],
            );
        }
        device.cmd_begin_render_pass(cmd, &pass, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
        device.cmd_bind_vertex_buffers(cmd, 0, &[inputs.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, inputs.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(cmd, inputs.index_count, 1, 0, 0, 0);
        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)
    }
    .setup("end_command_buffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_to_opaque_black() {
        let [value] = clear_values();
        let rgba = unsafe { value.color.float32 };
        assert_eq!(rgba, [0.0, 0.0, 0.0, 1.0]);
    }
}
