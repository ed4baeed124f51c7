// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{SetupContext, VkError};

/// One framebuffer per chain image view, same index, same extent.
pub struct FrameBufferSet {
    framebuffers: Vec<vk::Framebuffer>,
}

impl FrameBufferSet {
    pub fn build(
        device: &ash::Device,
        views: &[vk::ImageView],
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Self, VkError> {
        let mut framebuffers = Vec::with_capacity(views.len());
        for view in views {
            let attachments = [*view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            match unsafe { device.create_framebuffer(&info, None) }.setup("create_framebuffer") {
                Ok(fb) => framebuffers.push(fb),
                Err(err) => {
                    Self { framebuffers }.teardown(device);
                    return Err(err);
                }
            }
        }
        Ok(Self { framebuffers })
    }

    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn teardown(self, device: &ash::Device) {
        unsafe {
            for fb in self.framebuffers {
                device.destroy_framebuffer(fb, None);
            }
        }
    }
}
