// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Fatal backend failures. A stale swapchain is not one of these: it is
/// recovered inside the frame scheduler and never reaches the caller.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("{what} failed: {result:?}")]
    Setup {
        what: &'static str,
        result: vk::Result,
    },
    #[error("{op} returned unexpected status {result:?}")]
    Status {
        op: &'static str,
        result: vk::Result,
    },
    #[error("no physical device offers graphics + presentation for this surface")]
    NoSuitableDevice,
    #[error("no memory type matches bits {type_bits:#b} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
    #[error(
        "generation out of step: {image_views} views, {framebuffers} framebuffers, \
         {command_buffers} command buffers"
    )]
    FrameCountMismatch {
        image_views: usize,
        framebuffers: usize,
        command_buffers: usize,
    },
    #[error("shader bytecode unreadable: {0}")]
    Shader(#[from] std::io::Error),
    #[error("texture could not be decoded: {0}")]
    Texture(#[from] image::ImageError),
}

/// Tags a raw `vk::Result` with the setup step that produced it.
pub(crate) trait SetupContext<T> {
    fn setup(self, what: &'static str) -> Result<T, VkError>;
}

impl<T> SetupContext<T> for ash::prelude::VkResult<T> {
    fn setup(self, what: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError::Setup { what, result })
    }
}
