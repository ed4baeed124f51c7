// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Instant;
use tracing::info;

use quad_math::UniformBlock;
use quad_render::{FrameOutcome, RenderOptions, RenderSize, Renderer};

mod capability;
mod commands;
mod descriptors;
mod device;
mod error;
mod frame;
mod framebuffers;
mod render_target;
mod resources;
mod shaders;
mod swapchain;
mod texture;

pub use capability::ChainConfig;
pub use error::VkError;
pub use frame::{AcquireStatus, PresentStatus};

use commands::DrawInputs;
use descriptors::Descriptors;
use device::Gpu;
use error::SetupContext;
use frame::{FrameRecipe, FrameScheduler};
use resources::{QuadMesh, UniformBuffer, Vertex};
use shaders::ShaderSet;
use texture::{Pixels, Texture};

/// Vulkan backend for the spinning textured quad.
///
/// Everything except `gpu` sits in an `Option` so `Drop` can release it in
/// dependency order before the device goes away.
pub struct VkRenderer {
    scheduler: Option<FrameScheduler>,
    descriptors: Option<Descriptors>,
    texture: Option<Texture>,
    uniforms: Option<UniformBuffer>,
    mesh: Option<QuadMesh>,
    command_pool: vk::CommandPool,
    started: Instant,
    gpu: Gpu,
}

// TEARDOWN ORDER:
// - device idle, then the live generation (commands, framebuffers, pipeline, chain)
// - semaphores
// - descriptor pool + layout before the sampler/view they reference
// - texture, uniform buffer, mesh
// - command pool
// - `gpu` drops last: device, surface, messenger, instance
impl Drop for VkRenderer {
    fn drop(&mut self) {
        let device = &self.gpu.device;
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.destroy(&self.gpu);
        } else {
            unsafe { device.device_wait_idle() }.ok();
        }
        if let Some(descriptors) = self.descriptors.take() {
            descriptors.destroy(device);
        }
        if let Some(texture) = self.texture.take() {
            texture.destroy(device);
        }
        if let Some(uniforms) = self.uniforms.take() {
            uniforms.destroy(device);
        }
        if let Some(mesh) = self.mesh.take() {
            mesh.destroy(device);
        }
        if self.command_pool != vk::CommandPool::null() {
            unsafe { device.destroy_command_pool(self.command_pool, None) };
        }
    }
}

impl VkRenderer {
    fn load_shaders(options: &RenderOptions) -> Result<ShaderSet> {
        match &options.shader_dir {
            Some(dir) => ShaderSet::from_dir(dir)
                .with_context(|| format!("loading shaders from {}", dir.display())),
            None => ShaderSet::builtin().context("decoding built-in shaders"),
        }
    }

    /// Extent of the live chain as a width/height ratio.
    fn aspect(&self) -> f32 {
        match self.scheduler.as_ref().and_then(FrameScheduler::extent) {
            Some(e) if e.height > 0 => e.width as f32 / e.height as f32,
            _ => 1.0,
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RenderOptions,
    ) -> Result<Self> {
        let shaders = Self::load_shaders(options)?;
        let pixels = Pixels::from_option(options.texture.as_deref()).context("loading texture")?;

        let gpu = Gpu::new(window, display, options.validation)?;
        let pool_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(gpu.families.graphics);
        let command_pool = unsafe { gpu.device.create_command_pool(&pool_info, None) }
            .setup("create_command_pool")?;

        // From here on `Drop` cleans up whatever has been filled in.
        let mut renderer = Self {
            scheduler: None,
            descriptors: None,
            texture: None,
            uniforms: None,
            mesh: None,
            command_pool,
            started: Instant::now(),
            gpu,
        };

        let mesh = QuadMesh::upload(&renderer.gpu, command_pool).context("uploading quad")?;
        let draw = DrawInputs {
            descriptor_set: None,
            vertex_buffer: mesh.vertices.buffer,
            index_buffer: mesh.indices.buffer,
            index_count: mesh.index_count,
        };
        renderer.mesh = Some(mesh);

        let uniforms = UniformBuffer::new(&renderer.gpu).context("creating uniform buffer")?;
        let texture = Texture::upload(&renderer.gpu, command_pool, &pixels)
            .context("uploading texture")?;
        let descriptors = Descriptors::new(&renderer.gpu.device, &uniforms, &texture)
            .context("creating descriptors")?;

        let recipe = FrameRecipe {
            command_pool,
            shaders,
            vertex_layout: Vertex::layout(),
            set_layout: descriptors.layout,
            draw: DrawInputs {
                descriptor_set: Some(descriptors.set),
                ..draw
            },
        };
        renderer.uniforms = Some(uniforms);
        renderer.texture = Some(texture);
        renderer.descriptors = Some(descriptors);

        let scheduler =
            FrameScheduler::new(&renderer.gpu, size, recipe).context("building swapchain")?;
        renderer.scheduler = Some(scheduler);

        info!("vk renderer ready at {}x{}", size.width, size.height);
        renderer.started = Instant::now();
        Ok(renderer)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(());
        };
        scheduler
            .on_resize(&self.gpu, size)
            .with_context(|| format!("rebuilding swapchain at {}x{}", size.width, size.height))
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        match &self.scheduler {
            Some(scheduler) if !scheduler.is_paused() => {}
            _ => return Ok(FrameOutcome::Skipped),
        }

        let block = UniformBlock::spinning(self.started.elapsed().as_secs_f32(), self.aspect());
        if let Some(uniforms) = &self.uniforms {
            uniforms
                .update(&self.gpu.device, &block)
                .context("updating uniforms")?;
        }

        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(FrameOutcome::Skipped);
        };
        scheduler.draw_frame(&self.gpu).context("drawing frame")
    }
}
