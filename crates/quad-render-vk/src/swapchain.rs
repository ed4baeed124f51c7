// SPDX-License-Identifier: CEPL-1.0
//! The presentable-image chain: creation, views, and teardown.
use ash::vk;
use quad_render::RenderSize;
use tracing::{debug, info};

use crate::capability::{ChainConfig, SurfaceSupport};
use crate::device::Gpu;
use crate::error::{SetupContext, VkError};

/// One generation of the chain. Images belong to the driver; the views are ours.
///
/// Move-only: `teardown` consumes it, so a retired chain can't be presented again.
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    config: ChainConfig,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// Derives the next chain's configuration from a fresh capability query.
    pub fn plan(gpu: &Gpu, requested: RenderSize) -> Result<ChainConfig, VkError> {
        let support =
            unsafe { SurfaceSupport::query(&gpu.surface_loader, gpu.phys, gpu.surface)? };
        let config = ChainConfig::select(&support, requested);
        debug!(
            "surface: images {}..{} (0 = unbounded), current {}x{}, {} formats, modes {:?}",
            support.capabilities.min_image_count,
            support.capabilities.max_image_count,
            support.capabilities.current_extent.width,
            support.capabilities.current_extent.height,
            support.formats.len(),
            support.present_modes,
        );
        Ok(config)
    }

    /// `previous` stays alive and owned by the caller; it is only a recycling
    /// hint and must be torn down once the new chain is live.
    pub fn create(
        gpu: &Gpu,
        config: ChainConfig,
        previous: Option<&Swapchain>,
    ) -> Result<Self, VkError> {
        let (sharing_mode, families) = gpu.families.sharing();
        let old = previous.map_or(vk::SwapchainKHR::null(), |p| p.handle);

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(gpu.surface)
            .min_image_count(config.image_count)
            .image_format(config.format)
            .image_color_space(config.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = unsafe { gpu.swapchain_loader.create_swapchain(&info, None) }
            .setup("create_swapchain")?;

        // The driver may allocate more images than min_image_count asked for.
        let images = match unsafe { gpu.swapchain_loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(result) => {
                unsafe { gpu.swapchain_loader.destroy_swapchain(handle, None) };
                return Err(VkError::Setup {
                    what: "get_swapchain_images",
                    result,
                });
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match unsafe { create_color_view(&gpu.device, image, config.format) } {
                Ok(view) => views.push(view),
                Err(err) => {
                    Self {
                        handle,
                        config,
                        images: Vec::new(),
                        views,
                    }
                    .teardown(gpu);
                    return Err(err);
                }
            }
        }
        let chain = Self {
            handle,
            config,
            images,
            views,
        };

        info!(
            "swapchain: {:?} / {:?}, {:?}, {}x{}, images {} (asked {}){}",
            config.format,
            config.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            chain.image_count(),
            config.image_count,
            if previous.is_some() { ", recycled" } else { "" },
        );
        Ok(chain)
    }

    /// Views first, then the chain. The images go with the chain.
    pub fn teardown(self, gpu: &Gpu) {
        unsafe {
            for &view in &self.views {
                gpu.device.destroy_image_view(view, None);
            }
            gpu.swapchain_loader.destroy_swapchain(self.handle, None);
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Identity swizzle, one mip, one layer.
pub(crate) unsafe fn create_color_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, VkError> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&info, None) }.setup("create_image_view")
}
