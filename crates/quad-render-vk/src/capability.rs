// SPDX-License-Identifier: CEPL-1.0
//! Surface capability queries and the deterministic choices derived from them.
use ash::khr::surface;
use ash::vk;
use quad_render::RenderSize;

use crate::error::{SetupContext, VkError};

/// `current_extent.width` takes this value when the surface lets the swapchain pick its size.
pub const EXTENT_FROM_SWAPCHAIN: u32 = u32::MAX;

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Everything the surface reports for one physical device, fetched fresh per chain build.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub(crate) unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, VkError> {
        let capabilities = unsafe { surface_capabilities(loader, phys, surface)? };
        let formats = unsafe { loader.get_physical_device_surface_formats(phys, surface) }
            .setup("get_physical_device_surface_formats")?;
        let present_modes =
            unsafe { loader.get_physical_device_surface_present_modes(phys, surface) }
                .setup("get_physical_device_surface_present_modes")?;
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Raw capabilities, never cached: the extent bounds move with the window.
pub(crate) unsafe fn surface_capabilities(
    loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<vk::SurfaceCapabilitiesKHR, VkError> {
    unsafe { loader.get_physical_device_surface_capabilities(phys, surface) }
        .setup("get_physical_device_surface_capabilities")
}

/// Sentinel surfaces take the requested size clamped into bounds; fixed-size
/// surfaces dictate their current extent.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != EXTENT_FROM_SWAPCHAIN {
        return caps.current_extent;
    }
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: requested.width.clamp(min.width, max.width.max(min.width)),
        height: requested.height.clamp(min.height, max.height.max(min.height)),
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    match formats {
        [] => PREFERRED_FORMAT,
        [only] if only.format == vk::Format::UNDEFINED => PREFERRED_FORMAT,
        _ => formats
            .iter()
            .copied()
            .find(|f| {
                f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
            })
            .unwrap_or(formats[0]),
    }
}

/// MAILBOX, then IMMEDIATE, then the always-available FIFO.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count.saturating_add(1);
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Choices for one chain generation. Never mutated; a rebuild derives a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    /// Requested minimum; the backend may hand out more images.
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl ChainConfig {
    pub fn select(support: &SurfaceSupport, requested: RenderSize) -> Self {
        let caps = &support.capabilities;
        let surface_format = choose_surface_format(&support.formats);
        Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(caps, requested),
            image_count: image_count(caps),
            pre_transform: caps.current_transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn sentinel(min_ext: (u32, u32), max_ext: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D {
                width: min_ext.0,
                height: min_ext.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_ext.0,
                height: max_ext.1,
            },
            ..caps(2, 0, (EXTENT_FROM_SWAPCHAIN, EXTENT_FROM_SWAPCHAIN))
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn sentinel_extent_passes_in_range_request_through() {
        let c = sentinel((100, 100), (2000, 2000));
        let e = choose_extent(&c, RenderSize::new(640, 480));
        assert_eq!((e.width, e.height), (640, 480));
    }

    #[test]
    fn sentinel_extent_clamps_each_axis() {
        let c = sentinel((100, 100), (2000, 1000));
        let e = choose_extent(&c, RenderSize::new(50, 5000));
        assert_eq!((e.width, e.height), (100, 1000));
        let e = choose_extent(&c, RenderSize::new(9999, 10));
        assert_eq!((e.width, e.height), (2000, 100));
    }

    #[test]
    fn fixed_extent_comes_from_the_surface() {
        let c = caps(2, 3, (800, 600));
        let e = choose_extent(&c, RenderSize::new(1024, 768));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn preferred_format_wins_wherever_it_sits() {
        let other = fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let unorm_wrong_cs = fmt(
            vk::Format::B8G8R8A8_UNORM,
            vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        );
        for lists in [
            vec![PREFERRED_FORMAT, other, unorm_wrong_cs],
            vec![other, PREFERRED_FORMAT, unorm_wrong_cs],
            vec![other, unorm_wrong_cs, PREFERRED_FORMAT],
        ] {
            let chosen = choose_surface_format(&lists);
            assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
            assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        }
    }

    #[test]
    fn undefined_single_entry_means_anything_goes() {
        let chosen = choose_surface_format(&[fmt(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )]);
        assert_eq!(chosen.format, PREFERRED_FORMAT.format);
        assert_eq!(chosen.color_space, PREFERRED_FORMAT.color_space);
    }

    #[test]
    fn without_preferred_format_the_first_is_used() {
        let first = fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let second = fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let chosen = choose_surface_format(&[first, second]);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn empty_format_list_falls_back_to_default() {
        let chosen = choose_surface_format(&[]);
        assert_eq!(chosen.format, PREFERRED_FORMAT.format);
    }

    #[test]
    fn present_mode_priority() {
        use vk::PresentModeKHR as P;
        assert_eq!(choose_present_mode(&[P::FIFO, P::MAILBOX]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::IMMEDIATE, P::MAILBOX]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::FIFO, P::IMMEDIATE]), P::IMMEDIATE);
        assert_eq!(choose_present_mode(&[P::FIFO_RELAXED, P::FIFO]), P::FIFO);
        assert_eq!(choose_present_mode(&[P::FIFO]), P::FIFO);
        assert_eq!(choose_present_mode(&[]), P::FIFO);
    }

    #[test]
    fn image_count_respects_bounds() {
        assert_eq!(image_count(&caps(2, 3, (800, 600))), 3);
        assert_eq!(image_count(&caps(3, 3, (800, 600))), 3);
        assert_eq!(image_count(&caps(2, 0, (800, 600))), 3);
        assert_eq!(image_count(&caps(1, 8, (800, 600))), 2);
    }

    #[test]
    fn image_count_saturates_at_the_top() {
        assert_eq!(image_count(&caps(u32::MAX, 0, (800, 600))), u32::MAX);
        assert_eq!(image_count(&caps(u32::MAX, u32::MAX, (800, 600))), u32::MAX);
    }

    #[test]
    fn two_and_three_image_scenario() {
        let support = SurfaceSupport {
            capabilities: caps(2, 3, (800, 600)),
            formats: vec![PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let cfg = ChainConfig::select(&support, RenderSize::new(800, 600));
        assert_eq!(cfg.image_count, 3);
        assert_eq!((cfg.extent.width, cfg.extent.height), (800, 600));
        assert_eq!(cfg.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn same_inputs_give_equal_configs() {
        let support = SurfaceSupport {
            capabilities: sentinel((1, 1), (4096, 4096)),
            formats: vec![
                fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                PREFERRED_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let first = ChainConfig::select(&support, RenderSize::new(640, 480));
        let second = ChainConfig::select(&support, RenderSize::new(640, 480));
        assert_eq!(first, second);
        assert_eq!((first.extent.width, first.extent.height), (640, 480));
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
    }
}
