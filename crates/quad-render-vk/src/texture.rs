// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::Path;
use tracing::info;

use crate::device::Gpu;
use crate::error::{SetupContext, VkError};
use crate::resources::{one_shot, GpuBuffer};
use crate::swapchain::create_color_view;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const CHECKER_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;
const CHECKER_LIGHT: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
const CHECKER_DARK: [u8; 4] = [0x30, 0x30, 0x30, 0xff];

/// Tightly packed RGBA8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Pixels {
    pub fn load_png(path: &Path) -> Result<Self, VkError> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        info!("texture: {} ({width}x{height})", path.display());
        Ok(Self {
            width,
            height,
            rgba: img.into_raw(),
        })
    }

    pub fn checkerboard() -> Self {
        let mut rgba = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
        for y in 0..CHECKER_SIZE {
            for x in 0..CHECKER_SIZE {
                let light = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0;
                rgba.extend_from_slice(if light { &CHECKER_LIGHT } else { &CHECKER_DARK });
            }
        }
        Self {
            width: CHECKER_SIZE,
            height: CHECKER_SIZE,
            rgba,
        }
    }

    /// PNG at `path` if given, else the checkerboard.
    pub fn from_option(path: Option<&Path>) -> Result<Self, VkError> {
        match path {
            Some(path) => Self::load_png(path),
            None => Ok(Self::checkerboard()),
        }
    }
}

/// Sampled image + view + sampler, uploaded once and immutable afterwards.
pub struct Texture {
    image: vk::Image,
    memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub fn upload(gpu: &Gpu, pool: vk::CommandPool, pixels: &Pixels) -> Result<Self, VkError> {
        let device = &gpu.device;
        let extent = vk::Extent3D {
            width: pixels.width,
            height: pixels.height,
            depth: 1,
        };

        let staging = GpuBuffer::host_visible(
            gpu,
            pixels.rgba.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let uploaded = staging
            .write(device, &pixels.rgba)
            .and_then(|()| unsafe { create_image(gpu, extent) })
            .and_then(|(image, memory)| {
                let copied = one_shot(gpu, pool, |device, cmd| unsafe {
                    transition(
                        device,
                        cmd,
                        image,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    );
                    let region = vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                        image_extent: extent,
                    };
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging.buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                    transition(
                        device,
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                });
                match copied {
                    Ok(()) => Ok((image, memory)),
                    Err(err) => {
                        unsafe {
                            device.destroy_image(image, None);
                            device.free_memory(memory, None);
                        }
                        Err(err)
                    }
                }
            });
        staging.destroy(device);
        let (image, memory) = uploaded?;

        let view = match unsafe { create_color_view(device, image, TEXTURE_FORMAT) } {
            Ok(view) => view,
            Err(err) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(err);
            }
        };
        let mut texture = Self {
            image,
            memory,
            view,
            sampler: vk::Sampler::null(),
        };
        match unsafe { create_sampler(device) } {
            Ok(sampler) => texture.sampler = sampler,
            Err(err) => {
                texture.destroy(device);
                return Err(err);
            }
        }
        Ok(texture)
    }

    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
            }
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

unsafe fn create_image(
    gpu: &Gpu,
    extent: vk::Extent3D,
) -> Result<(vk::Image, vk::DeviceMemory), VkError> {
    let device = &gpu.device;
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&info, None) }.setup("create_image")?;

    let req = unsafe { device.get_image_memory_requirements(image) };
    let bound = gpu
        .find_memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        .and_then(|index| {
            let alloc = vk::MemoryAllocateInfo::default()
                .allocation_size(req.size)
                .memory_type_index(index);
            unsafe { device.allocate_memory(&alloc, None) }.setup("allocate_memory (texture)")
        })
        .and_then(|memory| {
            match unsafe { device.bind_image_memory(image, memory, 0) }.setup("bind_image_memory") {
                Ok(()) => Ok(memory),
                Err(err) => {
                    unsafe { device.free_memory(memory, None) };
                    Err(err)
                }
            }
        });
    match bound {
        Ok(memory) => Ok((image, memory)),
        Err(err) => {
            unsafe { device.destroy_image(image, None) };
            Err(err)
        }
    }
}

/// Access and stage masks for the two transitions an upload needs.
pub fn transition_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags) {
    match (from, to) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::MEMORY_WRITE,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

unsafe fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(from, to);
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(from)
        .new_layout(to)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

unsafe fn create_sampler(device: &ash::Device) -> Result<vk::Sampler, VkError> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS);
    unsafe { device.create_sampler(&info, None) }.setup("create_sampler")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(p: &Pixels, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * p.width + x) * 4) as usize;
        [p.rgba[i], p.rgba[i + 1], p.rgba[i + 2], p.rgba[i + 3]]
    }

    #[test]
    fn checkerboard_alternates_by_cell() {
        let p = Pixels::checkerboard();
        assert_eq!((p.width, p.height), (256, 256));
        assert_eq!(p.rgba.len(), 256 * 256 * 4);
        assert_eq!(texel(&p, 0, 0), CHECKER_LIGHT);
        assert_eq!(texel(&p, 31, 31), CHECKER_LIGHT);
        assert_eq!(texel(&p, 32, 0), CHECKER_DARK);
        assert_eq!(texel(&p, 0, 32), CHECKER_DARK);
        assert_eq!(texel(&p, 32, 32), CHECKER_LIGHT);
    }

    #[test]
    fn checkerboard_is_opaque() {
        let p = Pixels::checkerboard();
        assert!(p.rgba.chunks_exact(4).all(|px| px[3] == 0xff));
    }

    #[test]
    fn no_path_means_checkerboard() {
        assert_eq!(Pixels::from_option(None).unwrap(), Pixels::checkerboard());
    }

    #[test]
    fn missing_png_is_an_error() {
        let err = Pixels::load_png(Path::new("no/such/texture.png")).unwrap_err();
        assert!(matches!(err, VkError::Texture(_)));
    }

    #[test]
    fn upload_transitions_end_shader_readable() {
        let (_, dst, _, stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let (src, dst, _, _) =
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert!(src.is_empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
    }
}
