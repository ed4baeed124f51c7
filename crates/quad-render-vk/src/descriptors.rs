// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{SetupContext, VkError};
use crate::resources::UniformBuffer;
use crate::texture::Texture;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// Uniform block for the vertex stage, combined sampler for the fragment stage.
pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding::default()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX),
        vk::DescriptorSetLayoutBinding::default()
            .binding(SAMPLER_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
    ]
}

pub fn pool_sizes() -> [vk::DescriptorPoolSize; 2] {
    layout_bindings().map(|b| vk::DescriptorPoolSize {
        ty: b.descriptor_type,
        descriptor_count: b.descriptor_count,
    })
}

/// Layout, pool and the single set the recorded command buffers bind.
/// Survives swapchain rebuilds.
pub struct Descriptors {
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl Descriptors {
    pub fn new(
        device: &ash::Device,
        uniforms: &UniformBuffer,
        texture: &Texture,
    ) -> Result<Self, VkError> {
        let bindings = layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .setup("create_descriptor_set_layout")?;

        let sizes = pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(1);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) }
            .setup("create_descriptor_pool")
        {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(err);
            }
        };

        let layouts = [layout];
        let alloc = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = match unsafe { device.allocate_descriptor_sets(&alloc) }
            .setup("allocate_descriptor_sets")
        {
            Ok(sets) => sets[0],
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(err);
            }
        };

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: uniforms.buffer(),
            offset: 0,
            range: UniformBuffer::SIZE,
        }];
        let image_info = [vk::DescriptorImageInfo {
            sampler: texture.sampler,
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(UNIFORM_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(SAMPLER_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info),
        ];
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        Ok(Self { layout, pool, set })
    }

    /// The set is freed with its pool.
    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_split_by_stage() {
        let [ubo, sampler] = layout_bindings();
        assert_eq!(ubo.binding, 0);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(sampler.binding, 1);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_holds_one_of_each() {
        let sizes = pool_sizes();
        assert_eq!(sizes.len(), 2);
        assert!(sizes.iter().all(|s| s.descriptor_count == 1));
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
