// SPDX-License-Identifier: CEPL-1.0
//! Render pass + pipeline pinned to one chain's format and extent.
use ash::vk;
use std::ffi::CStr;

use crate::error::{SetupContext, VkError};
use crate::shaders::ShaderSet;
use crate::swapchain::Swapchain;

const ENTRY_POINT: &CStr = c"main";

/// Vertex buffer description the pipeline's input state is built from.
#[derive(Clone, Debug)]
pub struct VertexLayout {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Never patched in place: a new format or extent means a new target.
pub struct RenderTarget {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl RenderTarget {
    pub fn build(
        device: &ash::Device,
        chain: &Swapchain,
        shaders: &ShaderSet,
        vertex_layout: &VertexLayout,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self, VkError> {
        unsafe {
            let render_pass = build_render_pass(device, chain.format())?;
            let layout = match build_pipeline_layout(device, &[set_layout]) {
                Ok(layout) => layout,
                Err(err) => {
                    device.destroy_render_pass(render_pass, None);
                    return Err(err);
                }
            };
            let pipeline = match build_pipeline(
                device,
                chain.extent(),
                shaders,
                vertex_layout,
                layout,
                render_pass,
            ) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    device.destroy_pipeline_layout(layout, None);
                    device.destroy_render_pass(render_pass, None);
                    return Err(err);
                }
            };
            Ok(Self {
                render_pass,
                layout,
                pipeline,
            })
        }
    }

    pub fn teardown(self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Cleared on load, stored, handed to presentation at the end of the pass.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Holds the pass's color writes until presentation has released the image.
pub fn present_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

/// Full-extent viewport and scissor, baked into the pipeline.
pub fn viewport_and_scissor(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

pub unsafe fn build_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, VkError> {
    let attachments = [color_attachment(format)];
    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)];
    let dependencies = [present_dependency()];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&info, None) }.setup("create_render_pass")
}

pub unsafe fn build_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout, VkError> {
    let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    unsafe { device.create_pipeline_layout(&info, None) }.setup("create_pipeline_layout")
}

pub unsafe fn build_pipeline(
    device: &ash::Device,
    extent: vk::Extent2D,
    shaders: &ShaderSet,
    vertex_layout: &VertexLayout,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
) -> Result<vk::Pipeline, VkError> {
    let vs = unsafe { create_shader_module(device, &shaders.vertex)? };
    let fs = match unsafe { create_shader_module(device, &shaders.fragment) } {
        Ok(fs) => fs,
        Err(err) => {
            unsafe { device.destroy_shader_module(vs, None) };
            return Err(err);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vs)
            .name(ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fs)
            .name(ENTRY_POINT),
    ];

    let bindings = [vertex_layout.binding];
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&vertex_layout.attributes);
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Static viewport: a resize rebuilds the whole pipeline.
    let (viewport, scissor) = viewport_and_scissor(extent);
    let viewports = [viewport];
    let scissors = [scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let raster = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Straight overwrite, all channels.
    let blend_attachments = [vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    }];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&blend_attachments);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&raster)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let created = unsafe {
        device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&info),
            None,
        )
    };
    unsafe {
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);
    }

    match created {
        Ok(pipelines) => Ok(pipelines[0]),
        Err((_, result)) => Err(VkError::Setup {
            what: "create_graphics_pipelines",
            result,
        }),
    }
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
) -> Result<vk::ShaderModule, VkError> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&info, None) }.setup("create_shader_module")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let a = color_attachment(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(a.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn dependency_gates_color_output_from_outside() {
        let d = present_dependency();
        assert_eq!(d.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(d.dst_subpass, 0);
        assert_eq!(d.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(d.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        let color_rw =
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        assert!(d.dst_access_mask.contains(color_rw));
    }

    #[test]
    fn viewport_covers_whole_extent() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let (vp, sc) = viewport_and_scissor(extent);
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 640.0, 480.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!((sc.extent.width, sc.extent.height), (640, 480));
    }
}
