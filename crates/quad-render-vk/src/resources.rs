// SPDX-License-Identifier: CEPL-1.0
//! Quad geometry, device buffers and the per-frame uniform block.
use ash::vk;
use bytemuck::{Pod, Zeroable};
use quad_math::UniformBlock;
use std::mem::{offset_of, size_of};

use crate::device::Gpu;
use crate::error::{SetupContext, VkError};
use crate::render_target::VertexLayout;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 2], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    pub fn layout() -> VertexLayout {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        VertexLayout {
            binding,
            attributes: vec![
                attribute(0, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
                attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex_coord)),
            ],
        }
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// A buffer and the memory bound to it. Freed explicitly with `destroy`.
#[derive(Clone, Copy, Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn new(
        gpu: &Gpu,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self, VkError> {
        let device = &gpu.device;
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&info, None) }.setup("create_buffer")?;

        let req = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = gpu
            .find_memory_type(req.memory_type_bits, props)
            .and_then(|index| {
                let alloc = vk::MemoryAllocateInfo::default()
                    .allocation_size(req.size)
                    .memory_type_index(index);
                unsafe { device.allocate_memory(&alloc, None) }.setup("allocate_memory")
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let this = Self {
            buffer,
            memory,
            size,
        };
        let bound =
            unsafe { device.bind_buffer_memory(buffer, memory, 0) }.setup("bind_buffer_memory");
        if let Err(err) = bound {
            this.destroy(device);
            return Err(err);
        }
        Ok(this)
    }

    /// Host-visible, coherent.
    pub fn host_visible(
        gpu: &Gpu,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, VkError> {
        Self::new(
            gpu,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Copies `bytes` into the start of a host-visible buffer.
    pub fn write(&self, device: &ash::Device, bytes: &[u8]) -> Result<(), VkError> {
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .setup("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Records work into a throwaway command buffer, submits it on the graphics
/// queue and waits for the queue to drain.
pub fn one_shot<F>(gpu: &Gpu, pool: vk::CommandPool, record: F) -> Result<(), VkError>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let device = &gpu.device;
    let alloc = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let cmds = unsafe { device.allocate_command_buffers(&alloc) }
        .setup("allocate_command_buffers")?;

    let result = (|| {
        let cmd = cmds[0];
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin) }.setup("begin_command_buffer")?;
        record(device, cmd);
        unsafe { device.end_command_buffer(cmd) }.setup("end_command_buffer")?;

        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            device
                .queue_submit(gpu.graphics_queue, &[submit], vk::Fence::null())
                .setup("queue_submit (upload)")?;
            device
                .queue_wait_idle(gpu.graphics_queue)
                .setup("queue_wait_idle (upload)")
        }
    })();

    unsafe { device.free_command_buffers(pool, &cmds) };
    result
}

/// Host data → staging → device-local buffer with `usage | TRANSFER_DST`.
pub fn upload_device_local(
    gpu: &Gpu,
    pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<GpuBuffer, VkError> {
    let size = bytes.len() as vk::DeviceSize;
    let staging = GpuBuffer::host_visible(gpu, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
    let result = staging.write(&gpu.device, bytes).and_then(|()| {
        let dst = GpuBuffer::new(
            gpu,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let copied = one_shot(gpu, pool, |device, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, &[region]) };
        });
        match copied {
            Ok(()) => Ok(dst),
            Err(err) => {
                dst.destroy(&gpu.device);
                Err(err)
            }
        }
    });
    staging.destroy(&gpu.device);
    result
}

/// The quad's vertex + index buffers, device-local.
pub struct QuadMesh {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl QuadMesh {
    pub fn upload(gpu: &Gpu, pool: vk::CommandPool) -> Result<Self, VkError> {
        let vertices = upload_device_local(
            gpu,
            pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let indices = match upload_device_local(
            gpu,
            pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
        ) {
            Ok(indices) => indices,
            Err(err) => {
                vertices.destroy(&gpu.device);
                return Err(err);
            }
        };
        Ok(Self {
            vertices,
            indices,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    pub fn destroy(self, device: &ash::Device) {
        self.indices.destroy(device);
        self.vertices.destroy(device);
    }
}

/// Host-visible storage for one `UniformBlock`, rewritten every frame.
pub struct UniformBuffer {
    inner: GpuBuffer,
}

impl UniformBuffer {
    pub const SIZE: vk::DeviceSize = size_of::<UniformBlock>() as vk::DeviceSize;

    pub fn new(gpu: &Gpu) -> Result<Self, VkError> {
        let inner = GpuBuffer::host_visible(gpu, Self::SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
        Ok(Self { inner })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.inner.buffer
    }

    pub fn update(&self, device: &ash::Device, block: &UniformBlock) -> Result<(), VkError> {
        self.inner.write(device, bytemuck::bytes_of(block))
    }

    pub fn destroy(self, device: &ash::Device) {
        self.inner.destroy(device);
    }
}
