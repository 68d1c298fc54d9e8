//! GPU buffers: staged-immutable and persistently-mapped variants.
//!
//! `StaticBuffer` uploads once through per-thread staging buffers and is
//! immutable afterwards. The element range is split evenly across the
//! device's worker threads (remainder folded into the last slice); each
//! worker stages and records its copy through its own command pool, then the
//! calling thread submits every partition's command buffer in one batch and
//! waits for the queue to drain. `DynamicBuffer` keeps one host-visible,
//! persistently-mapped allocation per swapchain image and rewrites all of
//! them on every update.

use ash::vk;
use bytemuck::Pod;

use crate::device::context::{RawContext, VulkanError, VulkanResult};
use crate::device::Device;
use crate::thread_pool::partition;
use crate::util;

/// What a buffer binds as during draw recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Vertex,
    Index,
    Uniform,
}

impl BufferType {
    fn usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferType::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferType::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferType::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }
}

struct StagingCopy {
    staging: vk::Buffer,
    memory: vk::DeviceMemory,
    command: vk::CommandBuffer,
    pool: vk::CommandPool,
}

/// A device-local buffer uploaded once and immutable afterwards.
pub struct StaticBuffer {
    ctx: RawContext,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    buffer_size: vk::DeviceSize,
    num_elements: usize,
}

impl StaticBuffer {
    /// Uploads `data` into a new device-local buffer using the device's
    /// thread pool for the staged copy.
    pub fn new<T: Pod>(
        device: &Device,
        data: &[T],
        buffer_type: BufferType,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer size is 0".to_string(),
            });
        }

        let ctx = device.raw_context().clone();
        let element_size = std::mem::size_of::<T>();
        let num_elements = data.len();
        let buffer_size = bytes.len() as vk::DeviceSize;

        let (buffer, memory) = util::create_buffer(
            &ctx,
            buffer_size,
            vk::BufferUsageFlags::TRANSFER_DST | buffer_type.usage(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        // One disjoint destination slice per worker, each staged and
        // recorded through that worker's own command pool.
        let ranges = partition(num_elements, device.num_threads());
        let pools = device.command_pools();
        let mut jobs: Vec<Option<VulkanResult<StagingCopy>>> =
            ranges.iter().map(|_| None).collect();

        device.thread_pool().scope(|s| {
            for ((range, slot), &pool) in ranges.iter().zip(jobs.iter_mut()).zip(pools.iter()) {
                let ctx = &ctx;
                let slice = &bytes[range.start * element_size..range.end * element_size];
                let dst_offset = (range.start * element_size) as vk::DeviceSize;
                s.spawn(move || {
                    *slot = Some(stage_partition(ctx, pool, buffer, slice, dst_offset));
                });
            }
        });

        let mut copies = Vec::with_capacity(jobs.len());
        let mut first_error = None;
        for job in jobs {
            match job {
                Some(Ok(copy)) => copies.push(copy),
                Some(Err(e)) => first_error = first_error.or(Some(e)),
                None => {
                    first_error = first_error.or(Some(VulkanError::InvalidOperation {
                        reason: "upload worker did not run".to_string(),
                    }));
                }
            }
        }

        let submit_result = if first_error.is_none() {
            let commands: Vec<vk::CommandBuffer> = copies.iter().map(|c| c.command).collect();
            let submit_info = vk::SubmitInfo::builder().command_buffers(&commands);
            unsafe {
                device
                    .ash_device()
                    .queue_submit(
                        device.graphics_queue(),
                        &[submit_info.build()],
                        vk::Fence::null(),
                    )
                    .and_then(|()| device.ash_device().queue_wait_idle(device.graphics_queue()))
                    .map_err(VulkanError::Api)
            }
        } else {
            Ok(())
        };

        // Staging resources are one-shot regardless of the outcome.
        for copy in &copies {
            unsafe {
                ctx.device.free_command_buffers(copy.pool, &[copy.command]);
                ctx.device.destroy_buffer(copy.staging, None);
                ctx.device.free_memory(copy.memory, None);
            }
        }

        let outcome = first_error.map_or(submit_result, Err);
        if let Err(e) = outcome {
            unsafe {
                ctx.device.destroy_buffer(buffer, None);
                ctx.device.free_memory(memory, None);
            }
            return Err(e);
        }

        Ok(Self {
            ctx,
            buffer,
            memory,
            buffer_size,
            num_elements,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    /// Copies the device-local contents back into host memory through a
    /// temporary staging buffer. Debug aid for verifying staged uploads.
    pub fn read_back(&self, device: &Device) -> VulkanResult<Vec<u8>> {
        let (staging, staging_memory) = util::create_buffer(
            &self.ctx,
            self.buffer_size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let pool = device.command_pools()[0];
        let result = (|| -> VulkanResult<Vec<u8>> {
            let command = util::begin_single_time_commands(&self.ctx.device, pool)?;
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: self.buffer_size,
            };
            unsafe {
                self.ctx
                    .device
                    .cmd_copy_buffer(command, self.buffer, staging, &[region]);
            }
            util::end_single_time_commands(
                &self.ctx.device,
                device.graphics_queue(),
                pool,
                command,
            )?;

            let mut contents = vec![0u8; self.buffer_size as usize];
            unsafe {
                let mapped = self
                    .ctx
                    .device
                    .map_memory(
                        staging_memory,
                        0,
                        self.buffer_size,
                        vk::MemoryMapFlags::empty(),
                    )
                    .map_err(VulkanError::Api)?;
                std::ptr::copy_nonoverlapping(
                    mapped.cast::<u8>(),
                    contents.as_mut_ptr(),
                    contents.len(),
                );
                self.ctx.device.unmap_memory(staging_memory);
            }
            Ok(contents)
        })();

        unsafe {
            self.ctx.device.destroy_buffer(staging, None);
            self.ctx.device.free_memory(staging_memory, None);
        }

        result
    }
}

impl Drop for StaticBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
            self.ctx.device.free_memory(self.memory, None);
        }
    }
}

/// Stages one partition's bytes and records its copy command. Runs on a
/// worker thread; touches only that worker's command pool.
fn stage_partition(
    ctx: &RawContext,
    pool: vk::CommandPool,
    dst_buffer: vk::Buffer,
    bytes: &[u8],
    dst_offset: vk::DeviceSize,
) -> VulkanResult<StagingCopy> {
    let size = bytes.len() as vk::DeviceSize;
    let (staging, memory) = util::create_buffer(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let cleanup = |e: VulkanError| {
        unsafe {
            ctx.device.destroy_buffer(staging, None);
            ctx.device.free_memory(memory, None);
        }
        e
    };

    unsafe {
        let mapped = ctx
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
            .map_err(VulkanError::Api)
            .map_err(cleanup)?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
        ctx.device.unmap_memory(memory);
    }

    let command =
        util::begin_single_time_commands(&ctx.device, pool).map_err(cleanup)?;

    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset,
        size,
    };
    unsafe {
        ctx.device
            .cmd_copy_buffer(command, staging, dst_buffer, &[region]);
        ctx.device
            .end_command_buffer(command)
            .map_err(VulkanError::Api)
            .map_err(cleanup)?;
    }

    Ok(StagingCopy {
        staging,
        memory,
        command,
        pool,
    })
}

/// A host-visible buffer with one persistently-mapped copy per swapchain
/// image, rewritable every frame.
pub struct DynamicBuffer {
    device: ash::Device,
    buffers: Vec<vk::Buffer>,
    memories: Vec<vk::DeviceMemory>,
    mapped: Vec<*mut std::ffi::c_void>,
    buffer_size: vk::DeviceSize,
    num_elements: usize,
}

impl DynamicBuffer {
    /// Allocates `buffer_size` bytes per swapchain image, persistently
    /// mapped. Typical use: per-frame uniform data.
    pub fn new(
        device: &Device,
        buffer_size: vk::DeviceSize,
        buffer_type: BufferType,
    ) -> VulkanResult<Self> {
        Self::allocate(device, buffer_size, 1, buffer_type)
    }

    /// Allocates room for `data` per swapchain image and performs the first
    /// update. Used for vertex data rewritten every frame.
    pub fn with_data<T: Pod>(
        device: &Device,
        data: &[T],
        buffer_type: BufferType,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::allocate(
            device,
            bytes.len() as vk::DeviceSize,
            data.len(),
            buffer_type,
        )?;
        buffer.update_bytes(bytes);
        Ok(buffer)
    }

    fn allocate(
        device: &Device,
        buffer_size: vk::DeviceSize,
        num_elements: usize,
        buffer_type: BufferType,
    ) -> VulkanResult<Self> {
        if buffer_size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer size is 0".to_string(),
            });
        }

        let ctx = device.raw_context();
        let swapchain_size = device.swapchain_size();

        let mut dynamic = Self {
            device: ctx.device.clone(),
            buffers: Vec::with_capacity(swapchain_size),
            memories: Vec::with_capacity(swapchain_size),
            mapped: Vec::with_capacity(swapchain_size),
            buffer_size,
            num_elements,
        };

        for _ in 0..swapchain_size {
            let (buffer, memory) = util::create_buffer(
                ctx,
                buffer_size,
                buffer_type.usage(),
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            let mapped = unsafe {
                ctx.device
                    .map_memory(memory, 0, buffer_size, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)?
            };
            dynamic.buffers.push(buffer);
            dynamic.memories.push(memory);
            dynamic.mapped.push(mapped);
        }

        Ok(dynamic)
    }

    /// Writes the same bytes into every swapchain image's mapping. Frames
    /// already in flight see the new contents too; see the design notes.
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.buffer_size as usize);
        for &mapped in &self.mapped {
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), len);
            }
        }
    }

    /// Typed variant of [`update_bytes`](Self::update_bytes).
    pub fn update<T: Pod>(&mut self, data: &[T]) {
        self.update_bytes(bytemuck::cast_slice(data));
    }

    /// The buffer backing a given swapchain image.
    pub fn buffer(&self, image_index: usize) -> vk::Buffer {
        self.buffers[image_index]
    }

    pub fn buffers(&self) -> &[vk::Buffer] {
        &self.buffers
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }
}

impl Drop for DynamicBuffer {
    fn drop(&mut self) {
        unsafe {
            for (&buffer, &memory) in self.buffers.iter().zip(self.memories.iter()) {
                self.device.unmap_memory(memory);
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
        }
    }
}

/// Either buffer variant, bindable as the vertex source during recording.
pub enum DrawBuffer {
    Static(StaticBuffer),
    Dynamic(DynamicBuffer),
}

impl DrawBuffer {
    /// The handle to bind while recording commands for `image_index`.
    pub fn buffer(&self, image_index: usize) -> vk::Buffer {
        match self {
            DrawBuffer::Static(buffer) => buffer.handle(),
            DrawBuffer::Dynamic(buffer) => buffer.buffer(image_index),
        }
    }

    pub fn num_elements(&self) -> usize {
        match self {
            DrawBuffer::Static(buffer) => buffer.num_elements(),
            DrawBuffer::Dynamic(buffer) => buffer.num_elements(),
        }
    }

    /// The dynamic variant, if that is what this is; static buffers are
    /// immutable after upload.
    pub fn as_dynamic_mut(&mut self) -> Option<&mut DynamicBuffer> {
        match self {
            DrawBuffer::Static(_) => None,
            DrawBuffer::Dynamic(buffer) => Some(buffer),
        }
    }
}

impl From<StaticBuffer> for DrawBuffer {
    fn from(buffer: StaticBuffer) -> Self {
        DrawBuffer::Static(buffer)
    }
}

impl From<DynamicBuffer> for DrawBuffer {
    fn from(buffer: DynamicBuffer) -> Self {
        DrawBuffer::Dynamic(buffer)
    }
}
