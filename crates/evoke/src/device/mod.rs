//! The graphics device: context, swapchain, sync, command pools and the
//! per-frame draw loop.

pub mod commands;
pub mod context;
pub mod framebuffer;
pub mod swapchain;
pub mod sync;

use std::ffi::CString;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;

use crate::buffer::{DrawBuffer, StaticBuffer};
use crate::device::commands::Commands;
use crate::device::context::{
    LogicalDevice, PhysicalDeviceInfo, RawContext, VulkanError, VulkanInstance, VulkanResult,
    WindowSurface,
};
use crate::device::framebuffer::Framebuffer;
use crate::device::swapchain::Swapchain;
use crate::device::sync::Sync;
use crate::pipeline::Pipeline;
use crate::thread_pool::{partition, ThreadPool};
use crate::window::Window;

/// Deferred device construction: collects configuration, then finishes all
/// context setup once the window surface (and therefore the required
/// extension set) is known.
pub struct DeviceBuilder {
    num_threads: usize,
    swapchain_size: u32,
    device_extensions: Vec<CString>,
    validation_layers: Vec<String>,
}

impl DeviceBuilder {
    /// Adds validation layers (the debug construction variant). An empty
    /// list leaves validation off.
    pub fn validation_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    /// Requests an additional device extension beyond the swapchain
    /// extension, which is always present.
    pub fn device_extension(mut self, name: &std::ffi::CStr) -> Self {
        self.device_extensions.push(name.to_owned());
        self
    }

    /// Binds the window surface and performs the deferred setup: instance,
    /// physical-device pick, logical device, depth-format selection,
    /// swapchain, sync objects and per-thread command pools.
    pub fn create_surface(self, window: &Window) -> VulkanResult<Device> {
        let instance = VulkanInstance::new(window, &self.validation_layers)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface_handle = window.create_surface(instance.instance.handle()).map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to create window surface: {e}"))
        })?;
        let surface = WindowSurface {
            surface_loader,
            surface: surface_handle,
        };

        let physical = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface.surface,
            &surface.surface_loader,
            &self.device_extensions,
        )?;

        let logical = LogicalDevice::new(&instance.instance, &physical, &self.device_extensions)?;

        let ctx = RawContext {
            device: logical.device.clone(),
            instance: instance.instance.clone(),
            physical_device: physical.device,
            depth_format: physical.depth_format,
        };

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &instance.instance,
            logical.device.clone(),
            surface.surface,
            &surface.surface_loader,
            &physical,
            vk::Extent2D { width, height },
            self.swapchain_size,
        )?;

        let sync = Sync::new(logical.device.clone(), swapchain.len())?;
        let commands = Commands::new(
            logical.device.clone(),
            physical.graphics_family,
            swapchain.len(),
            self.num_threads,
        )?;

        log::info!(
            "device ready: {} swapchain images, {} worker threads",
            swapchain.len(),
            self.num_threads
        );

        Ok(Device {
            pipelines: Vec::new(),
            framebuffer: None,
            index_buffer: None,
            vertex_buffer: None,
            commands,
            sync,
            swapchain,
            logical,
            surface,
            instance,
            physical,
            ctx,
            thread_pool: ThreadPool::new(self.num_threads),
            num_threads: self.num_threads,
            current_frame: 0,
            resize_required: window.resize_flag(),
        })
    }
}

/// Owner of the graphics context and every shared rendering resource.
///
/// Constructed in two phases ([`Device::builder`] then
/// [`DeviceBuilder::create_surface`]), finalized once with the draw
/// resources, then driven by [`draw`](Device::draw) every frame. Destroyed
/// last; teardown waits for the GPU to go idle.
pub struct Device {
    // Field order is teardown order: draw state first, context last.
    pipelines: Vec<Pipeline>,
    framebuffer: Option<Framebuffer>,
    index_buffer: Option<StaticBuffer>,
    vertex_buffer: Option<DrawBuffer>,
    commands: Commands,
    sync: Sync,
    swapchain: Swapchain,
    logical: LogicalDevice,
    surface: WindowSurface,
    instance: VulkanInstance,
    physical: PhysicalDeviceInfo,
    ctx: RawContext,
    thread_pool: ThreadPool,
    num_threads: usize,
    current_frame: usize,
    resize_required: Arc<AtomicBool>,
}

impl Device {
    /// Starts device construction. `num_threads` fixes the worker pool and
    /// command-pool fan-out; `swapchain_size` is the requested presentable
    /// image count (clamped to surface capabilities at surface binding).
    pub fn builder(num_threads: usize, swapchain_size: u32) -> DeviceBuilder {
        DeviceBuilder {
            num_threads: num_threads.max(1),
            swapchain_size,
            device_extensions: vec![SwapchainLoader::name().to_owned()],
            validation_layers: Vec::new(),
        }
    }

    pub fn ash_device(&self) -> &ash::Device {
        &self.logical.device
    }

    pub(crate) fn raw_context(&self) -> &RawContext {
        &self.ctx
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical.device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.logical.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.logical.present_queue
    }

    pub fn depth_format(&self) -> vk::Format {
        self.physical.depth_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of swapchain images, which is also the frames-in-flight cap.
    pub fn swapchain_size(&self) -> usize {
        self.swapchain.len()
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    /// Per-thread command pools; index by worker index.
    pub fn command_pools(&self) -> &[vk::CommandPool] {
        self.commands.pools()
    }

    pub fn sync(&self) -> &Sync {
        &self.sync
    }

    /// Frame slot the next [`draw`](Device::draw) call will use.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// The vertex buffer handed to [`finalize`](Device::finalize), for
    /// per-frame updates of the dynamic variant.
    pub fn vertex_buffer_mut(&mut self) -> Option<&mut DrawBuffer> {
        self.vertex_buffer.as_mut()
    }

    /// Level-triggered flag raised by the window's resize event.
    pub fn resize_required(&self) -> bool {
        self.resize_required.load(Ordering::Relaxed)
    }

    /// Terminal setup call: takes ownership of the draw resources, builds
    /// the framebuffers and records the draw commands. Must be called
    /// exactly once, after every pipeline and buffer exists.
    pub fn finalize(
        &mut self,
        index_buffer: StaticBuffer,
        vertex_buffer: impl Into<DrawBuffer>,
        pipelines: Vec<Pipeline>,
    ) -> VulkanResult<()> {
        if !self.pipelines.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "finalize called twice".to_string(),
            });
        }
        if pipelines.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "finalize needs at least one pipeline".to_string(),
            });
        }

        let render_pass = pipelines[0].render_pass().clone();
        if pipelines.len() != render_pass.num_subpasses() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} pipelines for {} subpasses",
                    pipelines.len(),
                    render_pass.num_subpasses()
                ),
            });
        }
        self.framebuffer = Some(Framebuffer::new(
            self.logical.device.clone(),
            &render_pass,
            &self.swapchain,
        )?);
        self.index_buffer = Some(index_buffer);
        self.vertex_buffer = Some(vertex_buffer.into());
        self.pipelines = pipelines;

        self.record()
    }

    /// Draws one frame: wait for the frame fence, acquire an image, wait
    /// out any frame still using that image, submit the primary command
    /// buffer, present, advance the frame index. A pending resize (flag or
    /// out-of-date surface) reroutes into the rebuild path.
    pub fn draw(&mut self, window: &mut Window) -> VulkanResult<()> {
        if self.resize_required() {
            self.resize_window(window)?;
        }

        let device = self.logical.device.clone();
        let frame = self.current_frame;
        let frame_fence = self.sync.frame_fence(frame);

        unsafe {
            device
                .wait_for_fences(&[frame_fence], true, u64::MAX)
                .map_err(VulkanError::Api)?;
        }

        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                self.sync.image_available(frame),
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, _)) => index as usize,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resize_window(window)?;
                self.current_frame = 0;
                return Ok(());
            }
            Err(_) => {
                return Err(VulkanError::InitializationFailed(
                    "failed to acquire swap chain image".to_string(),
                ))
            }
        };

        // Another in-flight frame may still be rendering to this image.
        let image_fence = self.sync.image_in_flight(image_index);
        if image_fence != vk::Fence::null() {
            unsafe {
                device
                    .wait_for_fences(&[image_fence], true, u64::MAX)
                    .map_err(VulkanError::Api)?;
            }
        }
        self.sync.mark_image_in_flight(image_index, frame_fence);

        let wait_semaphores = [self.sync.image_available(frame)];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.commands.primary()[image_index]];
        let signal_semaphores = [self.sync.render_finished(frame)];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .reset_fences(&[frame_fence])
                .map_err(VulkanError::Api)?;
            device
                .queue_submit(
                    self.logical.graphics_queue,
                    &[submit_info.build()],
                    frame_fence,
                )
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to submit draw command buffer".to_string(),
                    )
                })?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.logical.present_queue, &present_info)
        };

        match presented {
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resize_window(window)?;
            }
            Ok(false) => {
                if self.resize_required() {
                    self.resize_window(window)?;
                } else {
                    self.current_frame = (frame + 1) % self.swapchain.len();
                }
            }
            Err(_) => {
                return Err(VulkanError::InitializationFailed(
                    "failed to present swap chain image".to_string(),
                ))
            }
        }

        unsafe {
            device
                .queue_wait_idle(self.logical.present_queue)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    /// Lazy resize: tears down and rebuilds the swapchain, attachment
    /// images, framebuffers and pipelines, then re-records the draw
    /// commands. Blocks while the window is minimized (zero extent).
    fn resize_window(&mut self, window: &mut Window) -> VulkanResult<()> {
        loop {
            let (width, height) = window.framebuffer_size();
            if width > 0 && height > 0 {
                break;
            }
            window.wait_events();
        }

        unsafe {
            self.logical
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)?;
        }

        let (width, height) = window.framebuffer_size();
        self.swapchain.recreate(
            self.surface.surface,
            &self.surface.surface_loader,
            &self.physical,
            vk::Extent2D { width, height },
        )?;
        self.sync.clear_images_in_flight();
        self.commands.resize(self.swapchain.len())?;

        if !self.pipelines.is_empty() {
            let render_pass = self.pipelines[0].render_pass().clone();
            let extent = self.swapchain.extent();
            render_pass.recreate_attachments(extent)?;

            self.framebuffer = Some(Framebuffer::new(
                self.logical.device.clone(),
                &render_pass,
                &self.swapchain,
            )?);

            for pipeline in &mut self.pipelines {
                pipeline.recreate(extent)?;
            }

            self.record()?;
        }

        self.resize_required.store(false, Ordering::Relaxed);
        log::info!("swapchain rebuilt at {width}x{height}");
        Ok(())
    }

    /// Records every swapchain image's primary command buffer. Each subpass
    /// fans secondary-buffer recording out across the worker pool: worker
    /// `i` draws the `i`-th contiguous slice of the index buffer (last
    /// slice absorbs the remainder). Recording is concurrent; execution
    /// order is fixed at thread-index order.
    fn record(&mut self) -> VulkanResult<()> {
        let device = self.ctx.device.clone();

        self.commands.free_secondary();

        let index_buffer = self.index_buffer.as_ref().ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: "record called before finalize".to_string(),
            }
        })?;
        let vertex_buffer = self.vertex_buffer.as_ref().ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: "record called before finalize".to_string(),
            }
        })?;
        let framebuffers = self
            .framebuffer
            .as_ref()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "record called before finalize".to_string(),
            })?
            .handles()
            .to_vec();

        let render_pass = self.pipelines[0].render_pass().clone();
        let render_pass_handle = render_pass.handle();
        let clear_values = render_pass.clear_values().to_vec();
        let num_subpasses = render_pass.num_subpasses();
        let extent = self.swapchain.extent();
        let primary = self.commands.primary().to_vec();
        let pools = self.commands.pools().to_vec();
        let index_handle = index_buffer.handle();
        let ranges = partition(index_buffer.num_elements(), self.num_threads);

        for (image_index, &primary_buffer) in primary.iter().enumerate() {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            unsafe {
                device
                    .begin_command_buffer(primary_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass_handle)
                .framebuffer(framebuffers[image_index])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            for pass in 0..num_subpasses {
                unsafe {
                    if pass == 0 {
                        device.cmd_begin_render_pass(
                            primary_buffer,
                            &render_pass_begin,
                            vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
                        );
                    } else {
                        device.cmd_next_subpass(
                            primary_buffer,
                            vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
                        );
                    }
                }

                let pipeline = &self.pipelines[pass];
                let pipeline_handle = pipeline.handle();
                let layout = pipeline.layout();
                let descriptor_set = pipeline.descriptor().map(|d| d.sets()[image_index]);
                let vertex_handle = vertex_buffer.buffer(image_index);
                let framebuffer = framebuffers[image_index];

                let mut slots: Vec<Option<VulkanResult<vk::CommandBuffer>>> =
                    ranges.iter().map(|_| None).collect();

                self.thread_pool.scope(|s| {
                    for ((range, slot), &pool) in
                        ranges.iter().zip(slots.iter_mut()).zip(pools.iter())
                    {
                        let device = &device;
                        let range = range.clone();
                        s.spawn(move || {
                            *slot = Some(record_secondary(
                                device,
                                pool,
                                render_pass_handle,
                                framebuffer,
                                pass as u32,
                                pipeline_handle,
                                layout,
                                descriptor_set,
                                vertex_handle,
                                index_handle,
                                range,
                            ));
                        });
                    }
                });

                let mut executed = Vec::with_capacity(slots.len());
                for (thread, slot) in slots.into_iter().enumerate() {
                    let buffer = slot.ok_or_else(|| VulkanError::InvalidOperation {
                        reason: "recording worker did not run".to_string(),
                    })??;
                    self.commands.track_secondary(thread, buffer);
                    executed.push(buffer);
                }

                unsafe {
                    device.cmd_execute_commands(primary_buffer, &executed);
                }
            }

            unsafe {
                device.cmd_end_render_pass(primary_buffer);
                device
                    .end_command_buffer(primary_buffer)
                    .map_err(|_| {
                        VulkanError::InitializationFailed(
                            "failed to record primary command buffer".to_string(),
                        )
                    })?;
            }
        }

        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.logical.device.device_wait_idle();
        }
    }
}

/// Records one worker's secondary command buffer: bind pipeline, vertex and
/// index buffers, the image's descriptor set, then a single indexed draw
/// over this worker's slice. Runs on a worker thread against its own pool.
#[allow(clippy::too_many_arguments)]
fn record_secondary(
    device: &ash::Device,
    pool: vk::CommandPool,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    subpass: u32,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    descriptor_set: Option<vk::DescriptorSet>,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    range: Range<usize>,
) -> VulkanResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::SECONDARY)
        .command_buffer_count(1);

    let buffer = unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?[0]
    };

    let inheritance = vk::CommandBufferInheritanceInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .subpass(subpass);

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
        .inheritance_info(&inheritance);

    unsafe {
        device
            .begin_command_buffer(buffer, &begin_info)
            .map_err(VulkanError::Api)?;

        device.cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        device.cmd_bind_vertex_buffers(buffer, 0, &[vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(buffer, index_buffer, 0, vk::IndexType::UINT32);
        if let Some(set) = descriptor_set {
            device.cmd_bind_descriptor_sets(
                buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
        device.cmd_draw_indexed(buffer, range.len() as u32, 1, range.start as u32, 0, 0);

        device
            .end_command_buffer(buffer)
            .map_err(VulkanError::Api)?;
    }

    Ok(buffer)
}
