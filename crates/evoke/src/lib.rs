//! # evoke
//!
//! A thin object-oriented wrapper over Vulkan: devices, swapchains, render
//! passes, pipelines, buffers, descriptors and textures, with
//! multi-threaded staged buffer upload and secondary-command-buffer
//! recording fanned out across a fixed worker pool.
//!
//! The shape of a program:
//!
//! 1. Create a [`Window`] and a [`Device`] (builder, then
//!    [`DeviceBuilder::create_surface`]).
//! 2. Describe [`Attachment`]s, compose them into [`Subpass`]es and a
//!    [`RenderPass`].
//! 3. Upload [`StaticBuffer`]s / allocate [`DynamicBuffer`]s, bind them
//!    through a [`Descriptor`], and build [`Pipeline`]s from SPIR-V
//!    [`Shader`]s.
//! 4. Hand everything to [`Device::finalize`], then call
//!    [`Device::draw`] once per frame.
//!
//! All waits use the infinite timeout; every native-API failure is fatal
//! and propagates as a [`VulkanError`].

pub mod attachment;
pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod obj;
pub mod pass;
pub mod pipeline;
pub mod shader;
pub mod texture;
pub mod thread_pool;
pub mod vertex;
pub mod vertex_input;
pub mod window;

mod util;

pub use attachment::{Attachment, AttachmentKind};
pub use buffer::{BufferType, DrawBuffer, DynamicBuffer, StaticBuffer};
pub use descriptor::Descriptor;
pub use device::context::{VulkanError, VulkanResult};
pub use device::{Device, DeviceBuilder};
pub use obj::{load_obj, ObjError};
pub use pass::{RenderPass, Subpass};
pub use pipeline::Pipeline;
pub use shader::{Shader, ShaderStage};
pub use texture::Texture;
pub use thread_pool::{partition, ThreadPool};
pub use vertex::Vertex;
pub use vertex_input::VertexInput;
pub use window::{Window, WindowError};
