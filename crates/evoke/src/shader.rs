//! Precompiled SPIR-V shader modules.
//!
//! No compilation happens here: shaders arrive as SPIR-V blobs on disk and
//! are handed to the driver as-is.

use std::ffi::CStr;
use std::fs;
use std::path::Path;

use ash::vk;

use crate::device::context::{VulkanError, VulkanResult};
use crate::device::Device;
use crate::util;

/// The pipeline stage a shader module is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// A shader module loaded from a SPIR-V file.
pub struct Shader {
    device: ash::Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads the SPIR-V blob at `path` and creates the module.
    pub fn new<P: AsRef<Path>>(
        device: &Device,
        path: P,
        stage: ShaderStage,
    ) -> VulkanResult<Self> {
        let bytes = fs::read(path.as_ref()).map_err(|e| {
            VulkanError::InitializationFailed(format!(
                "failed to read shader file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_bytes(device, &bytes, stage)
    }

    /// Creates the module from in-memory SPIR-V bytes.
    pub fn from_bytes(device: &Device, bytes: &[u8], stage: ShaderStage) -> VulkanResult<Self> {
        let words = util::spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe {
            device
                .ash_device()
                .create_shader_module(&create_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed("failed to create shader module".to_string())
                })?
        };

        Ok(Self {
            device: device.ash_device().clone(),
            module,
            stage,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage create-info for pipeline construction. The entry point is
    /// always `main`.
    pub(crate) fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        const ENTRY_POINT: &CStr =
            unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.flags())
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
