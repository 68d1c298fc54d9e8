//! Vulkan context establishment: instance, surface, physical and logical device.
//!
//! Everything here is created once during [`Device`](super::Device)
//! construction and destroyed last. Each wrapper owns exactly one native
//! handle (or group of handles created together) and releases it on drop.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Entry, Instance};
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::window::Window;

/// Vulkan-specific error types.
///
/// Every failure is fatal: callers propagate with `?` up to `main`, which
/// logs the message and exits. There is no recoverable subset.
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Context or resource initialization failed
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for an allocation
    #[error("failed to find a suitable memory type")]
    NoSuitableMemoryType,
}

/// Result type for Vulkan operations.
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Cheap bundle of the handles most components need to create and destroy
/// resources. Cloned into buffers, attachments and textures so they can
/// recreate themselves without reaching back into [`Device`](super::Device)
/// internals.
#[derive(Clone)]
pub(crate) struct RawContext {
    pub device: ash::Device,
    pub instance: Instance,
    pub physical_device: vk::PhysicalDevice,
    pub depth_format: vk::Format,
}

/// Vulkan instance wrapper with optional validation layers.
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Creates a Vulkan instance using the window's required surface
    /// extensions. A non-empty `validation_layers` list enables the layers
    /// and installs a debug messenger routing into the `log` facade.
    pub fn new(window: &Window, validation_layers: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("failed to load Vulkan: {e:?}")))?;

        let app_name = CString::new("evoke").map_err(|_| {
            VulkanError::InitializationFailed("application name contains a nul byte".to_string())
        })?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window.required_instance_extensions().map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to get surface extensions: {e}"))
        })?;

        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| {
                VulkanError::InitializationFailed("extension name contains a nul byte".to_string())
            })?;

        let mut extensions: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let enable_validation = !validation_layers.is_empty();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<CString> = validation_layers
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| {
                VulkanError::InitializationFailed("layer name contains a nul byte".to_string())
            })?;
        let layer_names_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(debug_messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[vulkan] {message_type:?} - {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// RAII wrapper for the window surface.
pub struct WindowSurface {
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Surface handle
    pub surface: vk::SurfaceKHR,
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Selected physical device with its queue families and depth format.
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Depth-stencil format supported by this device
    pub depth_format: vk::Format,
}

impl PhysicalDeviceInfo {
    /// Scans the system for a GPU that supports the surface, the requested
    /// device extensions and a usable depth-stencil format.
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        device_extensions: &[CString],
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Ok(info) =
                Self::evaluate_device(instance, device, surface, surface_loader, device_extensions)
            {
                let properties = unsafe { instance.get_physical_device_properties(device) };
                log::info!("selected GPU: {}", unsafe {
                    CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(info);
            }
        }

        Err(VulkanError::InitializationFailed(
            "failed to find a suitable GPU".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        device_extensions: &[CString],
    ) -> VulkanResult<Self> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family.ok_or_else(|| {
            VulkanError::InitializationFailed("no graphics queue family found".to_string())
        })?;
        let present_family = present_family.ok_or_else(|| {
            VulkanError::InitializationFailed("no present queue family found".to_string())
        })?;

        let available = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_required_extensions = device_extensions.iter().all(|required| {
            available.iter().any(|ext| {
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == required.as_c_str()
            })
        });
        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "required device extensions not supported".to_string(),
            ));
        }

        let depth_format = Self::find_depth_format(instance, device)?;

        Ok(Self {
            device,
            graphics_family,
            present_family,
            depth_format,
        })
    }

    /// Picks the first depth-stencil format with optimal-tiling attachment
    /// support. Stencil is required by the multipass depth-stencil states.
    fn find_depth_format(
        instance: &Instance,
        device: vk::PhysicalDevice,
    ) -> VulkanResult<vk::Format> {
        let candidates = [
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];
        for format in candidates {
            let props =
                unsafe { instance.get_physical_device_format_properties(device, format) };
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return Ok(format);
            }
        }
        Err(VulkanError::InitializationFailed(
            "failed to find a supported depth format".to_string(),
        ))
    }
}

/// Logical device wrapper owning the queues and the swapchain loader.
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: ash::Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Creates the logical device with one queue per unique family.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        device_extensions: &[CString],
    ) -> VulkanResult<Self> {
        let unique_families: std::collections::HashSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        ]
        .iter()
        .copied()
        .collect();

        let queue_priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const i8> =
            device_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue =
            unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // All queued work must retire before the device goes away.
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
