//! GLFW window wrapper for Vulkan rendering.
//!
//! Configures the window for a no-API client (Vulkan renders through a
//! surface, not a GL context), pumps events, and raises a shared resize flag
//! the [`Device`](crate::Device) polls at the top of each frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("GLFW initialization failed")]
    InitializationFailed,

    #[error("window creation failed")]
    CreationFailed,

    #[error("GLFW error: {0}")]
    GlfwError(String),
}

pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper with a level-triggered resize flag.
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resized: Arc<AtomicBool>,
}

impl Window {
    pub fn new(width: u32, height: u32, title: &str) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|_| WindowError::InitializationFailed)?;

        // No OpenGL context; Vulkan presents through a surface.
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            resized: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pumps pending events, raising the resize flag on framebuffer-size
    /// changes, and returns the drained events for the caller to inspect.
    pub fn poll_events(&mut self) -> Vec<(f64, glfw::WindowEvent)> {
        self.glfw.poll_events();
        self.drain_events()
    }

    /// Blocks until at least one event arrives, then drains as `poll_events`.
    pub fn wait_events(&mut self) -> Vec<(f64, glfw::WindowEvent)> {
        self.glfw.wait_events();
        self.drain_events()
    }

    fn drain_events(&mut self) -> Vec<(f64, glfw::WindowEvent)> {
        let events: Vec<_> = glfw::flush_messages(&self.events).collect();
        for (_, event) in &events {
            if let glfw::WindowEvent::FramebufferSize(_, _) = event {
                self.resized.store(true, Ordering::Relaxed);
            }
        }
        events
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width as u32, height as u32)
    }

    /// Shared flag raised whenever the framebuffer size changes. The device
    /// clears it when it rebuilds the swapchain.
    pub fn resize_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.resized)
    }

    /// Vulkan instance extensions the platform surface requires.
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| {
                WindowError::GlfwError("failed to get required extensions".to_string())
            })
    }

    /// Creates the Vulkan surface through GLFW.
    pub fn create_surface(&self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!(
                "failed to create window surface: {result:?}"
            )))
        }
    }
}
