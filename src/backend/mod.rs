// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Startup order: device -> swapchain -> pipeline -> sync

pub mod device;
pub mod error;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use error::{RenderError, RenderResult};
pub use swapchain::Swapchain;
