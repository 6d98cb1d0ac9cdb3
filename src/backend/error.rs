// Backend error taxonomy
//
// Every variant here is a startup-phase failure: nothing is retried,
// the application reports the error and exits.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("logical device creation failed: {0}")]
    DeviceCreationFailed(#[source] vk::Result),

    #[error("swapchain creation failed: {0}")]
    SwapchainCreationFailed(#[source] vk::Result),

    #[error("failed to load shader {path:?}: {source}")]
    ShaderLoadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("graphics pipeline compilation failed: {0}")]
    PipelineCompilationFailed(#[source] vk::Result),

    #[error("synchronization object creation failed: {0}")]
    SyncObjectCreationFailed(#[source] vk::Result),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
