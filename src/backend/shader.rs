// Shader module loading
//
// Vulkan consumes SPIR-V bytecode, which is word-addressed: the buffer
// handed to the driver must be 4-byte aligned. ash::util::read_spv takes
// care of that by copying into a Vec<u32>.

use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::error::{RenderError, RenderResult};
use super::VulkanDevice;

/// Load compiled SPIR-V bytecode from a file
pub fn load_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderLoadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::ShaderLoadFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> RenderResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None) }?;
    Ok(module)
}

/// Load a SPIR-V file and build a shader module in one step
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> RenderResult<vk::ShaderModule> {
    let code = load_spirv(path)?;
    create_shader_module(device, &code)
}
