// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled by build.rs and
// read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;
use crate::file_loader;

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    // read_spv realigns the words and fixes byte order
    let words = ash::util::read_spv(&mut Cursor::new(code)).context("Invalid SPIR-V bytecode")?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Load a compiled shader from disk
pub fn load_shader_module<P: AsRef<Path>>(device: &VulkanDevice, path: P) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let code = file_loader::load(path)
        .with_context(|| format!("Failed to load shader {:?}. Is glslc installed?", path))?;

    let module = create_shader_module(device, &code)
        .with_context(|| format!("Failed to create shader module from {:?}", path))?;
    device.set_object_name(module, &path.display().to_string());

    Ok(module)
}

pub fn destroy_shader_module(device: &VulkanDevice, module: vk::ShaderModule) {
    unsafe { device.device.destroy_shader_module(module, None) };
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn spirv_words_keep_their_order() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 7, 42] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let words = ash::util::read_spv(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7, 42]);
    }

    #[test]
    fn truncated_spirv_is_rejected() {
        let bytes = SPIRV_MAGIC.to_le_bytes();
        assert!(ash::util::read_spv(&mut Cursor::new(&bytes[..3])).is_err());
    }
}
