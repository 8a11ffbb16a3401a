// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Each type owns its handles and releases them
// on drop, holding an `Arc<VulkanDevice>` so the device outlives them.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod texture;

pub use descriptor::FrameDescriptors;
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
