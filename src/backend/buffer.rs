// GPU buffers backed by gpu-allocator
//
// Host-visible buffers stay mapped for their whole lifetime. Device-local
// buffers are filled once through a staging buffer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::{commands, VulkanDevice};

pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{name}'"))?;
        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator()
            .lock()
            .map_err(|_| anyhow::anyhow!("GPU allocator lock poisoned"))
            .and_then(|mut allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name,
                        requirements,
                        location,
                        linear: true,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .with_context(|| format!("Failed to allocate memory for '{name}'"))
            });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Owned from here on, so Drop releases both on error
        let gpu_buffer = Self {
            buffer,
            size,
            allocation: Some(allocation),
            device,
        };

        if let Some(allocation) = &gpu_buffer.allocation {
            unsafe {
                gpu_buffer
                    .device
                    .device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Failed to bind memory for '{name}'"))?;
        }

        gpu_buffer.device.set_object_name(buffer, name);
        Ok(gpu_buffer)
    }

    /// Host-visible buffer holding `data`
    pub fn with_data<T: bytemuck::Pod>(
        device: Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            device,
            name,
            bytes.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
        )?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// GPU-only buffer filled through a temporary staging buffer
    pub fn device_local_with_data<T: bytemuck::Pod>(
        device: Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let staging = Self::with_data(
            device.clone(),
            &format!("{name} (staging)"),
            vk::BufferUsageFlags::TRANSFER_SRC,
            data,
        )?;

        let buffer = Self::new(
            device.clone(),
            name,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        commands::submit_once(&device, |cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size,
            };
            unsafe {
                device
                    .device
                    .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region])
            };
        })?;

        Ok(buffer)
    }

    /// Copy `data` to the start of the mapped memory
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        anyhow::ensure!(
            bytes.len() <= mapped.len(),
            "Write of {} bytes overflows buffer of {} bytes",
            bytes.len(),
            mapped.len()
        );

        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {}", e);
                    }
                }
                Err(_) => log::error!("GPU allocator lock poisoned, leaking buffer memory"),
            }
        }
    }
}
