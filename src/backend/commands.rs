// One-shot command submission for uploads

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Record commands with `record`, submit them on the graphics queue and
/// block until the queue is idle.
pub fn submit_once<F>(device: &VulkanDevice, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::TRANSIENT)
        .queue_family_index(device.graphics_queue_family);
    let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create transient command pool")?;

    let result = record_and_submit(device, pool, record);

    // Frees the command buffer as well
    unsafe { device.device.destroy_command_pool(pool, None) };
    result
}

fn record_and_submit<F>(device: &VulkanDevice, pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate upload command buffer")?[0];

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .device
            .begin_command_buffer(cmd, &begin_info)
            .context("Failed to begin upload command buffer")?;

        record(cmd);

        device
            .device
            .end_command_buffer(cmd)
            .context("Failed to end upload command buffer")?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();
        device
            .device
            .queue_submit(
                device.graphics_queue,
                std::slice::from_ref(&submit_info),
                vk::Fence::null(),
            )
            .context("Failed to submit upload commands")?;
        device
            .device
            .queue_wait_idle(device.graphics_queue)
            .context("Failed waiting for upload to finish")?;
    }

    Ok(())
}
