// Frame pacing
//
// Each frame slot owns a command buffer, an "image available" semaphore and
// a fence. The CPU waits on a slot's fence before touching anything that
// slot uses, so at most `frames_in_flight` frames are queued on the GPU.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use super::VulkanDevice;

/// Ring index over the frame slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    current: usize,
    len: usize,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        Self { current: 0, len: len.max(1) }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }
}

/// Per-slot synchronization objects
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    in_flight: vk::Fence,
}

/// A frame that has acquired its image and is recording commands
#[derive(Debug, Clone, Copy)]
pub struct ActiveFrame {
    pub slot: usize,
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
    pub suboptimal: bool,
}

pub struct FramePacer {
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    ring: FrameRing,
    device: Arc<VulkanDevice>,
}

impl FramePacer {
    pub fn new(device: Arc<VulkanDevice>, frames_in_flight: usize) -> Result<Self> {
        let ring = FrameRing::new(frames_in_flight);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_queue_family);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(ring.len() as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        let mut pacer = Self {
            command_pool,
            slots: Vec::with_capacity(ring.len()),
            ring,
            device,
        };

        // Created signalled so the first wait on each slot returns at once
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for (i, command_buffer) in command_buffers.into_iter().enumerate() {
            let image_available = unsafe { pacer.device.device.create_semaphore(&semaphore_info, None) }
                .context("Failed to create image-available semaphore")?;
            let in_flight = match unsafe { pacer.device.device.create_fence(&fence_info, None) } {
                Ok(fence) => fence,
                Err(e) => {
                    unsafe { pacer.device.device.destroy_semaphore(image_available, None) };
                    return Err(e).context("Failed to create in-flight fence");
                }
            };

            pacer.device.set_object_name(command_buffer, &format!("frame {i} commands"));
            pacer.device.set_object_name(in_flight, &format!("frame {i} fence"));

            pacer.slots.push(FrameSlot {
                command_buffer,
                image_available,
                in_flight,
            });
        }

        log::info!("Frame pacer ready with {} frames in flight", pacer.ring.len());
        Ok(pacer)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Wait for the current slot, acquire an image and start recording.
    ///
    /// Returns `None` when the swapchain is out of date. The slot's fence
    /// stays signalled until `end` submits, so neither an out-of-date
    /// acquire nor a failed recording can leave the next wait blocked.
    pub fn begin(&mut self, swapchain: &Swapchain) -> Result<Option<ActiveFrame>> {
        let slot_index = self.ring.current();
        let slot = &self.slots[slot_index];
        let device = &self.device.device;

        unsafe { device.wait_for_fences(&[slot.in_flight], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")?;

        let (image_index, suboptimal) =
            match swapchain.acquire_next_image(u64::MAX, slot.image_available)? {
                AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
                AcquireOutcome::OutOfDate => return Ok(None),
            };

        unsafe {
            device
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(slot.command_buffer, &begin_info)
                .context("Failed to begin command buffer")?;
        }

        Ok(Some(ActiveFrame {
            slot: slot_index,
            image_index,
            command_buffer: slot.command_buffer,
            suboptimal,
        }))
    }

    /// Finish recording, submit and present, then move to the next slot
    pub fn end(&mut self, swapchain: &Swapchain, frame: ActiveFrame) -> Result<PresentOutcome> {
        let slot = &self.slots[frame.slot];
        let device = &self.device.device;

        unsafe { device.end_command_buffer(frame.command_buffer) }
            .context("Failed to end command buffer")?;

        let wait_semaphores = [slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [swapchain.render_finished(frame.image_index)];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe { device.reset_fences(&[slot.in_flight]) }
            .context("Failed to reset in-flight fence")?;

        let submitted = unsafe {
            device.queue_submit(
                self.device.graphics_queue,
                std::slice::from_ref(&submit_info),
                slot.in_flight,
            )
        };
        if let Err(e) = submitted {
            // An empty submit signals the fence so the slot can be waited on again
            if let Err(resignal) =
                unsafe { device.queue_submit(self.device.graphics_queue, &[], slot.in_flight) }
            {
                log::error!("Failed to re-signal frame {} fence: {}", frame.slot, resignal);
            }
            return Err(e).context("Failed to submit draw command buffer");
        }

        let outcome = swapchain.present(self.device.graphics_queue, frame.image_index)?;
        self.ring.advance();

        Ok(merge_outcome(frame.suboptimal, outcome))
    }
}

/// A suboptimal acquire still needs a new swapchain after an optimal present
pub fn merge_outcome(acquire_suboptimal: bool, present: PresentOutcome) -> PresentOutcome {
    match present {
        PresentOutcome::Optimal if acquire_suboptimal => PresentOutcome::Suboptimal,
        other => other,
    }
}

impl Drop for FramePacer {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            for slot in &self.slots {
                self.device.device.destroy_semaphore(slot.image_available, None);
                self.device.device.destroy_fence(slot.in_flight, None);
            }
            // Frees the command buffers with it
            self.device.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_after_last_slot() {
        let mut ring = FrameRing::new(3);
        let visited: Vec<usize> = (0..7)
            .map(|_| {
                let current = ring.current();
                ring.advance();
                current
            })
            .collect();
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn ring_index_stays_in_range() {
        for len in 1..5 {
            let mut ring = FrameRing::new(len);
            for _ in 0..20 {
                assert!(ring.current() < ring.len());
                ring.advance();
            }
        }
    }

    #[test]
    fn empty_ring_has_one_slot() {
        let mut ring = FrameRing::new(0);
        assert_eq!(ring.len(), 1);
        ring.advance();
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn suboptimal_acquire_outlives_an_optimal_present() {
        assert_eq!(merge_outcome(true, PresentOutcome::Optimal), PresentOutcome::Suboptimal);
        assert_eq!(merge_outcome(false, PresentOutcome::Optimal), PresentOutcome::Optimal);
    }

    #[test]
    fn present_problems_are_never_hidden() {
        for acquire_suboptimal in [false, true] {
            assert_eq!(
                merge_outcome(acquire_suboptimal, PresentOutcome::OutOfDate),
                PresentOutcome::OutOfDate
            );
            assert_eq!(
                merge_outcome(acquire_suboptimal, PresentOutcome::Suboptimal),
                PresentOutcome::Suboptimal
            );
        }
    }
}
