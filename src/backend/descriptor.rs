// Descriptor pool and per-frame descriptor sets
//
// Every frame slot gets its own set so a slot's uniform buffer can be
// rewritten while the GPU still reads another slot's.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct FrameDescriptors {
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

impl FrameDescriptors {
    /// Allocate one set per uniform buffer, each pointing at its buffer and
    /// at the shared texture
    pub fn new(
        device: Arc<VulkanDevice>,
        layout: vk::DescriptorSetLayout,
        uniform_buffers: &[(vk::Buffer, vk::DeviceSize)],
        texture_view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<Self> {
        let count = uniform_buffers.len() as u32;
        let pool_sizes = pool_sizes(count);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);

        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let mut descriptors = Self {
            pool,
            sets: Vec::new(),
            device,
        };

        let layouts = vec![layout; uniform_buffers.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        descriptors.sets = unsafe { descriptors.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (&set, &(buffer, range)) in descriptors.sets.iter().zip(uniform_buffers) {
            let buffer_info = [vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            }];
            let image_info = [vk::DescriptorImageInfo {
                sampler,
                image_view: texture_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            ];

            unsafe { descriptors.device.device.update_descriptor_sets(&writes, &[]) };
        }

        Ok(descriptors)
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }
}

impl Drop for FrameDescriptors {
    fn drop(&mut self) {
        // Sets are freed with the pool
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) };
    }
}

fn pool_sizes(sets: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: sets,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: sets,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_one_of_each_descriptor_per_set() {
        let sizes = pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
    }
}
