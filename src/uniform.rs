// Per-frame uniform data: model/view/projection matrices

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::backend::buffer::GpuBuffer;
use crate::backend::VulkanDevice;

const DEGREES_PER_SECOND: f32 = 90.0;
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Matrices for the quad `seconds` after startup
    pub fn at(seconds: f32, aspect: f32) -> Self {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };

        let model = Mat4::from_rotation_z((seconds * DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        // glam produces [0, 1] depth; Vulkan clip space has Y pointing down
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

/// One persistently mapped uniform buffer per frame slot
pub struct UniformBuffers {
    buffers: Vec<GpuBuffer>,
}

impl UniformBuffers {
    pub fn new(device: Arc<VulkanDevice>, frames_in_flight: usize) -> Result<Self> {
        let size = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
        let buffers = (0..frames_in_flight)
            .map(|i| {
                GpuBuffer::new(
                    device.clone(),
                    &format!("uniforms {i}"),
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { buffers })
    }

    /// Overwrite the buffer of `slot`. The slot's fence must have been waited on.
    pub fn update(&mut self, slot: usize, ubo: &UniformBufferObject) -> Result<()> {
        self.buffers[slot].write(std::slice::from_ref(ubo))
    }

    /// `(buffer, range)` per slot, for descriptor writes
    pub fn descriptor_ranges(&self) -> Vec<(vk::Buffer, vk::DeviceSize)> {
        self.buffers.iter().map(|b| (b.buffer, b.size)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn layout_is_three_column_major_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
    }

    #[test]
    fn model_starts_unrotated() {
        let ubo = UniformBufferObject::at(0.0, 16.0 / 9.0);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn model_turns_a_quarter_per_second() {
        let ubo = UniformBufferObject::at(1.0, 1.0);
        let x = ubo.model.transform_vector3(Vec3::X);
        assert!(approx(x, Vec3::Y), "rotated x axis: {x}");
    }

    #[test]
    fn origin_projects_to_screen_center() {
        let ubo = UniformBufferObject::at(0.3, 1.5);
        let clip = ubo.proj * ubo.view * ubo.model * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;

        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let ubo = UniformBufferObject::at(0.0, 1.0);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        assert_eq!(UniformBufferObject::at(0.0, 0.0), UniformBufferObject::at(0.0, 1.0));
        assert_eq!(UniformBufferObject::at(0.0, f32::NAN), UniformBufferObject::at(0.0, 1.0));
    }
}
