// Textured quad mesh

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::offset_of;
use std::sync::Arc;

use crate::backend::buffer::GpuBuffer;
use crate::backend::VulkanDevice;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Locations 0, 1 and 2 match the vertex shader inputs
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, position) as u32)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, tex_coord) as u32)
                .build(),
        ]
    }
}

pub const VERTICES: [Vertex; 4] = [
    Vertex { position: [0.5, -0.5], color: [0.0, 1.0, 0.0], tex_coord: [1.0, 0.0] },
    Vertex { position: [-0.5, -0.5], color: [1.0, 0.0, 0.0], tex_coord: [0.0, 0.0] },
    Vertex { position: [-0.5, 0.5], color: [0.0, 0.0, 1.0], tex_coord: [0.0, 1.0] },
    Vertex { position: [0.5, 0.5], color: [1.0, 1.0, 1.0], tex_coord: [1.0, 1.0] },
];

pub const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

pub struct QuadMesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
}

impl QuadMesh {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let vertex_buffer = GpuBuffer::with_data(
            device.clone(),
            "quad vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
        )?;

        let index_buffer = GpuBuffer::device_local_with_data(
            device,
            "quad indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: INDICES.len() as u32,
        })
    }

    /// Bind both buffers and issue a single indexed draw
    pub fn record_draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 7 * 4);
        assert_eq!(Vertex::binding_description().stride, 28);
    }

    #[test]
    fn attributes_follow_field_order() {
        let attributes = Vertex::attribute_descriptions();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();

        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(offsets, vec![0, 8, 20]);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn indices_form_two_triangles_over_all_vertices() {
        assert_eq!(INDICES.len(), 6);
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));

        let mut used: Vec<u16> = INDICES.to_vec();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, vec![0, 1, 2, 3]);
    }

    #[test]
    fn texture_corners_are_distinct() {
        let mut coords: Vec<[u32; 2]> = VERTICES
            .iter()
            .map(|v| [v.tex_coord[0] as u32, v.tex_coord[1] as u32])
            .collect();
        coords.sort_unstable();
        coords.dedup();
        assert_eq!(coords.len(), 4);
    }

    #[test]
    fn vertices_cast_to_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&VERTICES);
        assert_eq!(bytes.len(), 4 * 28);
    }
}
