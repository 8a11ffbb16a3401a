// Sampled 2D texture
//
// Pixels are decoded on the CPU with the `image` crate, copied into a
// staging buffer and then into an optimal-tiled, device-local image.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::buffer::GpuBuffer;
use super::swapchain::color_subresource_range;
use super::{commands, VulkanDevice};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Decode any supported image format into RGBA8
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)
            .context("Failed to decode texture")?
            .to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Black and magenta checkerboard, used when the texture file is missing
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 {
                    [255, 0, 255, 255]
                } else {
                    [0, 0, 0, 255]
                };
                pixels.extend_from_slice(&texel);
            }
        }

        Self {
            pixels,
            width: size,
            height: size,
        }
    }
}

pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Texture {
    pub fn upload(device: Arc<VulkanDevice>, name: &str, data: &TextureData) -> Result<Self> {
        anyhow::ensure!(
            data.pixels.len() == (data.width * data.height * 4) as usize,
            "Texture '{}' has {} bytes for {}x{} RGBA8",
            name,
            data.pixels.len(),
            data.width,
            data.height
        );

        let staging = GpuBuffer::with_data(
            device.clone(),
            &format!("{name} (staging)"),
            vk::BufferUsageFlags::TRANSFER_SRC,
            &data.pixels,
        )?;

        let extent = vk::Extent3D {
            width: data.width,
            height: data.height,
            depth: 1,
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create image '{name}'"))?;

        // Every handle created below is released by Drop
        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: None,
            device,
        };

        let requirements = unsafe { texture.device.device.get_image_memory_requirements(image) };
        let allocation = texture
            .device
            .allocator()
            .lock()
            .map_err(|_| anyhow::anyhow!("GPU allocator lock poisoned"))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for '{name}'"))?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        texture.allocation = Some(allocation);
        unsafe { texture.device.device.bind_image_memory(image, memory, offset) }
            .with_context(|| format!("Failed to bind memory for '{name}'"))?;

        let device = &texture.device;
        commands::submit_once(device, |cmd| unsafe {
            let to_transfer = layout_barrier(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            );
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(extent)
                .build();
            device.device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_shader = layout_barrier(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            );
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        })?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(color_subresource_range());
        texture.view = unsafe { texture.device.device.create_image_view(&view_info, None) }
            .context("Failed to create texture view")?;

        texture.sampler = create_sampler(&texture.device)?;

        texture.device.set_object_name(image, name);
        log::info!("Uploaded texture '{}' ({}x{})", name, data.width, data.height);

        Ok(texture)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free texture memory: {}", e);
                    }
                }
                Err(_) => log::error!("GPU allocator lock poisoned, leaking texture memory"),
            }
        }
    }
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let anisotropy = device.features.sampler_anisotropy;
    let max_anisotropy = if anisotropy {
        device.properties.limits.max_sampler_anisotropy
    } else {
        1.0
    };

    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.device.create_sampler(&sampler_info, None) }
        .context("Failed to create texture sampler")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn checkerboard_alternates_cells() {
        let data = TextureData::checkerboard(4, 2);
        assert_eq!((data.width, data.height), (4, 4));
        assert_eq!(data.pixels.len(), 4 * 4 * 4);

        let texel = |x: usize, y: usize| &data.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), texel(1, 1));
        assert_ne!(texel(0, 0), texel(2, 0));
        assert_ne!(texel(0, 0), texel(0, 2));
        assert_eq!(texel(0, 0), texel(2, 2));
    }

    #[test]
    fn zero_cell_size_does_not_divide_by_zero() {
        let data = TextureData::checkerboard(2, 0);
        assert_eq!(data.pixels.len(), 16);
    }

    #[test]
    fn decodes_png_into_rgba() {
        let source = image::RgbImage::from_fn(3, 2, |x, _| image::Rgb([x as u8 * 100, 10, 20]));
        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageOutputFormat::Png)
            .unwrap();

        let data = TextureData::from_encoded(&encoded).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.pixels.len(), 3 * 2 * 4);
        assert_eq!(&data.pixels[4..8], &[100, 10, 20, 255]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(TextureData::from_encoded(b"not an image").is_err());
    }
}
