// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Each image carries its own "render finished" semaphore, because an image
// can still be queued for presentation when its frame slot comes around
// again.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Surface formats we render into, in order of preference
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        self != PresentOutcome::Optimal
    }
}

/// Last known layout and access of a swapchain image, used to build
/// synchronization2 barriers when rendering without a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags2,
}

impl ImageState {
    /// Move to `layout`/`access` and return the state the barrier starts from
    pub fn advance(&mut self, layout: vk::ImageLayout, access: vk::AccessFlags2) -> ImageState {
        std::mem::replace(self, ImageState { layout, access })
    }
}

impl Default for ImageState {
    fn default() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags2::NONE,
        }
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    render_finished: Vec<vk::Semaphore>,
    image_states: Vec<ImageState>,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create a swapchain for the device's surface.
    ///
    /// Passing the previous swapchain lets the driver recycle its resources;
    /// the caller drops `old` afterwards.
    pub fn new(
        device: Arc<VulkanDevice>,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let surface = device.surface;
        let surface_loader = &device.surface_loader;

        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(device.physical_device, surface)
        }?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, surface)
        }?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(device.physical_device, surface)
        }?;

        let surface_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        let extent = choose_extent(&surface_caps, width, height);
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.swapchain));

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;
        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(color_subresource_range());

                unsafe {
                    device
                        .device
                        .create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let render_finished = images
            .iter()
            .map(|_| unsafe {
                device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-finished semaphore")
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, (&image, &view)) in images.iter().zip(&image_views).enumerate() {
            device.set_object_name(image, &format!("swapchain image {i}"));
            device.set_object_name(view, &format!("swapchain view {i}"));
        }

        Ok(Self {
            swapchain,
            swapchain_loader,
            image_states: vec![ImageState::default(); images.len()],
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
            render_finished,
            device,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Semaphore signalled when rendering into `image_index` completes
    pub fn render_finished(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize]
    }

    /// Acquire next image for rendering, signalling `semaphore` when ready
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        acquire_outcome(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Present `image_index` once its render-finished semaphore is signalled
    pub fn present(&self, queue: vk::Queue, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphores = [self.render_finished(image_index)];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        present_outcome(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    /// Record a barrier moving `image_index` from its tracked state into
    /// `new_layout`, then remember the new state.
    pub fn transition_image(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        new_layout: vk::ImageLayout,
        new_access: vk::AccessFlags2,
    ) {
        let index = image_index as usize;
        let from = self.image_states[index].advance(new_layout, new_access);
        let barrier = image_barrier(self.images[index], from, new_layout, new_access);

        let dependency_info = vk::DependencyInfo::builder()
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe { self.device.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &semaphore in &self.render_finished {
                self.device.device.destroy_semaphore(semaphore, None);
            }
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            // Images are owned by the swapchain itself
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Out-of-date is an expected outcome; every other error is fatal
pub fn acquire_outcome(result: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e).context("Failed to acquire swapchain image"),
    }
}

pub fn present_outcome(result: VkResult<bool>) -> Result<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Optimal),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e).context("Failed to present swapchain image"),
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn image_barrier(
    image: vk::Image,
    from: ImageState,
    new_layout: vk::ImageLayout,
    new_access: vk::AccessFlags2,
) -> vk::ImageMemoryBarrier2 {
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(from.access)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(new_access)
        .old_layout(from.layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .build()
}

/// Prefer a UNORM BGRA/RGBA format in sRGB colour space, else whatever the
/// surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    PREFERRED_FORMATS
        .iter()
        .find_map(|&wanted| {
            formats.iter().copied().find(|f| {
                f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
        .context("Surface reports no formats")
}

/// FIFO is the only mode every surface must support
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        if preferred != vk::PresentModeKHR::FIFO {
            log::warn!("Present mode {:?} unsupported, using FIFO", preferred);
        }
        vk::PresentModeKHR::FIFO
    }
}

/// The surface dictates the extent unless it reports the special value
/// `u32::MAX`, in which case the window size is clamped into range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum so we never wait on the driver, within the max
/// (`0` means unlimited)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_unorm_over_rgba() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn ignores_preferred_format_in_other_color_space() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::A2B10G10R10_UNORM_PACK32);
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_window_size_when_surface_is_undefined() {
        let caps = caps((u32::MAX, u32::MAX), (64, 64), (1024, 512));
        let extent = choose_extent(&caps, 1280, 32);
        assert_eq!((extent.width, extent.height), (1024, 64));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = caps((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn barrier_starts_from_tracked_state() {
        let image = vk::Image::null();
        let barrier = image_barrier(
            image,
            ImageState::default(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn acquire_maps_out_of_date_and_propagates_other_errors() {
        assert_eq!(
            acquire_outcome(Ok((2, false))).unwrap(),
            AcquireOutcome::Image { index: 2, suboptimal: false }
        );
        assert_eq!(
            acquire_outcome(Ok((0, true))).unwrap(),
            AcquireOutcome::Image { index: 0, suboptimal: true }
        );
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );

        let err = acquire_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<vk::Result>(),
            Some(&vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn present_maps_results_to_outcomes() {
        assert_eq!(present_outcome(Ok(false)).unwrap(), PresentOutcome::Optimal);
        assert_eq!(present_outcome(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(present_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn image_state_follows_each_frame() {
        let mut state = ImageState::default();

        let from = state.advance(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        assert_eq!(from, ImageState::default());

        let from = state.advance(vk::ImageLayout::PRESENT_SRC_KHR, vk::AccessFlags2::NONE);
        assert_eq!(from.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(from.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);

        // Second time round the image comes from presentation, not UNDEFINED
        let from = state.advance(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        assert_eq!(from.layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(from.access, vk::AccessFlags2::NONE);

        let barrier = image_barrier(
            vk::Image::null(),
            from,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn image_states_are_tracked_per_image() {
        let mut states = vec![ImageState::default(); 3];
        states[1].advance(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        states[1].advance(vk::ImageLayout::PRESENT_SRC_KHR, vk::AccessFlags2::NONE);

        assert_eq!(states[0].layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(states[1].layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(states[2].layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn only_optimal_presents_keep_the_swapchain() {
        assert!(!PresentOutcome::Optimal.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
