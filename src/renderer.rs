// =============================================================================
// RENDERER - Owns every GPU resource and draws one frame at a time
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the frame slot's fence, acquire a swapchain image
// 2. Update the slot's uniform buffer
// 3. Record: begin render pass (or transition + begin rendering), draw the
//    quad, draw the overlay, end
// 4. Submit, present, flag the swapchain for recreation if it went stale
//
// Fields drop in declaration order, all of them before the device.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::backend::frame::{ActiveFrame, FramePacer};
use crate::backend::pipeline::{self, GraphicsPipeline, PipelineTarget};
use crate::backend::shader;
use crate::backend::texture::{Texture, TextureData};
use crate::backend::{FrameDescriptors, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::file_loader;
use crate::overlay::{Overlay, OverlayInfo};
use crate::quad::QuadMesh;
use crate::uniform::{UniformBufferObject, UniformBuffers};

const FALLBACK_TEXTURE_SIZE: u32 = 256;
const FALLBACK_TEXTURE_CELL: u32 = 32;

/// How frames reach the swapchain image, fixed at build time by the
/// `dynamic-rendering` cargo feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    RenderPass,
    DynamicRendering,
}

impl RenderPath {
    pub fn selected() -> Self {
        if cfg!(feature = "dynamic-rendering") {
            RenderPath::DynamicRendering
        } else {
            RenderPath::RenderPass
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderPath::RenderPass => "USE RenderPass",
            RenderPath::DynamicRendering => "USE Dynamic Rendering",
        }
    }
}

/// Render pass and framebuffers, empty on the dynamic rendering path
struct RenderTargets {
    render_pass: Option<vk::RenderPass>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    device: Arc<VulkanDevice>,
}

impl RenderTargets {
    fn new(device: Arc<VulkanDevice>, path: RenderPath, swapchain: &Swapchain) -> Result<Self> {
        let render_pass = match path {
            RenderPath::RenderPass => Some(pipeline::create_render_pass(&device, swapchain.format)?),
            RenderPath::DynamicRendering => None,
        };

        let mut targets = Self {
            render_pass,
            framebuffers: Vec::new(),
            format: swapchain.format,
            device,
        };
        targets.rebuild(swapchain)?;
        Ok(targets)
    }

    /// Recreate the framebuffers for a new swapchain
    fn rebuild(&mut self, swapchain: &Swapchain) -> Result<()> {
        anyhow::ensure!(
            swapchain.format == self.format,
            "Swapchain format changed from {:?} to {:?}",
            self.format,
            swapchain.format
        );

        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        self.framebuffers.clear();

        if let Some(render_pass) = self.render_pass {
            self.framebuffers = pipeline::create_framebuffers(
                &self.device,
                &swapchain.image_views,
                render_pass,
                swapchain.extent,
            )?;
        }
        Ok(())
    }

    fn pipeline_target(&self) -> PipelineTarget {
        match self.render_pass {
            Some(render_pass) => PipelineTarget::RenderPass(render_pass),
            None => PipelineTarget::Dynamic {
                color_format: self.format,
            },
        }
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        if let Some(render_pass) = self.render_pass.take() {
            unsafe { self.device.device.destroy_render_pass(render_pass, None) };
        }
    }
}

/// Last window size reported by winit, and whether the swapchain still
/// has to catch up with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowState {
    size: [u32; 2],
    needs_recreate: bool,
}

impl WindowState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width, height],
            needs_recreate: false,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = [width, height];
        if !self.is_minimized() {
            self.needs_recreate = true;
        }
    }

    fn is_minimized(&self) -> bool {
        self.size[0] == 0 || self.size[1] == 0
    }
}

pub struct Renderer {
    // ─────────────────────────────────────────────────────────────────────────
    // Frame resources (dropped first)
    // ─────────────────────────────────────────────────────────────────────────
    overlay: Option<Overlay>,
    quad: QuadMesh,
    descriptors: FrameDescriptors,
    uniforms: UniformBuffers,
    // Referenced only through the descriptor sets
    _texture: Texture,
    pipeline: GraphicsPipeline,
    targets: RenderTargets,
    frames: FramePacer,
    swapchain: Swapchain,

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────
    path: RenderPath,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    window: WindowState,
    start: Instant,

    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Device and surface
        // ─────────────────────────────────────────────────────────────────────
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let device = VulkanDevice::new(
            &config.window.title,
            config.validation_enabled(),
            display_handle,
            window_handle,
        )?;

        let path = RenderPath::selected();
        if path == RenderPath::DynamicRendering && !device.supports_vulkan13() {
            anyhow::bail!("Dynamic rendering needs a Vulkan 1.3 device");
        }
        log::info!("Render path: {:?}", path);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain, frame pacing and render targets
        // ─────────────────────────────────────────────────────────────────────
        let size = window.inner_size();
        let present_mode = config.present_mode();
        let swapchain = Swapchain::new(device.clone(), size.width, size.height, present_mode, None)?;
        let frames = FramePacer::new(device.clone(), config.frames_in_flight())?;
        let targets = RenderTargets::new(device.clone(), path, &swapchain)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Pipeline
        // ─────────────────────────────────────────────────────────────────────
        let pipeline = build_pipeline(&device, targets.pipeline_target(), config)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Texture, uniforms, descriptors and the quad
        // ─────────────────────────────────────────────────────────────────────
        let texture_data = load_texture_data(config);
        let texture = Texture::upload(device.clone(), "quad texture", &texture_data)?;

        let uniforms = UniformBuffers::new(device.clone(), frames.frames_in_flight())?;
        let descriptors = FrameDescriptors::new(
            device.clone(),
            pipeline.descriptor_set_layout,
            &uniforms.descriptor_ranges(),
            texture.view,
            texture.sampler,
        )?;

        let quad = QuadMesh::new(device.clone())?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Debug overlay
        // ─────────────────────────────────────────────────────────────────────
        let overlay = if config.debug.show_overlay {
            Some(Overlay::new(
                device.clone(),
                frames.command_pool(),
                targets.pipeline_target(),
                frames.frames_in_flight(),
                [size.width, size.height],
                window.scale_factor(),
            )?)
        } else {
            None
        };

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            overlay,
            quad,
            descriptors,
            uniforms,
            _texture: texture,
            pipeline,
            targets,
            frames,
            swapchain,
            path,
            clear_color: config.graphics.clear_color,
            present_mode,
            window: WindowState::new(size.width, size.height),
            start: Instant::now(),
            device,
        })
    }

    /// Record that the window changed size; the swapchain is rebuilt on the
    /// next frame
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.window.resize(width, height);
    }

    /// Nothing is drawn while the window has no area
    pub fn is_minimized(&self) -> bool {
        self.window.is_minimized()
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let Some(overlay) = &mut self.overlay {
            overlay.handle_event(event);
        }
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Draw and present one frame. Returns false when nothing was presented.
    pub fn draw_frame(&mut self) -> Result<bool> {
        if self.window.is_minimized() {
            return Ok(false);
        }

        if self.window.needs_recreate {
            self.recreate_swapchain()?;
        }

        let Some(frame) = self.frames.begin(&self.swapchain)? else {
            log::debug!("Swapchain out of date on acquire");
            self.window.needs_recreate = true;
            return Ok(false);
        };

        // The command buffer is always submitted so the slot's fence gets
        // signalled again, even if recording failed part way
        let recorded = self.record(&frame);
        let outcome = self.frames.end(&self.swapchain, frame)?;
        recorded?;

        if outcome.needs_recreate() {
            log::debug!("Present reported {:?}", outcome);
            self.window.needs_recreate = true;
        }

        Ok(true)
    }

    fn record(&mut self, frame: &ActiveFrame) -> Result<()> {
        let extent = self.swapchain.extent;
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBufferObject::at(self.start.elapsed().as_secs_f32(), aspect);
        self.uniforms.update(frame.slot, &ubo)?;

        let device = self.device.clone();
        let cmd = frame.command_buffer;
        let image = frame.image_index as usize;
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };

        // ─────────────────────────────────────────────────────────────────────
        // Begin
        // ─────────────────────────────────────────────────────────────────────
        match self.targets.render_pass {
            Some(render_pass) => {
                let clear_values = [clear_value];
                let begin_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass)
                    .framebuffer(self.targets.framebuffers[image])
                    .render_area(render_area)
                    .clear_values(&clear_values);
                unsafe {
                    device
                        .device
                        .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE)
                };
            }
            None => {
                self.swapchain.transition_image(
                    cmd,
                    frame.image_index,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                );

                let color_attachment = vk::RenderingAttachmentInfo::builder()
                    .image_view(self.swapchain.image_views[image])
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_value)
                    .build();
                let rendering_info = vk::RenderingInfo::builder()
                    .render_area(render_area)
                    .layer_count(1)
                    .color_attachments(std::slice::from_ref(&color_attachment));
                unsafe { device.device.cmd_begin_rendering(cmd, &rendering_info) };
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // Quad
        // ─────────────────────────────────────────────────────────────────────
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );
            device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptors.set(frame.slot)],
                &[],
            );
        }
        self.quad.record_draw(&device.device, cmd);

        // ─────────────────────────────────────────────────────────────────────
        // Overlay
        // ─────────────────────────────────────────────────────────────────────
        if let Some(overlay) = &mut self.overlay {
            let info = OverlayInfo {
                extent,
                image_count: self.swapchain.image_count(),
                present_mode: self.swapchain.present_mode,
                path_label: self.path.label(),
            };
            if let Err(e) = overlay.record(cmd, &info) {
                log::error!("Overlay error: {:?}", e);
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // End
        // ─────────────────────────────────────────────────────────────────────
        match self.targets.render_pass {
            Some(_) => unsafe { device.device.cmd_end_render_pass(cmd) },
            None => {
                unsafe { device.device.cmd_end_rendering(cmd) };
                self.swapchain.transition_image(
                    cmd,
                    frame.image_index,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                    vk::AccessFlags2::NONE,
                );
            }
        }

        Ok(())
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Rebuild the swapchain and framebuffers for the current window size
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        if self.window.is_minimized() {
            return Ok(());
        }
        let [width, height] = self.window.size;

        self.device.wait_idle()?;

        let swapchain = Swapchain::new(
            self.device.clone(),
            width,
            height,
            self.present_mode,
            Some(&self.swapchain),
        )?;
        // The old swapchain is retired by the new one and destroyed here
        drop(std::mem::replace(&mut self.swapchain, swapchain));

        self.targets.rebuild(&self.swapchain)?;
        self.window.needs_recreate = false;

        log::info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be in use when the fields below are destroyed
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during cleanup: {:?}", e);
        }
    }
}

fn build_pipeline(
    device: &Arc<VulkanDevice>,
    target: PipelineTarget,
    config: &Config,
) -> Result<GraphicsPipeline> {
    let vert = shader::load_shader_module(device, &config.assets.vertex_shader)?;
    let frag = match shader::load_shader_module(device, &config.assets.fragment_shader) {
        Ok(frag) => frag,
        Err(e) => {
            shader::destroy_shader_module(device, vert);
            return Err(e);
        }
    };

    let pipeline = pipeline::create_graphics_pipeline(device.clone(), target, vert, frag);

    // Modules are only needed while the pipeline is built
    shader::destroy_shader_module(device, vert);
    shader::destroy_shader_module(device, frag);

    pipeline
}

fn load_texture_data(config: &Config) -> TextureData {
    let path = &config.assets.texture;
    match file_loader::load(path).and_then(|bytes| TextureData::from_encoded(&bytes)) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Using checkerboard texture, {:?} unavailable: {:#}", path, e);
            TextureData::checkerboard(FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_CELL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_follows_cargo_feature() {
        let expected = if cfg!(feature = "dynamic-rendering") {
            RenderPath::DynamicRendering
        } else {
            RenderPath::RenderPass
        };
        assert_eq!(RenderPath::selected(), expected);
    }

    #[test]
    fn overlay_labels_name_the_path() {
        assert_eq!(RenderPath::RenderPass.label(), "USE RenderPass");
        assert_eq!(RenderPath::DynamicRendering.label(), "USE Dynamic Rendering");
    }

    #[test]
    fn minimising_defers_recreation_until_restored() {
        let mut window = WindowState::new(800, 600);
        assert!(!window.is_minimized());
        assert!(!window.needs_recreate);

        window.resize(0, 0);
        assert!(window.is_minimized());
        assert!(!window.needs_recreate);

        window.resize(1024, 768);
        assert!(!window.is_minimized());
        assert!(window.needs_recreate);
        assert_eq!(window.size, [1024, 768]);
    }

    #[test]
    fn zero_width_alone_counts_as_minimised() {
        let mut window = WindowState::new(0, 600);
        assert!(window.is_minimized());
        window.resize(640, 0);
        assert!(window.is_minimized());
    }

    #[test]
    fn missing_texture_falls_back_to_checkerboard() {
        let mut config = Config::default();
        config.assets.texture = "no/such/texture.png".into();

        let data = load_texture_data(&config);
        assert_eq!((data.width, data.height), (FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_SIZE));
    }
}
