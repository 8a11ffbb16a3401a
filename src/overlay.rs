// Debug overlay (Dear ImGui)
//
// Drawn into the frame's command buffer inside the same render pass or
// rendering scope as the quad.

use anyhow::{Context, Result};
use ash::vk;
use imgui::{Condition, MouseButton as ImguiButton};
use imgui_rs_vulkan_renderer::{Options, Renderer};
use std::sync::Arc;
use std::time::Instant;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::backend::pipeline::PipelineTarget;
use crate::backend::VulkanDevice;

/// What the "Information" window shows this frame
#[derive(Debug, Clone, Copy)]
pub struct OverlayInfo {
    pub extent: vk::Extent2D,
    pub image_count: usize,
    pub present_mode: vk::PresentModeKHR,
    pub path_label: &'static str,
}

/// Window size in physical pixels plus the scale ImGui divides it by
#[derive(Debug, Clone, Copy, PartialEq)]
struct DisplayMetrics {
    physical_size: [u32; 2],
    scale_factor: f64,
}

impl DisplayMetrics {
    fn logical_size(&self) -> [f32; 2] {
        logical_size(self.physical_size, self.scale_factor)
    }

    fn apply(&self, io: &mut imgui::Io) {
        io.display_framebuffer_scale = [self.scale_factor as f32; 2];
        io.display_size = self.logical_size();
    }
}

pub struct Overlay {
    renderer: Renderer,
    context: imgui::Context,
    metrics: DisplayMetrics,
    last_frame: Instant,
    _device: Arc<VulkanDevice>,
}

impl Overlay {
    pub fn new(
        device: Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        target: PipelineTarget,
        frames_in_flight: usize,
        physical_size: [u32; 2],
        scale_factor: f64,
    ) -> Result<Self> {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);
        context.style_mut().use_dark_colors();

        let metrics = DisplayMetrics {
            physical_size,
            scale_factor,
        };
        metrics.apply(context.io_mut());

        let options = Some(Options {
            in_flight_frames: frames_in_flight,
            ..Default::default()
        });

        #[cfg(not(feature = "dynamic-rendering"))]
        let renderer = {
            let PipelineTarget::RenderPass(render_pass) = target else {
                anyhow::bail!("Overlay built for render passes was given {:?}", target);
            };
            Renderer::with_gpu_allocator(
                device.allocator().clone(),
                device.device.clone(),
                device.graphics_queue,
                command_pool,
                render_pass,
                &mut context,
                options,
            )
        };

        #[cfg(feature = "dynamic-rendering")]
        let renderer = {
            let PipelineTarget::Dynamic { color_format } = target else {
                anyhow::bail!("Overlay built for dynamic rendering was given {:?}", target);
            };
            Renderer::with_gpu_allocator(
                device.allocator().clone(),
                device.device.clone(),
                device.graphics_queue,
                command_pool,
                imgui_rs_vulkan_renderer::DynamicRendering {
                    color_attachment_format: color_format,
                    depth_attachment_format: None,
                },
                &mut context,
                options,
            )
        };

        let renderer = renderer.context("Failed to create overlay renderer")?;
        log::info!("Debug overlay ready");

        Ok(Self {
            renderer,
            context,
            metrics,
            last_frame: Instant::now(),
            _device: device,
        })
    }

    /// Forward mouse and window events to ImGui
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.metrics.physical_size = [size.width, size.height];
                self.metrics.apply(self.context.io_mut());
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.metrics.scale_factor = *scale_factor;
                self.metrics.apply(self.context.io_mut());
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = position.to_logical::<f32>(self.metrics.scale_factor);
                self.context
                    .io_mut()
                    .add_mouse_pos_event([position.x, position.y]);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = to_imgui_button(*button) {
                    self.context
                        .io_mut()
                        .add_mouse_button_event(button, *state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.context.io_mut().add_mouse_wheel_event(wheel_steps(*delta));
            }
            _ => {}
        }
    }

    /// Build this frame's UI and record its draw commands
    pub fn record(&mut self, cmd: vk::CommandBuffer, info: &OverlayInfo) -> Result<()> {
        let now = Instant::now();
        self.context.io_mut().update_delta_time(now - self.last_frame);
        self.last_frame = now;

        let ui = self.context.new_frame();
        let framerate = ui.io().framerate;

        ui.window("Information")
            .position([10.0, 10.0], Condition::FirstUseEver)
            .always_auto_resize(true)
            .build(|| {
                ui.text("Hello Quad");
                ui.text(format!("FPS: {:.2}", framerate));
                ui.text(format!("Frame time: {:.3} ms", frame_time_ms(framerate)));
                ui.separator();
                ui.text(format!("Extent: {}x{}", info.extent.width, info.extent.height));
                ui.text(format!("Swapchain images: {}", info.image_count));
                ui.text(format!("Present mode: {:?}", info.present_mode));
                ui.text(info.path_label);
            });

        let draw_data = self.context.render();
        self.renderer
            .cmd_draw(cmd, draw_data)
            .context("Failed to record overlay")
    }
}

fn logical_size(physical: [u32; 2], scale_factor: f64) -> [f32; 2] {
    let scale = if scale_factor > 0.0 { scale_factor } else { 1.0 };
    [
        (physical[0] as f64 / scale) as f32,
        (physical[1] as f64 / scale) as f32,
    ]
}

fn frame_time_ms(framerate: f32) -> f32 {
    if framerate > 0.0 {
        1000.0 / framerate
    } else {
        0.0
    }
}

pub fn to_imgui_button(button: MouseButton) -> Option<ImguiButton> {
    match button {
        MouseButton::Left => Some(ImguiButton::Left),
        MouseButton::Right => Some(ImguiButton::Right),
        MouseButton::Middle => Some(ImguiButton::Middle),
        MouseButton::Back => Some(ImguiButton::Extra1),
        MouseButton::Forward => Some(ImguiButton::Extra2),
        MouseButton::Other(_) => None,
    }
}

/// Lines scroll as-is; pixel deltas only carry a direction
pub fn wheel_steps(delta: MouseScrollDelta) -> [f32; 2] {
    match delta {
        MouseScrollDelta::LineDelta(x, y) => [x, y],
        MouseScrollDelta::PixelDelta(position) => [step(position.x), step(position.y)],
    }
}

fn step(pixels: f64) -> f32 {
    if pixels > 0.0 {
        1.0
    } else if pixels < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn standard_buttons_map_to_imgui() {
        assert_eq!(to_imgui_button(MouseButton::Left), Some(ImguiButton::Left));
        assert_eq!(to_imgui_button(MouseButton::Right), Some(ImguiButton::Right));
        assert_eq!(to_imgui_button(MouseButton::Middle), Some(ImguiButton::Middle));
        assert_eq!(to_imgui_button(MouseButton::Back), Some(ImguiButton::Extra1));
        assert_eq!(to_imgui_button(MouseButton::Other(9)), None);
    }

    #[test]
    fn line_deltas_pass_through() {
        assert_eq!(wheel_steps(MouseScrollDelta::LineDelta(0.0, -2.0)), [0.0, -2.0]);
    }

    #[test]
    fn pixel_deltas_become_single_steps() {
        let delta = MouseScrollDelta::PixelDelta(PhysicalPosition::new(-35.0, 120.0));
        assert_eq!(wheel_steps(delta), [-1.0, 1.0]);

        let vertical = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -3.0));
        assert_eq!(wheel_steps(vertical), [0.0, -1.0]);
    }

    #[test]
    fn display_size_is_logical() {
        assert_eq!(logical_size([2560, 1440], 2.0), [1280.0, 720.0]);
        assert_eq!(logical_size([800, 600], 0.0), [800.0, 600.0]);
    }

    #[test]
    fn frame_time_is_inverse_framerate() {
        assert_eq!(frame_time_ms(50.0), 20.0);
        assert_eq!(frame_time_ms(0.0), 0.0);
    }

    #[test]
    fn scale_change_updates_logical_size() {
        let mut context = imgui::Context::create();
        let mut metrics = DisplayMetrics {
            physical_size: [1600, 1200],
            scale_factor: 1.0,
        };
        metrics.apply(context.io_mut());
        assert_eq!(context.io().display_size, [1600.0, 1200.0]);

        metrics.scale_factor = 2.0;
        metrics.apply(context.io_mut());
        assert_eq!(context.io().display_size, [800.0, 600.0]);
        assert_eq!(context.io().display_framebuffer_scale, [2.0, 2.0]);
    }
}
