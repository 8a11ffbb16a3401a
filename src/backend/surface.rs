// Window surface creation
//
// Builds a VkSurfaceKHR straight from raw-window-handle handles for the
// windowing systems we ship on: Win32, Xlib, XCB and Wayland.

use anyhow::Result;
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

/// Instance extensions required to present to `display`
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => anyhow::bail!("Unsupported display handle: {:?}", other),
    };

    Ok(vec![khr::Surface::name(), platform])
}

/// Create a surface for `window`
///
/// # Safety
/// The handles must stay valid for the lifetime of the returned surface.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map_or(0, |h| h.get()) as vk::HINSTANCE;
            let hwnd = handle.hwnd.get() as vk::HWND;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)?
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display
                .display
                .map_or(std::ptr::null_mut(), |d| d.as_ptr()) as *mut vk::Display;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy)
                .window(handle.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)?
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display
                .connection
                .map_or(std::ptr::null_mut(), |c| c.as_ptr()) as *mut vk::xcb_connection_t;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection)
                .window(handle.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)?
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr() as *mut vk::wl_display)
                .surface(handle.surface.as_ptr() as *mut vk::wl_surface);
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)?
        }
        (display, window) => {
            anyhow::bail!("Unsupported window handle pair: {:?} / {:?}", display, window)
        }
    };

    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WindowsDisplayHandle, XlibDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn every_platform_needs_the_base_surface_extension() {
        let displays = [
            RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
            RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling())),
        ];
        for display in displays {
            let extensions = required_extensions(display).unwrap();
            assert_eq!(extensions.len(), 2);
            assert_eq!(extensions[0], khr::Surface::name());
        }
    }

    #[test]
    fn platform_extension_matches_display() {
        let extensions =
            required_extensions(RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling())))
                .unwrap();
        assert_eq!(extensions[1], khr::WaylandSurface::name());

        let extensions = required_extensions(RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0))).unwrap();
        assert_eq!(extensions[1], khr::XlibSurface::name());
    }

    #[test]
    fn web_displays_are_rejected() {
        let display = RawDisplayHandle::Web(raw_window_handle::WebDisplayHandle::new());
        assert!(required_extensions(display).is_err());
    }
}
