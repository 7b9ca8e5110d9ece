//! Binding native windows to Vulkan surfaces.

use std::ffi::CStr;

use arrayvec::ArrayVec;
use ash::{khr, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{check, Error, Result};

/// Instance extensions needed to create a surface on `display`.
pub fn required_extensions(display: RawDisplayHandle) -> Result<ArrayVec<&'static CStr, 2>> {
    let platform = match display {
        RawDisplayHandle::Xlib(_) => khr::xlib_surface::NAME,
        RawDisplayHandle::Xcb(_) => khr::xcb_surface::NAME,
        RawDisplayHandle::Wayland(_) => khr::wayland_surface::NAME,
        RawDisplayHandle::Windows(_) => khr::win32_surface::NAME,
        other => return Err(unsupported(format!("{:?}", other))),
    };

    let mut extensions = ArrayVec::new();
    extensions.push(khr::surface::NAME);
    extensions.push(platform);
    Ok(extensions)
}

fn unsupported(description: String) -> Error {
    log::error!("unsupported window handle: {}", description);
    Error::UnsupportedWindow(description)
}

/// Creates a surface for `window`.
///
/// # Safety
///
/// The handles must refer to a live window which outlives the surface, and
/// `instance` must have been created with [`required_extensions`] for
/// `display`.
pub unsafe fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    match (display, window) {
        (RawDisplayHandle::Xlib(d), RawWindowHandle::Xlib(w)) => {
            let dpy = d
                .display
                .ok_or_else(|| unsupported("Xlib handle without a display connection".into()))?;
            let info = vk::XlibSurfaceCreateInfoKHR::default()
                .dpy(dpy.as_ptr().cast())
                .window(w.window);
            let loader = khr::xlib_surface::Instance::new(entry, instance);
            check(
                unsafe { loader.create_xlib_surface(&info, None) },
                "vkCreateXlibSurfaceKHR",
                Error::SurfaceCreation,
            )
        }

        (RawDisplayHandle::Xcb(d), RawWindowHandle::Xcb(w)) => {
            let connection = d
                .connection
                .ok_or_else(|| unsupported("XCB handle without a connection".into()))?;
            let info = vk::XcbSurfaceCreateInfoKHR::default()
                .connection(connection.as_ptr().cast())
                .window(w.window.get());
            let loader = khr::xcb_surface::Instance::new(entry, instance);
            check(
                unsafe { loader.create_xcb_surface(&info, None) },
                "vkCreateXcbSurfaceKHR",
                Error::SurfaceCreation,
            )
        }

        (RawDisplayHandle::Wayland(d), RawWindowHandle::Wayland(w)) => {
            let info = vk::WaylandSurfaceCreateInfoKHR::default()
                .display(d.display.as_ptr().cast())
                .surface(w.surface.as_ptr().cast());
            let loader = khr::wayland_surface::Instance::new(entry, instance);
            check(
                unsafe { loader.create_wayland_surface(&info, None) },
                "vkCreateWaylandSurfaceKHR",
                Error::SurfaceCreation,
            )
        }

        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(w)) => {
            let info = vk::Win32SurfaceCreateInfoKHR::default()
                .hinstance(w.hinstance.map_or(0, |h| h.get()))
                .hwnd(w.hwnd.get());
            let loader = khr::win32_surface::Instance::new(entry, instance);
            check(
                unsafe { loader.create_win32_surface(&info, None) },
                "vkCreateWin32SurfaceKHR",
                Error::SurfaceCreation,
            )
        }

        (d, w) => Err(unsupported(format!("{:?} with {:?}", d, w))),
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use raw_window_handle::{AppKitDisplayHandle, WaylandDisplayHandle, WindowsDisplayHandle};

    use super::*;

    #[test]
    fn wayland_extensions() {
        let display = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling()));
        let exts = required_extensions(display).unwrap();
        assert_eq!(exts.as_slice(), &[c"VK_KHR_surface", c"VK_KHR_wayland_surface"]);
    }

    #[test]
    fn windows_extensions() {
        let display = RawDisplayHandle::Windows(WindowsDisplayHandle::new());
        let exts = required_extensions(display).unwrap();
        assert_eq!(exts[1], c"VK_KHR_win32_surface");
    }

    #[test]
    fn unsupported_platform() {
        let display = RawDisplayHandle::AppKit(AppKitDisplayHandle::new());
        assert!(matches!(
            required_extensions(display),
            Err(Error::UnsupportedWindow(_))
        ));
    }
}
