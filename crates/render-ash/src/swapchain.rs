use std::sync::{Arc, Mutex};

use ash::{extensions::khr, vk};
use forge_render::{
    format::TextureFormat,
    swapchain::SwapChainDesc,
    texture::RenderTargetDesc,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};

use crate::{
    convert::VkInto,
    device::AshDevice,
    drop_guard::{Destroy, Guard},
    instance::AshInstance,
    queue::{Fence, Queue, Semaphore},
    resources::RenderTarget,
    Error, Result,
};

/// A window that can be presented to.
pub trait SurfaceWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T: HasWindowHandle + HasDisplayHandle + Send + Sync> SurfaceWindow for T {}

impl Destroy for vk::SurfaceKHR {
    type Context = AshInstance;
    #[inline]
    unsafe fn destroy(self, instance: &AshInstance) {
        if self != Self::null() {
            if let Ok(ext_surface) = instance.ext_surface() {
                unsafe { ext_surface.destroy_surface(self, None) };
            }
        }
    }
}

impl Destroy for vk::SwapchainKHR {
    type Context = AshDevice;
    #[inline]
    unsafe fn destroy(self, device: &AshDevice) {
        if self != Self::null() {
            if let Ok(ext_swapchain) = device.ext_swapchain() {
                unsafe { ext_swapchain.destroy_swapchain(self, None) };
            }
        }
    }
}

macro_rules! check_and_get_extension {
    ($self:ident => $ext:ty) => {{
        if !$self.has_instance_extension(<$ext>::name()) {
            return Err(Error::ExtensionNotSupported(<$ext>::name()));
        }
        <$ext>::new($self.entry(), $self)
    }};
}

impl AshInstance {
    #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
    unsafe fn create_surface_xlib(
        &self,
        dpy: *mut vk::Display,
        window: vk::Window,
    ) -> Result<vk::SurfaceKHR> {
        let functions = check_and_get_extension!(self => khr::XlibSurface);
        let surface = unsafe {
            functions.create_xlib_surface(
                &vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy)
                    .window(window),
                None,
            )?
        };
        Ok(surface)
    }

    #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
    unsafe fn create_surface_xcb(
        &self,
        connection: *mut vk::xcb_connection_t,
        window: vk::xcb_window_t,
    ) -> Result<vk::SurfaceKHR> {
        let functions = check_and_get_extension!(self => khr::XcbSurface);
        let surface = unsafe {
            functions.create_xcb_surface(
                &vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection)
                    .window(window),
                None,
            )?
        };
        Ok(surface)
    }

    #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
    unsafe fn create_surface_wayland(
        &self,
        display: *mut vk::wl_display,
        surface: *mut vk::wl_surface,
    ) -> Result<vk::SurfaceKHR> {
        let functions = check_and_get_extension!(self => khr::WaylandSurface);
        let surface = unsafe {
            functions.create_wayland_surface(
                &vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display)
                    .surface(surface),
                None,
            )?
        };
        Ok(surface)
    }

    #[cfg(target_os = "android")]
    unsafe fn create_surface_android(
        &self,
        window: *mut vk::ANativeWindow,
    ) -> Result<vk::SurfaceKHR> {
        let functions = check_and_get_extension!(self => khr::AndroidSurface);
        let surface = unsafe {
            functions.create_android_surface(
                &vk::AndroidSurfaceCreateInfoKHR::builder().window(window),
                None,
            )?
        };
        Ok(surface)
    }

    #[cfg(target_os = "windows")]
    unsafe fn create_surface_win32(
        &self,
        hinstance: vk::HINSTANCE,
        hwnd: vk::HWND,
    ) -> Result<vk::SurfaceKHR> {
        let functions = check_and_get_extension!(self => khr::Win32Surface);
        let surface = unsafe {
            functions.create_win32_surface(
                &vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd),
                None,
            )?
        };
        Ok(surface)
    }

    /// SAFETY: display and window handles must be valid for the complete lifetime of surface
    unsafe fn create_surface_raw(
        &self,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
    ) -> Result<vk::SurfaceKHR> {
        // check for surface-extension
        self.ext_surface()?;

        match (raw_display_handle, raw_window_handle) {
            #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
            (RawDisplayHandle::Xlib(d), RawWindowHandle::Xlib(w)) => unsafe {
                self.create_surface_xlib(
                    d.display.ok_or(Error::WindowNotAvailable)?.as_ptr().cast(),
                    w.window,
                )
            },
            #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
            (RawDisplayHandle::Xcb(d), RawWindowHandle::Xcb(w)) => unsafe {
                self.create_surface_xcb(
                    d.connection.ok_or(Error::WindowNotAvailable)?.as_ptr(),
                    w.window.get(),
                )
            },
            #[cfg(all(unix, not(target_os = "android"), not(target_os = "macos")))]
            (RawDisplayHandle::Wayland(d), RawWindowHandle::Wayland(w)) => unsafe {
                self.create_surface_wayland(d.display.as_ptr().cast(), w.surface.as_ptr().cast())
            },
            #[cfg(target_os = "android")]
            (RawDisplayHandle::Android(_), RawWindowHandle::AndroidNdk(w)) => unsafe {
                self.create_surface_android(w.a_native_window.as_ptr().cast())
            },
            #[cfg(target_os = "windows")]
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(w)) => unsafe {
                let hinstance = w.hinstance.map_or(0, |h| h.get());
                self.create_surface_win32(hinstance as vk::HINSTANCE, w.hwnd.get() as vk::HWND)
            },
            _ => Err(Error::UnsupportedWindowSystem),
        }
    }

    /// SAFETY: display and window handles must be valid for the complete lifetime of surface
    pub(crate) unsafe fn new_surface(
        &self,
        window: &dyn SurfaceWindow,
    ) -> Result<Guard<'_, vk::SurfaceKHR>> {
        fn map_handle_error(e: raw_window_handle::HandleError) -> Error {
            use raw_window_handle::HandleError;
            match e {
                HandleError::Unavailable => Error::WindowNotAvailable,
                _ => Error::UnsupportedWindowSystem,
            }
        }
        let raw_display_handle = window.display_handle().map_err(map_handle_error)?.as_raw();
        let raw_window_handle = window.window_handle().map_err(map_handle_error)?.as_raw();
        let surface_raw = unsafe { self.create_surface_raw(raw_display_handle, raw_window_handle)? };
        Ok(Guard::new(self, surface_raw))
    }
}

/// Clamps a requested image count into the range supported by the surface.
///
/// A request of `0` asks for double buffering. `max_image_count == 0`
/// means there is no upper limit.
pub(crate) fn clamp_image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let requested = if requested == 0 { 2 } else { requested };
    let mut count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// Picks the present mode for the vsync setting among the `supported` modes.
///
/// Without vsync mailbox is preferred, then immediate. FIFO is always
/// available and the fallback.
pub(crate) fn choose_present_mode(
    enable_vsync: bool,
    supported: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    const PREFERENCE: [vk::PresentModeKHR; 2] =
        [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
    if !enable_vsync {
        for mode in PREFERENCE {
            if supported.contains(&mode) {
                return mode;
            }
        }
    }
    vk::PresentModeKHR::FIFO
}

/// Picks the surface format for `requested`.
///
/// Falls back to `Bgra8Unorm` when the surface does not offer the request.
/// HDR requests look for the HDR10 color space instead of sRGB.
pub(crate) fn choose_surface_format(
    requested: TextureFormat,
    hdr: bool,
    supported: &[vk::SurfaceFormatKHR],
) -> (TextureFormat, vk::SurfaceFormatKHR) {
    let fallback = (
        TextureFormat::Bgra8Unorm,
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    );
    // the surface has no preference
    if let [only] = supported {
        if only.format == vk::Format::UNDEFINED {
            return fallback;
        }
    }
    let color_space = if hdr {
        vk::ColorSpaceKHR::HDR10_ST2084_EXT
    } else {
        vk::ColorSpaceKHR::SRGB_NONLINEAR
    };
    let format: vk::Format = requested.vk_into();
    supported
        .iter()
        .find(|f| f.format == format && f.color_space == color_space)
        .map_or(fallback, |&f| (requested, f))
}

/// Presentable images of one window surface.
pub struct SwapChain {
    device: Arc<AshDevice>,
    surface: vk::SurfaceKHR,
    raw: vk::SwapchainKHR,
    desc: SwapChainDesc,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    queue_families: Vec<u32>,
    present_queue: Option<(vk::Queue, Arc<Mutex<()>>)>,
    render_targets: Vec<RenderTarget>,
    _window: Arc<dyn SurfaceWindow>,
}

impl SwapChain {
    pub(crate) fn new(
        device: &Arc<AshDevice>,
        queues: &[&Queue],
        desc: &mut SwapChainDesc,
        window: Arc<dyn SurfaceWindow>,
    ) -> Result<Self> {
        device.ext_swapchain()?;
        let instance = device.instance();
        let surface = unsafe { instance.new_surface(&*window)? };

        let mut queue_families: Vec<u32> = queues.iter().map(|q| q.family_index()).collect();
        queue_families.sort_unstable();
        queue_families.dedup();
        let first_family = queues.first().map_or(0, |q| q.family_index());
        let present_family = find_present_family(device, surface.raw(), first_family)
            .ok_or(Error::NoSwapchainSupport)?;
        let present_queue = if present_family != first_family {
            if !queue_families.contains(&present_family) {
                queue_families.push(present_family);
            }
            let lock = device
                .queue_lock(present_family, 0)
                .ok_or(Error::NoSwapchainSupport)?;
            Some((unsafe { device.get_device_queue(present_family, 0) }, lock))
        } else {
            None
        };

        let mut swap_chain = Self {
            device: device.clone(),
            surface: vk::SurfaceKHR::null(),
            raw: vk::SwapchainKHR::null(),
            desc: desc.clone(),
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            queue_families,
            present_queue,
            render_targets: Vec::new(),
            _window: window,
        };
        swap_chain.surface = surface.take();
        swap_chain.configure()?;
        *desc = swap_chain.desc.clone();
        Ok(swap_chain)
    }

    fn configure(&mut self) -> Result<()> {
        let device = self.device.clone();
        let ext_surface = device.instance().ext_surface()?;
        let physical_device = device.physical_device();
        let (caps, formats, present_modes) = unsafe {
            (
                ext_surface.get_physical_device_surface_capabilities(physical_device, self.surface)?,
                ext_surface.get_physical_device_surface_formats(physical_device, self.surface)?,
                ext_surface
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            )
        };
        if formats.is_empty() {
            return Err(Error::NoSwapchainSupport);
        }

        let image_count = clamp_image_count(self.desc.image_count, &caps);
        if image_count != self.desc.image_count {
            warn!(
                "swapchain image count {} clamped to {} (supported {}..={})",
                self.desc.image_count, image_count, caps.min_image_count, caps.max_image_count
            );
            self.desc.image_count = image_count;
        }

        let (color_format, surface_format) =
            choose_surface_format(self.desc.color_format, self.desc.hdr, &formats);
        if color_format != self.desc.color_format {
            debug!(
                "surface does not support {:?}, using {:?}",
                self.desc.color_format, color_format
            );
            self.desc.color_format = color_format;
        }
        self.surface_format = surface_format;
        self.present_mode = choose_present_mode(self.desc.enable_vsync, &present_modes);

        if caps.current_extent.width != u32::MAX {
            self.desc.width = caps.current_extent.width;
            self.desc.height = caps.current_extent.height;
        }

        let sharing_mode = if self.queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(self.desc.image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(vk::Extent2D {
                width: self.desc.width,
                height: self.desc.height,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(if sharing_mode == vk::SharingMode::CONCURRENT {
                &self.queue_families
            } else {
                &[]
            })
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(self.raw);

        let ext_swapchain = device.ext_swapchain()?;
        let swapchain = device.hold(unsafe { ext_swapchain.create_swapchain(&create_info, None)? });

        // the old swapchain is retired, even if creating the images fails
        self.render_targets.clear();
        unsafe { device.destroy(std::mem::replace(&mut self.raw, swapchain.take())) };

        let images = unsafe { ext_swapchain.get_swapchain_images(self.raw)? };
        let mut rt_desc = RenderTargetDesc::new(self.desc.width, self.desc.height, color_format);
        rt_desc.clear_value = self.desc.color_clear_value;
        for (i, image) in images.into_iter().enumerate() {
            rt_desc.name = Some(format!("swapchain image {i}"));
            self.render_targets
                .push(RenderTarget::from_swapchain_image(&device, image, &rt_desc, false)?);
        }
        self.desc.image_count = self.render_targets.len() as u32;

        info!(
            "created swapchain {}x{}, {} images, {:?}, {:?}",
            self.desc.width,
            self.desc.height,
            self.desc.image_count,
            color_format,
            self.present_mode
        );
        Ok(())
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    /// Queue of the dedicated present family and its submit lock, if the
    /// surface needs one.
    #[inline]
    pub(crate) fn present_queue(&self) -> Option<(vk::Queue, &Arc<Mutex<()>>)> {
        self.present_queue.as_ref().map(|(queue, lock)| (*queue, lock))
    }

    #[inline]
    pub fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.render_targets.len() as u32
    }

    #[inline]
    pub fn render_target(&self, index: u32) -> Option<&RenderTarget> {
        self.render_targets.get(index as usize)
    }

    #[inline]
    pub fn render_targets(&self) -> &[RenderTarget] {
        &self.render_targets
    }

    /// Acquires the next image; `None` if the swap chain is out of date.
    pub fn acquire_next_image(
        &mut self,
        signal_semaphore: Option<&Semaphore>,
        signal_fence: Option<&Fence>,
    ) -> Result<Option<u32>> {
        let ext_swapchain = self.device.ext_swapchain()?;
        let result = unsafe {
            ext_swapchain.acquire_next_image(
                self.raw,
                u64::MAX,
                signal_semaphore.map_or(vk::Semaphore::null(), |s| s.raw()),
                signal_fence.map_or(vk::Fence::null(), |f| f.raw()),
            )
        };
        let index = match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("swapchain is suboptimal");
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(None),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => return Err(Error::SurfaceLost),
            Err(e) => return Err(self.device.map_error(e, vk::Queue::null())),
        };
        if let Some(semaphore) = signal_semaphore {
            semaphore.mark_signaled(0);
        }
        if let Some(fence) = signal_fence {
            fence.mark_submitted();
        }
        Ok(Some(index))
    }

    /// Recreates the swap chain with the opposite vsync setting.
    pub(crate) fn toggle_vsync(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        self.desc.enable_vsync = !self.desc.enable_vsync;
        self.configure()
    }
}

/// Family presenting to `surface`, preferring one other than `queue_family`.
fn find_present_family(
    device: &AshDevice,
    surface: vk::SurfaceKHR,
    queue_family: u32,
) -> Option<u32> {
    let ext_surface = device.instance().ext_surface().ok()?;
    let family_count = device.gpu().queue_families.len() as u32;
    let supports = |family: u32| unsafe {
        ext_surface
            .get_physical_device_surface_support(device.physical_device(), family, surface)
            .unwrap_or(false)
    };
    (0..family_count)
        .find(|&family| family != queue_family && supports(family))
        .or_else(|| (0..family_count).find(|&family| supports(family)))
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.render_targets.clear();
        unsafe {
            self.device.destroy(self.raw);
            self.surface.destroy(self.device.instance());
        }
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("raw", &self.raw)
            .field("desc", &self.desc)
            .field("present_mode", &self.present_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_clamp_image_count() {
        assert_eq!(3, clamp_image_count(3, &caps(2, 8)));
        assert_eq!(2, clamp_image_count(0, &caps(1, 3)));
        assert_eq!(3, clamp_image_count(1, &caps(3, 8)));
        assert_eq!(4, clamp_image_count(6, &caps(2, 4)));
        // no upper limit
        assert_eq!(16, clamp_image_count(16, &caps(2, 0)));
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(vk::PresentModeKHR::FIFO, choose_present_mode(false, &fifo_only));
        assert_eq!(vk::PresentModeKHR::FIFO, choose_present_mode(true, &fifo_only));
    }

    #[test]
    fn test_present_mode_without_vsync() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(vk::PresentModeKHR::MAILBOX, choose_present_mode(false, &all));
        assert_eq!(vk::PresentModeKHR::FIFO, choose_present_mode(true, &all));
        let no_mailbox = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(vk::PresentModeKHR::IMMEDIATE, choose_present_mode(false, &no_mailbox));
    }

    #[test]
    fn test_surface_format() {
        let srgb = |format| vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let supported = [srgb(vk::Format::B8G8R8A8_UNORM), srgb(vk::Format::B8G8R8A8_SRGB)];
        let (format, surface) =
            choose_surface_format(TextureFormat::Bgra8UnormSrgb, false, &supported);
        assert_eq!(TextureFormat::Bgra8UnormSrgb, format);
        assert_eq!(vk::Format::B8G8R8A8_SRGB, surface.format);

        let (format, surface) = choose_surface_format(TextureFormat::Rgba16Float, false, &supported);
        assert_eq!(TextureFormat::Bgra8Unorm, format);
        assert_eq!(vk::Format::B8G8R8A8_UNORM, surface.format);

        let (format, _) = choose_surface_format(
            TextureFormat::Rgba8UnormSrgb,
            false,
            &[srgb(vk::Format::UNDEFINED)],
        );
        assert_eq!(TextureFormat::Bgra8Unorm, format);
    }
}
