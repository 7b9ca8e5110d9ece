//! Swapchain configuration policy and the swapchain with its image views
//! and framebuffers.

use std::cmp;

use ash::vk;

use crate::{
    config::PresentModePreference,
    device::{Context, QueueFamilies},
    error::{check, Error, Result},
    util::{drop_message, ErrorOnDrop},
};

/// `currentExtent` value meaning the swapchain decides the surface size.
pub const SWAPCHAIN_CHOOSES_EXTENT: vk::Extent2D = vk::Extent2D {
    width: u32::MAX,
    height: u32::MAX,
};

/// How a scene's output reaches the display as sRGB.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorPolicy {
    /// Render to an `_SRGB` format; the hardware encodes on store.
    HardwareSrgb,
    /// Render to a `_UNORM` format; the fragment shader applies gamma.
    ManualGamma,
}

impl ColorPolicy {
    pub fn preferred_format(self) -> vk::Format {
        match self {
            ColorPolicy::HardwareSrgb => vk::Format::B8G8R8A8_SRGB,
            ColorPolicy::ManualGamma => vk::Format::B8G8R8A8_UNORM,
        }
    }
}

/// Picks the policy's preferred format, or the first supported one.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    policy: ColorPolicy,
) -> Option<vk::SurfaceFormatKHR> {
    let preferred = vk::SurfaceFormatKHR {
        format: policy.preferred_format(),
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    match formats {
        [] => None,
        // The surface has no preference.
        [only] if only.format == vk::Format::UNDEFINED => Some(preferred),
        _ => Some(
            formats
                .iter()
                .copied()
                .find(|sf| {
                    sf.format == preferred.format && sf.color_space == preferred.color_space
                })
                .unwrap_or(formats[0]),
        ),
    }
}

/// One more than the minimum, so the application can acquire an image while
/// the presentation engine holds the rest.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = cmp::max(caps.min_image_count + 1, 2);

    let clamped = if caps.max_image_count == 0 {
        // No limit.
        desired
    } else {
        cmp::min(desired, caps.max_image_count)
    };

    cmp::max(clamped, caps.min_image_count)
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != SWAPCHAIN_CHOOSES_EXTENT.width
        || caps.current_extent.height != SWAPCHAIN_CHOOSES_EXTENT.height
    {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Implementations are required to support FIFO, so it is the fallback.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    let wanted = preference.as_vk();
    if available.contains(&wanted) {
        return wanted;
    }

    log::warn!(
        "present mode {:?} is unsupported, using FIFO",
        preference
    );
    vk::PresentModeKHR::FIFO
}

pub fn choose_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

pub fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| caps.supported_composite_alpha.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Queue families sharing the swapchain images.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Sharing {
    #[default]
    Exclusive,
    Concurrent([u32; 2]),
}

impl Sharing {
    pub fn for_families(families: QueueFamilies) -> Sharing {
        if families.is_shared() {
            Sharing::Exclusive
        } else {
            Sharing::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Sharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            Sharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn indices(&self) -> &[u32] {
        match self {
            Sharing::Exclusive => &[],
            Sharing::Concurrent(indices) => indices,
        }
    }
}

/// What the surface supports, queried fresh before every (re)creation.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(ctx: &Context) -> Result<SurfaceSupport> {
        let loader = ctx.surface_loader();
        let phys = ctx.physical_device();
        let surface = ctx.surface();

        unsafe {
            Ok(SurfaceSupport {
                capabilities: check(
                    loader.get_physical_device_surface_capabilities(phys, surface),
                    "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
                    Error::SwapchainCreation,
                )?,
                formats: check(
                    loader.get_physical_device_surface_formats(phys, surface),
                    "vkGetPhysicalDeviceSurfaceFormatsKHR",
                    Error::SwapchainCreation,
                )?,
                present_modes: check(
                    loader.get_physical_device_surface_present_modes(phys, surface),
                    "vkGetPhysicalDeviceSurfacePresentModesKHR",
                    Error::SwapchainCreation,
                )?,
            })
        }
    }
}

/// The parameters a swapchain is created with.
#[derive(Copy, Clone, Debug, Default)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing: Sharing,
}

impl SwapchainConfig {
    pub fn choose(
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
        policy: ColorPolicy,
        preference: PresentModePreference,
        families: QueueFamilies,
    ) -> Result<SwapchainConfig> {
        let caps = &support.capabilities;

        let format =
            choose_surface_format(&support.formats, policy).ok_or(Error::NoSurfaceFormat)?;

        Ok(SwapchainConfig {
            format,
            extent: choose_extent(caps, window_extent),
            image_count: choose_image_count(caps),
            present_mode: choose_present_mode(&support.present_modes, preference),
            transform: choose_transform(caps),
            composite_alpha: choose_composite_alpha(caps),
            sharing: Sharing::for_families(families),
        })
    }
}

drop_message!(
    DroppedSwapchain,
    "Swapchain must be manually destroyed with .destroy()"
);

/// A swapchain, one view per image and, once a render pass exists, one
/// framebuffer per view.
///
/// The default value owns nothing and may be destroyed freely.
#[derive(Default)]
pub struct Swapchain {
    bomb: ErrorOnDrop<DroppedSwapchain>,
    config: SwapchainConfig,
    raw: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

fn attachments_complete(images: usize, views: usize, framebuffers: usize) -> bool {
    images > 0 && views == images && framebuffers == images
}

fn create_view(ctx: &Context, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    check(
        unsafe { ctx.device().create_image_view(&info, None) },
        "vkCreateImageView",
        Error::SwapchainCreation,
    )
}

impl Swapchain {
    /// Creates the swapchain and its image views.
    ///
    /// `old` is retired by the driver but must still be destroyed by the
    /// caller.
    pub fn create(
        ctx: &Context,
        config: SwapchainConfig,
        old: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface())
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing.mode())
            .queue_family_indices(config.sharing.indices())
            .pre_transform(config.transform)
            .composite_alpha(config.composite_alpha)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old.unwrap_or(vk::SwapchainKHR::null()));

        let loader = ctx.swapchain_loader();

        let raw = check(
            unsafe { loader.create_swapchain(&info, None) },
            "vkCreateSwapchainKHR",
            Error::SwapchainCreation,
        )?;

        let mut swapchain = Swapchain {
            bomb: ErrorOnDrop::new(DroppedSwapchain),
            config,
            raw,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };

        if let Err(e) = swapchain.create_views(ctx) {
            unsafe { swapchain.destroy(ctx) };
            return Err(e);
        }

        log::info!(
            "created swapchain: {:?}/{:?}, {}x{}, {} images, {:?}",
            config.format.format,
            config.format.color_space,
            config.extent.width,
            config.extent.height,
            swapchain.images.len(),
            config.present_mode,
        );

        Ok(swapchain)
    }

    fn create_views(&mut self, ctx: &Context) -> Result<()> {
        self.images = check(
            unsafe { ctx.swapchain_loader().get_swapchain_images(self.raw) },
            "vkGetSwapchainImagesKHR",
            Error::SwapchainCreation,
        )?;

        self.views.reserve(self.images.len());
        for &image in &self.images {
            let view = create_view(ctx, image, self.config.format.format)?;
            self.views.push(view);
        }

        Ok(())
    }

    /// Creates one framebuffer per image view.
    pub fn create_framebuffers(
        &mut self,
        ctx: &Context,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        debug_assert!(self.framebuffers.is_empty());

        for &view in &self.views {
            let attachments = [view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.config.extent.width)
                .height(self.config.extent.height)
                .layers(1);

            let framebuffer = match check(
                unsafe { ctx.device().create_framebuffer(&info, None) },
                "vkCreateFramebuffer",
                Error::SwapchainCreation,
            ) {
                Ok(fb) => fb,
                Err(e) => {
                    unsafe { self.destroy_framebuffers(ctx) };
                    return Err(e);
                }
            };
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// # Safety
    ///
    /// No submitted work may still reference the framebuffers.
    pub unsafe fn destroy_framebuffers(&mut self, ctx: &Context) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { ctx.device().destroy_framebuffer(framebuffer, None) };
        }
    }

    /// # Safety
    ///
    /// No submitted work may still reference the image views.
    pub unsafe fn destroy_views(&mut self, ctx: &Context) {
        unsafe { self.destroy_framebuffers(ctx) };
        for view in self.views.drain(..) {
            unsafe { ctx.device().destroy_image_view(view, None) };
        }
        self.images.clear();
    }

    /// Destroys framebuffers, then views, then the swapchain itself.
    ///
    /// # Safety
    ///
    /// The device must be idle with respect to this swapchain's images.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe {
            self.destroy_views(ctx);
            if self.raw != vk::SwapchainKHR::null() {
                ctx.swapchain_loader().destroy_swapchain(self.raw, None);
            }
        }
        self.raw = vk::SwapchainKHR::null();
        self.bomb.disarm();
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn format(&self) -> vk::Format {
        self.config.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// True when every image has a view and a framebuffer.
    pub fn is_complete(&self) -> bool {
        attachments_complete(self.images.len(), self.views.len(), self.framebuffers.len())
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }

    fn sentinel_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: SWAPCHAIN_CHOOSES_EXTENT,
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..caps(2, 8)
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn sf(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn image_count_is_one_above_minimum() {
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(3, 0)), 4);
    }

    #[test]
    fn image_count_never_below_two() {
        assert_eq!(choose_image_count(&caps(0, 0)), 2);
    }

    #[test]
    fn image_count_clamps_to_maximum() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(1, 1)), 1);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn image_count_stays_within_bounds() {
        for min in 0..6 {
            for max in [0, min, min + 1, min + 4] {
                let c = caps(min, max);
                let n = choose_image_count(&c);
                assert!(n >= min, "min {} max {} -> {}", min, max, n);
                if max != 0 {
                    assert!(n <= max, "min {} max {} -> {}", min, max, n);
                }
            }
        }
    }

    #[test]
    fn extent_uses_current_extent() {
        let e = choose_extent(&caps(2, 3), extent(1024, 768));
        assert_eq!(e, extent(800, 600));
    }

    #[test]
    fn extent_sentinel_uses_clamped_window_size() {
        let c = sentinel_caps();
        assert_eq!(choose_extent(&c, extent(1024, 768)), extent(1024, 768));
        assert_eq!(choose_extent(&c, extent(8, 5000)), extent(64, 1080));
    }

    #[test]
    fn extent_round_trip() {
        let c = sentinel_caps();
        let original = extent(800, 600);
        let first = choose_extent(&c, original);
        let _resized = choose_extent(&c, extent(1280, 720));
        let back = choose_extent(&c, original);
        assert_eq!(first, back);
        assert_eq!(back, original);
    }

    #[test]
    fn format_policies() {
        let formats = [
            sf(vk::Format::R8G8B8A8_UNORM),
            sf(vk::Format::B8G8R8A8_UNORM),
            sf(vk::Format::B8G8R8A8_SRGB),
        ];

        let srgb = choose_surface_format(&formats, ColorPolicy::HardwareSrgb).unwrap();
        assert_eq!(srgb.format, vk::Format::B8G8R8A8_SRGB);

        let unorm = choose_surface_format(&formats, ColorPolicy::ManualGamma).unwrap();
        assert_eq!(unorm.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn format_fallback_and_edge_cases() {
        let formats = [sf(vk::Format::R8G8B8A8_UNORM)];
        let chosen = choose_surface_format(&formats, ColorPolicy::HardwareSrgb).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);

        assert!(choose_surface_format(&[], ColorPolicy::HardwareSrgb).is_none());

        let undefined = [sf(vk::Format::UNDEFINED)];
        let chosen = choose_surface_format(&undefined, ColorPolicy::ManualGamma).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn wrong_color_space_falls_back_to_first_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            sf(vk::Format::A2B10G10R10_UNORM_PACK32),
        ];
        let chosen = choose_surface_format(&formats, ColorPolicy::HardwareSrgb).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            chosen.color_space,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, PresentModePreference::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&modes, PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&modes, PresentModePreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn transform_and_alpha() {
        let mut c = caps(2, 3);
        assert_eq!(choose_transform(&c), vk::SurfaceTransformFlagsKHR::IDENTITY);
        assert_eq!(choose_composite_alpha(&c), vk::CompositeAlphaFlagsKHR::OPAQUE);

        c.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        c.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        c.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED;
        assert_eq!(choose_transform(&c), vk::SurfaceTransformFlagsKHR::ROTATE_90);
        assert_eq!(
            choose_composite_alpha(&c),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }

    #[test]
    fn separate_families_share_concurrently() {
        let families = QueueFamilies {
            graphics: 0,
            present: 1,
        };
        let sharing = Sharing::for_families(families);
        assert_eq!(sharing.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(sharing.indices(), &[0, 1]);

        let shared = Sharing::for_families(QueueFamilies {
            graphics: 2,
            present: 2,
        });
        assert_eq!(shared.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(shared.indices().is_empty());
    }

    #[test]
    fn config_choice() {
        let support = SurfaceSupport {
            capabilities: sentinel_caps(),
            formats: vec![sf(vk::Format::B8G8R8A8_UNORM), sf(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };

        let config = SwapchainConfig::choose(
            &support,
            extent(640, 480),
            ColorPolicy::HardwareSrgb,
            PresentModePreference::Mailbox,
            families,
        )
        .unwrap();

        assert_eq!(config.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.extent, extent(640, 480));
        assert_eq!(config.image_count, 3);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.sharing, Sharing::Exclusive);

        let empty = SurfaceSupport {
            formats: Vec::new(),
            ..support
        };
        assert!(matches!(
            SwapchainConfig::choose(
                &empty,
                extent(640, 480),
                ColorPolicy::HardwareSrgb,
                PresentModePreference::Fifo,
                families,
            ),
            Err(Error::NoSurfaceFormat)
        ));
    }

    #[test]
    fn attachments_complete_requires_equal_counts() {
        assert!(attachments_complete(3, 3, 3));
        assert!(!attachments_complete(0, 0, 0));
        // Views recreated, framebuffers not yet.
        assert!(!attachments_complete(3, 3, 0));
        assert!(!attachments_complete(3, 2, 3));
        assert!(!Swapchain::default().is_complete());
    }
}
