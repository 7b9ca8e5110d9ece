//! Instance, surface, physical device and logical device creation.

use std::{
    cmp,
    ffi::{CStr, CString},
    ops::Deref,
};

use arrayvec::ArrayVec;
use ash::{ext, khr, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    config::RendererConfig,
    debug_utils::DebugMessenger,
    error::{check, Error, Result},
    loader, surface, ApiVersion,
};

const LAYER_NAME_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";

/// The subset of `vk::QueueFamilyProperties` that family selection needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether the family can present to the window surface.
    pub present: bool,
}

/// Queue family indices chosen for rendering and presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// True if one family does both jobs.
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// The distinct family indices, graphics first.
    pub fn unique(&self) -> ArrayVec<u32, 2> {
        let mut families = ArrayVec::new();
        families.push(self.graphics);
        if !self.is_shared() {
            families.push(self.present);
        }
        families
    }
}

/// Chooses graphics and present families, preferring a single family that
/// does both.
///
/// When `needs_compute` is set the graphics family must also support
/// compute, since compute and draw are recorded into one command buffer.
pub fn select_queue_families(
    families: &[QueueFamilyInfo],
    needs_compute: bool,
) -> Result<QueueFamilies> {
    let mut required = vk::QueueFlags::GRAPHICS;
    if needs_compute {
        required |= vk::QueueFlags::COMPUTE;
    }

    let usable = |f: &QueueFamilyInfo| f.queue_count > 0 && f.flags.contains(required);

    if let Some(i) = families.iter().position(|f| usable(f) && f.present) {
        let i = i as u32;
        return Ok(QueueFamilies {
            graphics: i,
            present: i,
        });
    }

    let graphics = families
        .iter()
        .position(usable)
        .ok_or(Error::NoGraphicsQueue)?;
    let present = families
        .iter()
        .position(|f| f.queue_count > 0 && f.present)
        .ok_or(Error::NoPresentQueue)?;

    Ok(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// What device selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub families: Vec<QueueFamilyInfo>,
    pub supports_swapchain: bool,
    pub has_surface_formats: bool,
    pub has_present_modes: bool,
}

pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        _ => 1,
    }
}

/// Picks the best suitable device and its queue families.
///
/// Devices are ranked by type; ties go to the earlier device.
pub fn select_physical_device(
    candidates: &[DeviceCandidate],
    needs_compute: bool,
) -> Result<(usize, QueueFamilies)> {
    if candidates.is_empty() {
        log::error!("no Vulkan physical devices are available");
        return Err(Error::NoPhysicalDevice);
    }

    let mut best: Option<(u32, usize, QueueFamilies)> = None;
    let mut last_queue_error = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.supports_swapchain {
            log::debug!("skipping {}: no VK_KHR_swapchain", candidate.name);
            continue;
        }

        if !candidate.has_surface_formats || !candidate.has_present_modes {
            log::debug!("skipping {}: surface unsupported", candidate.name);
            continue;
        }

        let families = match select_queue_families(&candidate.families, needs_compute) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("skipping {}: {}", candidate.name, e);
                last_queue_error = Some(e);
                continue;
            }
        };

        let score = device_type_score(candidate.device_type);
        log::debug!("{} ({:?}) scores {}", candidate.name, candidate.device_type, score);

        if best.map_or(true, |(best_score, _, _)| score > best_score) {
            best = Some((score, index, families));
        }
    }

    match best {
        Some((_, index, families)) => Ok((index, families)),
        None => {
            // A lone device that only lacks queues gets the specific error.
            let err = match last_queue_error {
                Some(e) if candidates.len() == 1 => e,
                _ => Error::NoSuitableDevice,
            };
            log::error!("{}", err);
            Err(err)
        }
    }
}

/// Runs `create` only when at least one physical device exists, so that a
/// machine without adapters fails before anything is created against the
/// instance.
fn require_physical_devices<T, F>(devices: &[vk::PhysicalDevice], create: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    if devices.is_empty() {
        log::error!("no Vulkan physical devices are available");
        return Err(Error::NoPhysicalDevice);
    }

    create()
}

/// Destroys the instance when dropped.
struct InstanceOwner(ash::Instance);

impl Deref for InstanceOwner {
    type Target = ash::Instance;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for InstanceOwner {
    fn drop(&mut self) {
        log::debug!("destroying instance");
        unsafe { self.0.destroy_instance(None) };
    }
}

/// Destroys the logical device when dropped.
struct DeviceOwner(ash::Device);

impl Deref for DeviceOwner {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for DeviceOwner {
    fn drop(&mut self) {
        log::debug!("destroying device");
        unsafe { self.0.destroy_device(None) };
    }
}

/// Destroys the surface when dropped.
struct SurfaceOwner {
    loader: khr::surface::Instance,
    raw: vk::SurfaceKHR,
}

impl Drop for SurfaceOwner {
    fn drop(&mut self) {
        log::debug!("destroying surface");
        unsafe { self.loader.destroy_surface(self.raw, None) };
    }
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(name))
}

fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(name))
}

/// The device-level state every other component borrows.
pub struct Context {
    // NOTE: Drop correctness depends on field order!
    swapchain_loader: khr::swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    families: QueueFamilies,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    api_version: ApiVersion,

    surface: SurfaceOwner,
    device: DeviceOwner,
    _debug: Option<DebugMessenger>,
    instance: InstanceOwner,

    // Must outlive every handle above.
    entry: &'static ash::Entry,
}

impl Context {
    /// Creates the instance, surface and logical device for a window.
    ///
    /// On failure, whatever was created is destroyed in reverse order.
    ///
    /// # Safety
    ///
    /// The window behind `display` and `window` must outlive the returned
    /// context.
    pub unsafe fn new(
        config: &RendererConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        needs_compute: bool,
    ) -> Result<Context> {
        let entry = loader::entry()?;

        let driver_version = match unsafe { entry.try_enumerate_instance_version() } {
            Ok(Some(version)) => ApiVersion::from_u32(version),
            Ok(None) => ApiVersion::V1_0_0,
            Err(result) => {
                return check(Err(result), "vkEnumerateInstanceVersion", Error::InstanceCreation)
            }
        };
        let api_version = cmp::min(driver_version, config.max_api_version);

        let instance = Self::create_instance(entry, config, display, api_version)?;
        loader::verify_instance(entry, &instance)?;

        let physical_devices = check(
            unsafe { instance.enumerate_physical_devices() },
            "vkEnumeratePhysicalDevices",
            Error::DeviceCreation,
        )?;

        let (debug, surface) = require_physical_devices(&physical_devices, || {
            let debug = if config.validation {
                match DebugMessenger::new(entry, &instance) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        log::warn!("validation messages will not be logged: {}", e);
                        None
                    }
                }
            } else {
                None
            };

            let surface = SurfaceOwner {
                loader: khr::surface::Instance::new(entry, &instance),
                raw: unsafe { surface::create_surface(entry, &instance, display, window)? },
            };

            Ok((debug, surface))
        })?;

        let candidates = physical_devices
            .iter()
            .map(|&pd| Self::describe(&instance, &surface, pd))
            .collect::<Vec<_>>();

        let (index, families) = select_physical_device(&candidates, needs_compute)?;
        let physical_device = physical_devices[index];
        let device_name = candidates[index].name.clone();

        log::info!(
            "using {} ({:?}), Vulkan {}, graphics family {}, present family {}",
            device_name,
            candidates[index].device_type,
            api_version,
            families.graphics,
            families.present,
        );

        let device = Self::create_device(&instance, physical_device, families)?;
        loader::verify_device(&instance, &device)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let swapchain_loader = khr::swapchain::Device::new(&instance, &device);

        Ok(Context {
            swapchain_loader,
            graphics_queue,
            present_queue,
            families,
            memory_properties,
            physical_device,
            device_name,
            api_version,
            surface,
            device,
            _debug: debug,
            instance,
            entry,
        })
    }

    fn create_instance(
        entry: &ash::Entry,
        config: &RendererConfig,
        display: RawDisplayHandle,
        api_version: ApiVersion,
    ) -> Result<InstanceOwner> {
        let available_extensions = check(
            unsafe { entry.enumerate_instance_extension_properties(None) },
            "vkEnumerateInstanceExtensionProperties",
            Error::InstanceCreation,
        )?;
        let available_layers = check(
            unsafe { entry.enumerate_instance_layer_properties() },
            "vkEnumerateInstanceLayerProperties",
            Error::InstanceCreation,
        )?;

        let mut extensions: Vec<&CStr> = surface::required_extensions(display)?.to_vec();
        for &ext in &extensions {
            if !has_extension(&available_extensions, ext) {
                log::warn!("Extension not found: {}", ext.to_string_lossy());
            }
        }

        let mut layers: Vec<&CStr> = Vec::new();
        if config.validation {
            if has_extension(&available_extensions, ext::debug_utils::NAME) {
                extensions.push(ext::debug_utils::NAME);
            } else {
                log::warn!("Extension not found: {}", ext::debug_utils::NAME.to_string_lossy());
            }

            if has_layer(&available_layers, LAYER_NAME_VALIDATION) {
                layers.push(LAYER_NAME_VALIDATION);
            } else {
                log::warn!("Layer not found: {}", LAYER_NAME_VALIDATION.to_string_lossy());
            }
        }

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(config.app_version)
            .engine_name(c"ember")
            .engine_version(1)
            .api_version(api_version.as_u32());

        let ext_ptrs = extensions.iter().map(|s| s.as_ptr()).collect::<Vec<_>>();
        let layer_ptrs = layers.iter().map(|s| s.as_ptr()).collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&ext_ptrs);

        let raw = check(
            unsafe { entry.create_instance(&create_info, None) },
            "vkCreateInstance",
            Error::InstanceCreation,
        )?;
        log::debug!(
            "created instance with extensions {:?} and layers {:?}",
            extensions,
            layers
        );

        Ok(InstanceOwner(raw))
    }

    fn describe(
        instance: &ash::Instance,
        surface: &SurfaceOwner,
        pd: vk::PhysicalDevice,
    ) -> DeviceCandidate {
        let props = unsafe { instance.get_physical_device_properties(pd) };
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed device>"));

        let families = unsafe { instance.get_physical_device_queue_family_properties(pd) }
            .iter()
            .enumerate()
            .map(|(index, props)| {
                let present = unsafe {
                    surface.loader.get_physical_device_surface_support(
                        pd,
                        index as u32,
                        surface.raw,
                    )
                }
                .unwrap_or_else(|e| {
                    log::warn!("{}: surface support query failed: {}", name, e);
                    false
                });

                QueueFamilyInfo {
                    flags: props.queue_flags,
                    queue_count: props.queue_count,
                    present,
                }
            })
            .collect();

        let supports_swapchain = unsafe { instance.enumerate_device_extension_properties(pd) }
            .map(|exts| has_extension(&exts, khr::swapchain::NAME))
            .unwrap_or(false);

        let has_surface_formats =
            unsafe { surface.loader.get_physical_device_surface_formats(pd, surface.raw) }
                .map(|f| !f.is_empty())
                .unwrap_or(false);

        let has_present_modes =
            unsafe { surface.loader.get_physical_device_surface_present_modes(pd, surface.raw) }
                .map(|m| !m.is_empty())
                .unwrap_or(false);

        DeviceCandidate {
            name,
            device_type: props.device_type,
            families,
            supports_swapchain,
            has_surface_formats,
            has_present_modes,
        }
    }

    fn create_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> Result<DeviceOwner> {
        let priorities = [1.0f32];
        let queue_infos = families
            .unique()
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect::<ArrayVec<_, 2>>();

        let extensions = [khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let raw = check(
            unsafe { instance.create_device(physical_device, &create_info, None) },
            "vkCreateDevice",
            Error::DeviceCreation,
        )?;
        log::debug!("created logical device");

        Ok(DeviceOwner(raw))
    }

    pub fn entry(&self) -> &ash::Entry {
        self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.raw
    }

    pub fn surface_loader(&self) -> &khr::surface::Instance {
        &self.surface.loader
    }

    pub fn swapchain_loader(&self) -> &khr::swapchain::Device {
        &self.swapchain_loader
    }

    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn wait_idle(&self) -> Result<()> {
        check(
            unsafe { self.device.device_wait_idle() },
            "vkDeviceWaitIdle",
            Error::Sync,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swapchain::Sharing;

    const GRAPHICS_COMPUTE: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw(),
    );

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            present,
        }
    }

    fn candidate(device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: format!("{:?}", device_type),
            device_type,
            families: vec![family(GRAPHICS_COMPUTE, true)],
            supports_swapchain: true,
            has_surface_formats: true,
            has_present_modes: true,
        }
    }

    #[test]
    fn zero_adapters_is_fatal() {
        assert!(matches!(
            select_physical_device(&[], false),
            Err(Error::NoPhysicalDevice)
        ));
    }

    #[test]
    fn zero_adapters_fail_before_instance_objects_are_created() {
        let mut created = false;
        let result = require_physical_devices(&[], || {
            created = true;
            Ok(())
        });
        assert!(matches!(result, Err(Error::NoPhysicalDevice)));
        assert!(!created);

        let adapters = [vk::PhysicalDevice::null()];
        let value = require_physical_devices(&adapters, || Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn combined_family_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ];
        let chosen = select_queue_families(&families, false).unwrap();
        assert_eq!(
            chosen,
            QueueFamilies {
                graphics: 2,
                present: 2
            }
        );
        assert!(chosen.is_shared());
        assert_eq!(chosen.unique().as_slice(), &[2]);
    }

    #[test]
    fn separate_graphics_and_present_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        let chosen = select_queue_families(&families, false).unwrap();
        assert_eq!(chosen.graphics, 0);
        assert_eq!(chosen.present, 1);
        assert_eq!(chosen.unique().as_slice(), &[0, 1]);

        let sharing = Sharing::for_families(chosen);
        assert_eq!(sharing.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(sharing.indices(), &[0, 1]);
    }

    #[test]
    fn compute_requirement() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, true),
            family(GRAPHICS_COMPUTE, true),
        ];
        assert_eq!(select_queue_families(&families, false).unwrap().graphics, 0);
        assert_eq!(select_queue_families(&families, true).unwrap().graphics, 1);
    }

    #[test]
    fn missing_queue_kinds() {
        let no_graphics = [family(vk::QueueFlags::COMPUTE, true)];
        assert!(matches!(
            select_queue_families(&no_graphics, false),
            Err(Error::NoGraphicsQueue)
        ));

        let no_present = [family(vk::QueueFlags::GRAPHICS, false)];
        assert!(matches!(
            select_queue_families(&no_present, false),
            Err(Error::NoPresentQueue)
        ));

        let empty_family = [QueueFamilyInfo {
            flags: vk::QueueFlags::GRAPHICS,
            queue_count: 0,
            present: true,
        }];
        assert!(select_queue_families(&empty_family, false).is_err());
    }

    #[test]
    fn discrete_beats_integrated() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(vk::PhysicalDeviceType::CPU),
        ];
        let (index, _) = select_physical_device(&candidates, false).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ];
        assert_eq!(select_physical_device(&candidates, false).unwrap().0, 0);
    }

    #[test]
    fn unsuitable_devices_are_skipped() {
        let mut no_swapchain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.supports_swapchain = false;
        let mut no_formats = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_formats.has_surface_formats = false;
        let fallback = candidate(vk::PhysicalDeviceType::CPU);

        let candidates = [no_swapchain.clone(), no_formats, fallback];
        assert_eq!(select_physical_device(&candidates, false).unwrap().0, 2);

        assert!(matches!(
            select_physical_device(&[no_swapchain], false),
            Err(Error::NoSuitableDevice)
        ));
    }

    #[test]
    fn lone_device_reports_queue_error() {
        let mut gpu = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        gpu.families = vec![family(vk::QueueFlags::GRAPHICS, false)];
        assert!(matches!(
            select_physical_device(&[gpu], false),
            Err(Error::NoPresentQueue)
        ));
    }

    #[test]
    fn type_scores() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::VIRTUAL_GPU)
                > device_type_score(vk::PhysicalDeviceType::OTHER)
        );
    }
}
