//! Loading the Vulkan runtime and verifying the driver's entry points.

use std::{ffi::CStr, sync::OnceLock};

use ash::vk;

use crate::error::{LoaderError, SymbolScope};

static ENTRY: OnceLock<ash::Entry> = OnceLock::new();

/// Returns the process-wide Vulkan entry, loading the runtime library on
/// first use.
pub fn entry() -> Result<&'static ash::Entry, LoaderError> {
    if let Some(entry) = ENTRY.get() {
        return Ok(entry);
    }

    // Safety: the library stays loaded for the rest of the process.
    let loaded = unsafe { ash::Entry::load()? };
    log::debug!("loaded Vulkan runtime");

    // Another thread may have loaded it first.
    Ok(ENTRY.get_or_init(|| loaded))
}

/// Instance-level commands the renderer calls.
pub const INSTANCE_FUNCTIONS: &[&CStr] = &[
    c"vkDestroyInstance",
    c"vkEnumeratePhysicalDevices",
    c"vkGetPhysicalDeviceProperties",
    c"vkGetPhysicalDeviceQueueFamilyProperties",
    c"vkGetPhysicalDeviceMemoryProperties",
    c"vkEnumerateDeviceExtensionProperties",
    c"vkCreateDevice",
    c"vkGetDeviceProcAddr",
    c"vkDestroySurfaceKHR",
    c"vkGetPhysicalDeviceSurfaceSupportKHR",
    c"vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
    c"vkGetPhysicalDeviceSurfaceFormatsKHR",
    c"vkGetPhysicalDeviceSurfacePresentModesKHR",
];

/// Device-level commands the renderer calls.
pub const DEVICE_FUNCTIONS: &[&CStr] = &[
    c"vkDestroyDevice",
    c"vkGetDeviceQueue",
    c"vkDeviceWaitIdle",
    c"vkCreateSwapchainKHR",
    c"vkDestroySwapchainKHR",
    c"vkGetSwapchainImagesKHR",
    c"vkAcquireNextImageKHR",
    c"vkQueuePresentKHR",
    c"vkCreateImageView",
    c"vkDestroyImageView",
    c"vkCreateShaderModule",
    c"vkDestroyShaderModule",
    c"vkCreateRenderPass",
    c"vkDestroyRenderPass",
    c"vkCreateFramebuffer",
    c"vkDestroyFramebuffer",
    c"vkCreatePipelineLayout",
    c"vkDestroyPipelineLayout",
    c"vkCreateGraphicsPipelines",
    c"vkCreateComputePipelines",
    c"vkDestroyPipeline",
    c"vkCreateCommandPool",
    c"vkDestroyCommandPool",
    c"vkAllocateCommandBuffers",
    c"vkResetCommandBuffer",
    c"vkBeginCommandBuffer",
    c"vkEndCommandBuffer",
    c"vkCmdBeginRenderPass",
    c"vkCmdEndRenderPass",
    c"vkCmdBindPipeline",
    c"vkCmdBindVertexBuffers",
    c"vkCmdBindDescriptorSets",
    c"vkCmdSetViewport",
    c"vkCmdSetScissor",
    c"vkCmdPushConstants",
    c"vkCmdDraw",
    c"vkCmdDispatch",
    c"vkCmdPipelineBarrier",
    c"vkQueueSubmit",
    c"vkCreateSemaphore",
    c"vkDestroySemaphore",
    c"vkCreateFence",
    c"vkDestroyFence",
    c"vkWaitForFences",
    c"vkResetFences",
    c"vkCreateBuffer",
    c"vkDestroyBuffer",
    c"vkGetBufferMemoryRequirements",
    c"vkAllocateMemory",
    c"vkFreeMemory",
    c"vkBindBufferMemory",
    c"vkMapMemory",
    c"vkUnmapMemory",
    c"vkCreateDescriptorSetLayout",
    c"vkDestroyDescriptorSetLayout",
    c"vkCreateDescriptorPool",
    c"vkDestroyDescriptorPool",
    c"vkAllocateDescriptorSets",
    c"vkUpdateDescriptorSets",
];

/// Checks that `resolve` finds every name in `names`.
///
/// Reports the first missing name.
pub fn require_symbols<F>(
    names: &[&CStr],
    scope: SymbolScope,
    mut resolve: F,
) -> Result<(), LoaderError>
where
    F: FnMut(&CStr) -> bool,
{
    match names.iter().copied().find(|name| !resolve(*name)) {
        Some(name) => {
            let name = name.to_string_lossy().into_owned();
            log::error!("driver is missing {} function {}", scope, name);
            Err(LoaderError::MissingSymbol { name, scope })
        }
        None => Ok(()),
    }
}

/// Resolves every instance-level command through `vkGetInstanceProcAddr`.
pub fn verify_instance(entry: &ash::Entry, instance: &ash::Instance) -> Result<(), LoaderError> {
    require_symbols(INSTANCE_FUNCTIONS, SymbolScope::Instance, |name| {
        // Safety: `instance` is a live instance created from `entry`.
        unsafe { entry.get_instance_proc_addr(instance.handle(), name.as_ptr()) }.is_some()
    })
}

/// Resolves every device-level command through `vkGetDeviceProcAddr`.
pub fn verify_device(instance: &ash::Instance, device: &ash::Device) -> Result<(), LoaderError> {
    let get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr = instance.fp_v1_0().get_device_proc_addr;

    require_symbols(DEVICE_FUNCTIONS, SymbolScope::Device, |name| {
        // Safety: `device` is a live device created from `instance`.
        unsafe { get_device_proc_addr(device.handle(), name.as_ptr()) }.is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_symbols_present() {
        assert!(require_symbols(DEVICE_FUNCTIONS, SymbolScope::Device, |_| true).is_ok());
    }

    #[test]
    fn reports_first_missing_symbol() {
        let mut asked = Vec::new();
        let err = require_symbols(INSTANCE_FUNCTIONS, SymbolScope::Instance, |name| {
            asked.push(name.to_owned());
            name != c"vkCreateDevice" && name != c"vkDestroySurfaceKHR"
        })
        .unwrap_err();

        match err {
            LoaderError::MissingSymbol { name, scope } => {
                assert_eq!(name, "vkCreateDevice");
                assert_eq!(scope, SymbolScope::Instance);
            }
            other => panic!("unexpected error: {}", other),
        }

        // Resolution stops at the first failure.
        assert_eq!(asked.last().map(|n| n.as_c_str()), Some(c"vkCreateDevice"));
    }

    #[test]
    fn missing_symbol_message() {
        let err = require_symbols(&[c"vkCmdDraw"], SymbolScope::Device, |_| false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "driver does not provide device-level function vkCmdDraw"
        );
    }

    #[test]
    fn tables_have_no_duplicates() {
        for table in [INSTANCE_FUNCTIONS, DEVICE_FUNCTIONS] {
            let mut names = table.to_vec();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), table.len());
        }
    }
}
