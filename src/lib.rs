//! Vulkan bring-up and present loop.
//!
//! The crate implements, once, the protocol every small Vulkan demo ends up
//! re-deriving: load the driver, create the instance and device, bind a
//! window to a swapchain, build a pipeline, and drive a frames-in-flight
//! present loop. Scenes plug into it through the [`Scene`] trait.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod app;
pub mod buffer;
pub mod command;
pub mod config;
mod debug_utils;
pub mod device;
pub mod error;
pub mod frame;
pub mod loader;
pub mod pass;
pub mod pipeline;
pub mod push;
pub mod renderer;
pub mod resources;
pub mod scheduler;
pub mod shader;
pub mod spirv;
pub mod surface;
pub mod swapchain;
mod util;

use std::fmt;

use ash::vk;

pub use crate::{
    config::{PresentModePreference, RendererConfig},
    device::Context,
    error::{Error, LoaderError, Result},
    pass::{ClearColorValue, DrawCall, FrameInput, Scene},
    push::PushConstants,
    renderer::Renderer,
    scheduler::{FrameScheduler, FrameStatus},
    swapchain::ColorPolicy,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    inner: u32,
}

impl ApiVersion {
    pub const V1_0_0: ApiVersion = ApiVersion {
        inner: vk::make_api_version(0, 1, 0, 0),
    };

    pub const V1_1_0: ApiVersion = ApiVersion {
        inner: vk::make_api_version(0, 1, 1, 0),
    };

    pub const V1_2_0: ApiVersion = ApiVersion {
        inner: vk::make_api_version(0, 1, 2, 0),
    };

    pub const V1_3_0: ApiVersion = ApiVersion {
        inner: vk::make_api_version(0, 1, 3, 0),
    };

    pub const fn major(&self) -> u32 {
        vk::api_version_major(self.inner)
    }

    pub const fn minor(&self) -> u32 {
        vk::api_version_minor(self.inner)
    }

    pub const fn patch(&self) -> u32 {
        vk::api_version_patch(self.inner)
    }

    pub const fn from_u32(version: u32) -> ApiVersion {
        ApiVersion { inner: version }
    }

    pub const fn as_u32(&self) -> u32 {
        self.inner
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_versions_order_by_minor() {
        assert!(ApiVersion::V1_0_0 < ApiVersion::V1_1_0);
        assert!(ApiVersion::V1_2_0 < ApiVersion::V1_3_0);
        assert_eq!(
            std::cmp::min(ApiVersion::V1_3_0, ApiVersion::V1_1_0),
            ApiVersion::V1_1_0
        );
    }

    #[test]
    fn api_version_display() {
        assert_eq!(ApiVersion::V1_2_0.to_string(), "1.2.0");
        assert_eq!(ApiVersion::from_u32(ApiVersion::V1_3_0.as_u32()).minor(), 3);
    }
}
