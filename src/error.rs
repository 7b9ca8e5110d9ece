use std::fmt;

use ash::{prelude::VkResult, vk};
use thiserror::Error;

use crate::command::CommandBufferState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A Vulkan entry point that returned a non-success code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallFailure {
    pub call: &'static str,
    pub result: vk::Result,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} returned {:?} ({})",
            self.call,
            self.result,
            self.result.as_raw()
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolScope {
    Instance,
    Device,
}

impl fmt::Display for SymbolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolScope::Instance => f.write_str("instance-level"),
            SymbolScope::Device => f.write_str("device-level"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to load the Vulkan runtime library: {0}")]
    Library(#[from] ash::LoadingError),
    #[error("driver does not provide {scope} function {name}")]
    MissingSymbol { name: String, scope: SymbolScope },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("instance creation failed: {0}")]
    InstanceCreation(CallFailure),
    #[error("no Vulkan physical devices are available")]
    NoPhysicalDevice,
    #[error("no physical device supports the window surface and required extensions")]
    NoSuitableDevice,
    #[error("no queue family supports graphics operations")]
    NoGraphicsQueue,
    #[error("no queue family can present to the window surface")]
    NoPresentQueue,
    #[error("device creation failed: {0}")]
    DeviceCreation(CallFailure),
    #[error("unsupported window handle: {0}")]
    UnsupportedWindow(String),
    #[error("surface creation failed: {0}")]
    SurfaceCreation(CallFailure),
    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(CallFailure),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
    #[error("failed to compile shader {name}: {diagnostic}")]
    ShaderCompile { name: String, diagnostic: String },
    #[error("invalid SPIR-V in {name}: {reason}")]
    InvalidSpirv { name: String, reason: String },
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(CallFailure),
    #[error("resource creation failed: {0}")]
    ResourceCreation(CallFailure),
    #[error("no memory type satisfies {required:?} (type bits {type_bits:#b})")]
    NoMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },
    #[error("command recording failed: {0}")]
    CommandRecord(CallFailure),
    #[error("cannot {operation} a command buffer in the {state:?} state")]
    CommandState {
        operation: &'static str,
        state: CommandBufferState,
    },
    #[error("synchronization failed: {0}")]
    Sync(CallFailure),
    #[error("queue submission failed: {0}")]
    Submit(CallFailure),
    #[error("presentation failed: {0}")]
    Present(CallFailure),
    #[error("window system error: {0}")]
    Window(String),
}

/// Checks the result of a driver call at its call site.
///
/// Failures are logged with the entry point name and result code, then
/// wrapped in the error kind `kind`.
pub(crate) fn check<T>(
    result: VkResult<T>,
    call: &'static str,
    kind: fn(CallFailure) -> Error,
) -> Result<T> {
    result.map_err(|result| {
        let failure = CallFailure { call, result };
        log::error!("{}", failure);
        kind(failure)
    })
}
