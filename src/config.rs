//! Renderer configuration.
//!
//! Defaults suit the demo binaries; a handful of environment variables
//! override them without recompiling.

use std::{path::PathBuf, str::FromStr};

use ash::vk;

use crate::ApiVersion;

pub const ENV_FRAMES_IN_FLIGHT: &str = "EMBER_FRAMES_IN_FLIGHT";
pub const ENV_PRESENT_MODE: &str = "EMBER_PRESENT_MODE";
pub const ENV_VALIDATION: &str = "EMBER_VALIDATION";
pub const ENV_SHADER_DIR: &str = "EMBER_SHADER_DIR";

pub const MIN_FRAMES_IN_FLIGHT: usize = 1;
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Requested presentation mode.
///
/// FIFO is the only mode implementations are required to support, so any
/// other preference silently degrades to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentModePreference {
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentModePreference {
    pub fn as_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown present mode {0:?} (expected fifo, mailbox or immediate)")]
pub struct ParsePresentModeError(String);

impl FromStr for PresentModePreference {
    type Err = ParsePresentModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" | "vsync" => Ok(PresentModePreference::Fifo),
            "mailbox" => Ok(PresentModePreference::Mailbox),
            "immediate" => Ok(PresentModePreference::Immediate),
            _ => Err(ParsePresentModeError(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub app_name: String,
    pub app_version: u32,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    pub present_mode: PresentModePreference,
    /// Enables the Khronos validation layer and the debug messenger.
    pub validation: bool,
    /// Upper bound on the requested instance API version.
    pub max_api_version: ApiVersion,
    /// Directory searched for shader sources before the embedded copies.
    pub shader_dir: Option<PathBuf>,
    /// Initial window client size.
    pub window_size: (u32, u32),
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            app_name: String::from("ember"),
            app_version: 0,
            frames_in_flight: 2,
            present_mode: PresentModePreference::Fifo,
            validation: cfg!(debug_assertions),
            max_api_version: ApiVersion::V1_3_0,
            shader_dir: None,
            window_size: (800, 600),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RendererConfig {
    pub fn new<S: Into<String>>(app_name: S) -> RendererConfig {
        RendererConfig {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Builds a configuration from defaults and the `EMBER_*` environment
    /// variables.
    pub fn from_env<S: Into<String>>(app_name: S) -> RendererConfig {
        let mut config = RendererConfig::new(app_name);
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Applies overrides looked up by variable name. Malformed values are
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_FRAMES_IN_FLIGHT) {
            match value.trim().parse::<usize>() {
                Ok(n) => self.frames_in_flight = n,
                Err(e) => log::warn!("ignoring {}={:?}: {}", ENV_FRAMES_IN_FLIGHT, value, e),
            }
        }

        if let Some(value) = lookup(ENV_PRESENT_MODE) {
            match value.parse() {
                Ok(mode) => self.present_mode = mode,
                Err(e) => log::warn!("ignoring {}: {}", ENV_PRESENT_MODE, e),
            }
        }

        if let Some(value) = lookup(ENV_VALIDATION) {
            match parse_bool(&value) {
                Some(v) => self.validation = v,
                None => log::warn!("ignoring {}={:?}: not a boolean", ENV_VALIDATION, value),
            }
        }

        if let Some(value) = lookup(ENV_SHADER_DIR) {
            if !value.is_empty() {
                self.shader_dir = Some(PathBuf::from(value));
            }
        }
    }

    /// The frames-in-flight count actually used, clamped to the supported
    /// range.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
            .clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = RendererConfig::new("demo");
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.window_size, (800, 600));
        assert!(config.shader_dir.is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut config = RendererConfig::new("demo");
        config.apply_overrides(lookup_from(&[
            (ENV_FRAMES_IN_FLIGHT, "1"),
            (ENV_PRESENT_MODE, "Mailbox"),
            (ENV_VALIDATION, "off"),
            (ENV_SHADER_DIR, "/tmp/shaders"),
        ]));

        assert_eq!(config.frames_in_flight(), 1);
        assert_eq!(config.present_mode, PresentModePreference::Mailbox);
        assert!(!config.validation);
        assert_eq!(config.shader_dir, Some(PathBuf::from("/tmp/shaders")));
    }

    #[test]
    fn malformed_overrides_are_ignored() {
        let mut config = RendererConfig::new("demo");
        let validation = config.validation;
        config.apply_overrides(lookup_from(&[
            (ENV_FRAMES_IN_FLIGHT, "two"),
            (ENV_PRESENT_MODE, "triple-buffered"),
            (ENV_VALIDATION, "maybe"),
        ]));

        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.validation, validation);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut config = RendererConfig::new("demo");
        config.frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
        config.frames_in_flight = 16;
        assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn present_mode_parse() {
        assert_eq!("vsync".parse(), Ok(PresentModePreference::Fifo));
        assert_eq!(
            " IMMEDIATE ".parse(),
            Ok(PresentModePreference::Immediate)
        );
        assert!("".parse::<PresentModePreference>().is_err());
        assert_eq!(
            PresentModePreference::Mailbox.as_vk(),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn present_mode_parse_error_names_the_value() {
        let err = "triple".parse::<PresentModePreference>().unwrap_err();
        assert_eq!(err, ParsePresentModeError("triple".into()));
        assert_eq!(
            err.to_string(),
            "unknown present mode \"triple\" (expected fifo, mailbox or immediate)"
        );
        let _: &dyn std::error::Error = &err;
    }
}
