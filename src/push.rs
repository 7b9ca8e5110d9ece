//! The per-frame push-constant block shared by the full-screen scenes.

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Matches the shader block
///
/// ```glsl
/// layout(push_constant) uniform PushConstants {
///     float iTime;
///     float padding;
///     vec2 iResolution;
/// };
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub time: f32,
    pub padding: f32,
    pub resolution: [f32; 2],
}

impl PushConstants {
    pub const SIZE: usize = std::mem::size_of::<PushConstants>();

    /// Stages the block is visible to.
    pub const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

    pub fn new(time: f32, extent: vk::Extent2D) -> PushConstants {
        PushConstants {
            time,
            padding: 0.0,
            resolution: [extent.width as f32, extent.height as f32],
        }
    }

    /// The bytes uploaded through `vkCmdPushConstants`.
    pub fn to_le_bytes(&self) -> [u8; PushConstants::SIZE] {
        let mut out = [0; PushConstants::SIZE];
        let fields = [self.time, self.padding, self.resolution[0], self.resolution[1]];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: PushConstants::STAGES,
            offset: 0,
            size: PushConstants::SIZE as u32,
        }
    }
}
