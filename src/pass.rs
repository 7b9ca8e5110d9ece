//! The interface between the renderer and the scene it draws.

use ash::vk;

use crate::{
    pipeline::GraphicsPipelineDesc, push::PushConstants, resources::ResourceDesc,
    shader::ShaderSource, swapchain::ColorPolicy,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClearColorValue {
    Float32([f32; 4]),
    Int32([i32; 4]),
    Uint32([u32; 4]),
}

impl From<[f32; 4]> for ClearColorValue {
    fn from(f: [f32; 4]) -> Self {
        ClearColorValue::Float32(f)
    }
}

impl From<[i32; 4]> for ClearColorValue {
    fn from(i: [i32; 4]) -> Self {
        ClearColorValue::Int32(i)
    }
}

impl From<[u32; 4]> for ClearColorValue {
    fn from(u: [u32; 4]) -> Self {
        ClearColorValue::Uint32(u)
    }
}

impl From<ClearColorValue> for vk::ClearColorValue {
    fn from(val: ClearColorValue) -> Self {
        use ClearColorValue::*;

        match val {
            Float32(f) => vk::ClearColorValue { float32: f },
            Int32(i) => vk::ClearColorValue { int32: i },
            Uint32(u) => vk::ClearColorValue { uint32: u },
        }
    }
}

/// Per-frame values handed to the scene.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameInput {
    /// Seconds since the renderer started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
    pub extent: vk::Extent2D,
    /// Number of frames presented so far.
    pub frame: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl DrawCall {
    /// One triangle covering the whole viewport.
    pub const FULLSCREEN_TRIANGLE: DrawCall = DrawCall::vertices(3);

    pub const fn vertices(vertex_count: u32) -> DrawCall {
        DrawCall {
            vertex_count,
            instance_count: 1,
        }
    }
}

/// Shaders and fixed-function state of the scene's graphics pipeline.
#[derive(Clone, Debug)]
pub struct GraphicsProgram {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    pub desc: GraphicsPipelineDesc,
}

/// A compute pass run before the render pass every frame.
#[derive(Clone, Debug)]
pub struct ComputeProgram {
    pub shader: ShaderSource,
    /// `local_size_x` declared by the shader.
    pub local_size: u32,
    /// Number of invocations needed.
    pub elements: u32,
}

pub trait Scene {
    fn name(&self) -> &str;

    fn color_policy(&self) -> ColorPolicy;

    /// Returns the value the color attachment is cleared to.
    fn clear_color_value(&self) -> ClearColorValue {
        ClearColorValue::Float32([0.0, 0.0, 0.0, 1.0])
    }

    fn program(&self) -> GraphicsProgram;

    fn compute(&self) -> Option<ComputeProgram> {
        None
    }

    fn resources(&self) -> ResourceDesc {
        ResourceDesc::default()
    }

    fn draw(&self) -> DrawCall;

    /// Returns the push-constant block for this frame, if the pipeline
    /// declares one.
    fn push_constants(&self, _input: &FrameInput) -> Option<PushConstants> {
        None
    }

    /// Advances the scene and fills its uniform block, if it has one.
    fn update(&mut self, _input: &FrameInput, _uniforms: &mut [u8]) {}
}
