//! A ray-marched scene drawn by a single full-screen triangle.

use ash::vk;
use ember::{
    pass::{FrameInput, GraphicsProgram, Scene},
    pipeline::GraphicsPipelineDesc,
    shader::{ShaderSource, ShaderStage},
    spirv::precompiled,
    ColorPolicy, DrawCall, PushConstants, RendererConfig,
};

struct Raymarch;

impl Scene for Raymarch {
    fn name(&self) -> &str {
        "raymarch"
    }

    /// The fragment shader applies its own gamma curve.
    fn color_policy(&self) -> ColorPolicy {
        ColorPolicy::ManualGamma
    }

    fn program(&self) -> GraphicsProgram {
        GraphicsProgram {
            vertex: ShaderSource {
                name: "fullscreen.vert",
                stage: ShaderStage::Vertex,
                embedded: include_str!("../../shaders/fullscreen.vert"),
                precompiled: Some(precompiled::FULLSCREEN_VERT),
            },
            fragment: ShaderSource {
                name: "raymarch.frag",
                stage: ShaderStage::Fragment,
                embedded: include_str!("../../shaders/raymarch.frag"),
                precompiled: Some(precompiled::GRADIENT_FRAG),
            },
            desc: GraphicsPipelineDesc {
                cull_mode: vk::CullModeFlags::NONE,
                push_constants: true,
                ..Default::default()
            },
        }
    }

    fn draw(&self) -> DrawCall {
        DrawCall::FULLSCREEN_TRIANGLE
    }

    fn push_constants(&self, input: &FrameInput) -> Option<PushConstants> {
        Some(PushConstants::new(input.time, input.extent))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RendererConfig::from_env("raymarch");
    if let Err(e) = ember::app::run(config, Raymarch) {
        log::error!("raymarch: {}", e);
        std::process::exit(1);
    }
}
