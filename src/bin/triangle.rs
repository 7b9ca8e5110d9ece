//! One RGB triangle drawn from an interleaved vertex buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember::{
    pass::{GraphicsProgram, Scene},
    pipeline::{GraphicsPipelineDesc, VertexAttribute, VertexLayout},
    resources::ResourceDesc,
    shader::{ShaderSource, ShaderStage},
    spirv::precompiled,
    ColorPolicy, DrawCall, RendererConfig,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

// Clockwise in framebuffer space, where y points down.
const VERTICES: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

fn vertex_layout() -> VertexLayout {
    VertexLayout {
        stride: std::mem::size_of::<Vertex>() as u32,
        attributes: vec![
            VertexAttribute {
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::size_of::<[f32; 2]>() as u32,
            },
        ],
    }
}

struct Triangle;

impl Scene for Triangle {
    fn name(&self) -> &str {
        "triangle"
    }

    fn color_policy(&self) -> ColorPolicy {
        ColorPolicy::HardwareSrgb
    }

    fn program(&self) -> GraphicsProgram {
        GraphicsProgram {
            vertex: ShaderSource {
                name: "triangle.vert",
                stage: ShaderStage::Vertex,
                embedded: include_str!("../../shaders/triangle.vert"),
                precompiled: Some(precompiled::TRIANGLE_VERT),
            },
            fragment: ShaderSource {
                name: "triangle.frag",
                stage: ShaderStage::Fragment,
                embedded: include_str!("../../shaders/triangle.frag"),
                precompiled: Some(precompiled::TRIANGLE_FRAG),
            },
            desc: GraphicsPipelineDesc {
                cull_mode: vk::CullModeFlags::BACK,
                front_face: vk::FrontFace::CLOCKWISE,
                vertex_layout: Some(vertex_layout()),
                ..Default::default()
            },
        }
    }

    fn resources(&self) -> ResourceDesc {
        ResourceDesc {
            vertex_data: bytemuck::cast_slice(&VERTICES).to_vec(),
            ..Default::default()
        }
    }

    fn draw(&self) -> DrawCall {
        DrawCall::vertices(VERTICES.len() as u32)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RendererConfig::from_env("triangle");
    if let Err(e) = ember::app::run(config, Triangle) {
        log::error!("triangle: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = vertex_layout();
        assert_eq!(layout.stride, 20);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(Triangle.resources().vertex_data.len(), 60);
    }
}
