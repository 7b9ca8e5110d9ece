//! A damped four-pendulum harmonograph: a compute pass evaluates 500 000
//! points of the curve every frame and the draw renders them as points.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember::{
    pass::{ComputeProgram, FrameInput, GraphicsProgram, Scene},
    pipeline::{Blend, GraphicsPipelineDesc},
    resources::ResourceDesc,
    shader::{ShaderSource, ShaderStage},
    ColorPolicy, DrawCall, RendererConfig,
};

const NUM_POINTS: u32 = 500_000;

/// `local_size_x` of harmonograph.comp.
const LOCAL_SIZE: u32 = 256;

/// Animation step per frame, in curve time units.
const TIME_STEP: f32 = 0.016;

/// One damped sinusoid: `amplitude * sin(frequency * t + PI * phase) *
/// exp(-damping * t)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct Oscillator {
    amplitude: f32,
    frequency: f32,
    phase: f32,
    damping: f32,
}

impl Oscillator {
    const fn new(amplitude: f32, frequency: f32, phase: f32, damping: f32) -> Oscillator {
        Oscillator {
            amplitude,
            frequency,
            phase,
            damping,
        }
    }
}

/// The std140 `Params` block. x sums oscillators 0 and 1, y sums 2 and 3.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct HarmonographParams {
    max_num: u32,
    dt: f32,
    scale: f32,
    _pad: f32,
    oscillators: [Oscillator; 4],
}

impl Default for HarmonographParams {
    fn default() -> Self {
        HarmonographParams {
            max_num: NUM_POINTS,
            dt: 0.001,
            // Amplitude 50 lands near the edge of clip space.
            scale: 0.02,
            _pad: 0.0,
            oscillators: [
                Oscillator::new(50.0, 2.0, 1.0 / 16.0, 0.02),
                Oscillator::new(50.0, 2.0, 3.0 / 2.0, 0.0315),
                Oscillator::new(50.0, 2.0, 13.0 / 15.0, 0.02),
                Oscillator::new(50.0, 2.0, 1.0, 0.02),
            ],
        }
    }
}

impl HarmonographParams {
    const FREQUENCY_RATES: [f32; 4] = [0.7, 0.9, 1.1, 1.3];

    /// Sets the frequencies for animation time `t` and drifts the first
    /// phase by one step.
    fn animate(&mut self, t: f32) {
        for (osc, rate) in self.oscillators.iter_mut().zip(Self::FREQUENCY_RATES) {
            osc.frequency = 2.0 + 0.5 * (t * rate).sin();
        }
        self.oscillators[0].phase += 0.002;
    }
}

#[derive(Default)]
struct Harmonograph {
    params: HarmonographParams,
    anim_time: f32,
}

fn shader(name: &'static str, stage: ShaderStage, embedded: &'static str) -> ShaderSource {
    ShaderSource {
        name,
        stage,
        embedded,
        precompiled: None,
    }
}

impl Scene for Harmonograph {
    fn name(&self) -> &str {
        "harmonograph"
    }

    fn color_policy(&self) -> ColorPolicy {
        ColorPolicy::HardwareSrgb
    }

    fn program(&self) -> GraphicsProgram {
        GraphicsProgram {
            vertex: shader(
                "harmonograph.vert",
                ShaderStage::Vertex,
                include_str!("../../shaders/harmonograph.vert"),
            ),
            fragment: shader(
                "harmonograph.frag",
                ShaderStage::Fragment,
                include_str!("../../shaders/harmonograph.frag"),
            ),
            desc: GraphicsPipelineDesc {
                topology: vk::PrimitiveTopology::POINT_LIST,
                cull_mode: vk::CullModeFlags::NONE,
                blend: Blend::Additive,
                ..Default::default()
            },
        }
    }

    fn compute(&self) -> Option<ComputeProgram> {
        Some(ComputeProgram {
            shader: shader(
                "harmonograph.comp",
                ShaderStage::Compute,
                include_str!("../../shaders/harmonograph.comp"),
            ),
            local_size: LOCAL_SIZE,
            elements: NUM_POINTS,
        })
    }

    fn resources(&self) -> ResourceDesc {
        // One vec4 per point for positions, one for colours.
        let ssbo_size = NUM_POINTS as vk::DeviceSize * 16;
        ResourceDesc {
            vertex_data: Vec::new(),
            storage_buffers: vec![ssbo_size, ssbo_size],
            uniform_size: Some(std::mem::size_of::<HarmonographParams>() as vk::DeviceSize),
        }
    }

    fn draw(&self) -> DrawCall {
        DrawCall::vertices(NUM_POINTS)
    }

    fn update(&mut self, _input: &FrameInput, uniforms: &mut [u8]) {
        self.anim_time += TIME_STEP;
        self.params.animate(self.anim_time);
        uniforms.copy_from_slice(bytemuck::bytes_of(&self.params));
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RendererConfig::from_env("harmonograph");
    if let Err(e) = ember::app::run(config, Harmonograph::default()) {
        log::error!("harmonograph: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_std140_block() {
        assert_eq!(std::mem::size_of::<HarmonographParams>(), 80);
        assert_eq!(std::mem::offset_of!(HarmonographParams, oscillators), 16);
    }

    #[test]
    fn animation_moves_frequencies_and_first_phase() {
        let mut params = HarmonographParams::default();
        params.animate(1.0);

        assert!((params.oscillators[0].frequency - (2.0 + 0.5 * 0.7f32.sin())).abs() < 1e-6);
        assert!((params.oscillators[3].frequency - (2.0 + 0.5 * 1.3f32.sin())).abs() < 1e-6);
        assert!((params.oscillators[0].phase - (1.0 / 16.0 + 0.002)).abs() < 1e-6);
        assert_eq!(params.oscillators[1].phase, 3.0 / 2.0);
        assert_eq!(params.oscillators[2].amplitude, 50.0);
    }

    #[test]
    fn update_writes_uniform_block() {
        let mut scene = Harmonograph::default();
        let mut block = vec![0u8; std::mem::size_of::<HarmonographParams>()];
        let input = FrameInput {
            time: 0.0,
            delta: 0.0,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            frame: 0,
        };

        scene.update(&input, &mut block);
        assert_eq!(u32::from_le_bytes([block[0], block[1], block[2], block[3]]), NUM_POINTS);
        assert_eq!(scene.anim_time, TIME_STEP);
    }

    #[test]
    fn one_workgroup_per_256_points() {
        let compute = Harmonograph::default().compute().unwrap();
        assert_eq!(
            ember::command::workgroup_count(compute.elements, compute.local_size),
            1954
        );
    }
}
