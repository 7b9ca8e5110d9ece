//! Ties a [`Scene`] to a window's swapchain and drives its frames.

use std::{mem, path::Path, time::Instant};

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    command::{self, CommandPool, ComputeDispatch, FrameRecording},
    config::RendererConfig,
    device::Context,
    error::{check, Error, Result},
    frame::FrameContext,
    pass::{ComputeProgram, DrawCall, FrameInput, Scene},
    pipeline::{
        compute_to_vertex_barriers, ComputePipeline, GraphicsPipeline, GraphicsPipelineDesc,
        RecreatePlan, RenderPass, ViewportMode,
    },
    push::PushConstants,
    resources::SceneResources,
    scheduler::{Acquired, FrameScheduler, FrameStatus, FrameTarget, Presented},
    shader::{self, GraphicsShaders},
    spirv::Spirv,
    swapchain::{ColorPolicy, SurfaceSupport, Swapchain, SwapchainConfig},
};

/// SPIR-V for every stage the scene uses, kept for pipeline rebuilds.
struct CompiledShaders {
    vertex: Spirv,
    fragment: Spirv,
    compute: Option<Spirv>,
}

struct Clock {
    start: Instant,
    last: Instant,
}

impl Clock {
    fn new() -> Clock {
        let now = Instant::now();
        Clock {
            start: now,
            last: now,
        }
    }

    /// Returns `(time, delta)` in seconds.
    fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        (now.duration_since(self.start).as_secs_f32(), delta)
    }
}

/// The Vulkan side of a running scene.
struct SceneTarget<S: Scene> {
    scene: S,
    config: RendererConfig,
    policy: ColorPolicy,
    window_extent: vk::Extent2D,
    clock: Clock,
    presented: u64,

    shaders: CompiledShaders,
    desc: GraphicsPipelineDesc,
    draw: DrawCall,
    compute: Option<ComputeProgram>,
    storage_barriers: Vec<vk::BufferMemoryBarrier<'static>>,
    uniform_scratch: Vec<u8>,

    // Destroyed in reverse order by `destroy`.
    swapchain: Swapchain,
    render_pass: RenderPass,
    resources: SceneResources,
    pipeline: GraphicsPipeline,
    compute_pipeline: ComputePipeline,
    command_pool: CommandPool,
    frames: Vec<FrameContext>,
    destroyed: bool,

    ctx: Context,
}

fn compile_shaders<S: Scene>(
    scene: &S,
    compute: Option<&ComputeProgram>,
    shader_dir: Option<&Path>,
) -> Result<CompiledShaders> {
    let compiler = shader::default_compiler();
    let program = scene.program();

    Ok(CompiledShaders {
        vertex: shader::acquire_spirv(compiler.as_ref(), &program.vertex, shader_dir)?,
        fragment: shader::acquire_spirv(compiler.as_ref(), &program.fragment, shader_dir)?,
        compute: compute
            .map(|c| shader::acquire_spirv(compiler.as_ref(), &c.shader, shader_dir))
            .transpose()?,
    })
}

impl<S: Scene> SceneTarget<S> {
    fn new(
        ctx: Context,
        config: RendererConfig,
        window_extent: vk::Extent2D,
        scene: S,
    ) -> Result<Self> {
        let compute = scene.compute();
        let shaders = compile_shaders(&scene, compute.as_ref(), config.shader_dir.as_deref())?;

        let mut target = SceneTarget {
            policy: scene.color_policy(),
            desc: scene.program().desc,
            draw: scene.draw(),
            compute,
            shaders,
            scene,
            config,
            window_extent,
            clock: Clock::new(),
            presented: 0,
            storage_barriers: Vec::new(),
            uniform_scratch: Vec::new(),
            swapchain: Swapchain::default(),
            render_pass: RenderPass::default(),
            resources: SceneResources::default(),
            pipeline: GraphicsPipeline::default(),
            compute_pipeline: ComputePipeline::default(),
            command_pool: CommandPool::default(),
            frames: Vec::new(),
            destroyed: false,
            ctx,
        };

        if let Err(e) = target.build() {
            target.destroy();
            return Err(e);
        }

        Ok(target)
    }

    fn build(&mut self) -> Result<()> {
        let ctx = &self.ctx;
        let frames_in_flight = self.config.frames_in_flight();

        let swapchain_config = self.choose_swapchain_config()?;
        self.swapchain = Swapchain::create(ctx, swapchain_config, None)?;
        self.render_pass = RenderPass::create(ctx, self.swapchain.format())?;

        let desc = self.scene.resources();
        self.resources =
            SceneResources::create(ctx, &desc, frames_in_flight, self.compute.is_some())?;
        self.storage_barriers = compute_to_vertex_barriers(&self.resources.storage_buffers());
        self.uniform_scratch = vec![0; self.resources.uniform_size()];

        self.pipeline = self.create_pipeline()?;
        if let Some(spirv) = &self.shaders.compute {
            self.compute_pipeline =
                ComputePipeline::create(ctx, spirv, self.resources.set_layout())?;
        }

        self.swapchain.create_framebuffers(ctx, self.render_pass.raw())?;
        debug_assert!(self.swapchain.is_complete());

        self.command_pool = CommandPool::create(ctx, ctx.families().graphics)?;
        let buffers = self.command_pool.allocate(ctx, frames_in_flight as u32)?;
        for buffer in buffers {
            let frame = FrameContext::create(ctx, buffer)?;
            self.frames.push(frame);
        }

        log::info!(
            "{}: {} frames in flight on {}",
            self.scene.name(),
            frames_in_flight,
            ctx.device_name()
        );

        Ok(())
    }

    fn choose_swapchain_config(&self) -> Result<SwapchainConfig> {
        let support = SurfaceSupport::query(&self.ctx)?;
        SwapchainConfig::choose(
            &support,
            self.window_extent,
            self.policy,
            self.config.present_mode,
            self.ctx.families(),
        )
    }

    fn create_pipeline(&self) -> Result<GraphicsPipeline> {
        let shaders =
            GraphicsShaders::create(&self.ctx, &self.shaders.vertex, &self.shaders.fragment)?;
        GraphicsPipeline::create(
            &self.ctx,
            shaders,
            &self.desc,
            self.render_pass.raw(),
            self.resources.set_layout(),
            self.swapchain.extent(),
        )
    }

    /// Destroys everything but the context, in reverse creation order.
    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Err(e) = self.ctx.wait_idle() {
            log::error!("failed to wait for device idle before teardown: {}", e);
        }

        let ctx = &self.ctx;
        unsafe {
            for frame in &mut self.frames {
                frame.destroy(ctx);
            }
            self.frames.clear();
            self.command_pool.destroy(ctx);
            self.compute_pipeline.destroy(ctx);
            self.pipeline.destroy(ctx);
            self.resources.destroy(ctx);
            self.swapchain.destroy_framebuffers(ctx);
            self.render_pass.destroy(ctx);
            self.swapchain.destroy(ctx);
        }

        log::debug!("{}: renderer destroyed", self.scene.name());
    }

    fn frame_input(&mut self) -> FrameInput {
        let (time, delta) = self.clock.tick();
        FrameInput {
            time,
            delta,
            extent: self.swapchain.extent(),
            frame: self.presented,
        }
    }
}

impl<S: Scene> Drop for SceneTarget<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<S: Scene> FrameTarget for SceneTarget<S> {
    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.frames[slot].wait(&self.ctx)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.frames[slot].reset(&self.ctx)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquired> {
        let result = unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.swapchain.raw(),
                u64::MAX,
                self.frames[slot].image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => check(Err(e), "vkAcquireNextImageKHR", Error::Present),
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let input = self.frame_input();

        if !self.uniform_scratch.is_empty() {
            self.scene.update(&input, &mut self.uniform_scratch);
            self.resources
                .write_uniforms(&self.ctx, slot, &self.uniform_scratch)?;
        } else {
            self.scene.update(&input, &mut []);
        }

        let push = self.scene.push_constants(&input).map(|p| p.to_le_bytes());
        let descriptor_set = self.resources.descriptor_set(slot);

        let compute = match (&self.compute, descriptor_set) {
            (Some(program), Some(set)) => Some(ComputeDispatch {
                pipeline: self.compute_pipeline.raw(),
                layout: self.compute_pipeline.layout(),
                descriptor_set: set,
                group_count: command::workgroup_count(program.elements, program.local_size),
                barriers: &self.storage_barriers,
            }),
            _ => None,
        };

        let recording = FrameRecording {
            render_pass: self.render_pass.raw(),
            framebuffer: self.swapchain.framebuffer(image_index),
            extent: self.swapchain.extent(),
            clear_color: self.scene.clear_color_value().into(),
            pipeline: self.pipeline.raw(),
            layout: self.pipeline.layout(),
            dynamic_viewport: self.desc.viewport == ViewportMode::Dynamic,
            vertex_buffers: self.resources.vertex_buffers(),
            descriptor_set,
            push_constants: push
                .as_ref()
                .map(|bytes| (PushConstants::STAGES, &bytes[..])),
            draw: self.draw,
            compute,
        };

        command::record_frame(
            self.ctx.device(),
            &mut self.frames[slot].command_buffer,
            &recording,
        )
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &mut self.frames[slot];

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer.raw()];
        let signal_semaphores = [frame.render_finished];

        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        check(
            unsafe {
                self.ctx
                    .device()
                    .queue_submit(self.ctx.graphics_queue(), &[info], frame.in_flight)
            },
            "vkQueueSubmit",
            Error::Submit,
        )?;

        frame.command_buffer.mark_submitted()
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented> {
        let wait_semaphores = [self.frames[slot].render_finished];
        let swapchains = [self.swapchain.raw()];
        let image_indices = [image_index];

        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue(), &info)
        };

        self.presented += 1;

        match result {
            Ok(false) => Ok(Presented::Optimal),
            Ok(true) => Ok(Presented::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::OutOfDate),
            Err(e) => check(Err(e), "vkQueuePresentKHR", Error::Present),
        }
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            log::debug!("window has no area, deferring swapchain recreation");
            return Ok(false);
        }

        self.ctx.wait_idle()?;

        let config = self.choose_swapchain_config()?;
        if config.extent.width == 0 || config.extent.height == 0 {
            log::debug!("surface has no area, deferring swapchain recreation");
            return Ok(false);
        }

        let plan = RecreatePlan::new(
            self.render_pass.format(),
            config.format.format,
            self.desc.viewport,
        );
        log::debug!("recreating swapchain: {:?}", plan);

        let ctx = &self.ctx;
        unsafe {
            self.swapchain.destroy_framebuffers(ctx);
            if plan.pipeline {
                self.pipeline.destroy(ctx);
            }
            if plan.render_pass {
                self.render_pass.destroy(ctx);
            }
            self.swapchain.destroy_views(ctx);
        }

        let new = Swapchain::create(ctx, config, Some(self.swapchain.raw()))?;
        let mut old = mem::replace(&mut self.swapchain, new);
        unsafe { old.destroy(ctx) };

        if plan.render_pass {
            self.render_pass = RenderPass::create(ctx, self.swapchain.format())?;
        }
        if plan.pipeline {
            self.pipeline = self.create_pipeline()?;
        }

        self.swapchain.create_framebuffers(&self.ctx, self.render_pass.raw())?;
        debug_assert!(self.swapchain.is_complete());

        Ok(true)
    }
}

/// A scene rendering into a window.
pub struct Renderer<S: Scene> {
    scheduler: FrameScheduler,
    target: SceneTarget<S>,
}

impl<S: Scene> Renderer<S> {
    /// Brings up Vulkan for the window and builds everything `scene` needs.
    ///
    /// # Safety
    ///
    /// The window behind `display` and `window` must outlive the renderer.
    pub unsafe fn new(
        config: RendererConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        window_size: (u32, u32),
        scene: S,
    ) -> Result<Renderer<S>> {
        let needs_compute = scene.compute().is_some();
        let ctx = unsafe { Context::new(&config, display, window, needs_compute)? };

        let scheduler = FrameScheduler::new(config.frames_in_flight());
        let extent = vk::Extent2D {
            width: window_size.0,
            height: window_size.1,
        };
        let target = SceneTarget::new(ctx, config, extent, scene)?;

        Ok(Renderer { scheduler, target })
    }

    /// Renders and presents one frame. Frames are skipped while the window
    /// has no area or the swapchain is being rebuilt.
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        let extent = self.target.window_extent;
        if extent.width == 0 || extent.height == 0 {
            return Ok(FrameStatus::Skipped);
        }

        self.scheduler.draw_frame(&mut self.target)
    }

    /// Rebuilds the swapchain now, returning false if the window has no
    /// area and the rebuild was deferred.
    pub fn recreate_swapchain(&mut self) -> Result<bool> {
        self.scheduler.recreate_swapchain(&mut self.target)
    }

    /// Records the new window size. The swapchain is rebuilt after the next
    /// present.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.target.window_extent = vk::Extent2D { width, height };
        self.scheduler.notify_resized();
    }

    pub fn context(&self) -> &Context {
        &self.target.ctx
    }

    pub fn scene(&self) -> &S {
        &self.target.scene
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.target.swapchain.extent()
    }

    /// Waits for the device to idle and destroys every object in reverse
    /// creation order. Also runs on drop.
    pub fn destroy(&mut self) {
        self.target.destroy();
    }
}
