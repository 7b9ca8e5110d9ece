//! Command pools, command buffers and per-frame recording.

use ash::vk;

use crate::{
    device::Context,
    error::{check, Error, Result},
    pass::DrawCall,
    util::{drop_message, ErrorOnDrop},
};

/// Lifecycle of a primary command buffer.
///
/// Buffers are never recorded with one-time-submit, so completed work
/// returns the buffer to `Executable` rather than `Invalid`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
    Invalid,
}

impl CommandBufferState {
    fn illegal(self, operation: &'static str) -> Error {
        log::error!("cannot {} a command buffer in the {:?} state", operation, self);
        Error::CommandState {
            operation,
            state: self,
        }
    }

    /// Any state except `Pending` may be reset.
    pub fn reset(self) -> Result<CommandBufferState> {
        match self {
            CommandBufferState::Pending => Err(self.illegal("reset")),
            _ => Ok(CommandBufferState::Initial),
        }
    }

    pub fn begin(self) -> Result<CommandBufferState> {
        match self {
            CommandBufferState::Initial => Ok(CommandBufferState::Recording),
            _ => Err(self.illegal("begin")),
        }
    }

    pub fn end(self) -> Result<CommandBufferState> {
        match self {
            CommandBufferState::Recording => Ok(CommandBufferState::Executable),
            _ => Err(self.illegal("end")),
        }
    }

    pub fn submit(self) -> Result<CommandBufferState> {
        match self {
            CommandBufferState::Executable => Ok(CommandBufferState::Pending),
            _ => Err(self.illegal("submit")),
        }
    }

    /// Called once the fence guarding the submission has signalled.
    pub fn complete(self) -> CommandBufferState {
        match self {
            CommandBufferState::Pending => CommandBufferState::Executable,
            other => other,
        }
    }
}

/// Number of workgroups needed to cover `elements` items.
pub fn workgroup_count(elements: u32, local_size: u32) -> u32 {
    assert!(local_size > 0, "workgroup size must be nonzero");
    elements.div_ceil(local_size)
}

drop_message!(
    DroppedCommandPool,
    "CommandPool must be manually destroyed with .destroy()"
);

#[derive(Default)]
pub struct CommandPool {
    bomb: ErrorOnDrop<DroppedCommandPool>,
    raw: vk::CommandPool,
}

impl CommandPool {
    /// Creates a pool whose buffers may be reset individually.
    pub fn create(ctx: &Context, queue_family: u32) -> Result<CommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);

        let raw = check(
            unsafe { ctx.device().create_command_pool(&info, None) },
            "vkCreateCommandPool",
            Error::ResourceCreation,
        )?;

        Ok(CommandPool {
            bomb: ErrorOnDrop::new(DroppedCommandPool),
            raw,
        })
    }

    pub fn allocate(&self, ctx: &Context, count: u32) -> Result<Vec<CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let raw = check(
            unsafe { ctx.device().allocate_command_buffers(&info) },
            "vkAllocateCommandBuffers",
            Error::ResourceCreation,
        )?;

        Ok(raw
            .into_iter()
            .map(|raw| CommandBuffer {
                raw,
                state: CommandBufferState::Initial,
            })
            .collect())
    }

    /// Destroys the pool, freeing every buffer allocated from it.
    ///
    /// # Safety
    ///
    /// None of the pool's buffers may be pending execution.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe { ctx.device().destroy_command_pool(self.raw, None) };
        self.raw = vk::CommandPool::null();
        self.bomb.disarm();
    }
}

/// A primary command buffer and its tracked state.
pub struct CommandBuffer {
    raw: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn reset(&mut self, device: &ash::Device) -> Result<()> {
        let next = self.state.reset()?;
        check(
            unsafe { device.reset_command_buffer(self.raw, vk::CommandBufferResetFlags::empty()) },
            "vkResetCommandBuffer",
            Error::CommandRecord,
        )?;
        self.state = next;
        Ok(())
    }

    pub fn begin(&mut self, device: &ash::Device) -> Result<()> {
        let next = self.state.begin()?;
        let info = vk::CommandBufferBeginInfo::default();
        check(
            unsafe { device.begin_command_buffer(self.raw, &info) },
            "vkBeginCommandBuffer",
            Error::CommandRecord,
        )?;
        self.state = next;
        Ok(())
    }

    pub fn end(&mut self, device: &ash::Device) -> Result<()> {
        let next = self.state.end()?;
        if let Err(e) = check(
            unsafe { device.end_command_buffer(self.raw) },
            "vkEndCommandBuffer",
            Error::CommandRecord,
        ) {
            self.state = CommandBufferState::Invalid;
            return Err(e);
        }
        self.state = next;
        Ok(())
    }

    pub fn mark_submitted(&mut self) -> Result<()> {
        self.state = self.state.submit()?;
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        self.state = self.state.complete();
    }
}

/// A compute dispatch recorded ahead of the render pass.
pub struct ComputeDispatch<'a> {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub group_count: u32,
    /// Barriers making the dispatch's writes visible to the draw.
    pub barriers: &'a [vk::BufferMemoryBarrier<'a>],
}

/// Everything needed to record one frame's command buffer.
pub struct FrameRecording<'a> {
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the image acquired this frame.
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: vk::ClearColorValue,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub dynamic_viewport: bool,
    /// Empty when the pipeline has no vertex input.
    pub vertex_buffers: &'a [vk::Buffer],
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub push_constants: Option<(vk::ShaderStageFlags, &'a [u8])>,
    pub draw: DrawCall,
    pub compute: Option<ComputeDispatch<'a>>,
}

/// Resets `cmd` and records a complete frame into it.
pub fn record_frame(
    device: &ash::Device,
    cmd: &mut CommandBuffer,
    rec: &FrameRecording<'_>,
) -> Result<()> {
    cmd.reset(device)?;
    cmd.begin(device)?;

    let raw = cmd.raw();

    unsafe {
        if let Some(compute) = &rec.compute {
            // The previous frame's draw may still be reading the buffers.
            device.cmd_pipeline_barrier(
                raw,
                vk::PipelineStageFlags::VERTEX_SHADER,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[],
            );
            device.cmd_bind_pipeline(raw, vk::PipelineBindPoint::COMPUTE, compute.pipeline);
            device.cmd_bind_descriptor_sets(
                raw,
                vk::PipelineBindPoint::COMPUTE,
                compute.layout,
                0,
                &[compute.descriptor_set],
                &[],
            );
            device.cmd_dispatch(raw, compute.group_count, 1, 1);
            device.cmd_pipeline_barrier(
                raw,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::VERTEX_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                compute.barriers,
                &[],
            );
        }

        let clear_values = [vk::ClearValue {
            color: rec.clear_color,
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: rec.extent,
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(rec.render_pass)
            .framebuffer(rec.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(raw, &begin_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(raw, vk::PipelineBindPoint::GRAPHICS, rec.pipeline);

        if rec.dynamic_viewport {
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: rec.extent.width as f32,
                height: rec.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(raw, 0, &[viewport]);
            device.cmd_set_scissor(raw, 0, &[render_area]);
        }

        if !rec.vertex_buffers.is_empty() {
            let offsets = vec![0; rec.vertex_buffers.len()];
            device.cmd_bind_vertex_buffers(raw, 0, rec.vertex_buffers, &offsets);
        }

        if let Some(set) = rec.descriptor_set {
            device.cmd_bind_descriptor_sets(
                raw,
                vk::PipelineBindPoint::GRAPHICS,
                rec.layout,
                0,
                &[set],
                &[],
            );
        }

        if let Some((stages, bytes)) = rec.push_constants {
            device.cmd_push_constants(raw, rec.layout, stages, 0, bytes);
        }

        device.cmd_draw(
            raw,
            rec.draw.vertex_count,
            rec.draw.instance_count,
            0,
            0,
        );
        device.cmd_end_render_pass(raw);
    }

    cmd.end(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    use CommandBufferState::*;

    #[test]
    fn full_cycle() {
        let state = Initial;
        let state = state.begin().unwrap();
        assert_eq!(state, Recording);
        let state = state.end().unwrap();
        assert_eq!(state, Executable);
        let state = state.submit().unwrap();
        assert_eq!(state, Pending);
        let state = state.complete();
        assert_eq!(state, Executable);
        assert_eq!(state.reset().unwrap(), Initial);
    }

    #[test]
    fn pending_cannot_be_reset() {
        match Pending.reset() {
            Err(Error::CommandState { operation, state }) => {
                assert_eq!(operation, "reset");
                assert_eq!(state, Pending);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn illegal_transitions() {
        assert!(Recording.begin().is_err());
        assert!(Executable.begin().is_err());
        assert!(Initial.end().is_err());
        assert!(Recording.submit().is_err());
        assert!(Invalid.submit().is_err());
        assert_eq!(Invalid.reset().unwrap(), Initial);
        assert_eq!(Initial.complete(), Initial);
    }

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(500_000, 256), 1954);
        assert_eq!(workgroup_count(512, 256), 2);
        assert_eq!(workgroup_count(1, 256), 1);
        assert_eq!(workgroup_count(0, 64), 0);
    }
}
