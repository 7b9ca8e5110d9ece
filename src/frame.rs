//! Per-slot synchronization objects for frames in flight.

use ash::vk;

use crate::{
    command::CommandBuffer,
    device::Context,
    error::{check, Error, Result},
    util::{drop_message, ErrorOnDrop},
};

drop_message!(
    DroppedFrameContext,
    "FrameContext must be manually destroyed with .destroy()"
);

/// Everything owned by one frame slot.
///
/// The fence starts signaled so that the first wait on the slot returns
/// immediately.
pub struct FrameContext {
    bomb: ErrorOnDrop<DroppedFrameContext>,

    /// Signaled when the acquired image may be rendered to.
    pub image_available: vk::Semaphore,
    /// Signaled when rendering has finished and the image may be presented.
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission has completed on the GPU.
    pub in_flight: vk::Fence,
    pub command_buffer: CommandBuffer,
}

impl FrameContext {
    pub fn create(ctx: &Context, command_buffer: CommandBuffer) -> Result<FrameContext> {
        let device = ctx.device();

        let mut frame = FrameContext {
            bomb: ErrorOnDrop::new(DroppedFrameContext),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            command_buffer,
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let result = (|| -> Result<()> {
            frame.image_available = check(
                unsafe { device.create_semaphore(&semaphore_info, None) },
                "vkCreateSemaphore",
                Error::Sync,
            )?;
            frame.render_finished = check(
                unsafe { device.create_semaphore(&semaphore_info, None) },
                "vkCreateSemaphore",
                Error::Sync,
            )?;
            frame.in_flight = check(
                unsafe { device.create_fence(&fence_info, None) },
                "vkCreateFence",
                Error::Sync,
            )?;
            Ok(())
        })();

        if let Err(e) = result {
            unsafe { frame.destroy(ctx) };
            return Err(e);
        }

        Ok(frame)
    }

    /// Blocks until the slot's last submission has completed.
    pub fn wait(&mut self, ctx: &Context) -> Result<()> {
        check(
            unsafe {
                ctx.device()
                    .wait_for_fences(&[self.in_flight], true, u64::MAX)
            },
            "vkWaitForFences",
            Error::Sync,
        )?;
        self.command_buffer.mark_completed();
        Ok(())
    }

    /// Unsignals the fence ahead of a new submission.
    pub fn reset(&self, ctx: &Context) -> Result<()> {
        check(
            unsafe { ctx.device().reset_fences(&[self.in_flight]) },
            "vkResetFences",
            Error::Sync,
        )
    }

    /// Destroys the semaphores and the fence. The command buffer is freed
    /// with its pool.
    ///
    /// # Safety
    ///
    /// The slot's submission must have completed.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        let device = ctx.device();
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
        self.image_available = vk::Semaphore::null();
        self.render_finished = vk::Semaphore::null();
        self.in_flight = vk::Fence::null();
        self.bomb.disarm();
    }
}
