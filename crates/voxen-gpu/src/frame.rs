//! Double-buffered frame scheduling.
//!
//! Two frame slots are reused cyclically. A slot's render fence must be
//! signaled before its command buffer is reset and re-recorded; that wait
//! is the backpressure bounding in-flight frames to two. GPU-side order
//! is expressed entirely through the semaphore graph: the submission
//! waits on the acquire semaphore, the presentation waits on the render
//! semaphore, and the fence hands completion back to the CPU.

use crate::command::{begin_command_buffer, end_command_buffer, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::surface::SurfaceContext;
use crate::swapchain::Swapchain;
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};
use ash::vk;

/// Number of frames that may be in flight simultaneously.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// How long one frame fence wait may block. A stall this long on a
/// real-time path means the GPU hung or the driver stalled.
const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;

/// Per-frame resources, one of exactly [`FRAMES_IN_FLIGHT`].
///
/// Created once at startup; destroyed together at shutdown after the
/// device has gone idle.
pub struct FrameSlot {
    command_pool: CommandPool,
    command_buffer: vk::CommandBuffer,
    /// Signaled by the presentation engine when the acquired image is ready.
    acquire_semaphore: vk::Semaphore,
    /// Signaled by the graphics queue, waited on by the present request.
    render_semaphore: vk::Semaphore,
    /// Signaled when this slot's submission has fully retired.
    render_fence: vk::Fence,
}

impl FrameSlot {
    /// # Safety
    /// The device must be valid and the queue family must exist.
    unsafe fn new(device: &ash::Device, graphics_family: u32) -> Result<Self> {
        let command_pool = CommandPool::new(
            device,
            graphics_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool.allocate_command_buffer(device)?;

        Ok(Self {
            command_pool,
            command_buffer,
            acquire_semaphore: create_semaphore(device)?,
            render_semaphore: create_semaphore(device)?,
            // created signaled so the first wait on this slot passes
            render_fence: create_fence(device, true)?,
        })
    }

    /// # Safety
    /// The device must be valid and the slot must not be in use.
    unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.acquire_semaphore, None);
        device.destroy_semaphore(self.render_semaphore, None);
        device.destroy_fence(self.render_fence, None);
        self.command_pool.destroy(device);
    }
}

/// Which slot a given frame number uses.
pub fn slot_index(frame_counter: u64) -> usize {
    (frame_counter % FRAMES_IN_FLIGHT as u64) as usize
}

/// Drives the wait → acquire → record → submit → present protocol.
pub struct FrameScheduler {
    slots: Vec<FrameSlot>,
    frame_counter: u64,
}

impl FrameScheduler {
    /// Create the frame slots on the graphics queue family.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, graphics_family: u32) -> Result<Self> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            slots.push(FrameSlot::new(device, graphics_family)?);
        }

        Ok(Self {
            slots,
            frame_counter: 0,
        })
    }

    /// Total frames submitted so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Execute one frame of the protocol.
    ///
    /// Strictly sequential on the calling thread:
    /// 1. pick the slot for this frame;
    /// 2. wait on its render fence (bounded, [`GpuError::DrawTimeout`] on
    ///    expiry) and reset the fence right after the successful wait;
    /// 3. recreate the swapchain if it is marked stale, then acquire an
    ///    image with the slot's acquire semaphore;
    /// 4. reset the command buffer and record through `record`;
    /// 5. submit to the graphics queue, waiting on the acquire semaphore
    ///    at color-attachment-output, signaling the render semaphore at
    ///    all-graphics and the render fence on completion;
    /// 6. present on the present queue, waiting on the render semaphore.
    ///
    /// `desired_extent` is the current framebuffer size, used when the
    /// swapchain has to be recreated on the way in.
    ///
    /// # Safety
    /// All handles must be valid and this must be the only thread
    /// touching the scheduler, swapchain, and queues.
    pub unsafe fn draw_frame(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
        swapchain: &mut Swapchain,
        desired_extent: vk::Extent2D,
        record: impl FnOnce(vk::CommandBuffer, vk::Image, vk::Extent2D) -> Result<()>,
    ) -> Result<()> {
        let device = gpu.device();
        let slot = &self.slots[slot_index(self.frame_counter)];

        // The wait proves the previous use of this slot's command buffer
        // is complete; resetting immediately closes the window where a
        // stale signaled fence could be misread.
        wait_for_fence(device, slot.render_fence, FRAME_TIMEOUT_NS).map_err(|e| match e {
            GpuError::Vulkan(vk::Result::TIMEOUT) => GpuError::DrawTimeout,
            other => other,
        })?;
        reset_fence(device, slot.render_fence)?;

        let (image_index, image) = loop {
            if swapchain.needs_recreate() {
                gpu.wait_idle()?;
                surface.recreate_swapchain(gpu, swapchain, desired_extent)?;
            }

            match swapchain.acquire(&surface.swapchain_loader, slot.acquire_semaphore) {
                Ok(acquired) => break acquired,
                // no image was acquired; recreate and try again
                Err(GpuError::SwapchainOutOfDate) => swapchain.mark_suboptimal(),
                Err(GpuError::SwapchainNotReady) => {}
                Err(e) => return Err(e),
            }
        };

        device.reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(
            device,
            slot.command_buffer,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        )?;

        record(slot.command_buffer, image, swapchain.extent)?;

        end_command_buffer(device, slot.command_buffer)?;

        let wait_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.acquire_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .device_index(0);

        let signal_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.render_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
            .device_index(0);

        let cmd_info = vk::CommandBufferSubmitInfo::default()
            .command_buffer(slot.command_buffer)
            .device_mask(0);

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(std::slice::from_ref(&wait_info))
            .signal_semaphore_infos(std::slice::from_ref(&signal_info))
            .command_buffer_infos(std::slice::from_ref(&cmd_info));

        device.queue_submit2(
            gpu.queues().graphics,
            std::slice::from_ref(&submit_info),
            slot.render_fence,
        )?;

        swapchain.present(
            &surface.swapchain_loader,
            gpu.queues().present,
            image_index,
            slot.render_semaphore,
        )?;

        self.frame_counter += 1;

        Ok(())
    }

    /// Destroy all slots.
    ///
    /// # Safety
    /// The device must be idle; no slot may have work in flight.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for slot in &self.slots {
            slot.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_two_frames_in_flight() {
        assert_eq!(FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn slots_are_reused_cyclically() {
        assert_eq!(slot_index(0), 0);
        assert_eq!(slot_index(1), 1);
        assert_eq!(slot_index(2), 0);
        assert_eq!(slot_index(3), 1);
        assert_eq!(slot_index(u64::from(u32::MAX) + 2), 1);
    }
}
