//! Command buffer management.

use crate::error::{GpuError, Result};
use crate::sync::{create_fence, reset_fence, wait_for_fence};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
    ) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers[0])
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// One-off submissions outside the frame loop, e.g. staging uploads.
///
/// Owns its own pool, buffer, and fence; `submit` records through a
/// closure and blocks until the GPU has finished.
pub struct ImmediateSubmit {
    pool: CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    queue: vk::Queue,
}

impl ImmediateSubmit {
    /// Timeout for one immediate submission.
    const TIMEOUT_NS: u64 = 1_000_000_000;

    /// Create the immediate-submit context on the given queue.
    ///
    /// # Safety
    /// The device must be valid and the queue must belong to `queue_family`.
    pub unsafe fn new(device: &ash::Device, queue: vk::Queue, queue_family: u32) -> Result<Self> {
        let pool = CommandPool::new(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = pool.allocate_command_buffer(device)?;
        let fence = create_fence(device, false)?;

        Ok(Self {
            pool,
            command_buffer,
            fence,
            queue,
        })
    }

    /// Record and submit a one-time command buffer, waiting for completion.
    ///
    /// # Safety
    /// The device must be valid and the closure must only record commands
    /// legal on this queue family.
    pub unsafe fn submit<T>(
        &self,
        device: &ash::Device,
        f: impl FnOnce(vk::CommandBuffer) -> Result<T>,
    ) -> Result<T> {
        device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(
            device,
            self.command_buffer,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        )?;

        let value = f(self.command_buffer)?;

        end_command_buffer(device, self.command_buffer)?;

        let cmd_info = vk::CommandBufferSubmitInfo::default()
            .command_buffer(self.command_buffer)
            .device_mask(0);
        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(std::slice::from_ref(&cmd_info));

        device.queue_submit2(self.queue, std::slice::from_ref(&submit_info), self.fence)?;

        wait_for_fence(device, self.fence, Self::TIMEOUT_NS).map_err(|err| match err {
            GpuError::Vulkan(vk::Result::TIMEOUT) => GpuError::DrawTimeout,
            other => other,
        })?;
        reset_fence(device, self.fence)?;

        Ok(value)
    }

    /// Destroy the pool and fence.
    ///
    /// # Safety
    /// The device must be valid and no submission may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
        self.pool.destroy(device);
    }
}
