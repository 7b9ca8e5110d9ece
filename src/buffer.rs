//! Host-visible buffers for vertex, storage and uniform data.

use std::ptr;

use ash::vk;

use crate::{
    device::Context,
    error::{check, Error, Result},
    util::{drop_message, ErrorOnDrop},
};

/// Returns the first memory type allowed by `type_bits` that has all of
/// `required`.
///
/// Types with fewer property flags are listed first, so the first match is
/// also the least specialised one.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    props
        .memory_types
        .iter()
        .take(props.memory_type_count as usize)
        .enumerate()
        .find(|(i, ty)| type_bits & (1u32 << *i) != 0 && ty.property_flags.contains(required))
        .map(|(i, _)| i as u32)
}

/// Memory properties for buffers the CPU writes every frame.
pub const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

drop_message!(
    DroppedBuffer,
    "Buffer must be manually destroyed with .destroy()"
);

#[derive(Default)]
pub struct Buffer {
    bomb: ErrorOnDrop<DroppedBuffer>,
    raw: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    pub fn create(
        ctx: &Context,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Buffer> {
        let device = ctx.device();

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = check(
            unsafe { device.create_buffer(&info, None) },
            "vkCreateBuffer",
            Error::ResourceCreation,
        )?;

        let requirements = unsafe { device.get_buffer_memory_requirements(raw) };

        let memory_type = match find_memory_type(
            ctx.memory_properties(),
            requirements.memory_type_bits,
            properties,
        ) {
            Some(t) => t,
            None => {
                unsafe { device.destroy_buffer(raw, None) };
                log::error!(
                    "no memory type with {:?} in type bits {:#b}",
                    properties,
                    requirements.memory_type_bits
                );
                return Err(Error::NoMemoryType {
                    type_bits: requirements.memory_type_bits,
                    required: properties,
                });
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match check(
            unsafe { device.allocate_memory(&alloc_info, None) },
            "vkAllocateMemory",
            Error::ResourceCreation,
        ) {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.destroy_buffer(raw, None) };
                return Err(e);
            }
        };

        if let Err(e) = check(
            unsafe { device.bind_buffer_memory(raw, memory, 0) },
            "vkBindBufferMemory",
            Error::ResourceCreation,
        ) {
            unsafe {
                device.free_memory(memory, None);
                device.destroy_buffer(raw, None);
            }
            return Err(e);
        }

        log::debug!(
            "created {} byte buffer ({:?}) in memory type {}",
            size,
            usage,
            memory_type
        );

        Ok(Buffer {
            bomb: ErrorOnDrop::new(DroppedBuffer),
            raw,
            memory,
            size,
        })
    }

    /// Creates a buffer holding `bytes`.
    pub fn with_data(ctx: &Context, usage: vk::BufferUsageFlags, bytes: &[u8]) -> Result<Buffer> {
        let mut buffer = Buffer::create(ctx, bytes.len() as vk::DeviceSize, usage, HOST_MEMORY)?;
        if let Err(e) = buffer.write(ctx, 0, bytes) {
            unsafe { buffer.destroy(ctx) };
            return Err(e);
        }
        Ok(buffer)
    }

    /// Copies `bytes` into the buffer at `offset`.
    ///
    /// The memory must be host-visible and coherent, and the GPU must not
    /// be reading the written range.
    pub fn write(&self, ctx: &Context, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as vk::DeviceSize;
        assert!(
            offset + len <= self.size,
            "write of {} bytes at {} overflows {} byte buffer",
            len,
            offset,
            self.size
        );

        if bytes.is_empty() {
            return Ok(());
        }

        let device = ctx.device();
        let mapped = check(
            unsafe { device.map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty()) },
            "vkMapMemory",
            Error::ResourceCreation,
        )?;

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// # Safety
    ///
    /// No submitted work may still reference the buffer.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe {
            ctx.device().destroy_buffer(self.raw, None);
            ctx.device().free_memory(self.memory, None);
        }
        self.raw = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
        self.bomb.disarm();
    }

    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
            slot.heap_index = 0;
        }
        props
    }

    #[test]
    fn first_matching_type_wins() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_MEMORY,
            HOST_MEMORY | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&p, 0b111, HOST_MEMORY), Some(1));
        assert_eq!(
            find_memory_type(&p, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn type_bits_filter() {
        let p = props(&[HOST_MEMORY, HOST_MEMORY]);
        assert_eq!(find_memory_type(&p, 0b10, HOST_MEMORY), Some(1));
        assert_eq!(find_memory_type(&p, 0, HOST_MEMORY), None);
    }

    #[test]
    fn types_past_count_are_ignored() {
        let mut p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        p.memory_types[1].property_flags = HOST_MEMORY;
        assert_eq!(find_memory_type(&p, u32::MAX, HOST_MEMORY), None);
    }
}
