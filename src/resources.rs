//! Buffers and descriptor sets a scene draws from.
//!
//! Storage buffers are shared by every frame in flight. The uniform buffer
//! is duplicated per frame slot, since the CPU rewrites it every frame.

use ash::vk;

use crate::{
    buffer::{Buffer, HOST_MEMORY},
    device::Context,
    error::{check, Error, Result},
    util::{drop_message, ErrorOnDrop},
};

/// Sizes and contents of a scene's buffers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceDesc {
    /// Contents of the vertex buffer. Empty for scenes without vertex input.
    pub vertex_data: Vec<u8>,
    /// Sizes of the storage buffers, bound in order from binding 0.
    pub storage_buffers: Vec<vk::DeviceSize>,
    /// Size of the uniform block, bound after the storage buffers.
    pub uniform_size: Option<vk::DeviceSize>,
}

impl ResourceDesc {
    pub fn needs_descriptors(&self) -> bool {
        !self.storage_buffers.is_empty() || self.uniform_size.is_some()
    }

    /// Binding index of the uniform block.
    pub fn uniform_binding(&self) -> u32 {
        self.storage_buffers.len() as u32
    }
}

/// Layout bindings for `desc`.
///
/// Storage buffers are visible to the vertex stage, and to the compute
/// stage when the scene has one. The uniform block is visible to every
/// stage the scene uses.
pub fn descriptor_bindings(
    desc: &ResourceDesc,
    has_compute: bool,
) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let compute = if has_compute {
        vk::ShaderStageFlags::COMPUTE
    } else {
        vk::ShaderStageFlags::empty()
    };

    let storage = (0..desc.storage_buffers.len() as u32).map(|binding| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | compute)
    });

    let uniform = desc.uniform_size.map(|_| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(desc.uniform_binding())
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT | compute)
    });

    storage.chain(uniform).collect()
}

/// Pool sizes for `sets` descriptor sets laid out per `desc`.
pub fn pool_sizes(desc: &ResourceDesc, sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes = Vec::with_capacity(2);

    if !desc.storage_buffers.is_empty() {
        sizes.push(vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: desc.storage_buffers.len() as u32 * sets,
        });
    }

    if desc.uniform_size.is_some() {
        sizes.push(vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: sets,
        });
    }

    sizes
}

drop_message!(
    DroppedSceneResources,
    "SceneResources must be manually destroyed with .destroy()"
);

#[derive(Default)]
pub struct SceneResources {
    bomb: ErrorOnDrop<DroppedSceneResources>,

    vertex_buffer: Option<Buffer>,
    vertex_raw: Vec<vk::Buffer>,
    storage: Vec<Buffer>,
    uniforms: Vec<Buffer>,
    uniform_size: usize,

    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl SceneResources {
    /// Creates the buffers in `desc` and, if any need binding, one
    /// descriptor set per frame slot.
    pub fn create(
        ctx: &Context,
        desc: &ResourceDesc,
        frames_in_flight: usize,
        has_compute: bool,
    ) -> Result<SceneResources> {
        let mut resources = SceneResources {
            bomb: ErrorOnDrop::new(DroppedSceneResources),
            uniform_size: desc.uniform_size.unwrap_or(0) as usize,
            ..Default::default()
        };

        if let Err(e) = resources.build(ctx, desc, frames_in_flight, has_compute) {
            unsafe { resources.destroy(ctx) };
            return Err(e);
        }

        Ok(resources)
    }

    fn build(
        &mut self,
        ctx: &Context,
        desc: &ResourceDesc,
        frames_in_flight: usize,
        has_compute: bool,
    ) -> Result<()> {
        if !desc.vertex_data.is_empty() {
            let buffer =
                Buffer::with_data(ctx, vk::BufferUsageFlags::VERTEX_BUFFER, &desc.vertex_data)?;
            self.vertex_raw.push(buffer.raw());
            self.vertex_buffer = Some(buffer);
        }

        for &size in &desc.storage_buffers {
            let buffer =
                Buffer::create(ctx, size, vk::BufferUsageFlags::STORAGE_BUFFER, HOST_MEMORY)?;
            self.storage.push(buffer);
        }

        if let Some(size) = desc.uniform_size {
            for _ in 0..frames_in_flight {
                let buffer =
                    Buffer::create(ctx, size, vk::BufferUsageFlags::UNIFORM_BUFFER, HOST_MEMORY)?;
                self.uniforms.push(buffer);
            }
        }

        if !desc.needs_descriptors() {
            return Ok(());
        }

        let device = ctx.device();

        let bindings = descriptor_bindings(desc, has_compute);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        self.set_layout = check(
            unsafe { device.create_descriptor_set_layout(&layout_info, None) },
            "vkCreateDescriptorSetLayout",
            Error::ResourceCreation,
        )?;

        let set_count = frames_in_flight as u32;
        let sizes = pool_sizes(desc, set_count);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(set_count)
            .pool_sizes(&sizes);
        self.pool = check(
            unsafe { device.create_descriptor_pool(&pool_info, None) },
            "vkCreateDescriptorPool",
            Error::ResourceCreation,
        )?;

        let layouts = vec![self.set_layout; frames_in_flight];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        self.sets = check(
            unsafe { device.allocate_descriptor_sets(&alloc_info) },
            "vkAllocateDescriptorSets",
            Error::ResourceCreation,
        )?;

        for (slot, &set) in self.sets.iter().enumerate() {
            let mut infos: Vec<(u32, vk::DescriptorType, [vk::DescriptorBufferInfo; 1])> = self
                .storage
                .iter()
                .enumerate()
                .map(|(binding, buffer)| {
                    (
                        binding as u32,
                        vk::DescriptorType::STORAGE_BUFFER,
                        [buffer_info(buffer)],
                    )
                })
                .collect();

            if let Some(uniform) = self.uniforms.get(slot) {
                infos.push((
                    desc.uniform_binding(),
                    vk::DescriptorType::UNIFORM_BUFFER,
                    [buffer_info(uniform)],
                ));
            }

            let writes: Vec<vk::WriteDescriptorSet<'_>> = infos
                .iter()
                .map(|(binding, ty, info)| {
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(*binding)
                        .descriptor_type(*ty)
                        .buffer_info(info)
                })
                .collect();

            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        log::debug!(
            "created {} descriptor sets with {} bindings",
            self.sets.len(),
            bindings.len()
        );

        Ok(())
    }

    /// Copies `bytes` into the uniform buffer of `slot`.
    ///
    /// The slot's previous submission must have completed.
    pub fn write_uniforms(&self, ctx: &Context, slot: usize, bytes: &[u8]) -> Result<()> {
        match self.uniforms.get(slot) {
            Some(buffer) => buffer.write(ctx, 0, bytes),
            None => Ok(()),
        }
    }

    /// Size of the uniform block in bytes, zero if the scene has none.
    pub fn uniform_size(&self) -> usize {
        self.uniform_size
    }

    pub fn vertex_buffers(&self) -> &[vk::Buffer] {
        &self.vertex_raw
    }

    /// Storage buffers and their sizes, in binding order.
    pub fn storage_buffers(&self) -> Vec<(vk::Buffer, vk::DeviceSize)> {
        self.storage.iter().map(|b| (b.raw(), b.size())).collect()
    }

    pub fn set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        (self.set_layout != vk::DescriptorSetLayout::null()).then_some(self.set_layout)
    }

    pub fn descriptor_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(slot).copied()
    }

    /// # Safety
    ///
    /// No submitted work may still reference the buffers or sets.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        let device = ctx.device();

        unsafe {
            // Destroying the pool frees its sets.
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);

            for buffer in self
                .uniforms
                .iter_mut()
                .chain(self.storage.iter_mut())
                .chain(self.vertex_buffer.iter_mut())
            {
                buffer.destroy(ctx);
            }
        }

        self.sets.clear();
        self.uniforms.clear();
        self.storage.clear();
        self.vertex_buffer = None;
        self.vertex_raw.clear();
        self.pool = vk::DescriptorPool::null();
        self.set_layout = vk::DescriptorSetLayout::null();
        self.bomb.disarm();
    }
}

fn buffer_info(buffer: &Buffer) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo {
        buffer: buffer.raw(),
        offset: 0,
        range: vk::WHOLE_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particles() -> ResourceDesc {
        ResourceDesc {
            vertex_data: Vec::new(),
            storage_buffers: vec![16 * 1024, 16 * 1024],
            uniform_size: Some(64),
        }
    }

    #[test]
    fn storage_then_uniform_bindings() {
        let bindings = descriptor_bindings(&particles(), true);
        assert_eq!(bindings.len(), 3);

        for (i, b) in bindings[..2].iter().enumerate() {
            assert_eq!(b.binding, i as u32);
            assert_eq!(b.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
            assert!(b.stage_flags.contains(vk::ShaderStageFlags::COMPUTE));
            assert!(b.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        }

        assert_eq!(bindings[2].binding, 2);
        assert_eq!(bindings[2].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn no_compute_stage_without_compute() {
        let bindings = descriptor_bindings(&particles(), false);
        assert!(bindings
            .iter()
            .all(|b| !b.stage_flags.contains(vk::ShaderStageFlags::COMPUTE)));
    }

    #[test]
    fn pool_sizes_scale_with_sets() {
        let sizes = pool_sizes(&particles(), 2);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 4);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 2);
    }

    #[test]
    fn vertex_only_scene_needs_no_descriptors() {
        let desc = ResourceDesc {
            vertex_data: vec![0; 60],
            ..Default::default()
        };
        assert!(!desc.needs_descriptors());
        assert!(descriptor_bindings(&desc, false).is_empty());
        assert!(pool_sizes(&desc, 3).is_empty());
    }
}
