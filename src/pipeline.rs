//! Render passes and graphics/compute pipelines.

use ash::vk;

use crate::{
    device::Context,
    error::{check, Error, Result},
    push::PushConstants,
    shader::{GraphicsShaders, ShaderModule, ShaderStage},
    spirv::Spirv,
    util::{drop_message, ErrorOnDrop},
};

/// How the pipeline's viewport and scissor are specified.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViewportMode {
    /// Set at record time. The pipeline survives resizes.
    Dynamic,
    /// Baked into the pipeline. The pipeline is rebuilt on every resize.
    Fixed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Blend {
    Opaque,
    /// `src + dst`, for accumulating many overlapping points.
    Additive,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Layout of the single interleaved vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    fn binding(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: 0,
                format: a.format,
                offset: a.offset,
            })
            .collect()
    }
}

/// Fixed-function state of a graphics pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub viewport: ViewportMode,
    pub blend: Blend,
    /// `None` when the vertex shader generates its own positions.
    pub vertex_layout: Option<VertexLayout>,
    /// Whether the layout declares the [`PushConstants`] range.
    pub push_constants: bool,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        GraphicsPipelineDesc {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            viewport: ViewportMode::Dynamic,
            blend: Blend::Opaque,
            vertex_layout: None,
            push_constants: false,
        }
    }
}

const DYNAMIC_VIEWPORT_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

impl GraphicsPipelineDesc {
    pub fn dynamic_states(&self) -> &'static [vk::DynamicState] {
        match self.viewport {
            ViewportMode::Dynamic => &DYNAMIC_VIEWPORT_STATES,
            ViewportMode::Fixed => &[],
        }
    }
}

pub fn blend_attachment(blend: Blend) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);

    match blend {
        Blend::Opaque => state.blend_enable(false),
        Blend::Additive => state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

/// Which objects a swapchain recreation has to rebuild.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecreatePlan {
    pub render_pass: bool,
    pub pipeline: bool,
}

impl RecreatePlan {
    pub fn new(
        old_format: vk::Format,
        new_format: vk::Format,
        viewport: ViewportMode,
    ) -> RecreatePlan {
        let render_pass = old_format != new_format;
        RecreatePlan {
            render_pass,
            // The pipeline is tied to the render pass it was created with.
            pipeline: render_pass || viewport == ViewportMode::Fixed,
        }
    }
}

/// Barriers making compute-shader writes visible to vertex-shader reads.
pub fn compute_to_vertex_barriers(
    buffers: &[(vk::Buffer, vk::DeviceSize)],
) -> Vec<vk::BufferMemoryBarrier<'static>> {
    buffers
        .iter()
        .map(|&(buffer, size)| {
            vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer)
                .offset(0)
                .size(size)
        })
        .collect()
}

drop_message!(
    DroppedRenderPass,
    "RenderPass must be manually destroyed with .destroy()"
);

/// A single-subpass render pass clearing one color attachment and leaving
/// it ready for presentation.
#[derive(Default)]
pub struct RenderPass {
    bomb: ErrorOnDrop<DroppedRenderPass>,
    raw: vk::RenderPass,
    format: vk::Format,
}

impl RenderPass {
    pub fn create(ctx: &Context, format: vk::Format) -> Result<RenderPass> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        // Wait for the acquired image before writing to it.
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let raw = check(
            unsafe { ctx.device().create_render_pass(&info, None) },
            "vkCreateRenderPass",
            Error::PipelineCreation,
        )?;
        log::debug!("created render pass for {:?}", format);

        Ok(RenderPass {
            bomb: ErrorOnDrop::new(DroppedRenderPass),
            raw,
            format,
        })
    }

    pub fn raw(&self) -> vk::RenderPass {
        self.raw
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// # Safety
    ///
    /// No pipeline or framebuffer created against this render pass may
    /// still be in use.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe { ctx.device().destroy_render_pass(self.raw, None) };
        self.raw = vk::RenderPass::null();
        self.bomb.disarm();
    }
}

fn create_layout(
    ctx: &Context,
    set_layout: Option<vk::DescriptorSetLayout>,
    push_constants: Option<vk::PushConstantRange>,
) -> Result<vk::PipelineLayout> {
    let set_layouts: Vec<_> = set_layout.into_iter().collect();
    let ranges: Vec<_> = push_constants.into_iter().collect();

    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&ranges);

    check(
        unsafe { ctx.device().create_pipeline_layout(&info, None) },
        "vkCreatePipelineLayout",
        Error::PipelineCreation,
    )
}

drop_message!(
    DroppedGraphicsPipeline,
    "GraphicsPipeline must be manually destroyed with .destroy()"
);

#[derive(Default)]
pub struct GraphicsPipeline {
    bomb: ErrorOnDrop<DroppedGraphicsPipeline>,
    raw: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Creates a pipeline for subpass 0 of `render_pass`.
    ///
    /// The shader modules are destroyed once creation has finished, whether
    /// or not it succeeded. `extent` is only used for fixed viewports.
    pub fn create(
        ctx: &Context,
        shaders: GraphicsShaders,
        desc: &GraphicsPipelineDesc,
        render_pass: vk::RenderPass,
        set_layout: Option<vk::DescriptorSetLayout>,
        extent: vk::Extent2D,
    ) -> Result<GraphicsPipeline> {
        let result = Self::create_with(ctx, &shaders, desc, render_pass, set_layout, extent);
        unsafe { shaders.destroy_with(ctx.device()) };
        result
    }

    fn create_with(
        ctx: &Context,
        shaders: &GraphicsShaders,
        desc: &GraphicsPipelineDesc,
        render_pass: vk::RenderPass,
        set_layout: Option<vk::DescriptorSetLayout>,
        extent: vk::Extent2D,
    ) -> Result<GraphicsPipeline> {
        let device = ctx.device();

        let push_range = desc.push_constants.then(PushConstants::range);
        let layout = create_layout(ctx, set_layout, push_range)?;

        let stages = shaders.stage_infos();

        let bindings: Vec<_> = desc.vertex_layout.iter().map(VertexLayout::binding).collect();
        let attributes = desc
            .vertex_layout
            .as_ref()
            .map(VertexLayout::attribute_descriptions)
            .unwrap_or_default();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = match desc.viewport {
            ViewportMode::Dynamic => vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1),
            ViewportMode::Fixed => vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors),
        };

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = [blend_attachment(desc.blend)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(desc.dynamic_states());

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        };

        let raw = match check(
            result.map_err(|(_, e)| e),
            "vkCreateGraphicsPipelines",
            Error::PipelineCreation,
        ) {
            Ok(pipelines) => pipelines[0],
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        log::debug!(
            "created graphics pipeline ({:?}, {:?} viewport)",
            desc.topology,
            desc.viewport
        );

        Ok(GraphicsPipeline {
            bomb: ErrorOnDrop::new(DroppedGraphicsPipeline),
            raw,
            layout,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// # Safety
    ///
    /// No submitted work may still use the pipeline.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe {
            ctx.device().destroy_pipeline(self.raw, None);
            ctx.device().destroy_pipeline_layout(self.layout, None);
        }
        self.raw = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.bomb.disarm();
    }
}

drop_message!(
    DroppedComputePipeline,
    "ComputePipeline must be manually destroyed with .destroy()"
);

#[derive(Default)]
pub struct ComputePipeline {
    bomb: ErrorOnDrop<DroppedComputePipeline>,
    raw: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl ComputePipeline {
    pub fn create(
        ctx: &Context,
        spirv: &Spirv,
        set_layout: Option<vk::DescriptorSetLayout>,
    ) -> Result<ComputePipeline> {
        let device = ctx.device();

        let module = ShaderModule::create(ctx, spirv, ShaderStage::Compute)?;

        let layout = match create_layout(ctx, set_layout, None) {
            Ok(l) => l,
            Err(e) => {
                unsafe { device.destroy_shader_module(module.raw, None) };
                return Err(e);
            }
        };

        let info = vk::ComputePipelineCreateInfo::default()
            .stage(module.stage_info())
            .layout(layout);

        let result = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        };
        unsafe { device.destroy_shader_module(module.raw, None) };

        let raw = match check(
            result.map_err(|(_, e)| e),
            "vkCreateComputePipelines",
            Error::PipelineCreation,
        ) {
            Ok(pipelines) => pipelines[0],
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };
        log::debug!("created compute pipeline from {}", spirv.name());

        Ok(ComputePipeline {
            bomb: ErrorOnDrop::new(DroppedComputePipeline),
            raw,
            layout,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// # Safety
    ///
    /// No submitted work may still use the pipeline.
    pub unsafe fn destroy(&mut self, ctx: &Context) {
        unsafe {
            ctx.device().destroy_pipeline(self.raw, None);
            ctx.device().destroy_pipeline_layout(self.layout, None);
        }
        self.raw = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.bomb.disarm();
    }
}
