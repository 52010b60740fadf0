// Graphics pipeline creation
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Geometry comes from the vertex shader itself (no vertex buffers), viewport
// and scissor are dynamic so a resize never forces a pipeline rebuild, and
// nothing is bound externally (empty layout).

use super::driver::Driver;
use super::shader::compile_shader_module;
use crate::error::{BootstrapError, Result};
use ash::vk;
use std::ffi::CStr;

/// Set per frame at record time rather than baked into the pipeline.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// What the pipeline builder needs besides the device and bytecode.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions<'a> {
    pub entry_point: &'a CStr,
    /// Also build the render pass and the pipeline object; with `false`
    /// construction stops at the layout.
    pub create_pipeline_object: bool,
}

/// Objects owned by the pipeline stage of the bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct PipelineState {
    pub layout: vk::PipelineLayout,
    pub render_pass: Option<vk::RenderPass>,
    pub pipeline: Option<vk::Pipeline>,
}

impl PipelineState {
    /// Pipeline, then render pass, then layout.
    pub fn destroy<D: Driver>(&self, driver: &mut D, device: vk::Device) {
        if let Some(pipeline) = self.pipeline {
            driver.destroy_pipeline(device, pipeline);
        }
        if let Some(render_pass) = self.render_pass {
            driver.destroy_render_pass(device, render_pass);
        }
        driver.destroy_pipeline_layout(device, self.layout);
    }
}

/// No vertex buffers: positions are generated in the vertex shader.
pub fn vertex_input_state() -> vk::PipelineVertexInputStateCreateInfo<'static> {
    vk::PipelineVertexInputStateCreateInfo::default()
}

pub fn input_assembly_state() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false)
}

/// One viewport and one scissor; their values are dynamic state.
pub fn viewport_state() -> vk::PipelineViewportStateCreateInfo<'static> {
    vk::PipelineViewportStateCreateInfo {
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    }
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

/// Multisampling (disabled)
pub fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
}

/// Standard alpha blending on colour; destination alpha is kept as is.
pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ZERO)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Vertex and fragment stages, both entering at `entry_point`.
pub fn shader_stages<'a>(
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
    entry_point: &'a CStr,
) -> [vk::PipelineShaderStageCreateInfo<'a>; 2] {
    [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(entry_point),
    ]
}

/// Create a render pass with a single colour attachment that ends up ready
/// for presentation.
pub fn create_render_pass<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    format: vk::Format,
) -> Result<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments);

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    driver
        .create_render_pass(device, &render_pass_info)
        .map_err(BootstrapError::RenderPassCreation)
}

fn create_graphics_pipeline<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    stages: &[vk::PipelineShaderStageCreateInfo<'_>],
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
) -> Result<vk::Pipeline> {
    let vertex_input = vertex_input_state();
    let input_assembly = input_assembly_state();
    let viewport = viewport_state();
    let rasterizer = rasterization_state();
    let multisampling = multisample_state();

    let color_blend_attachments = [color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    driver
        .create_graphics_pipeline(device, &pipeline_info)
        .map_err(BootstrapError::PipelineCreation)
}

/// Everything that needs the shader modules alive. Anything created here is
/// released again if a later step fails.
fn build_with_modules<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
    format: vk::Format,
    options: &PipelineOptions<'_>,
) -> Result<PipelineState> {
    // No descriptor sets and no push constants
    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = driver
        .create_pipeline_layout(device, &layout_info)
        .map_err(BootstrapError::PipelineLayoutCreation)?;

    if !options.create_pipeline_object {
        return Ok(PipelineState {
            layout,
            render_pass: None,
            pipeline: None,
        });
    }

    let render_pass = match create_render_pass(driver, device, format) {
        Ok(render_pass) => render_pass,
        Err(e) => {
            driver.destroy_pipeline_layout(device, layout);
            return Err(e);
        }
    };

    let stages = shader_stages(vertex, fragment, options.entry_point);
    match create_graphics_pipeline(driver, device, &stages, layout, render_pass) {
        Ok(pipeline) => Ok(PipelineState {
            layout,
            render_pass: Some(render_pass),
            pipeline: Some(pipeline),
        }),
        Err(e) => {
            driver.destroy_render_pass(device, render_pass);
            driver.destroy_pipeline_layout(device, layout);
            Err(e)
        }
    }
}

/// Wrap both shaders into modules, build the layout (and optionally the
/// render pass and pipeline), then destroy the modules again.
///
/// The modules are only needed while pipeline objects are being created, so
/// they never outlive this call, on success or on failure.
pub fn assemble_pipeline_state<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    vertex_bytecode: &[u8],
    fragment_bytecode: &[u8],
    format: vk::Format,
    options: &PipelineOptions<'_>,
) -> Result<PipelineState> {
    let vertex = compile_shader_module(driver, device, vertex_bytecode)?;
    let fragment = match compile_shader_module(driver, device, fragment_bytecode) {
        Ok(module) => module,
        Err(e) => {
            driver.destroy_shader_module(device, vertex);
            return Err(e);
        }
    };

    let state = build_with_modules(driver, device, vertex, fragment, format, options);

    driver.destroy_shader_module(device, fragment);
    driver.destroy_shader_module(device, vertex);

    let state = state?;
    log::info!(
        "Pipeline state ready (layout {:?}, pipeline {:?})",
        state.layout,
        state.pipeline
    );
    Ok(state)
}
