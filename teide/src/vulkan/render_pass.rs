//! Render pass and framebuffer construction.

use ash::vk;

use crate::error::Result;
use crate::format::format_to_vk;
use crate::pipeline_data::{FramebufferLayout, RenderPassInfo};
use crate::render_list::ClearState;

/// A framebuffer together with the layout and size it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub framebuffer: vk::Framebuffer,
    pub layout: FramebufferLayout,
    pub size: (u32, u32),
}

pub(crate) fn render_pass_info_for_clear_state(clear_state: &ClearState) -> RenderPassInfo {
    RenderPassInfo {
        clear_color: clear_state.color_value.is_some(),
        clear_depth: clear_state.depth_value.is_some(),
        clear_stencil: clear_state.stencil_value.is_some(),
    }
}

fn load_op(clear: bool) -> vk::AttachmentLoadOp {
    if clear {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    }
}

fn store_op(capture: bool) -> vk::AttachmentStoreOp {
    if capture {
        vk::AttachmentStoreOp::STORE
    } else {
        vk::AttachmentStoreOp::DONT_CARE
    }
}

/// Builds a render pass for the given framebuffer layout: optional color,
/// optional depth/stencil, and a resolve attachment when the pass is
/// multisampled and its color output is captured. One subpass, one external
/// dependency covering color output and early fragment tests.
pub(crate) fn create_render_pass(
    device: &ash::Device,
    layout: &FramebufferLayout,
    info: &RenderPassInfo,
) -> Result<vk::RenderPass> {
    let sample_count = vk::SampleCountFlags::from_raw(layout.sample_count.max(1));
    let multisampled = layout.sample_count > 1;

    let mut attachments = Vec::new();
    let mut color_ref = None;
    let mut depth_ref = None;
    let mut resolve_ref = None;

    if let Some(color_format) = layout.color_format {
        color_ref = Some(
            vk::AttachmentReference::default()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format_to_vk(color_format))
                .samples(sample_count)
                .load_op(load_op(info.clear_color))
                .store_op(store_op(layout.capture_color && !multisampled))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
    }

    if let Some(depth_format) = layout.depth_stencil_format {
        depth_ref = Some(
            vk::AttachmentReference::default()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format_to_vk(depth_format))
                .samples(sample_count)
                .load_op(load_op(info.clear_depth))
                .store_op(store_op(layout.capture_depth_stencil))
                .stencil_load_op(load_op(info.clear_stencil))
                .stencil_store_op(store_op(layout.capture_depth_stencil))
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    if multisampled && layout.capture_color {
        if let Some(color_format) = layout.color_format {
            resolve_ref = Some(
                vk::AttachmentReference::default()
                    .attachment(attachments.len() as u32)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format_to_vk(color_format))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
        }
    }

    let color_refs: Vec<vk::AttachmentReference> = color_ref.into_iter().collect();
    let resolve_refs: Vec<vk::AttachmentReference> = resolve_ref.into_iter().collect();

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if !resolve_refs.is_empty() {
        subpass = subpass.resolve_attachments(&resolve_refs);
    }
    if let Some(depth) = &depth_ref {
        subpass = subpass.depth_stencil_attachment(depth);
    }

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    Ok(unsafe { device.create_render_pass(&create_info, None)? })
}

pub(crate) fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    size: (u32, u32),
    attachments: &[vk::ImageView],
) -> Result<vk::Framebuffer> {
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(size.0)
        .height(size.1)
        .layers(1);
    Ok(unsafe { device.create_framebuffer(&create_info, None)? })
}
