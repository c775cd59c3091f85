//! Experimental declarative render graph: a typed node soup with a
//! dependency build pass, a topological execute pass feeding the unified
//! scheduler, and a Graphviz dump for diagnostics.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use ash::vk;

use crate::error::Result;
use crate::pipeline_data::RenderPassDesc;
use crate::render_list::{RenderList, RenderTargetInfo};
use crate::task::Task;
use crate::texture_data::{get_byte_size, TextureData};
use crate::vulkan::buffer::create_buffer_uninitialized;
use crate::vulkan::device::VulkanDevice;
use crate::vulkan::texture::mip_byte_size;
use crate::{Kernel, ParameterBlock, Texture};

/// A device-side texture in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureNodeRef(usize);

/// A host-side texture payload in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDataNodeRef(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceNodeRef {
    Texture(TextureNodeRef),
    TextureData(TextureDataNodeRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CommandNodeRef {
    Render(usize),
    Copy(usize),
    Dispatch(usize),
}

struct TextureNode {
    name: String,
    texture: Texture,
    source: Option<CommandNodeRef>,
}

struct TextureDataNode {
    name: String,
    /// Declarative payload; populated by executing the node's source.
    #[allow(dead_code)]
    data: TextureData,
    source: Option<CommandNodeRef>,
}

struct RenderNode {
    render_list: RenderList,
    render_target: RenderTargetInfo,
    color_target: Option<TextureNodeRef>,
    depth_stencil_target: Option<TextureNodeRef>,
    dependencies: Vec<ResourceNodeRef>,
}

/// Directional copy between a device texture and a host payload.
struct CopyNode {
    source: ResourceNodeRef,
    target: ResourceNodeRef,
}

struct DispatchNode {
    kernel: Kernel,
    parameters: Option<ParameterBlock>,
    group_count: (u32, u32, u32),
    dependencies: Vec<ResourceNodeRef>,
    outputs: Vec<ResourceNodeRef>,
}

/// Declarative alternative to driving [`crate::vulkan::renderer::Renderer`]
/// directly. Nodes are added in any order; `execute` builds implicit
/// dependencies, orders the command nodes and runs them through the
/// scheduler.
#[derive(Default)]
pub struct RenderGraph {
    texture_nodes: Vec<TextureNode>,
    texture_data_nodes: Vec<TextureDataNode>,
    render_nodes: Vec<RenderNode>,
    copy_nodes: Vec<CopyNode>,
    dispatch_nodes: Vec<DispatchNode>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_texture(&mut self, name: impl Into<String>, texture: Texture) -> TextureNodeRef {
        self.texture_nodes.push(TextureNode { name: name.into(), texture, source: None });
        TextureNodeRef(self.texture_nodes.len() - 1)
    }

    pub fn add_texture_data(&mut self, name: impl Into<String>, data: TextureData) -> TextureDataNodeRef {
        self.texture_data_nodes.push(TextureDataNode { name: name.into(), data, source: None });
        TextureDataNodeRef(self.texture_data_nodes.len() - 1)
    }

    /// Adds a render pass writing `color_target` and/or
    /// `depth_stencil_target`.
    pub fn add_render_node(
        &mut self,
        render_list: RenderList,
        render_target: RenderTargetInfo,
        color_target: Option<TextureNodeRef>,
        depth_stencil_target: Option<TextureNodeRef>,
    ) {
        self.render_nodes.push(RenderNode {
            render_list,
            render_target,
            color_target,
            depth_stencil_target,
            dependencies: Vec::new(),
        });
        let node = CommandNodeRef::Render(self.render_nodes.len() - 1);
        if let Some(target) = color_target {
            self.texture_nodes[target.0].source = Some(node);
        }
        if let Some(target) = depth_stencil_target {
            self.texture_nodes[target.0].source = Some(node);
        }
    }

    /// Adds a device-to-host readback of a texture node into a texture-data
    /// node.
    pub fn add_copy_node(&mut self, source: TextureNodeRef, target: TextureDataNodeRef) {
        self.copy_nodes.push(CopyNode {
            source: ResourceNodeRef::Texture(source),
            target: ResourceNodeRef::TextureData(target),
        });
        self.texture_data_nodes[target.0].source = Some(CommandNodeRef::Copy(self.copy_nodes.len() - 1));
    }

    /// Adds a compute dispatch with explicit resource edges.
    pub fn add_dispatch_node(
        &mut self,
        kernel: Kernel,
        parameters: Option<ParameterBlock>,
        group_count: (u32, u32, u32),
        inputs: Vec<ResourceNodeRef>,
        outputs: Vec<ResourceNodeRef>,
    ) {
        self.dispatch_nodes.push(DispatchNode {
            kernel,
            parameters,
            group_count,
            dependencies: inputs,
            outputs: outputs.clone(),
        });
        let node = CommandNodeRef::Dispatch(self.dispatch_nodes.len() - 1);
        for output in outputs {
            if let ResourceNodeRef::Texture(target) = output {
                self.texture_nodes[target.0].source = Some(node);
            }
        }
    }

    fn source_of(&self, resource: ResourceNodeRef) -> Option<CommandNodeRef> {
        match resource {
            ResourceNodeRef::Texture(node) => self.texture_nodes[node.0].source,
            ResourceNodeRef::TextureData(node) => self.texture_data_nodes[node.0].source,
        }
    }

    /// Walks every render node and appends each sampled texture as a
    /// dependency edge pointing at that texture's latest writer.
    fn build(&mut self) {
        let texture_refs: HashMap<u64, TextureNodeRef> = self
            .texture_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.texture.index(), TextureNodeRef(i)))
            .collect();

        for node in &mut self.render_nodes {
            let list = &node.render_list;
            let mut sampled: Vec<Texture> = list.view_parameters.textures.clone();
            for object in &list.objects {
                if let Some(block) = &object.material_parameters {
                    sampled.extend(block.with(|b| b.textures.clone()));
                }
                sampled.extend(object.object_parameters.textures.iter().cloned());
            }

            let mut dependencies = Vec::new();
            for texture in sampled {
                if let Some(&node_ref) = texture_refs.get(&texture.index()) {
                    dependencies.push(ResourceNodeRef::Texture(node_ref));
                }
            }
            node.dependencies = dependencies;
        }
    }

    fn command_nodes(&self) -> Vec<CommandNodeRef> {
        (0..self.render_nodes.len())
            .map(CommandNodeRef::Render)
            .chain((0..self.dispatch_nodes.len()).map(CommandNodeRef::Dispatch))
            .chain((0..self.copy_nodes.len()).map(CommandNodeRef::Copy))
            .collect()
    }

    fn dependencies_of(&self, node: CommandNodeRef) -> Vec<CommandNodeRef> {
        let resources: Vec<ResourceNodeRef> = match node {
            CommandNodeRef::Render(i) => self.render_nodes[i].dependencies.clone(),
            CommandNodeRef::Copy(i) => vec![self.copy_nodes[i].source],
            CommandNodeRef::Dispatch(i) => self.dispatch_nodes[i].dependencies.clone(),
        };
        resources
            .into_iter()
            .filter_map(|resource| self.source_of(resource))
            .filter(|&source| source != node)
            .collect()
    }

    /// Topological order over command nodes; insertion order breaks ties.
    fn topological_order(&self) -> Vec<CommandNodeRef> {
        let nodes = self.command_nodes();
        let mut ordered = Vec::with_capacity(nodes.len());
        let mut visited: HashMap<CommandNodeRef, bool> = HashMap::new();

        fn visit(
            graph: &RenderGraph,
            node: CommandNodeRef,
            visited: &mut HashMap<CommandNodeRef, bool>,
            ordered: &mut Vec<CommandNodeRef>,
        ) {
            match visited.get(&node) {
                Some(true) => return,
                // A cycle is a construction error in the graph.
                Some(false) => panic!("render graph contains a dependency cycle"),
                None => {}
            }
            visited.insert(node, false);
            for dependency in graph.dependencies_of(node) {
                visit(graph, dependency, visited, ordered);
            }
            visited.insert(node, true);
            ordered.push(node);
        }

        for node in nodes {
            visit(self, node, &mut visited, &mut ordered);
        }
        ordered
    }

    /// Executes the graph through the scheduler. Returns the readback tasks
    /// of every copy node, keyed by the target texture-data node's name.
    pub fn execute(mut self, device: &Arc<VulkanDevice>) -> Result<Vec<(String, Task<TextureData>)>> {
        self.build();
        let order = self.topological_order();
        let mut readbacks = Vec::new();

        for node in order {
            match node {
                CommandNodeRef::Render(i) => self.execute_render(device, i)?,
                CommandNodeRef::Dispatch(i) => self.execute_dispatch(device, i),
                CommandNodeRef::Copy(i) => {
                    let readback = self.execute_copy(device, i);
                    readbacks.push(readback);
                }
            }
        }
        Ok(readbacks)
    }

    fn execute_render(&self, device: &Arc<VulkanDevice>, index: usize) -> Result<()> {
        let node = &self.render_nodes[index];
        let render_list = node.render_list.clone();
        let render_target = node.render_target.clone();
        let color = node.color_target.map(|t| self.texture_nodes[t.0].texture.clone());
        let depth = node.depth_stencil_target.map(|t| self.texture_nodes[t.0].texture.clone());

        let device = Arc::clone(device);
        let shared_device = Arc::clone(&device);
        device.scheduler().schedule_gpu(move |cmd| {
            let result = (|| -> Result<()> {
                let mut attachments = Vec::new();
                for texture in [&color, &depth].into_iter().flatten() {
                    cmd.add_texture(texture);
                    texture.with(|t| {
                        t.transition_to_render_target(cmd);
                        attachments.push(t.image_view);
                    });
                }

                let render_pass = shared_device
                    .create_render_pass(&render_target.framebuffer_layout, &render_list.clear_state)?;
                let framebuffer = shared_device.create_framebuffer(
                    render_pass,
                    &render_target.framebuffer_layout,
                    render_target.size,
                    attachments,
                )?;
                let render_pass_desc = RenderPassDesc {
                    framebuffer_layout: render_target.framebuffer_layout,
                    render_overrides: render_list.render_overrides,
                };

                crate::vulkan::renderer::record_graph_render_list(
                    &shared_device,
                    cmd,
                    &render_list,
                    render_pass,
                    &render_pass_desc,
                    &framebuffer,
                )?;

                for texture in [&color, &depth].into_iter().flatten() {
                    texture.with(|t| t.transition_to_shader_input(cmd));
                }
                Ok(())
            })();
            if let Err(e) = result {
                log::error!("Failed to record graph render node: {e}");
            }
        });
        Ok(())
    }

    fn execute_dispatch(&self, device: &Arc<VulkanDevice>, index: usize) {
        let node = &self.dispatch_nodes[index];
        let kernel = node.kernel.clone();
        let parameters = node.parameters.clone();
        let group_count = node.group_count;
        let inputs: Vec<Texture> = node
            .dependencies
            .iter()
            .filter_map(|resource| match resource {
                ResourceNodeRef::Texture(t) => Some(self.texture_nodes[t.0].texture.clone()),
                ResourceNodeRef::TextureData(_) => None,
            })
            .collect();

        let vk_device = device.vk_device().clone();
        device.scheduler().schedule_gpu(move |cmd| {
            for input in &inputs {
                cmd.add_texture(input);
                input.with(|t| t.transition_to_shader_input(cmd));
            }
            kernel.with(|k| {
                let raw = cmd.get();
                unsafe {
                    vk_device.cmd_bind_pipeline(raw, vk::PipelineBindPoint::COMPUTE, k.pipeline);
                    if let Some(parameters) = &parameters {
                        if let Some(set) = parameters.with(|block| block.descriptor_set()) {
                            vk_device.cmd_bind_descriptor_sets(
                                raw,
                                vk::PipelineBindPoint::COMPUTE,
                                k.pipeline_layout,
                                0,
                                &[set],
                                &[],
                            );
                        }
                    }
                    vk_device.cmd_dispatch(raw, group_count.0, group_count.1, group_count.2);
                }
            });
            if let Some(parameters) = &parameters {
                cmd.add_parameter_block(parameters);
            }
        });
    }

    fn execute_copy(&self, device: &Arc<VulkanDevice>, index: usize) -> (String, Task<TextureData>) {
        let node = &self.copy_nodes[index];
        let ResourceNodeRef::Texture(source) = node.source else {
            panic!("copy node source must be a texture node");
        };
        let ResourceNodeRef::TextureData(target) = node.target else {
            panic!("copy node target must be a texture-data node");
        };
        let texture = self.texture_nodes[source.0].texture.clone();
        let name = self.texture_data_nodes[target.0].name.clone();

        let (size, format, mip_level_count, sample_count) =
            texture.with(|t| (t.size, t.format, t.mip_level_count, t.sample_count));
        let texture_data = TextureData {
            size,
            format,
            mip_level_count,
            sample_count,
            sampler_state: Default::default(),
            pixels: Vec::new(),
        };
        let buffer_size = get_byte_size(&texture_data) as u64;

        let shared_device = Arc::clone(device);
        let readback = device.scheduler().schedule_gpu(move |cmd| -> Result<Arc<crate::vulkan::buffer::VulkanBuffer>> {
            let buffer = create_buffer_uninitialized(
                shared_device.vk_device(),
                shared_device.memory_properties(),
                buffer_size,
                vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            cmd.add_texture(&texture);
            texture.with(|t| {
                t.transition_to_transfer_src(cmd);
                let mut buffer_offset = 0u64;
                let regions: Vec<vk::BufferImageCopy> = (0..t.mip_level_count)
                    .map(|mip| {
                        let extent = vk::Extent3D {
                            width: (t.size.0 >> mip).max(1),
                            height: (t.size.1 >> mip).max(1),
                            depth: 1,
                        };
                        let region = vk::BufferImageCopy::default()
                            .buffer_offset(buffer_offset)
                            .image_subresource(
                                vk::ImageSubresourceLayers::default()
                                    .aspect_mask(crate::format::get_image_aspect(t.format))
                                    .mip_level(mip)
                                    .layer_count(1),
                            )
                            .image_extent(extent);
                        buffer_offset += mip_byte_size(t.size, t.format, mip);
                        region
                    })
                    .collect();
                unsafe {
                    shared_device.vk_device().cmd_copy_image_to_buffer(
                        cmd.get(),
                        t.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        buffer.buffer,
                        &regions,
                    );
                }
                t.transition_to_shader_input(cmd);
            });
            Ok(Arc::new(buffer))
        });

        let task = device.scheduler().schedule_after(readback, move |buffer| {
            let mut data = texture_data;
            if let Ok(buffer) = buffer {
                data.pixels = buffer.mapped_data().to_vec();
            }
            data
        });
        (name, task)
    }

    /// Emits a Graphviz DOT description of the graph for diagnostics.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph RenderGraph {\n");
        for (i, node) in self.texture_nodes.iter().enumerate() {
            let _ = writeln!(out, "    texture{i} [label=\"{}\" shape=box];", node.name);
        }
        for (i, node) in self.texture_data_nodes.iter().enumerate() {
            let _ = writeln!(out, "    textureData{i} [label=\"{}\" shape=note];", node.name);
        }
        for (i, node) in self.render_nodes.iter().enumerate() {
            let _ = writeln!(out, "    render{i} [label=\"render: {}\"];", node.render_list.name);
            for dependency in &node.dependencies {
                let _ = writeln!(out, "    {} -> render{i};", self.resource_node_id(*dependency));
            }
            if let Some(target) = node.color_target {
                let _ = writeln!(out, "    render{i} -> texture{};", target.0);
            }
            if let Some(target) = node.depth_stencil_target {
                let _ = writeln!(out, "    render{i} -> texture{};", target.0);
            }
        }
        for (i, node) in self.copy_nodes.iter().enumerate() {
            let _ = writeln!(out, "    copy{i} [label=\"copy\"];");
            let _ = writeln!(out, "    {} -> copy{i};", self.resource_node_id(node.source));
            let _ = writeln!(out, "    copy{i} -> {};", self.resource_node_id(node.target));
        }
        for (i, node) in self.dispatch_nodes.iter().enumerate() {
            let _ = writeln!(out, "    dispatch{i} [label=\"dispatch\"];");
            for dependency in &node.dependencies {
                let _ = writeln!(out, "    {} -> dispatch{i};", self.resource_node_id(*dependency));
            }
            for output in &node.outputs {
                let _ = writeln!(out, "    dispatch{i} -> {};", self.resource_node_id(*output));
            }
        }
        out.push_str("}\n");
        out
    }

    fn resource_node_id(&self, resource: ResourceNodeRef) -> String {
        match resource {
            ResourceNodeRef::Texture(node) => format!("texture{}", node.0),
            ResourceNodeRef::TextureData(node) => format!("textureData{}", node.0),
        }
    }
}
