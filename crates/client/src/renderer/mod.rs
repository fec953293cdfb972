//! WebGPU render surface for the overlay.
//!
//! Uses wgpu for cross-platform GPU rendering (WebGPU/WebGL on WASM,
//! Vulkan/Metal/DX12 native). Each frame draws the video pass-through
//! layer first, then the anchor's meshes on top.

mod normal_pipeline;
mod pipeline;
mod vertex;

use std::collections::HashMap;

use glam::Mat4;
use wgpu::{
    util::DeviceExt, Backends, Device, DeviceDescriptor, Instance, InstanceDescriptor,
    PowerPreference, Queue, RequestAdapterOptions, Surface, SurfaceConfiguration, TextureUsages,
};

use poseview_core::{FrameImage, MeshId, MeshNode, RenderFrame, RenderSurface, SurfaceError};

use normal_pipeline::{GlobalUniforms, InstanceUniforms, NormalPipeline};
use pipeline::BackgroundPipeline;

pub use vertex::{mesh_vertex_layout, QuadVertex};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// GPU resources for one attached mesh.
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// [`RenderSurface`] backed by a wgpu surface.
pub struct WgpuSurface {
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    clear_color: wgpu::Color,
    normal_pipeline: NormalPipeline,
    background: BackgroundPipeline,
    meshes: HashMap<MeshId, GpuMesh>,
    released: bool,
}

impl WgpuSurface {
    /// Create a surface on `target` (a winit window or, on the web, a
    /// canvas) of `width` x `height` pixels.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    ) -> anyhow::Result<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No suitable GPU adapter found"))?;

        tracing::info!("Using adapter: {:?}", adapter.get_info());

        // Use adapter limits for native, fall back to defaults for WASM
        let limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("poseview_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Surface reports no texture formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .iter()
            .find(|m| **m == wgpu::CompositeAlphaMode::PreMultiplied)
            .or_else(|| surface_caps.alpha_modes.first())
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let (depth_texture, depth_view) = create_depth_texture(&device, config.width, config.height);
        let normal_pipeline = NormalPipeline::new(&device, surface_format);
        let background = BackgroundPipeline::new(&device, surface_format);

        let [r, g, b, a] = clear_color.map(f64::from);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            depth_view,
            clear_color: wgpu::Color { r, g, b, a },
            normal_pipeline,
            background,
            meshes: HashMap::new(),
            released: false,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn upload_meshes(&mut self, nodes: &[MeshNode]) {
        for node in nodes {
            if self.meshes.contains_key(&node.id) || node.mesh.is_empty() {
                continue;
            }
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertex_buffer"),
                contents: bytemuck::cast_slice(&node.mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let (uniform_buffer, bind_group) = self.normal_pipeline.create_instance(&self.device);
            self.meshes.insert(
                node.id,
                GpuMesh {
                    vertex_buffer,
                    vertex_count: node.mesh.vertex_count(),
                    uniform_buffer,
                    bind_group,
                },
            );
            tracing::debug!("Uploaded mesh {:?} ({} vertices)", node.id, node.mesh.vertex_count());
        }
    }
}

impl RenderSurface for WgpuSurface {
    fn resize(&mut self, width: u32, height: u32) {
        if self.released || width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.depth_texture.destroy();
        let (depth_texture, depth_view) = create_depth_texture(&self.device, width, height);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;
    }

    fn present_video_frame(&mut self, frame: &FrameImage) {
        if !self.released {
            self.background.upload(&self.device, &self.queue, frame);
        }
    }

    fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), SurfaceError> {
        if self.released {
            return Ok(());
        }
        self.upload_meshes(frame.meshes);

        let output = self.surface.get_current_texture().map_err(surface_error)?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.normal_pipeline.update_global_uniforms(
            &self.queue,
            &GlobalUniforms::new(frame.projection, frame.view),
        );

        let mut visible = Vec::new();
        if frame.anchor_visible {
            for node in frame.meshes {
                let Some(mesh) = self.meshes.get(&node.id) else {
                    continue;
                };
                let model = node_transform(frame.anchor, node);
                let uniforms = InstanceUniforms::new(model, frame.view * model);
                self.queue
                    .write_buffer(&mesh.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
                visible.push(mesh);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.background.draw(&mut pass);

            pass.set_pipeline(&self.normal_pipeline.pipeline);
            pass.set_bind_group(0, &self.normal_pipeline.global_bind_group, &[]);
            for mesh in visible {
                pass.set_bind_group(1, &mesh.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.draw(0..mesh.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for (_, mesh) in self.meshes.drain() {
            mesh.vertex_buffer.destroy();
            mesh.uniform_buffer.destroy();
        }
        self.background.clear();
        self.depth_texture.destroy();
        tracing::info!("GPU resources released");
    }
}

fn create_depth_texture(device: &Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn surface_error(error: wgpu::SurfaceError) -> SurfaceError {
    match error {
        wgpu::SurfaceError::Lost => SurfaceError::Lost,
        wgpu::SurfaceError::Outdated => SurfaceError::Outdated,
        wgpu::SurfaceError::OutOfMemory => SurfaceError::OutOfMemory,
        other => SurfaceError::Other(other.to_string()),
    }
}

/// Camera-space transform of a node under `anchor`.
pub fn node_transform(anchor: Mat4, node: &MeshNode) -> Mat4 {
    anchor * node.local
}

#[cfg(test)]
mod tests {
    use super::*;
    use poseview_core::MeshData;

    #[test]
    fn surface_errors_map_to_core() {
        assert_eq!(surface_error(wgpu::SurfaceError::Lost), SurfaceError::Lost);
        assert_eq!(surface_error(wgpu::SurfaceError::Outdated), SurfaceError::Outdated);
        assert!(matches!(
            surface_error(wgpu::SurfaceError::Timeout),
            SurfaceError::Other(_)
        ));
    }

    #[test]
    fn node_transform_applies_local_after_anchor() {
        let node = MeshNode {
            id: MeshId(0),
            mesh: MeshData::default(),
            local: Mat4::from_scale(glam::Vec3::splat(2.0)),
            frustum_culled: false,
        };
        let anchor = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -1.0));
        let p = node_transform(anchor, &node).transform_point3(glam::Vec3::X);
        assert_eq!(p, glam::Vec3::new(2.0, 0.0, -1.0));
    }
}
