//! Shader Pipeline - textured full-screen quad
//!
//! Compiles the quad program, owns the GPU objects of a [`RenderTarget`]
//! and replaces the frame texture on every draw.
//!
//! Shader errors are reported in two stages:
//! - compile: WGSL parse + validation (`ShaderCompileFailure`)
//! - link: entry point resolution, stage interface matching and
//!   render pipeline creation (`ShaderLinkFailure`)

use crate::frame::Frame;
use crate::gpu::GpuContext;
use bytemuck::{Pod, Zeroable};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPipeline, Sampler,
    Texture, TextureFormat, TextureView,
};

/// Built-in quad shader
pub const QUAD_SHADER: &str = include_str!("shaders/quad.wgsl");

/// Format of frame textures and the offscreen video layer
pub const LAYER_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Shader compile failure: {0}")]
    ShaderCompileFailure(String),

    #[error("Shader link failure: {0}")]
    ShaderLinkFailure(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Render target disposed")]
    Disposed,
}

/// Shader program description
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    pub label: &'a str,
    pub wgsl: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
}

impl Default for ShaderSource<'static> {
    fn default() -> Self {
        Self {
            label: "Quad Shader",
            wgsl: QUAD_SHADER,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }
}

/// Parse and validate WGSL.
///
/// The diagnostic in the returned error is the compiler's rendered message.
pub fn compile(source: &ShaderSource<'_>) -> Result<naga::Module, PipelineError> {
    let module = naga::front::wgsl::parse_str(source.wgsl)
        .map_err(|e| PipelineError::ShaderCompileFailure(e.emit_to_string(source.wgsl)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|e| PipelineError::ShaderCompileFailure(format!("{}: {:?}", e, e.as_inner())))?;

    Ok(module)
}

/// Resolve entry points and check that every fragment input location is
/// written by the vertex stage.
pub fn link(module: &naga::Module, source: &ShaderSource<'_>) -> Result<(), PipelineError> {
    let vertex = module
        .entry_points
        .iter()
        .find(|ep| ep.name == source.vertex_entry && ep.stage == naga::ShaderStage::Vertex)
        .ok_or_else(|| {
            PipelineError::ShaderLinkFailure(format!(
                "vertex entry point `{}` not found",
                source.vertex_entry
            ))
        })?;

    let fragment = module
        .entry_points
        .iter()
        .find(|ep| ep.name == source.fragment_entry && ep.stage == naga::ShaderStage::Fragment)
        .ok_or_else(|| {
            PipelineError::ShaderLinkFailure(format!(
                "fragment entry point `{}` not found",
                source.fragment_entry
            ))
        })?;

    let mut outputs = BTreeSet::new();
    if let Some(result) = &vertex.function.result {
        collect_locations(module, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut inputs = BTreeSet::new();
    for argument in &fragment.function.arguments {
        collect_locations(module, argument.ty, argument.binding.as_ref(), &mut inputs);
    }

    if let Some(missing) = inputs.difference(&outputs).next() {
        return Err(PipelineError::ShaderLinkFailure(format!(
            "fragment input @location({}) is not written by `{}`",
            missing, source.vertex_entry
        )));
    }

    Ok(())
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

/// Quad vertex: clip-space position + texture coordinate
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Unit quad as a triangle strip, v flipped so row 0 is the top edge
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
];

/// Linked program plus the objects every quad draw needs
pub struct QuadProgram {
    pub pipeline: RenderPipeline,
    pub bind_group_layout: BindGroupLayout,
    pub sampler: Sampler,
    pub vertex_buffer: Buffer,
}

impl QuadProgram {
    /// Compile, link and build a quad program targeting `format`
    pub fn build(
        device: &Device,
        source: &ShaderSource<'_>,
        format: TextureFormat,
        blend: Option<wgpu::BlendState>,
    ) -> Result<Self, PipelineError> {
        let module = compile(source)?;
        link(&module, source)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderCompileFailure(error.to_string()));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Quad Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(source.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(source.vertex_entry),
                buffers: &[QuadVertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(source.fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderLinkFailure(error.to_string()));
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
            vertex_buffer,
        })
    }

    /// Bind a texture view for sampling by this program
    pub fn bind(&self, device: &Device, view: &TextureView, label: &str) -> BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Record the quad draw into an open render pass
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, bind_group: &BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
    }
}

/// A sampled texture together with its bind group
pub struct FrameTexture {
    pub texture: Texture,
    pub bind_group: BindGroup,
    pub width: u32,
    pub height: u32,
}

impl FrameTexture {
    /// Allocate an uninitialized sampled texture of the given size
    pub fn new(device: &Device, program: &QuadProgram, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LAYER_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = program.bind(device, &view, label);

        Self {
            texture,
            bind_group,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Replace the full contents with tightly packed RGBA8 pixels
    pub fn write(&self, queue: &Queue, pixels: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// The rendered video layer of a target, as handed to the compositor
#[derive(Clone, Copy)]
pub struct VideoLayer<'a> {
    /// Unique per render target; stable for its lifetime
    pub id: u64,
    pub view: &'a TextureView,
}

/// GPU-side state of one player: program, vertex buffer, frame texture
/// and the offscreen layer the video is drawn into.
pub struct RenderTarget {
    id: u64,
    program: QuadProgram,
    texture: FrameTexture,
    layer: Texture,
    layer_view: TextureView,
    width: u32,
    height: u32,
    busy: Arc<AtomicBool>,
}

impl RenderTarget {
    /// Layer dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The rendered video layer, for host-side stacking
    pub fn layer(&self) -> VideoLayer<'_> {
        VideoLayer {
            id: self.id,
            view: &self.layer_view,
        }
    }

    /// Whether the last submitted draw is still executing on the GPU
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Size of the frame texture currently allocated
    pub fn texture_dimensions(&self) -> (u32, u32) {
        (self.texture.width, self.texture.height)
    }
}

/// Factory and driver for render targets
pub struct ShaderPipeline {
    device: Arc<Device>,
    queue: Arc<Queue>,
    max_dimension: u32,
}

impl ShaderPipeline {
    pub fn new(gpu: &GpuContext) -> Self {
        Self {
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            max_dimension: gpu.config.max_texture_dimension,
        }
    }

    /// Build the program and allocate the GPU objects for a layer of the
    /// given size. Compile and link failures abort before any texture is
    /// allocated.
    pub fn initialize(
        &self,
        width: u32,
        height: u32,
        source: &ShaderSource<'_>,
    ) -> Result<RenderTarget, PipelineError> {
        info!("Initializing render target ({}x{})", width, height);

        let program = QuadProgram::build(&self.device, source, LAYER_FORMAT, None)?;
        let texture = FrameTexture::new(&self.device, &program, width, height, "Frame Texture");

        let layer = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Layer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LAYER_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let layer_view = layer.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(RenderTarget {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
            program,
            texture,
            layer,
            layer_view,
            width: width.max(1),
            height: height.max(1),
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the texture contents with `frame` and draw it over the layer.
    ///
    /// The texture is only reallocated when the frame size changes.
    pub fn upload_and_draw(&self, target: &mut RenderTarget, frame: &Frame) -> Result<(), PipelineError> {
        let (width, height) = frame.dimensions();
        if width > self.max_dimension || height > self.max_dimension {
            return Err(PipelineError::InvalidFrame(format!(
                "{}x{} exceeds maximum texture dimension {}",
                width, height, self.max_dimension
            )));
        }

        if target.texture.width != width || target.texture.height != height {
            debug!(
                "Reallocating frame texture {}x{} -> {}x{}",
                target.texture.width, target.texture.height, width, height
            );
            target.texture.texture.destroy();
            target.texture = FrameTexture::new(&self.device, &target.program, width, height, "Frame Texture");
        }

        target.texture.write(&self.queue, frame.pixels());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.layer_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            target.program.draw(&mut pass, &target.texture.bind_group);
        }

        target.busy.store(true, Ordering::Release);
        self.queue.submit(std::iter::once(encoder.finish()));

        let busy = target.busy.clone();
        self.queue.on_submitted_work_done(move || {
            busy.store(false, Ordering::Release);
        });

        Ok(())
    }

    /// Release the GPU objects of a target
    pub fn dispose(&self, target: RenderTarget) {
        debug!("Disposing render target ({}x{})", target.width, target.height);
        target.texture.texture.destroy();
        target.layer.destroy();
        target.program.vertex_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shader_compiles_and_links() {
        let source = ShaderSource::default();
        let module = compile(&source).expect("quad shader should compile");
        assert!(link(&module, &source).is_ok());
    }

    #[test]
    fn test_syntax_error_is_compile_failure() {
        let source = ShaderSource {
            wgsl: "@vertex fn vs_main( -> @builtin(position) vec4<f32> {",
            ..ShaderSource::default()
        };

        match compile(&source) {
            Err(PipelineError::ShaderCompileFailure(diagnostic)) => {
                assert!(!diagnostic.trim().is_empty());
            }
            other => panic!("expected compile failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_entry_point_is_link_failure() {
        let source = ShaderSource {
            fragment_entry: "fs_missing",
            ..ShaderSource::default()
        };
        let module = compile(&source).unwrap();

        match link(&module, &source) {
            Err(PipelineError::ShaderLinkFailure(diagnostic)) => {
                assert!(diagnostic.contains("fs_missing"));
            }
            other => panic!("expected link failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unwritten_fragment_input_is_link_failure() {
        let wgsl = r#"
            @vertex
            fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 0.0, 1.0);
            }

            @fragment
            fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> {
                return tint;
            }
        "#;
        let source = ShaderSource {
            wgsl,
            ..ShaderSource::default()
        };
        let module = compile(&source).unwrap();

        let err = link(&module, &source).unwrap_err();
        assert!(err.to_string().contains("@location(3)"));
    }

    #[test]
    fn test_quad_covers_viewport() {
        let xs: Vec<f32> = QUAD_VERTICES.iter().map(|v| v.position[0]).collect();
        let ys: Vec<f32> = QUAD_VERTICES.iter().map(|v| v.position[1]).collect();
        assert!(xs.contains(&-1.0) && xs.contains(&1.0));
        assert!(ys.contains(&-1.0) && ys.contains(&1.0));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_initialize_rejects_broken_shader() {
        let gpu = pollster::block_on(GpuContext::headless()).unwrap();
        let pipeline = ShaderPipeline::new(&gpu);
        let source = ShaderSource {
            wgsl: "fn broken( {",
            ..ShaderSource::default()
        };

        let result = pipeline.initialize(640, 360, &source);
        assert!(matches!(result, Err(PipelineError::ShaderCompileFailure(_))));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_texture_reused_across_frames() {
        let gpu = pollster::block_on(GpuContext::headless()).unwrap();
        let pipeline = ShaderPipeline::new(&gpu);
        let mut target = pipeline.initialize(64, 32, &ShaderSource::default()).unwrap();

        for shade in 0..8u8 {
            let frame = Frame::solid(64, 32, [shade, 0, 0, 255]);
            pipeline.upload_and_draw(&mut target, &frame).unwrap();
        }
        assert_eq!(target.texture_dimensions(), (64, 32));

        let frame = Frame::solid(16, 16, [0, 0, 0, 255]);
        pipeline.upload_and_draw(&mut target, &frame).unwrap();
        assert_eq!(target.texture_dimensions(), (16, 16));

        pipeline.dispose(target);
    }
}
