//! Renders a lit triangle mesh into a texture without a window.
//!
//! Exercises the full path: a render-to-texture target, position/normal
//! attributes resolved through the material's program, and the wgpu backend
//! turning the resulting GL-style state into a pipeline and a draw.

use std::rc::Rc;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use ves_render::api::{GpuApi, TextureFormat, WgpuApi};
use ves_render::device::{Gpu, GpuInit};
use ves_render::logging::{LoggingConfig, init_logging};
use ves_render::{
    Mapper, Material, NormalVertexAttribute, PositionVertexAttribute, RenderState,
    RenderTarget, RenderToTexture, ShaderProgram, Texture, TriangleData,
};

const SIZE: u32 = 256;

fn pyramid() -> TriangleData {
    let mut data = TriangleData::from_positions(
        &[
            [-0.6, -0.6, 0.2],
            [0.6, -0.6, 0.2],
            [0.6, 0.6, 0.2],
            [-0.6, 0.6, 0.2],
            [0.0, 0.0, -0.4],
        ],
        vec![[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]],
    );
    data.compute_normals();
    data
}

fn create_pipeline(gl: &WgpuApi) -> Result<wgpu::RenderPipeline> {
    let device = gl.device();
    let formats = gl.target_formats()?;
    let color = formats.color.context("target has no color format")?;
    let layouts = gl.vertex_layouts();
    let buffers: Vec<_> = layouts.iter().map(|l| l.as_wgpu()).collect();

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("ves lit shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/lit.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("ves lit pipeline layout"),
        bind_group_layouts: &[],
        immediate_size: 0,
    });

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("ves lit pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: formats.depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    }))
}

fn run() -> Result<()> {
    let gpu = pollster::block_on(Gpu::headless(GpuInit::default()))?;
    let mut gl = gpu.api();

    let program = ShaderProgram::new("lit")
        .with_attribute(PositionVertexAttribute::DEFAULT_NAME, 0)
        .with_attribute(NormalVertexAttribute::DEFAULT_NAME, 1);
    let mut material = Material::with_shader(Rc::new(program));
    material.add_vertex_attribute(Box::new(PositionVertexAttribute::new()));
    material.add_vertex_attribute(Box::new(NormalVertexAttribute::new()));
    let mapper = Mapper::new(Rc::new(pyramid()));
    let state = RenderState::new(&material, &mapper);

    let texture = Texture::create(&mut gl, SIZE, SIZE, TextureFormat::Rgba8Unorm)?;
    let mut target = RenderToTexture::new();
    target.set_texture(Rc::clone(&texture));

    // Second frame exercises the resize path: the depth buffer is rebuilt.
    for (frame, size) in [SIZE, SIZE * 2].into_iter().enumerate() {
        target.resize(&mut gl, size, size)?;
        target.render(&mut gl, &state)?;

        state.update_vertex_attributes();
        state.setup_vertex_attributes(&mut gl)?;
        state.activate_vertex_attributes(&mut gl)?;

        let pipeline = create_pipeline(&gl)?;
        let layouts = gl.vertex_layouts();
        let indices = mapper.data().indices();
        let index_buffer = gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ves index buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let mut encoder = gpu.create_encoder("ves offscreen encoder");
        {
            let mut pass = gl.begin_render_pass(&mut encoder, Some(wgpu::Color::BLACK))?;
            pass.set_pipeline(&pipeline);
            gl.set_vertex_buffers(&mut pass, &layouts);
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..indices.len() as u32, 0, 0..1);
        }
        gpu.submit(encoder);

        log::info!(
            "frame {frame}: {} vertices into {}x{} texture {}",
            gl.drawable_vertex_count(),
            texture.width(),
            texture.height(),
            texture.handle()
        );
        state.deactivate_vertex_attributes(&mut gl)?;
    }

    target.release(&mut gl)?;
    texture.release(&mut gl)?;
    gl.bind_framebuffer(None)?;
    Ok(())
}

fn main() {
    init_logging(LoggingConfig::default());

    if let Err(err) = run() {
        log::error!("offscreen render failed: {err:#}");
        std::process::exit(1);
    }
}
