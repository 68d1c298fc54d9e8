//! Benchmark harness.
//!
//! Rebuilds the cube-grid scene for every thread count from 1 to 4,
//! renders a fixed number of frames per setup, and appends one CSV row per
//! frame with startup, per-frame and vertex-update timings.

use std::mem::{offset_of, size_of};
use std::rc::Rc;

use clap::Parser;
use cube_app::{Bench, BenchFlags, Grid, UniformBufferObject};
use evoke::{
    Attachment, BufferType, Descriptor, Device, DynamicBuffer, Pipeline, RenderPass, Shader,
    ShaderStage, StaticBuffer, Subpass, Vertex, VertexInput, Window,
};

const NUM_SETUPS: usize = 10;

fn main() {
    env_logger::init();
    let flags = BenchFlags::parse();
    if let Err(e) = run(&flags) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(flags: &BenchFlags) -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = Bench::open(&flags.file, flags.overwrite)?;
    let mut window = Window::new(800, 600, "evoke - bench")?;

    for num_threads in 1..=4 {
        bench.num_threads(num_threads);
        for _ in 0..NUM_SETUPS {
            let startup = Bench::start();
            let mut scene = CubeScene::build(&window, num_threads, flags.scene.num_cubes)?;
            bench.startup_time(startup);
            bench.num_cubes(scene.grid.num_cubes());
            bench.num_vertices(scene.grid.num_vertices());

            for _ in 0..flags.num_frames {
                window.poll_events();

                let update = Bench::start();
                scene.update_vertices();
                bench.update_vbo_time(update);

                let frame = Bench::start();
                scene.draw(&mut window)?;
                bench.frame_time(frame);

                bench.record()?;
            }
        }
        log::info!("finished setups for {num_threads} thread(s)");
    }

    Ok(())
}

/// The cubes scene, rebuilt from scratch for every benchmarked setup.
struct CubeScene {
    device: Device,
    grid: Grid,
    ubo: DynamicBuffer,
    angle: f32,
}

impl CubeScene {
    fn build(
        window: &Window,
        num_threads: usize,
        num_cubes: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut device = Device::builder(num_threads, 3).create_surface(window)?;

        let side = (num_cubes as f64).sqrt() as usize;
        let grid_size = 2.0;
        let cube_size = (grid_size / side as f32) * 0.5;
        let grid = Grid::new(grid_size, cube_size, side);

        let framebuffer = Rc::new(Attachment::framebuffer(0));
        let depth = Rc::new(Attachment::depth(&device, 1)?);
        let subpass = Subpass::new(
            0,
            &[],
            vec![Rc::clone(&framebuffer)],
            vec![Rc::clone(&depth)],
            Vec::new(),
        );
        let render_pass = Rc::new(RenderPass::new(
            &device,
            vec![framebuffer, depth],
            vec![subpass],
        )?);

        let ubo = DynamicBuffer::new(
            &device,
            size_of::<UniformBufferObject>() as u64,
            BufferType::Uniform,
        )?;
        let mut descriptor = Descriptor::new(&device);
        descriptor.add_uniform_buffer(0, &ubo, ShaderStage::Vertex);

        let mut vertex_input = VertexInput::new(size_of::<Vertex>() as u32);
        vertex_input.set_attribute_vec3(0, offset_of!(Vertex, pos) as u32);
        vertex_input.set_attribute_vec3(1, offset_of!(Vertex, color) as u32);

        let index_buffer = StaticBuffer::new(&device, &grid.indices(), BufferType::Index)?;
        let vertex_buffer = DynamicBuffer::with_data(
            &device,
            &grid.vertices(0.0, device.thread_pool()),
            BufferType::Vertex,
        )?;

        let shaders = vec![
            Shader::new(&device, "shaders/cubes_vert.spv", ShaderStage::Vertex)?,
            Shader::new(&device, "shaders/cubes_frag.spv", ShaderStage::Fragment)?,
        ];
        let pipeline = Pipeline::new(
            &device,
            0,
            Some(descriptor),
            vertex_input,
            render_pass,
            shaders,
        )?;

        device.finalize(index_buffer, vertex_buffer, vec![pipeline])?;

        Ok(Self {
            device,
            grid,
            ubo,
            angle: 0.0,
        })
    }

    /// The timed vertex update: recompute the spun grid across the pool and
    /// rewrite the dynamic vertex buffer.
    fn update_vertices(&mut self) {
        self.angle += 0.01;
        let spun = self.grid.vertices(self.angle, self.device.thread_pool());
        if let Some(vertices) = self
            .device
            .vertex_buffer_mut()
            .and_then(|b| b.as_dynamic_mut())
        {
            vertices.update(&spun);
        }
    }

    fn draw(&mut self, window: &mut Window) -> Result<(), Box<dyn std::error::Error>> {
        let extent = self.device.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        self.ubo
            .update(&[UniformBufferObject::spinning(self.angle, aspect)]);
        self.device.draw(window)?;
        Ok(())
    }
}
