//! Animated cube grid.
//!
//! Renders an n×n grid of cubes, re-uploading the spun vertex positions
//! through a dynamic vertex buffer every frame. Vertex recomputation, the
//! initial index-buffer upload and command recording all fan out across the
//! worker pool selected with `--num-threads`.

use std::mem::{offset_of, size_of};
use std::rc::Rc;

use clap::Parser;
use cube_app::{Grid, SceneFlags, UniformBufferObject};
use evoke::{
    Attachment, BufferType, Descriptor, Device, DynamicBuffer, Pipeline, RenderPass, Shader,
    ShaderStage, StaticBuffer, Subpass, Vertex, VertexInput, Window,
};

fn main() {
    env_logger::init();
    let flags = SceneFlags::parse();
    if let Err(e) = run(&flags) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(flags: &SceneFlags) -> Result<(), Box<dyn std::error::Error>> {
    let mut window = Window::new(800, 600, "evoke - cubes")?;

    let mut builder = Device::builder(flags.num_threads, 3);
    if flags.enable_validation {
        builder = builder.validation_layers(["VK_LAYER_KHRONOS_validation"]);
    }
    let mut device = builder.create_surface(&window)?;

    let side = (flags.num_cubes as f64).sqrt() as usize;
    let grid_size = 2.0;
    let cube_size = (grid_size / side as f32) * 0.5;
    let grid = Grid::new(grid_size, cube_size, side);
    log::info!(
        "grid ready: {} cubes, {} vertices",
        grid.num_cubes(),
        grid.num_vertices()
    );

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

    let mut ubo = DynamicBuffer::new(
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

    let mut angle = 0.0_f32;
    while !window.should_close() {
        for (_, event) in window.poll_events() {
            if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                window.set_should_close(true);
            }
        }

        angle += 0.01;
        let spun = grid.vertices(angle, device.thread_pool());
        if let Some(vertices) = device.vertex_buffer_mut().and_then(|b| b.as_dynamic_mut()) {
            vertices.update(&spun);
        }

        let extent = device.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        ubo.update(&[UniformBufferObject::spinning(angle, aspect)]);

        device.draw(&mut window)?;
    }

    Ok(())
}
