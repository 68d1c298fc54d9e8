//! Two-subpass deferred rendering demo.
//!
//! Subpass 0 draws the cube grid into an intermediate color attachment and
//! the depth-stencil attachment. Subpass 1 composites onto the swapchain
//! image, reading both as input attachments; its stencil equal-test keeps
//! the composite to pixels the geometry pass actually covered.

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
    let mut window = Window::new(800, 600, "evoke - multipass")?;

    let mut builder = Device::builder(flags.num_threads, 3);
    if flags.enable_validation {
        builder = builder.validation_layers(["VK_LAYER_KHRONOS_validation"]);
    }
    let mut device = builder.create_surface(&window)?;

    let side = (flags.num_cubes as f64).sqrt() as usize;
    let grid_size = 2.0;
    let cube_size = (grid_size / side as f32) * 0.5;
    let grid = Grid::new(grid_size, cube_size, side);

    let framebuffer = Rc::new(Attachment::framebuffer(0));
    let color = Rc::new(Attachment::color(&device, 1)?);
    let depth = Rc::new(Attachment::depth(&device, 2)?);

    // Pass 0 writes geometry into the intermediate color + depth targets.
    let subpass0 = Subpass::new(
        0,
        &[],
        vec![Rc::clone(&color)],
        vec![Rc::clone(&depth)],
        Vec::new(),
    );
    // Pass 1 composites onto the swapchain image, reading pass 0's output.
    let subpass1 = Subpass::new(
        1,
        &[0],
        vec![Rc::clone(&framebuffer)],
        Vec::new(),
        vec![Rc::clone(&color), Rc::clone(&depth)],
    );

    let render_pass = Rc::new(RenderPass::new(
        &device,
        vec![framebuffer, Rc::clone(&color), Rc::clone(&depth)],
        vec![subpass0, subpass1],
    )?);

    let mut ubo = DynamicBuffer::new(
        &device,
        size_of::<UniformBufferObject>() as u64,
        BufferType::Uniform,
    )?;

    let mut descriptor0 = Descriptor::new(&device);
    descriptor0.add_uniform_buffer(0, &ubo, ShaderStage::Vertex);

    let mut descriptor1 = Descriptor::new(&device);
    descriptor1.add_uniform_buffer(0, &ubo, ShaderStage::Vertex);
    descriptor1.add_input_attachment(1, Rc::clone(&color), ShaderStage::Fragment);
    descriptor1.add_input_attachment(2, Rc::clone(&depth), ShaderStage::Fragment);

    let mut vertex_input0 = VertexInput::new(size_of::<Vertex>() as u32);
    vertex_input0.set_attribute_vec3(0, offset_of!(Vertex, pos) as u32);
    vertex_input0.set_attribute_vec3(1, offset_of!(Vertex, color) as u32);

    let mut vertex_input1 = VertexInput::new(size_of::<Vertex>() as u32);
    vertex_input1.set_attribute_vec3(0, offset_of!(Vertex, pos) as u32);

    let index_buffer = StaticBuffer::new(&device, &grid.indices(), BufferType::Index)?;
    let vertex_buffer = StaticBuffer::new(
        &device,
        &grid.vertices(0.0, device.thread_pool()),
        BufferType::Vertex,
    )?;

    let shaders0 = vec![
        Shader::new(&device, "shaders/multipass_0_vert.spv", ShaderStage::Vertex)?,
        Shader::new(&device, "shaders/multipass_0_frag.spv", ShaderStage::Fragment)?,
    ];
    let pipeline0 = Pipeline::new(
        &device,
        0,
        Some(descriptor0),
        vertex_input0,
        Rc::clone(&render_pass),
        shaders0,
    )?;

    let shaders1 = vec![
        Shader::new(&device, "shaders/multipass_1_vert.spv", ShaderStage::Vertex)?,
        Shader::new(&device, "shaders/multipass_1_frag.spv", ShaderStage::Fragment)?,
    ];
    let pipeline1 = Pipeline::new(
        &device,
        1,
        Some(descriptor1),
        vertex_input1,
        render_pass,
        shaders1,
    )?;

    device.finalize(index_buffer, vertex_buffer, vec![pipeline0, pipeline1])?;

    let mut angle = 0.0_f32;
    while !window.should_close() {
        for (_, event) in window.poll_events() {
            if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                window.set_should_close(true);
            }
        }

        angle += 0.01;
        let extent = device.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        ubo.update(&[UniformBufferObject::spinning(angle, aspect)]);

        device.draw(&mut window)?;
    }

    Ok(())
}
