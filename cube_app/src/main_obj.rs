//! Textured OBJ model viewer.

use std::mem::{offset_of, size_of};
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use cube_app::flags::parse_num_threads;
use cube_app::UniformBufferObject;
use evoke::{
    load_obj, Attachment, BufferType, Descriptor, Device, DynamicBuffer, Pipeline, RenderPass,
    Shader, ShaderStage, StaticBuffer, Subpass, Vertex, VertexInput, Window,
};

#[derive(Parser, Debug)]
struct ObjFlags {
    /// OBJ model to load.
    #[arg(long, default_value = "models/viking_room.obj")]
    model: PathBuf,

    /// Texture image for the model.
    #[arg(long, default_value = "textures/viking_room.png")]
    texture: PathBuf,

    /// Worker threads for upload and command recording (1-4).
    #[arg(long = "num-threads", default_value_t = 1, value_parser = parse_num_threads)]
    num_threads: usize,

    /// Enable the Khronos validation layer.
    #[arg(long = "enable-validation")]
    enable_validation: bool,
}

fn main() {
    env_logger::init();
    let flags = ObjFlags::parse();
    if let Err(e) = run(&flags) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(flags: &ObjFlags) -> Result<(), Box<dyn std::error::Error>> {
    let mut window = Window::new(800, 600, "evoke - obj viewer")?;

    let mut builder = Device::builder(flags.num_threads, 3);
    if flags.enable_validation {
        builder = builder.validation_layers(["VK_LAYER_KHRONOS_validation"]);
    }
    let mut device = builder.create_surface(&window)?;

    let (vertices, indices) = load_obj(&flags.model)?;
    log::info!(
        "loaded {}: {} vertices, {} indices",
        flags.model.display(),
        vertices.len(),
        indices.len()
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

    let texture = evoke::Texture::new(&device, &flags.texture)?;

    let mut ubo = DynamicBuffer::new(
        &device,
        size_of::<UniformBufferObject>() as u64,
        BufferType::Uniform,
    )?;
    let mut descriptor = Descriptor::new(&device);
    descriptor.add_uniform_buffer(0, &ubo, ShaderStage::Vertex);
    descriptor.add_texture_sampler(1, &texture, ShaderStage::Fragment);

    let mut vertex_input = VertexInput::new(size_of::<Vertex>() as u32);
    vertex_input.set_attribute_vec3(0, offset_of!(Vertex, pos) as u32);
    vertex_input.set_attribute_vec2(1, offset_of!(Vertex, tex_coord) as u32);

    let index_buffer = StaticBuffer::new(&device, &indices, BufferType::Index)?;
    let vertex_buffer = StaticBuffer::new(&device, &vertices, BufferType::Vertex)?;

    let shaders = vec![
        Shader::new(&device, "shaders/obj_vert.spv", ShaderStage::Vertex)?,
        Shader::new(&device, "shaders/obj_frag.spv", ShaderStage::Fragment)?,
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

        angle += 0.005;
        let extent = device.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        ubo.update(&[UniformBufferObject::spinning(angle, aspect)]);

        device.draw(&mut window)?;
    }

    Ok(())
}
