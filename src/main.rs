use std::path::Path;
use std::sync::Arc;

use rigid_spheres::scene::Scene;
use rigid_spheres::simulation::{SimConfig, SimError};
use winit::{
    event::*,
    event_loop::{ControlFlow, EventLoop},
};

fn main() {
    env_logger::init();

    let sim_config = SimConfig::load_or_default(Path::new("rigid-spheres.ron"));

    let event_loop = EventLoop::new().unwrap();

    let window_attributes = winit::window::Window::default_attributes()
        .with_title("Rigid Spheres")
        .with_inner_size(winit::dpi::PhysicalSize::new(1600, 900));

    let window = Arc::new(event_loop.create_window(window_attributes).unwrap());

    // Initialize wgpu
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let surface = instance.create_surface(window.clone()).unwrap();

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .expect("no suitable GPU adapter");

    // The five simulation buffers each occupy their own resource group.
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: None,
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits {
            max_bind_groups: 5,
            ..wgpu::Limits::default()
        },
        memory_hints: Default::default(),
        trace: Default::default(),
    }))
    .expect("failed to request GPU device");

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(surface_caps.formats[0]);

    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };

    surface.configure(&device, &config);

    let mut scene = Scene::new(&device, &queue, &config, sim_config.clone())
        .expect("failed to initialize simulation");
    let mut last_render_time = std::time::Instant::now();
    let mut last_title_update = std::time::Instant::now();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, window_id } if window_id == window.id() => {
                    if scene.handle_event(&queue, &event) {
                        return;
                    }
                    match event {
                        WindowEvent::CloseRequested => {
                            log::info!("close requested");
                            elwt.exit();
                        }
                        WindowEvent::Resized(physical_size) => {
                            config.width = physical_size.width.max(1);
                            config.height = physical_size.height.max(1);
                            surface.configure(&device, &config);
                            scene.resize(&device, config.width, config.height);
                        }
                        WindowEvent::RedrawRequested => {
                            let now = std::time::Instant::now();
                            let dt = now.duration_since(last_render_time).as_secs_f32();
                            last_render_time = now;

                            if now.duration_since(last_title_update).as_secs_f32() >= 0.1 {
                                window.set_title(&format!(
                                    "Rigid Spheres - {} spheres - {:.1} FPS",
                                    scene.simulation.instance_count(),
                                    1.0 / dt.max(1e-6)
                                ));
                                last_title_update = now;
                            }

                            match scene.update(&device, &queue, dt) {
                                Ok(()) => {}
                                Err(SimError::DeviceLost) => {
                                    // Fatal for the current GPU state; tear down
                                    // and rebuild the whole scene.
                                    log::error!("device lost; rebuilding scene");
                                    match Scene::new(&device, &queue, &config, sim_config.clone())
                                    {
                                        Ok(rebuilt) => scene = rebuilt,
                                        Err(err) => {
                                            log::error!("rebuild failed: {err}");
                                            elwt.exit();
                                        }
                                    }
                                    return;
                                }
                                Err(err) => {
                                    log::error!("simulation error: {err}");
                                    elwt.exit();
                                    return;
                                }
                            }

                            let output = match surface.get_current_texture() {
                                Ok(output) => output,
                                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                    surface.configure(&device, &config);
                                    return;
                                }
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    log::error!("surface out of memory");
                                    elwt.exit();
                                    return;
                                }
                                Err(err) => {
                                    log::warn!("dropped frame: {err}");
                                    return;
                                }
                            };
                            let view = output
                                .texture
                                .create_view(&wgpu::TextureViewDescriptor::default());

                            scene.render(&device, &queue, &view);

                            output.present();
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .unwrap();
}
