//! Scene orchestration: simulation stepping, camera and rendering.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::rendering::{OrbitCamera, SphereRenderer};
use crate::simulation::instance::{reseed_instance, seed_instances, Instance};
use crate::simulation::readback::scan_non_finite;
use crate::simulation::{GpuSimulation, SimConfig, SimError};

/// Frames between instability scans of the instance buffer. The scan is
/// a blocking read-back, so it runs sparsely.
const INSTABILITY_SCAN_INTERVAL: u64 = 300;

pub struct Scene {
    pub simulation: GpuSimulation,
    pub renderer: SphereRenderer,
    pub camera: OrbitCamera,
    pub paused: bool,
    time_accumulator: f32,
    frame_index: u64,
    reseed_counter: u64,
}

impl Scene {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_config: &wgpu::SurfaceConfiguration,
        sim_config: SimConfig,
    ) -> Result<Self, SimError> {
        let instances = seed_instances(&sim_config);
        let simulation = GpuSimulation::new(device, queue, sim_config, &instances)?;
        let renderer = SphereRenderer::new(device, surface_config);
        let camera = OrbitCamera::new(3.0 * simulation.config.boundary);

        Ok(Self {
            simulation,
            renderer,
            camera,
            paused: false,
            time_accumulator: 0.0,
            frame_index: 0,
            reseed_counter: 0,
        })
    }

    /// Feed a window event; returns true if the scene consumed it.
    pub fn handle_event(&mut self, queue: &wgpu::Queue, event: &WindowEvent) -> bool {
        if let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state: ElementState::Pressed,
                    ..
                },
            ..
        } = event
        {
            match code {
                KeyCode::Space => {
                    self.paused = !self.paused;
                    log::info!("simulation {}", if self.paused { "paused" } else { "resumed" });
                    return true;
                }
                KeyCode::KeyR => {
                    self.reseed(queue);
                    return true;
                }
                _ => {}
            }
        }
        self.camera.handle_event(event)
    }

    /// Re-scatter the whole instance set with a fresh layout.
    pub fn reseed(&mut self, queue: &wgpu::Queue) {
        self.reseed_counter += 1;
        let mut config = self.simulation.config.clone();
        config.seed = config.seed.wrapping_add(self.reseed_counter);
        let instances = seed_instances(&config);
        self.simulation.upload_instances(queue, &instances);
        log::info!("reseeded {} spheres (seed {})", instances.len(), config.seed);
    }

    /// Advance the simulation by as many sub-steps as the elapsed time
    /// covers, capped at the configured sub-steps per frame. After the
    /// last sub-step the instance buffer is quiescent for rendering.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dt: f32,
    ) -> Result<(), SimError> {
        self.camera.update(dt);
        self.frame_index += 1;

        if !self.paused {
            let config = &self.simulation.config;
            self.time_accumulator += dt.min(0.1);
            let mut steps = 0;
            while self.time_accumulator >= config.time_step && steps < config.sub_steps {
                self.simulation.sub_step(device, queue);
                self.time_accumulator -= config.time_step;
                steps += 1;
            }
            if steps == config.sub_steps {
                // Behind real time; drop the backlog instead of spiraling.
                self.time_accumulator = self.time_accumulator.min(config.time_step);
            }
        }

        if self.frame_index % INSTABILITY_SCAN_INTERVAL == 0 {
            self.scan_for_instability(device, queue)?;
        }
        Ok(())
    }

    /// Instability advisory: the kernels never reject, so a too-stiff
    /// configuration shows up as non-finite state. Log and reseed the
    /// offending spheres in place.
    fn scan_for_instability(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<(), SimError> {
        let raws = self.simulation.read_back_instances(device, queue)?;
        let broken = scan_non_finite(&raws);
        if broken.is_empty() {
            return Ok(());
        }

        log::warn!(
            "instability: {} sphere(s) went non-finite; reseeding",
            broken.len()
        );
        let mut rng = StdRng::seed_from_u64(self.frame_index);
        for slot in broken {
            let template = Instance::from_raw(&raws[slot as usize]);
            let fresh = reseed_instance(&template, &self.simulation.config, rng.gen());
            self.simulation.reseed_slot(queue, slot, &fresh);
        }
        Ok(())
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.renderer.resize(device, width, height);
    }

    pub fn render(&self, device: &wgpu::Device, queue: &wgpu::Queue, view: &wgpu::TextureView) {
        self.renderer.update_uniforms(queue, &self.camera);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Render Encoder"),
        });
        self.renderer.render(
            &mut encoder,
            view,
            self.simulation.instance_buffer(),
            self.simulation.instance_count(),
        );
        queue.submit(std::iter::once(encoder.finish()));
    }
}
