//! GPU-resident sphere physics.
//!
//! A four-stage compute pipeline advances the simulation one sub-step at
//! a time: grid assign, bitonic sort over cell indices, cell-range
//! build, then contact integration. `GpuSimulation` ties the buffers,
//! pipelines and scheduler together; `cpu` holds the sequential mirror
//! used to verify the kernels.

pub mod buffers;
pub mod config;
pub mod cpu;
pub mod error;
pub mod instance;
pub mod pipelines;
pub mod readback;
pub mod step;

pub use config::{ConfigError, SimConfig};
pub use error::SimError;
pub use instance::{Instance, SphereState};

/// Contact stiffness of the penalty spring.
pub const STIFFNESS: f32 = 1000.0;
/// Gravitational acceleration.
pub const GRAVITY: f32 = 9.8;
/// Cubic air drag coefficient.
pub const AIR_RESISTANCE: f32 = 0.01;
/// Advisory restitution; unused by the sign-clamp wall rule.
pub const RESTITUTION: f32 = 0.85;

/// The GPU simulation core: five buffers, five kernels, one scheduler.
pub struct GpuSimulation {
    pub config: SimConfig,
    pub buffers: buffers::SimulationBuffers,
    pipelines: pipelines::SimPipelines,
}

impl GpuSimulation {
    /// Validate the config, allocate the GPU state and upload the
    /// initial instance set.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: SimConfig,
        instances: &[Instance],
    ) -> Result<Self, SimError> {
        config.validate()?;
        let buffers = buffers::SimulationBuffers::new(device, &config)?;
        let pipelines = pipelines::SimPipelines::new(device, &buffers);
        buffers.write_params(queue, &config);
        buffers.upload_instances(queue, instances);
        log::info!(
            "simulation ready: {} spheres (padded to {}), {}^3 cells",
            buffers.instance_count,
            buffers.padded_len,
            config.grid_count(),
        );
        Ok(Self {
            config,
            buffers,
            pipelines,
        })
    }

    /// Advance one sub-step.
    pub fn sub_step(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        step::run_sub_step(device, queue, &self.buffers, &self.pipelines);
    }

    /// Update the sub-step duration. The only parameter that may change
    /// between sub-steps; boundary and grid size are fixed at init.
    pub fn set_time_step(&mut self, queue: &wgpu::Queue, time_step: f32) {
        self.config.time_step = time_step;
        self.buffers.write_params(queue, &self.config);
    }

    /// Replace the whole instance set.
    pub fn upload_instances(&self, queue: &wgpu::Queue, instances: &[Instance]) {
        self.buffers.upload_instances(queue, instances);
    }

    /// Block on a read of the results buffer (state per stable id).
    pub fn read_back_results(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<SphereState>, SimError> {
        readback::read_results(device, queue, &self.buffers)
    }

    /// Block on a read of the sorted instance buffer.
    pub fn read_back_instances(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<instance::InstanceRaw>, SimError> {
        readback::read_instances(device, queue, &self.buffers)
    }

    /// Overwrite one sorted slot with a freshly seeded instance.
    pub fn reseed_slot(&self, queue: &wgpu::Queue, slot: u32, instance: &Instance) {
        self.buffers.write_instance(queue, slot, &instance.to_raw());
    }

    /// The quiescent instance buffer handed to the rendering
    /// collaborator between frames (radius at byte 4, position at 16).
    pub fn instance_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.instances
    }

    pub fn instance_count(&self) -> u32 {
        self.buffers.instance_count
    }
}
