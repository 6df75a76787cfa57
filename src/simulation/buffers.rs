//! Parameter & buffer manager.
//!
//! Owns the five long-lived GPU buffers and binds each to its own
//! resource group so every stage shader declares only the bindings it
//! needs:
//!
//! | group | contents                          |
//! |-------|-----------------------------------|
//! | 0     | Parameters (storage)              |
//! | 1     | Instance array (storage, vertex)  |
//! | 2     | SortParams (storage)              |
//! | 3     | Cells array (storage)             |
//! | 4     | Results array (storage)           |

use bytemuck::Zeroable;

use super::config::SimConfig;
use super::error::SimError;
use super::instance::{
    padded_len, to_padded_raw, CellRangeRaw, Instance, InstanceRaw, ParamsRaw, ResultRaw,
    SortParamsRaw,
};

pub const PARAMS_GROUP: usize = 0;
pub const INSTANCES_GROUP: usize = 1;
pub const SORT_PARAMS_GROUP: usize = 2;
pub const CELLS_GROUP: usize = 3;
pub const RESULTS_GROUP: usize = 4;

/// The five simulation buffers plus read-back staging.
pub struct SimulationBuffers {
    pub params: wgpu::Buffer,
    pub instances: wgpu::Buffer,
    pub sort_params: wgpu::Buffer,
    pub cells: wgpu::Buffer,
    pub results: wgpu::Buffer,

    pub results_staging: wgpu::Buffer,
    pub instances_staging: wgpu::Buffer,

    pub bind_group_layouts: [wgpu::BindGroupLayout; 5],
    pub bind_groups: [wgpu::BindGroup; 5],

    /// Real instance count; results and read-back are sized to this.
    pub instance_count: u32,
    /// Instance buffer length after power-of-two padding.
    pub padded_len: u32,
    /// Cell table length (grid_count^3).
    pub total_cells: u32,
}

impl SimulationBuffers {
    pub fn new(device: &wgpu::Device, config: &SimConfig) -> Result<Self, SimError> {
        let instance_count = config.instance_count;
        let padded = padded_len(instance_count);
        let total_cells = config.total_cells();

        let instances_size = padded as u64 * std::mem::size_of::<InstanceRaw>() as u64;
        let cells_size = total_cells * std::mem::size_of::<CellRangeRaw>() as u64;
        let results_size = instance_count as u64 * std::mem::size_of::<ResultRaw>() as u64;

        let limit = device.limits().max_storage_buffer_binding_size as u64;
        for (label, size) in [
            ("instances", instances_size),
            ("cells", cells_size),
            ("results", results_size),
        ] {
            if size > limit {
                return Err(SimError::Resource(format!(
                    "{label} buffer needs {size} bytes, device allows {limit}"
                )));
            }
        }

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Params Buffer"),
            size: std::mem::size_of::<ParamsRaw>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Doubles as the renderer's instance-stepped vertex buffer.
        let instances = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Instance Buffer"),
            size: instances_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let sort_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Sort Params Buffer"),
            size: std::mem::size_of::<SortParamsRaw>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cells = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Cell Table Buffer"),
            size: cells_size,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let results = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Results Buffer"),
            size: results_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let results_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Results Staging Buffer"),
            size: results_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let instances_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Instance Staging Buffer"),
            size: instances_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layouts = [
            Self::storage_layout(device, "Sim Params Layout"),
            Self::storage_layout(device, "Sim Instances Layout"),
            Self::storage_layout(device, "Sim Sort Params Layout"),
            Self::storage_layout(device, "Sim Cells Layout"),
            Self::storage_layout(device, "Sim Results Layout"),
        ];

        let buffers = [&params, &instances, &sort_params, &cells, &results];
        let bind_groups = std::array::from_fn(|group| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sim Bind Group"),
                layout: &bind_group_layouts[group],
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers[group].as_entire_binding(),
                }],
            })
        });

        Ok(Self {
            params,
            instances,
            sort_params,
            cells,
            results,
            results_staging,
            instances_staging,
            bind_group_layouts,
            bind_groups,
            instance_count,
            padded_len: padded,
            total_cells: total_cells as u32,
        })
    }

    /// Single read/write storage binding; the shaders narrow the access
    /// where they only read.
    fn storage_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    /// Upload the full instance set (sentinel-padded) and zero the
    /// results so a read-back before the first sub-step is defined.
    pub fn upload_instances(&self, queue: &wgpu::Queue, instances: &[Instance]) {
        debug_assert_eq!(instances.len() as u32, self.instance_count);
        let raws = to_padded_raw(instances);
        queue.write_buffer(&self.instances, 0, bytemuck::cast_slice(&raws));

        let zeroed = vec![ResultRaw::zeroed(); self.instance_count as usize];
        queue.write_buffer(&self.results, 0, bytemuck::cast_slice(&zeroed));
    }

    /// Overwrite a single sorted slot, used when the host reseeds an
    /// instance flagged by the instability scan.
    pub fn write_instance(&self, queue: &wgpu::Queue, slot: u32, raw: &InstanceRaw) {
        debug_assert!(slot < self.padded_len);
        let offset = slot as u64 * std::mem::size_of::<InstanceRaw>() as u64;
        queue.write_buffer(&self.instances, offset, bytemuck::bytes_of(raw));
    }

    pub fn write_params(&self, queue: &wgpu::Queue, config: &SimConfig) {
        let params = ParamsRaw {
            time_step: config.time_step,
            boundary: config.boundary,
            grid_size: config.grid_size,
            _pad: 0.0,
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
    }

    /// Rewrite the sort control ahead of one bitonic dispatch. The caller
    /// must submit the dispatch separately so this write is flushed first.
    pub fn write_sort_params(&self, queue: &wgpu::Queue, k: u32, j: u32) {
        let sort = SortParamsRaw { j, k };
        queue.write_buffer(&self.sort_params, 0, bytemuck::bytes_of(&sort));
    }
}
