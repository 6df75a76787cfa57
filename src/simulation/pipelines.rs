//! Compute pipelines for the four simulation stages (five kernels).
//!
//! Every stage source is compiled with `shaders/sim_common.wgsl`
//! prepended, so the data layouts and the cell-flattening helper exist
//! exactly once. All pipelines share one layout over the five resource
//! groups; stages declare only the groups they touch.

use super::buffers::SimulationBuffers;

pub struct SimPipelines {
    pub grid_assign: wgpu::ComputePipeline,
    pub bitonic_sort: wgpu::ComputePipeline,
    pub cell_clear: wgpu::ComputePipeline,
    pub cell_range: wgpu::ComputePipeline,
    pub integrate: wgpu::ComputePipeline,
}

const COMMON: &str = include_str!("../../shaders/sim_common.wgsl");

impl SimPipelines {
    pub fn new(device: &wgpu::Device, buffers: &SimulationBuffers) -> Self {
        let layout_refs: Vec<&wgpu::BindGroupLayout> =
            buffers.bind_group_layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sim Pipeline Layout"),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let grid_assign = Self::create_compute_pipeline(
            device,
            &pipeline_layout,
            include_str!("../../shaders/grid_assign.wgsl"),
            "Grid Assign",
        );
        let bitonic_sort = Self::create_compute_pipeline(
            device,
            &pipeline_layout,
            include_str!("../../shaders/bitonic_sort.wgsl"),
            "Bitonic Sort",
        );
        let cell_clear = Self::create_compute_pipeline(
            device,
            &pipeline_layout,
            include_str!("../../shaders/cell_clear.wgsl"),
            "Cell Clear",
        );
        let cell_range = Self::create_compute_pipeline(
            device,
            &pipeline_layout,
            include_str!("../../shaders/cell_range.wgsl"),
            "Cell Range",
        );
        let integrate = Self::create_compute_pipeline(
            device,
            &pipeline_layout,
            include_str!("../../shaders/integrate.wgsl"),
            "Integrate",
        );

        Self {
            grid_assign,
            bitonic_sort,
            cell_clear,
            cell_range,
            integrate,
        }
    }

    fn create_compute_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        stage_source: &str,
        label: &str,
    ) -> wgpu::ComputePipeline {
        let source = format!("{COMMON}\n{stage_source}");
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}
