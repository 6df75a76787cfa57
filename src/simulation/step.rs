//! Sub-step scheduler.
//!
//! Drives one full physics sub-step: Assign, the host-swept bitonic
//! sort loop, then cell clear, cell build and integrate. Kernels are
//! strictly serialized on the queue; each compute dispatch is a fence
//! for the next. The sort loop is the only host logic inside the
//! physics loop: every (k, j) write must be flushed before its dispatch,
//! so each sort pass gets its own submission.

use super::buffers::SimulationBuffers;
use super::pipelines::SimPipelines;

/// Threads per workgroup for the per-instance kernels.
pub const WORKGROUP_SIZE: u32 = 64;
/// Threads per workgroup for the cell-table clear kernel.
pub const CLEAR_WORKGROUP_SIZE: u32 = 256;
/// Fixed clear launch; the kernel strides over larger cell tables.
const CLEAR_DISPATCH: u32 = 64;

/// Host-side scheduler state for one sub-step. `SortLoop` is the only
/// state that re-enters itself; termination is the CPU-side (k, j) sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubStepPhase {
    Idle,
    Assign,
    SortLoop { k: u32, j: u32 },
    CellClear,
    CellBuild,
    Integrate,
}

/// The (k, j) stride schedule of a bitonic network over `n` elements
/// (`n` a power of two): log2(n) * (log2(n) + 1) / 2 pairs.
pub fn sort_schedule(n: u32) -> Vec<(u32, u32)> {
    debug_assert!(n.is_power_of_two());
    let mut pairs = Vec::new();
    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j >= 1 {
            pairs.push((k, j));
            j /= 2;
        }
        k *= 2;
    }
    pairs
}

/// Advance the simulation by one sub-step.
pub fn run_sub_step(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
    pipelines: &SimPipelines,
) {
    let instance_groups = buffers.padded_len.div_ceil(WORKGROUP_SIZE);

    log::trace!("sub-step: {:?}", SubStepPhase::Assign);
    {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sim Assign Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Grid Assign"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.grid_assign);
            bind_all(&mut pass, buffers);
            pass.dispatch_workgroups(instance_groups, 1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    // Sort loop: one submission per pass so the sort-params write lands
    // before the dispatch that reads it.
    for (k, j) in sort_schedule(buffers.padded_len) {
        log::trace!("sub-step: {:?}", SubStepPhase::SortLoop { k, j });
        buffers.write_sort_params(queue, k, j);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sim Sort Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bitonic Sort Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.bitonic_sort);
            bind_all(&mut pass, buffers);
            pass.dispatch_workgroups(instance_groups, 1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    // Cell table rebuild and integration share one pass; dispatches in a
    // pass are ordered.
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Sim Integrate Encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cell Build + Integrate"),
            timestamp_writes: None,
        });

        log::trace!("sub-step: {:?}", SubStepPhase::CellClear);
        pass.set_pipeline(&pipelines.cell_clear);
        bind_all(&mut pass, buffers);
        pass.dispatch_workgroups(
            CLEAR_DISPATCH.min(buffers.total_cells.div_ceil(CLEAR_WORKGROUP_SIZE)),
            1,
            1,
        );

        log::trace!("sub-step: {:?}", SubStepPhase::CellBuild);
        pass.set_pipeline(&pipelines.cell_range);
        pass.dispatch_workgroups(instance_groups, 1, 1);

        log::trace!("sub-step: {:?}", SubStepPhase::Integrate);
        pass.set_pipeline(&pipelines.integrate);
        pass.dispatch_workgroups(instance_groups, 1, 1);
    }
    queue.submit(std::iter::once(encoder.finish()));
    log::trace!("sub-step: {:?}", SubStepPhase::Idle);
}

fn bind_all<'a>(pass: &mut wgpu::ComputePass<'a>, buffers: &'a SimulationBuffers) {
    for (group, bind_group) in buffers.bind_groups.iter().enumerate() {
        pass.set_bind_group(group as u32, bind_group, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_has_log_squared_length() {
        for n in [2u32, 8, 1024, 4096] {
            let log = n.trailing_zeros();
            assert_eq!(sort_schedule(n).len() as u32, log * (log + 1) / 2);
        }
    }

    #[test]
    fn schedule_sweeps_k_outward_and_j_inward() {
        assert_eq!(
            sort_schedule(8),
            vec![(2, 1), (4, 2), (4, 1), (8, 4), (8, 2), (8, 1)]
        );
    }

    #[test]
    fn schedule_strides_are_powers_of_two() {
        for (k, j) in sort_schedule(4096) {
            assert!(k.is_power_of_two() && j.is_power_of_two());
            assert!(j < k && k <= 4096);
        }
    }
}
