//! GPU-to-CPU transfers.
//!
//! Read-back is the one mandatory host-side await in the pipeline: copy
//! into a MAP_READ staging buffer, map asynchronously and block on the
//! device poll. Also hosts the NaN scan backing the instability
//! advisory; the core does not self-detect instability.

use std::sync::mpsc;

use super::buffers::SimulationBuffers;
use super::error::SimError;
use super::instance::{InstanceRaw, ResultRaw, SphereState, SENTINEL};

/// Read the results buffer: the last sub-step's `{position, velocity}`
/// per stable id, in id order.
pub fn read_results(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
) -> Result<Vec<SphereState>, SimError> {
    let size = buffers.instance_count as u64 * std::mem::size_of::<ResultRaw>() as u64;
    let bytes = read_buffer(device, queue, &buffers.results, &buffers.results_staging, size)?;
    let raws: &[ResultRaw] = bytemuck::cast_slice(&bytes);
    Ok(raws.iter().map(SphereState::from).collect())
}

/// Read the padded instance buffer in sorted-slot order. Used by the
/// instability scan and by anything that needs slot addresses.
pub fn read_instances(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
) -> Result<Vec<InstanceRaw>, SimError> {
    let size = buffers.padded_len as u64 * std::mem::size_of::<InstanceRaw>() as u64;
    let bytes = read_buffer(device, queue, &buffers.instances, &buffers.instances_staging, size)?;
    Ok(bytemuck::cast_slice(&bytes).to_vec())
}

/// Sorted slots whose instance holds a non-finite position or velocity.
/// The host may log these and reseed the offending instances.
pub fn scan_non_finite(instances: &[InstanceRaw]) -> Vec<u32> {
    instances
        .iter()
        .enumerate()
        .filter(|(_, raw)| {
            raw.id != SENTINEL
                && (raw.position.iter().any(|v| !v.is_finite())
                    || raw.velocity.iter().any(|v| !v.is_finite()))
        })
        .map(|(slot, _)| slot as u32)
        .collect()
}

fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, SimError> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Sim Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..size);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|_| SimError::DeviceLost)?;
    rx.recv()
        .map_err(|_| SimError::DeviceLost)?
        .map_err(|_| SimError::DeviceLost)?;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_scan_flags_only_broken_real_slots() {
        let mut good = InstanceRaw::sentinel();
        good.id = 0;
        good.position = [1.0, 2.0, 3.0];

        let mut broken = good;
        broken.id = 1;
        broken.velocity = [f32::NAN, 0.0, 0.0];

        let mut broken_sentinel = InstanceRaw::sentinel();
        broken_sentinel.position = [f32::INFINITY, 0.0, 0.0];

        let slots = scan_non_finite(&[good, broken, broken_sentinel]);
        assert_eq!(slots, vec![1]);
    }
}
