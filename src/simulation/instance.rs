//! GPU data model: raw buffer layouts, grid math and instance seeding.
//!
//! The raw structs must match `shaders/sim_common.wgsl` byte for byte;
//! the size tests below pin the layouts.

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::SimConfig;

/// Id and cell index carried by padding slots so they sort to the tail.
pub const SENTINEL: u32 = u32::MAX;

/// One sphere, host side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    /// Stable identity; survives sorting and addresses the results slot.
    pub id: u32,
    pub radius: f32,
    /// Derived; recomputed by the assign stage every sub-step.
    pub cell_index: u32,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Instance {
    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw {
            id: self.id,
            radius: self.radius,
            cell_index: self.cell_index,
            _pad0: 0,
            position: self.position.to_array(),
            _pad1: 0,
            velocity: self.velocity.to_array(),
            _pad2: 0,
        }
    }

    pub fn from_raw(raw: &InstanceRaw) -> Self {
        Self {
            id: raw.id,
            radius: raw.radius,
            cell_index: raw.cell_index,
            position: Vec3::from_array(raw.position),
            velocity: Vec3::from_array(raw.velocity),
        }
    }
}

/// 48-byte instance record (16-byte aligned 3-vectors).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct InstanceRaw {
    pub id: u32,
    pub radius: f32,
    pub cell_index: u32,
    pub _pad0: u32,
    pub position: [f32; 3],
    pub _pad1: u32,
    pub velocity: [f32; 3],
    pub _pad2: u32,
}

impl InstanceRaw {
    /// Padding record; sorts to the tail and is skipped by every stage.
    pub fn sentinel() -> Self {
        Self {
            id: SENTINEL,
            radius: 0.0,
            cell_index: SENTINEL,
            _pad0: 0,
            position: [0.0; 3],
            _pad1: 0,
            velocity: [0.0; 3],
            _pad2: 0,
        }
    }
}

/// 32-byte integration output, scattered by stable id.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ResultRaw {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub velocity: [f32; 3],
    pub _pad1: f32,
}

/// 16-byte simulation parameter block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ParamsRaw {
    pub time_step: f32,
    pub boundary: f32,
    pub grid_size: f32,
    pub _pad: f32,
}

/// 8-byte bitonic stride pair; rewritten by the host before every sort
/// dispatch. `j` comes first, matching the shader struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SortParamsRaw {
    pub j: u32,
    pub k: u32,
}

/// 8-byte half-open range into the sorted instance array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CellRangeRaw {
    pub start: u32,
    pub end: u32,
}

/// Position and velocity read back for one stable id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereState {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl From<&ResultRaw> for SphereState {
    fn from(raw: &ResultRaw) -> Self {
        Self {
            position: Vec3::from_array(raw.position),
            velocity: Vec3::from_array(raw.velocity),
        }
    }
}

/// Cells per axis. Mirrors `grid_count` in `shaders/sim_common.wgsl`:
/// the cast truncates, so the +0.5 rounds to the nearest integer.
pub fn grid_count(boundary: f32, grid_size: f32) -> u32 {
    (2.0 * boundary / grid_size + 0.5) as u32
}

/// Total cell table length for a cubic grid.
pub fn total_cells(boundary: f32, grid_size: f32) -> u64 {
    (grid_count(boundary, grid_size) as u64).pow(3)
}

/// Grid coordinates of a position. Mirrors the shader helper: the
/// conversion saturates below zero.
pub fn cell_coords(position: Vec3, boundary: f32, grid_size: f32) -> UVec3 {
    let offset = (position + Vec3::splat(boundary)) / grid_size;
    offset.max(Vec3::ZERO).as_uvec3()
}

/// Flattened cell index, clamped per axis like the shader helper.
pub fn flatten_cell(coords: UVec3, count: u32) -> u32 {
    let c = coords.min(UVec3::splat(count - 1));
    c.x + c.y * count + c.z * count * count
}

/// The bitonic network needs a power-of-two array length.
pub fn padded_len(n: u32) -> u32 {
    n.next_power_of_two()
}

/// Raw upload image of an instance set: records in order, sentinel-padded
/// to the next power of two.
pub fn to_padded_raw(instances: &[Instance]) -> Vec<InstanceRaw> {
    let mut raws: Vec<InstanceRaw> = instances.iter().map(Instance::to_raw).collect();
    raws.resize(padded_len(instances.len() as u32) as usize, InstanceRaw::sentinel());
    raws
}

/// Seed the initial instance set: ids 0..n on a jittered lattice inside
/// the cube, spaced so no two spheres start interpenetrating (a deep
/// initial overlap means a penalty impulse far beyond what the sub-step
/// can integrate), with uniform velocities in [-1, 1] per axis.
/// Deterministic for a given seed.
pub fn seed_instances(config: &SimConfig) -> Vec<Instance> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut side = 1u32;
    while side * side * side < config.instance_count {
        side += 1;
    }
    let spacing = 2.0 * config.boundary / side as f32;
    let jitter = 0.45 * (spacing - 2.0 * config.radius).max(0.0);
    let lattice = |c: u32| -config.boundary + (c as f32 + 0.5) * spacing;

    (0..config.instance_count)
        .map(|id| {
            let cell = UVec3::new(id % side, (id / side) % side, id / (side * side));
            Instance {
                id,
                radius: config.radius,
                cell_index: 0,
                position: Vec3::new(
                    lattice(cell.x) + rng.gen_range(-jitter..=jitter),
                    lattice(cell.y) + rng.gen_range(-jitter..=jitter),
                    lattice(cell.z) + rng.gen_range(-jitter..=jitter),
                ),
                velocity: Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ),
            }
        })
        .collect()
}

/// A fresh pose for one instance, used when the host reseeds a sphere
/// the instability scan flagged. Identity and radius are preserved.
pub fn reseed_instance(template: &Instance, config: &SimConfig, salt: u64) -> Instance {
    let mut rng = StdRng::seed_from_u64(config.seed ^ (template.id as u64) ^ salt);
    let extent = config.boundary - template.radius;
    Instance {
        position: Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        ),
        velocity: Vec3::ZERO,
        ..*template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_struct_sizes_match_shader_layouts() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 48);
        assert_eq!(std::mem::size_of::<ResultRaw>(), 32);
        assert_eq!(std::mem::size_of::<ParamsRaw>(), 16);
        assert_eq!(std::mem::size_of::<SortParamsRaw>(), 8);
        assert_eq!(std::mem::size_of::<CellRangeRaw>(), 8);
    }

    #[test]
    fn grid_count_rounds_exact_divisions_exactly() {
        assert_eq!(grid_count(10.0, 1.0), 20);
        assert_eq!(grid_count(10.0, 0.4), 50);
        assert_eq!(grid_count(5.0, 0.5), 20);
        assert_eq!(total_cells(10.0, 1.0), 8000);
    }

    #[test]
    fn cell_coords_saturate_at_the_lower_faces() {
        // A rounding error below -boundary must land in the face cell.
        let coords = cell_coords(Vec3::new(-10.0001, 0.0, 0.0), 10.0, 1.0);
        assert_eq!(coords.x, 0);
    }

    #[test]
    fn flatten_clamps_the_upper_rim() {
        let count = grid_count(10.0, 1.0);
        let rim = cell_coords(Vec3::splat(10.0), 10.0, 1.0);
        let idx = flatten_cell(rim, count);
        assert!(idx < count * count * count);
        assert_eq!(idx, count * count * count - 1);
    }

    #[test]
    fn padding_fills_to_the_next_power_of_two_with_sentinels() {
        let config = SimConfig {
            instance_count: 1000,
            ..SimConfig::default()
        };
        let raws = to_padded_raw(&seed_instances(&config));
        assert_eq!(raws.len(), 1024);
        assert!(raws[1000..].iter().all(|r| r.id == SENTINEL && r.cell_index == SENTINEL));
        assert!(raws[..1000].iter().all(|r| r.id != SENTINEL));
    }

    #[test]
    fn seeding_is_deterministic_and_contained() {
        let config = SimConfig::default();
        let a = seed_instances(&config);
        let b = seed_instances(&config);
        assert_eq!(a.len(), config.instance_count as usize);
        assert_eq!(a, b);
        for inst in &a {
            for axis in 0..3 {
                assert!(inst.position[axis].abs() <= config.boundary - config.radius);
            }
        }
    }
}
