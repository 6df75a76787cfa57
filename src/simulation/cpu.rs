//! CPU reference pipeline.
//!
//! A sequential mirror of the four GPU stages, operating on the same
//! padded array image the GPU sees. It shares the grid helpers and the
//! (k, j) sort schedule with the GPU path, and reproduces the kernel
//! arithmetic step for step, which makes it the verification harness
//! for the pipeline invariants. Comparator pairs within one bitonic
//! pass are disjoint, so applying them in index order here matches the
//! parallel execution exactly.

use glam::Vec3;

use super::config::SimConfig;
use super::instance::{
    cell_coords, flatten_cell, grid_count, padded_len, CellRangeRaw, Instance, SphereState,
    SENTINEL,
};
use super::step::sort_schedule;
use super::{AIR_RESISTANCE, GRAVITY, STIFFNESS};

pub struct CpuSimulation {
    pub config: SimConfig,
    /// Sentinel-padded to a power of two, like the GPU instance buffer.
    pub instances: Vec<Instance>,
    pub cells: Vec<CellRangeRaw>,
    results: Vec<SphereState>,
    real_count: usize,

    /// Material constants; initialized from the globals, overridable for
    /// controlled experiments (e.g. zero-gravity energy checks).
    pub stiffness: f32,
    pub gravity: f32,
    pub air_resistance: f32,
}

impl CpuSimulation {
    pub fn new(config: SimConfig, instances: Vec<Instance>) -> Self {
        let real_count = instances.len();
        let padded = padded_len(real_count as u32) as usize;
        let mut instances = instances;
        instances.resize(
            padded,
            Instance {
                id: SENTINEL,
                radius: 0.0,
                cell_index: SENTINEL,
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
            },
        );

        let total_cells = config.total_cells() as usize;
        Self {
            config,
            instances,
            cells: vec![CellRangeRaw { start: 0, end: 0 }; total_cells],
            results: vec![
                SphereState {
                    position: Vec3::ZERO,
                    velocity: Vec3::ZERO,
                };
                real_count
            ],
            real_count,
            stiffness: STIFFNESS,
            gravity: GRAVITY,
            air_resistance: AIR_RESISTANCE,
        }
    }

    /// Stage 1: recompute every real instance's flattened cell index.
    pub fn assign_cells(&mut self) {
        let count = grid_count(self.config.boundary, self.config.grid_size);
        for inst in &mut self.instances {
            if inst.id == SENTINEL {
                continue;
            }
            let coords = cell_coords(inst.position, self.config.boundary, self.config.grid_size);
            inst.cell_index = flatten_cell(coords, count);
        }
    }

    /// Stage 2: full bitonic sweep over the padded array.
    pub fn sort_by_cell(&mut self) {
        for (k, j) in sort_schedule(self.instances.len() as u32) {
            self.bitonic_pass(k, j);
        }
    }

    /// One comparator pass; mirrors the sort kernel.
    fn bitonic_pass(&mut self, k: u32, j: u32) {
        let n = self.instances.len() as u32;
        for i in 0..n {
            let partner = i ^ j;
            if partner <= i || partner >= n {
                continue;
            }
            let ascending = (i & k) == 0;
            let a = self.instances[i as usize].cell_index;
            let b = self.instances[partner as usize].cell_index;
            if (ascending && a > b) || (!ascending && a < b) {
                self.instances.swap(i as usize, partner as usize);
            }
        }
    }

    /// Stage 3: clear and rebuild the cell range table.
    pub fn build_cell_ranges(&mut self) {
        self.cells.fill(CellRangeRaw { start: 0, end: 0 });
        let n = self.instances.len();
        let total = self.cells.len() as u32;
        for i in 0..n {
            let cell = self.instances[i].cell_index;
            if i == 0 {
                if cell < total {
                    self.cells[cell as usize].start = 0;
                }
            } else {
                let prev = self.instances[i - 1].cell_index;
                if cell != prev {
                    if cell < total {
                        self.cells[cell as usize].start = i as u32;
                    }
                    if prev < total {
                        self.cells[prev as usize].end = i as u32;
                    }
                }
            }
            if i == n - 1 && cell < total {
                self.cells[cell as usize].end = n as u32;
            }
        }
    }

    /// Stage 4: contact forces, gravity, walls and drag for one sub-step.
    /// Reads a snapshot of the instance array, as every GPU thread sees
    /// the buffer as written by the cell range builder.
    pub fn integrate(&mut self) {
        let count = grid_count(self.config.boundary, self.config.grid_size) as i32;
        let boundary = self.config.boundary;
        let dt = self.config.time_step;
        let snapshot = self.instances.clone();

        for i in 0..snapshot.len() {
            let inst = snapshot[i];
            if inst.id == SENTINEL {
                continue;
            }

            let coords = cell_coords(inst.position, boundary, self.config.grid_size).as_ivec3();
            let mut force = Vec3::ZERO;
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let nc = coords + glam::IVec3::new(dx, dy, dz);
                        if nc.cmplt(glam::IVec3::ZERO).any()
                            || nc.cmpge(glam::IVec3::splat(count)).any()
                        {
                            continue;
                        }
                        let cell = flatten_cell(nc.as_uvec3(), count as u32);
                        let range = self.cells[cell as usize];
                        for j in range.start..range.end {
                            if j as usize == i {
                                continue;
                            }
                            let other = &snapshot[j as usize];
                            let rel = inst.position - other.position;
                            let dist = rel.length();
                            let overlap = inst.radius + other.radius - dist;
                            if overlap > 0.0 {
                                let normal = if dist > 1e-4 { rel / dist } else { Vec3::X };
                                force += self.stiffness * overlap * normal;
                            }
                        }
                    }
                }
            }

            let mass = inst.radius * inst.radius * inst.radius;
            let accel = force / mass + Vec3::new(0.0, -self.gravity, 0.0);

            let mut velocity = inst.velocity + accel * dt;
            for axis in 0..3 {
                if inst.position[axis] + inst.radius > boundary {
                    velocity[axis] = -velocity[axis].abs();
                }
                if inst.position[axis] - inst.radius < -boundary {
                    velocity[axis] = velocity[axis].abs();
                }
            }

            let position = inst.position + inst.velocity * dt + 0.5 * accel * dt * dt;
            velocity *= 1.0 - self.air_resistance * velocity.length().powi(3) * dt;

            self.results[inst.id as usize] = SphereState { position, velocity };
            self.instances[i].position = position;
            self.instances[i].velocity = velocity;
        }
    }

    /// One full sub-step: Assign, Sort, CellClear + CellBuild, Integrate.
    pub fn sub_step(&mut self) {
        self.assign_cells();
        self.sort_by_cell();
        self.build_cell_ranges();
        self.integrate();
    }

    /// Integration output, indexed by stable id.
    pub fn results(&self) -> &[SphereState] {
        &self.results
    }

    /// Real (non-sentinel) instances, in current sorted order.
    pub fn spheres(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|inst| inst.id != SENTINEL)
    }

    pub fn real_count(&self) -> usize {
        self.real_count
    }

    /// Total kinetic energy of the real instances (unit density).
    pub fn kinetic_energy(&self) -> f32 {
        self.spheres()
            .map(|inst| {
                let mass = inst.radius * inst.radius * inst.radius;
                0.5 * mass * inst.velocity.length_squared()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{HashMap, HashSet};

    fn config(instance_count: u32, radius: f32, grid_size: f32) -> SimConfig {
        SimConfig {
            instance_count,
            radius,
            boundary: 10.0,
            grid_size,
            time_step: 1.0 / 240.0,
            sub_steps: 1,
            seed: 42,
        }
    }

    fn sphere(id: u32, radius: f32, position: Vec3, velocity: Vec3) -> Instance {
        Instance {
            id,
            radius,
            cell_index: 0,
            position,
            velocity,
        }
    }

    #[test]
    fn assign_matches_the_flatten_formula() {
        let cfg = config(100, 0.2, 0.4);
        let mut sim = CpuSimulation::new(cfg.clone(), super::super::instance::seed_instances(&cfg));
        sim.assign_cells();

        let count = cfg.grid_count();
        for inst in sim.spheres() {
            let expected = {
                let g = ((inst.position + Vec3::splat(cfg.boundary)) / cfg.grid_size).floor();
                let g = g.as_uvec3().min(glam::UVec3::splat(count - 1));
                g.x + g.y * count + g.z * count * count
            };
            assert_eq!(inst.cell_index, expected);
        }
    }

    #[test]
    fn bitonic_network_sorts_random_keys() {
        // S4: N = 1024, random cell indices in [0, 100).
        let mut rng = StdRng::seed_from_u64(9);
        let instances: Vec<Instance> = (0..1024)
            .map(|id| {
                let mut inst = sphere(id, 0.2, Vec3::ZERO, Vec3::ZERO);
                inst.cell_index = rng.gen_range(0..100);
                inst
            })
            .collect();
        let keys_before: Vec<u32> = instances.iter().map(|i| i.cell_index).collect();

        let mut sim = CpuSimulation::new(config(1024, 0.2, 0.4), instances);
        sim.sort_by_cell();

        let sorted: Vec<&Instance> = sim.spheres().collect();
        assert!(sorted.windows(2).all(|w| w[0].cell_index <= w[1].cell_index));

        // Permutation of the input: same id set, keys still attached.
        let ids: HashSet<u32> = sorted.iter().map(|i| i.id).collect();
        assert_eq!(ids.len(), 1024);
        for inst in &sorted {
            assert_eq!(inst.cell_index, keys_before[inst.id as usize]);
        }
    }

    #[test]
    fn cell_ranges_concatenate_over_the_real_prefix() {
        // S5: a non-power-of-two count exercises the sentinel tail.
        let cfg = config(1000, 0.2, 0.4);
        let mut sim = CpuSimulation::new(cfg.clone(), super::super::instance::seed_instances(&cfg));
        sim.assign_cells();
        sim.sort_by_cell();
        sim.build_cell_ranges();

        let mut ranges: Vec<CellRangeRaw> = sim
            .cells
            .iter()
            .copied()
            .filter(|r| r.start != r.end)
            .collect();
        ranges.sort_by_key(|r| r.start);

        let mut cursor = 0;
        for range in &ranges {
            assert_eq!(range.start, cursor);
            assert!(range.end > range.start);
            cursor = range.end;
        }
        assert_eq!(cursor, 1000);
    }

    #[test]
    fn cell_table_is_exact() {
        let cfg = config(500, 0.2, 0.4);
        let mut sim = CpuSimulation::new(cfg.clone(), super::super::instance::seed_instances(&cfg));
        sim.assign_cells();
        sim.sort_by_cell();
        sim.build_cell_ranges();

        let mut expected: HashMap<u32, HashSet<u32>> = HashMap::new();
        for inst in sim.spheres() {
            expected.entry(inst.cell_index).or_default().insert(inst.id);
        }

        for (cell, range) in sim.cells.iter().enumerate() {
            match expected.get(&(cell as u32)) {
                Some(ids) => {
                    let got: HashSet<u32> = sim.instances[range.start as usize..range.end as usize]
                        .iter()
                        .map(|i| i.id)
                        .collect();
                    assert_eq!(&got, ids, "cell {cell}");
                }
                None => {
                    assert_eq!(*range, CellRangeRaw { start: 0, end: 0 }, "cell {cell}");
                }
            }
        }
    }

    #[test]
    fn falling_sphere_tracks_free_fall() {
        // S1: one sphere dropped from half height.
        let cfg = config(1, 0.5, 1.0);
        let start = Vec3::new(0.0, 0.5 * cfg.boundary, 0.0);
        let mut sim = CpuSimulation::new(cfg.clone(), vec![sphere(0, 0.5, start, Vec3::ZERO)]);

        for _ in 0..120 {
            sim.sub_step();
        }

        let state = sim.results()[0];
        let elapsed = 120.0 * cfg.time_step;
        let free_fall = 0.5 * GRAVITY * elapsed * elapsed;
        assert!(state.velocity.y < 0.0);
        assert!(
            state.position.y < start.y - free_fall + 0.1,
            "fell to {} (free fall would reach {})",
            state.position.y,
            start.y - free_fall
        );
    }

    #[test]
    fn head_on_pair_reverses_without_gaining_speed() {
        // S2: equal spheres meeting at the origin, no gravity or drag.
        // The contact spring at r = 0.5 needs a finer sub-step than the
        // default to integrate cleanly, which is the documented
        // mitigation for stiffness instability.
        let mut cfg = config(2, 0.5, 1.0);
        cfg.time_step = 1.0 / 2400.0;
        let mut sim = CpuSimulation::new(
            cfg,
            vec![
                sphere(0, 0.5, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
                sphere(1, 0.5, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            ],
        );
        sim.gravity = 0.0;
        sim.air_resistance = 0.0;

        for _ in 0..1400 {
            sim.sub_step();
        }

        let a = sim.results()[0];
        let b = sim.results()[1];
        assert!(a.velocity.x > 0.0, "sphere 0 still moving inward: {:?}", a.velocity);
        assert!(b.velocity.x < 0.0, "sphere 1 still moving inward: {:?}", b.velocity);
        assert!(a.velocity.length() <= 1.0 + 0.1);
        assert!(b.velocity.length() <= 1.0 + 0.1);
    }

    #[test]
    fn packed_lattice_stays_put_with_one_sphere_per_cell() {
        // S3: an 8x8x8 resting lattice, one instance per grid cell.
        let cfg = config(512, 0.3, 1.0);
        let mut instances = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                for z in 0..8 {
                    let position =
                        Vec3::new(x as f32 - 3.5, y as f32 - 3.5, z as f32 - 3.5);
                    instances.push(sphere(instances.len() as u32, 0.3, position, Vec3::ZERO));
                }
            }
        }
        let originals: Vec<Vec3> = instances.iter().map(|i| i.position).collect();

        let mut sim = CpuSimulation::new(cfg.clone(), instances);
        sim.gravity = 0.0;
        sim.sub_step();

        let occupied: Vec<&CellRangeRaw> =
            sim.cells.iter().filter(|r| r.start != r.end).collect();
        assert_eq!(occupied.len(), 512);
        assert!(occupied.iter().all(|r| r.end - r.start == 1));

        let noise = STIFFNESS * cfg.time_step * cfg.time_step;
        for inst in sim.spheres() {
            let moved = (inst.position - originals[inst.id as usize]).length();
            assert!(moved <= noise, "sphere {} moved {moved}", inst.id);
        }
    }

    #[test]
    fn boundary_trap_reverses_the_velocity() {
        // S6: a sphere pressed into the +x face at speed.
        let cfg = config(1, 0.5, 1.0);
        let position = Vec3::new(cfg.boundary - 0.1 * 0.5, 0.0, 0.0);
        let mut sim = CpuSimulation::new(
            cfg,
            vec![sphere(0, 0.5, position, Vec3::new(10.0, 0.0, 0.0))],
        );
        sim.sub_step();
        assert!(sim.results()[0].velocity.x < 0.0);
    }

    #[test]
    fn spheres_stay_contained() {
        let cfg = SimConfig {
            instance_count: 64,
            radius: 0.5,
            boundary: 5.0,
            grid_size: 1.0,
            time_step: 1.0 / 240.0,
            sub_steps: 1,
            seed: 3,
        };
        let mut sim = CpuSimulation::new(cfg.clone(), super::super::instance::seed_instances(&cfg));

        for _ in 0..400 {
            sim.sub_step();
        }

        let eps = 4.0 * STIFFNESS * cfg.time_step * cfg.time_step;
        for inst in sim.spheres() {
            for axis in 0..3 {
                assert!(
                    inst.position[axis].abs() <= cfg.boundary + eps,
                    "sphere {} escaped on axis {axis}: {}",
                    inst.id,
                    inst.position[axis]
                );
            }
        }
    }

    #[test]
    fn instance_count_is_invariant() {
        let cfg = config(300, 0.5, 1.0);
        let mut sim = CpuSimulation::new(cfg.clone(), super::super::instance::seed_instances(&cfg));
        for _ in 0..50 {
            sim.sub_step();
        }
        let ids: HashSet<u32> = sim.spheres().map(|i| i.id).collect();
        assert_eq!(ids.len(), 300);
        assert_eq!(sim.real_count(), 300);
    }

    #[test]
    fn drag_strictly_decreases_kinetic_energy() {
        // Far-apart spheres, no gravity, no contacts: drag is the only
        // force and energy must fall every sub-step.
        let cfg = config(8, 0.2, 0.4);
        let mut rng = StdRng::seed_from_u64(5);
        let instances: Vec<Instance> = (0..8)
            .map(|id| {
                let position = Vec3::new(
                    (id % 2) as f32 * 8.0 - 4.0,
                    ((id / 2) % 2) as f32 * 8.0 - 4.0,
                    ((id / 4) % 2) as f32 * 8.0 - 4.0,
                );
                let velocity = Vec3::new(
                    rng.gen_range(0.5..2.0),
                    rng.gen_range(0.5..2.0),
                    rng.gen_range(0.5..2.0),
                );
                sphere(id, 0.2, position, velocity)
            })
            .collect();

        let mut sim = CpuSimulation::new(cfg, instances);
        sim.gravity = 0.0;

        let mut energy = sim.kinetic_energy();
        for _ in 0..50 {
            sim.sub_step();
            let next = sim.kinetic_energy();
            assert!(next < energy, "energy rose: {energy} -> {next}");
            energy = next;
        }
    }
}
