//! # Rigid Spheres: GPU-Resident Collision Simulation
//!
//! A real-time rigid-sphere simulator. Up to several thousand spheres
//! bounce inside a cubic container under gravity, cubic air drag and
//! elastic penalty contacts, with all physics running on the GPU.
//!
//! ## Architecture Overview
//!
//! ### Simulation Core ([`simulation`])
//!
//! A four-stage compute pipeline advances the world one sub-step at a
//! time:
//!
//! 1. **Grid assign** hashes each sphere into a uniform spatial grid.
//! 2. **Bitonic sort** orders the instance array by cell index across
//!    a host-driven (k, j) stride schedule.
//! 3. **Cell ranges** builds a per-cell `[start, end)` table from the
//!    sorted array, with no atomics.
//! 4. **Integrate** sweeps the 27-cell neighborhood for penalty
//!    contacts, applies gravity, wall reflection and drag, and scatters
//!    the result by stable id.
//!
//! [`simulation::cpu`] mirrors the four stages sequentially and backs
//! the test suite.
//!
//! ### Rendering ([`rendering`])
//!
//! GPU-instanced billboard spheres drawn straight out of the simulation
//! instance buffer, plus an orbit camera. The renderer never reads the
//! simulation back to the CPU.
//!
//! ### Orchestration ([`scene`])
//!
//! [`scene::Scene`] owns the simulation, camera and renderer, runs the
//! fixed-timestep sub-step loop, and handles the instability advisory
//! (NaN scan + reseed).
//!
//! ## Key Design Points
//!
//! - **Stable id vs sorted index**: the sort continually reshuffles the
//!   instance array; consumers address spheres through the results
//!   buffer, scattered by the id assigned at creation.
//! - **No atomics**: every kernel partitions its writes per thread.
//! - **Sequential dispatches**: each compute dispatch is a fence for
//!   the next; the sort loop is the only host logic inside the step.

pub mod rendering;
pub mod scene;
pub mod simulation;
