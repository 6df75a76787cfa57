//! Simulation configuration.
//!
//! All values are fixed at init except `time_step`, which may be updated
//! between sub-steps. `boundary` and `grid_size` cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::instance::{grid_count, total_cells};

/// Startup configuration for the simulation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of spheres. Padded internally to a power of two for the sort.
    pub instance_count: u32,

    /// Sphere radius (single global radius; unit density, m = r^3).
    pub radius: f32,

    /// Half-extent of the cubic container.
    pub boundary: f32,

    /// Side length of one grid cell. Must be at least 2 * radius so the
    /// 27-cell neighbor sweep is sound.
    pub grid_size: f32,

    /// Duration of one physics sub-step.
    pub time_step: f32,

    /// Sub-steps advanced per displayed frame.
    pub sub_steps: u32,

    /// Seed for the initial instance layout.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            instance_count: 4096,
            radius: 0.5,
            boundary: 10.0,
            grid_size: 1.0,
            time_step: 1.0 / 240.0,
            sub_steps: 4,
            seed: 42,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid cell size {grid_size} is below twice the sphere radius {radius}; the 27-cell neighbor sweep would miss contacts")]
    GridCellTooSmall { grid_size: f32, radius: f32 },
    #[error("boundary half-extent must be positive, got {0}")]
    NonPositiveBoundary(f32),
    #[error("time step must be positive, got {0}")]
    NonPositiveTimeStep(f32),
    #[error("instance count must be nonzero")]
    NoInstances,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl SimConfig {
    /// Check the init-time invariants. The only reject points of the
    /// pipeline; stages cannot fail at runtime under valid inputs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boundary <= 0.0 {
            return Err(ConfigError::NonPositiveBoundary(self.boundary));
        }
        if self.grid_size < 2.0 * self.radius {
            return Err(ConfigError::GridCellTooSmall {
                grid_size: self.grid_size,
                radius: self.radius,
            });
        }
        if self.time_step <= 0.0 {
            return Err(ConfigError::NonPositiveTimeStep(self.time_step));
        }
        if self.instance_count == 0 {
            return Err(ConfigError::NoInstances);
        }
        Ok(())
    }

    /// Cells per axis for this configuration.
    pub fn grid_count(&self) -> u32 {
        grid_count(self.boundary, self.grid_size)
    }

    /// Cell table length for this configuration.
    pub fn total_cells(&self) -> u64 {
        total_cells(self.boundary, self.grid_size)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&contents)?)
    }

    /// Load a RON config if the file exists, falling back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                config
            }
            Err(err) => {
                log::warn!("failed to load {}: {err}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_count(), 20);
    }

    #[test]
    fn undersized_grid_cells_are_rejected() {
        let config = SimConfig {
            grid_size: 0.3,
            radius: 0.2,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridCellTooSmall { .. })
        ));
    }

    #[test]
    fn non_positive_boundary_is_rejected() {
        let config = SimConfig {
            boundary: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveBoundary(_))
        ));
    }

    #[test]
    fn config_round_trips_through_ron() {
        let config = SimConfig {
            instance_count: 512,
            seed: 7,
            ..SimConfig::default()
        };
        let text = ron::to_string(&config).unwrap();
        let parsed: SimConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
