//! Configuration types for the behavior-art engine.

use serde::{Deserialize, Serialize};

fn default_fixed_dt() -> Option<f32> {
    Some(1.0 / 60.0)
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Number of particle slots allocated up front.
    pub particle_capacity: usize,
    /// Side length of the square noise texture.
    pub noise_resolution: usize,
    /// Number of noise octaves (amplitude halves, frequency doubles).
    pub noise_octaves: u32,
    /// Lattice hash seed for the noise field.
    pub noise_seed: u32,
    /// Radius of the circle carrying the attractors, in scene units.
    pub attractor_radius: f32,
    /// Inverse-square pull strength of a unit-weight attractor.
    pub attractor_strength: f32,
    /// Upper bound on attractors (one per leading symbol).
    pub max_attractors: usize,
    /// Multiplier applied to `spread` when laying out the reseed spiral.
    pub base_radius_scale: f32,
    /// Fixed simulation step. `None` uses the measured frame delta.
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: Option<f32>,
    /// How much of the previous frame survives in the background blend.
    pub feedback_decay: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            particle_capacity: 1_000_000,
            noise_resolution: 512,
            noise_octaves: 6,
            noise_seed: 0,
            attractor_radius: 300.0,
            attractor_strength: 1000.0,
            max_attractors: 10,
            base_radius_scale: 1.0,
            fixed_dt: default_fixed_dt(),
            feedback_decay: 0.96,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidViewport);
        }
        if self.particle_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.noise_resolution == 0 {
            return Err(ConfigError::InvalidNoiseResolution);
        }
        if self.noise_octaves == 0 {
            return Err(ConfigError::InvalidOctaves);
        }
        if !(self.attractor_radius > 0.0) {
            return Err(ConfigError::InvalidAttractorRadius);
        }
        if let Some(dt) = self.fixed_dt {
            if !(dt > 0.0) {
                return Err(ConfigError::InvalidTimeStep);
            }
        }
        if !(0.0..=1.0).contains(&self.feedback_decay) {
            return Err(ConfigError::InvalidFeedbackDecay(self.feedback_decay));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Viewport dimensions (width, height) must be non-zero")]
    InvalidViewport,
    #[error("Particle capacity must be non-zero")]
    InvalidCapacity,
    #[error("Noise resolution must be non-zero")]
    InvalidNoiseResolution,
    #[error("Noise octave count must be non-zero")]
    InvalidOctaves,
    #[error("Attractor radius must be positive")]
    InvalidAttractorRadius,
    #[error("Fixed time step must be positive")]
    InvalidTimeStep,
    #[error("Feedback decay {0} must lie in [0, 1]")]
    InvalidFeedbackDecay(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = EngineConfig {
            particle_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let config = EngineConfig {
            fixed_dt: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeStep)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "width": 64, "height": 32 }"#).unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.particle_capacity, 1_000_000);
        assert_eq!(config.fixed_dt, Some(1.0 / 60.0));
    }
}
