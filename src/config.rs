//! Tunables for the playground scene, pacing, player and sandbox.
//!
//! Every field has a default, so a JSON config file only needs to name
//! the values it overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use glam::Vec3;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    // Scene
    pub block_count: usize,
    pub slot_spacing: f32, // Distance between adjacent slot centres along x
    pub block_width: f32,  // Footprint of each block on x and z
    pub rest_z: f32,       // z every block returns to after a swap
    pub ground_size: f32,

    // Pacing
    pub settle_delay_ms: u64,
    pub physics_step_hz: f32,

    // Player
    pub move_speed: f32,
    pub jump_impulse: f32,
    pub grounded_threshold: f32, // |vy| below this counts as standing
    pub eye_height: f32,
    pub spawn: Vec3,
    pub mouse_sensitivity: f32,
    pub lock_retry_ms: u64,

    // Physics
    pub gravity: f32,

    // Sandbox limits (0 disables the operation cap)
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_array_size: usize,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            block_count: 8,
            slot_spacing: 1.5,
            block_width: 1.0,
            rest_z: -6.0,
            ground_size: 30.0,
            settle_delay_ms: 50,
            physics_step_hz: 60.0,
            move_speed: 4.0,
            jump_impulse: 5.0,
            grounded_threshold: 0.05,
            eye_height: 1.5,
            spawn: Vec3::new(0.0, 2.0, 0.0),
            mouse_sensitivity: 0.002,
            lock_retry_ms: 1000,
            gravity: 9.81,
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_array_size: 10_000,
        }
    }
}

impl PlaygroundConfig {
    /// Load a config from a JSON file, filling unspecified fields with defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scene cannot be built from.
    pub fn validate(&self) -> Result<()> {
        let floats = [
            ("slot_spacing", self.slot_spacing),
            ("block_width", self.block_width),
            ("rest_z", self.rest_z),
            ("ground_size", self.ground_size),
            ("physics_step_hz", self.physics_step_hz),
            ("move_speed", self.move_speed),
            ("jump_impulse", self.jump_impulse),
            ("grounded_threshold", self.grounded_threshold),
            ("eye_height", self.eye_height),
            ("spawn.x", self.spawn.x),
            ("spawn.y", self.spawn.y),
            ("spawn.z", self.spawn.z),
            ("mouse_sensitivity", self.mouse_sensitivity),
            ("gravity", self.gravity),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                bail!("{} must be finite, got {}", name, value);
            }
        }

        let positive = [
            ("slot_spacing", self.slot_spacing),
            ("block_width", self.block_width),
            ("ground_size", self.ground_size),
            ("physics_step_hz", self.physics_step_hz),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                bail!("{} must be greater than zero, got {}", name, value);
            }
        }
        if self.grounded_threshold < 0.0 {
            bail!("grounded_threshold must not be negative, got {}", self.grounded_threshold);
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }

    /// Fixed physics timestep.
    pub fn physics_step(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.physics_step_hz.max(1.0) as f64)
    }

    /// Fixed physics timestep in seconds.
    pub fn physics_dt(&self) -> f32 {
        self.physics_step().as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PlaygroundConfig::from_json_str(r#"{ "settle_delay_ms": 10, "block_count": 4 }"#)
            .unwrap();
        assert_eq!(config.settle_delay(), Duration::from_millis(10));
        assert_eq!(config.block_count, 4);
        assert_eq!(config.move_speed, 4.0);
        assert_eq!(config.spawn, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_physics_dt() {
        let config = PlaygroundConfig::default();
        assert!((config.physics_dt() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_layout() {
        let err = PlaygroundConfig::from_json_str(r#"{ "slot_spacing": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("slot_spacing"), "{}", err);
        let err = PlaygroundConfig::from_json_str(r#"{ "block_width": -1 }"#).unwrap_err();
        assert!(err.to_string().contains("block_width"), "{}", err);
        assert!(PlaygroundConfig::from_json_str(r#"{ "physics_step_hz": 0 }"#).is_err());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut config = PlaygroundConfig::default();
        config.gravity = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = PlaygroundConfig::default();
        config.spawn.z = f32::INFINITY;
        assert!(config.validate().is_err());

        // Out-of-range literals overflow f32 to infinity
        assert!(PlaygroundConfig::from_json_str(r#"{ "slot_spacing": 1e300 }"#).is_err());
        assert!(PlaygroundConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(PlaygroundConfig::from_json_str("{ not json").is_err());
    }
}
