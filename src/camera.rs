//! First-person camera.
//!
//! Yaw 0 looks down -z; positive pitch looks up. Movement uses the look
//! direction projected onto the ground plane, so looking up or down never
//! changes walking speed.

use std::f32::consts::FRAC_PI_2;

use glam::Vec3;
use serde::Serialize;

/// Keeps the view from flipping over the poles.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Camera pose handed to the renderer each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstPersonCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl FirstPersonCamera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn look_direction(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    /// Forward and right vectors on the ground plane, both unit length.
    pub fn ground_basis(&self) -> (Vec3, Vec3) {
        let look = self.look_direction();
        let forward = Vec3::new(look.x, 0.0, look.z)
            .try_normalize()
            .unwrap_or_else(|| {
                // Looking straight up or down: fall back to yaw alone
                let (sy, cy) = self.yaw.sin_cos();
                Vec3::new(-sy, 0.0, -cy)
            });
        let right = forward.cross(Vec3::Y).normalize();
        (forward, right)
    }

    pub fn apply_mouse_look(&mut self, dx: f64, dy: f64, sensitivity: f32) {
        self.yaw -= dx as f32 * sensitivity;
        self.pitch = (self.pitch - dy as f32 * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Place the eye `eye_height` above the tracked body.
    pub fn follow(&mut self, body_position: Vec3, eye_height: f32) {
        self.position = body_position + Vec3::Y * eye_height;
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            direction: self.look_direction(),
        }
    }
}
