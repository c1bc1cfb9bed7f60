//! Keyboard and pointer handling for the first-person controller.
//!
//! The playground is either `Locked` (pointer captured, WASD walks the
//! player, the mouse looks around) or `Unlocked` (the script editor has
//! focus and movement keys are ignored). `E` toggles between the two.
//!
//! Pointer capture is owned by the host window. A refused or lost capture
//! starts a cooldown during which new lock requests are refused, so the
//! controller never spins on a capture the host keeps rejecting.

use std::time::Duration;

use glam::Vec3;
use serde::Serialize;
use winit::keyboard::KeyCode;

use crate::bridge::PhysicsBridge;
use crate::camera::{CameraPose, FirstPersonCamera};
use crate::config::PlaygroundConfig;
use crate::physics::PhysicsWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Locked,
    Unlocked,
}

/// Input delivered by the host window.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key { code: KeyCode, pressed: bool },
    MouseMotion { dx: f64, dy: f64 },
    /// Click on the scene outside the editor panel.
    LockRequested,
    PointerCaptureChanged { captured: bool },
    PointerCaptureError,
    VisibilityChanged { hidden: bool },
}

/// Host-side pointer capture (cursor grab).
pub trait PointerCapture {
    /// Try to capture the pointer. Returns false if the host refused.
    fn request_capture(&mut self) -> bool;
    fn release_capture(&mut self);
}

/// Capture that always succeeds. Used when there is no window.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessCapture;

impl PointerCapture for HeadlessCapture {
    fn request_capture(&mut self) -> bool {
        true
    }

    fn release_capture(&mut self) {}
}

/// Lines shown in the controls overlay while unlocked.
pub fn controls_help() -> &'static [&'static str] {
    &[
        "W / S: move forward / backward",
        "A / D: strafe left / right",
        "Space: jump",
        "Mouse: look around",
        "E: toggle between game mode and editor",
        "Click the scene to capture the mouse",
    ]
}

#[derive(Debug, Default, Clone, Copy)]
struct HeldKeys {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
}

impl HeldKeys {
    /// (strafe, forward) in -1..=1.
    fn axes(&self) -> (f32, f32) {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        (axis(self.right, self.left), axis(self.forward, self.backward))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub jumps: usize,
    pub rejected_jumps: usize,
    pub refused_locks: usize,
}

pub struct PlayerController {
    mode: ControlMode,
    keys: HeldKeys,
    jump_requested: bool,
    jump_held: bool,
    toggle_held: bool,
    camera: FirstPersonCamera,
    capture: Box<dyn PointerCapture>,
    now: Duration,
    retry_at: Option<Duration>,
    last_unlock_position: Option<Vec3>,
    stats: ControllerStats,

    move_speed: f32,
    jump_impulse: f32,
    grounded_threshold: f32,
    eye_height: f32,
    mouse_sensitivity: f32,
    lock_retry: Duration,
}

impl PlayerController {
    /// Starts unlocked, with the editor focused.
    pub fn new(config: &PlaygroundConfig, capture: Box<dyn PointerCapture>) -> Self {
        Self {
            mode: ControlMode::Unlocked,
            keys: HeldKeys::default(),
            jump_requested: false,
            jump_held: false,
            toggle_held: false,
            camera: FirstPersonCamera::new(config.spawn + Vec3::Y * config.eye_height),
            capture,
            now: Duration::ZERO,
            retry_at: None,
            last_unlock_position: None,
            stats: ControllerStats::default(),
            move_speed: config.move_speed,
            jump_impulse: config.jump_impulse,
            grounded_threshold: config.grounded_threshold,
            eye_height: config.eye_height,
            mouse_sensitivity: config.mouse_sensitivity,
            lock_retry: config.lock_retry(),
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn camera(&self) -> &FirstPersonCamera {
        &self.camera
    }

    pub fn camera_pose(&self) -> CameraPose {
        self.camera.pose()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Player position captured at the most recent Locked to Unlocked transition.
    pub fn last_unlock_position(&self) -> Option<Vec3> {
        self.last_unlock_position
    }

    pub fn handle_event<W: PhysicsWorld>(&mut self, event: InputEvent, bridge: &mut PhysicsBridge<W>) {
        match event {
            InputEvent::Key { code: KeyCode::KeyE, pressed } => {
                let fresh = pressed && !self.toggle_held;
                self.toggle_held = pressed;
                if fresh {
                    match self.mode {
                        ControlMode::Unlocked => {
                            self.lock();
                        }
                        ControlMode::Locked => self.unlock(bridge, true),
                    }
                }
            }
            InputEvent::Key { code, pressed } => {
                if self.mode == ControlMode::Locked {
                    self.handle_movement_key(code, pressed);
                }
            }
            InputEvent::MouseMotion { dx, dy } => {
                if self.mode == ControlMode::Locked {
                    self.camera.apply_mouse_look(dx, dy, self.mouse_sensitivity);
                }
            }
            InputEvent::LockRequested => {
                if self.mode == ControlMode::Unlocked {
                    self.lock();
                }
            }
            InputEvent::PointerCaptureChanged { captured } => match (self.mode, captured) {
                (ControlMode::Locked, false) => self.unlock(bridge, false),
                (ControlMode::Unlocked, true) => self.enter_locked(),
                _ => {}
            },
            InputEvent::PointerCaptureError => {
                log::warn!("Pointer capture failed; retrying after {:?}", self.lock_retry);
                self.start_cooldown();
                if self.mode == ControlMode::Locked {
                    self.unlock(bridge, false);
                }
            }
            InputEvent::VisibilityChanged { hidden } => {
                if hidden {
                    self.start_cooldown();
                    if self.mode == ControlMode::Locked {
                        self.unlock(bridge, true);
                    }
                }
            }
        }
    }

    fn handle_movement_key(&mut self, code: KeyCode, pressed: bool) {
        match code {
            KeyCode::KeyW => self.keys.forward = pressed,
            KeyCode::KeyS => self.keys.backward = pressed,
            KeyCode::KeyA => self.keys.left = pressed,
            KeyCode::KeyD => self.keys.right = pressed,
            KeyCode::Space => {
                if pressed && !self.jump_held {
                    self.jump_requested = true;
                }
                self.jump_held = pressed;
            }
            _ => {}
        }
    }

    fn start_cooldown(&mut self) {
        self.retry_at = Some(self.now + self.lock_retry);
    }

    fn lock(&mut self) -> bool {
        if let Some(retry_at) = self.retry_at {
            if self.now < retry_at {
                self.stats.refused_locks += 1;
                log::warn!(
                    "Pointer lock refused; retry in {:?}",
                    retry_at.saturating_sub(self.now)
                );
                return false;
            }
        }

        if !self.capture.request_capture() {
            self.stats.refused_locks += 1;
            log::warn!("Host refused pointer capture");
            self.start_cooldown();
            return false;
        }
        self.enter_locked();
        true
    }

    fn enter_locked(&mut self) {
        self.mode = ControlMode::Locked;
        self.retry_at = None;
        self.clear_held();
        log::info!("Game mode: pointer locked");
    }

    fn unlock<W: PhysicsWorld>(&mut self, bridge: &mut PhysicsBridge<W>, release: bool) {
        self.mode = ControlMode::Unlocked;
        self.clear_held();
        if release {
            self.capture.release_capture();
        }

        match bridge.player_translation() {
            Ok(position) => self.last_unlock_position = Some(position),
            Err(e) => log::warn!("Could not snapshot player on unlock: {}", e),
        }
        // Drop horizontal motion so the player does not keep sliding
        if let Ok(velocity) = bridge.player_velocity() {
            let _ = bridge.set_player_velocity(Vec3::new(0.0, velocity.y, 0.0));
        }
        log::info!("Editor mode: pointer released");
    }

    fn clear_held(&mut self) {
        self.keys.clear();
        self.jump_requested = false;
        self.jump_held = false;
    }

    /// Desired horizontal velocity from the held keys, relative to the camera.
    pub fn movement_vector(&self) -> Vec3 {
        let (strafe, forward) = self.keys.axes();
        if strafe == 0.0 && forward == 0.0 {
            return Vec3::ZERO;
        }
        let (ahead, right) = self.camera.ground_basis();
        (right * strafe + ahead * forward).normalize_or_zero() * self.move_speed
    }

    /// Apply movement and any pending jump. Runs before the physics step.
    pub fn tick<W: PhysicsWorld>(&mut self, now: Duration, bridge: &mut PhysicsBridge<W>) {
        self.now = now;
        if self.mode != ControlMode::Locked {
            self.jump_requested = false;
            return;
        }

        let velocity = match bridge.player_velocity() {
            Ok(v) => v,
            Err(e) => {
                log::debug!("Movement skipped: {}", e);
                return;
            }
        };

        let planar = self.movement_vector();
        if let Err(e) = bridge.set_player_velocity(Vec3::new(planar.x, velocity.y, planar.z)) {
            log::debug!("Movement skipped: {}", e);
            return;
        }

        if std::mem::take(&mut self.jump_requested) {
            if velocity.y.abs() <= self.grounded_threshold {
                if bridge.apply_player_impulse(Vec3::Y * self.jump_impulse).is_ok() {
                    self.stats.jumps += 1;
                }
            } else {
                self.stats.rejected_jumps += 1;
                log::debug!("Jump ignored while airborne (vy = {:.3})", velocity.y);
            }
        }
    }

    /// Keep the eye above the player body. Runs after the physics step.
    pub fn follow_player<W: PhysicsWorld>(&mut self, bridge: &PhysicsBridge<W>) {
        match bridge.player_translation() {
            Ok(position) => self.camera.follow(position, self.eye_height),
            Err(e) => log::debug!("Camera follow skipped: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Collider, SimpleWorld};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeCapture {
        refuse: Rc<Cell<bool>>,
        requests: Rc<Cell<usize>>,
        releases: Rc<Cell<usize>>,
    }

    impl PointerCapture for FakeCapture {
        fn request_capture(&mut self) -> bool {
            self.requests.set(self.requests.get() + 1);
            !self.refuse.get()
        }

        fn release_capture(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn setup() -> (PlayerController, PhysicsBridge<SimpleWorld>, FakeCapture) {
        let config = PlaygroundConfig::default();
        let capture = FakeCapture::default();
        let controller = PlayerController::new(&config, Box::new(capture.clone()));
        let mut bridge = PhysicsBridge::new(SimpleWorld::new(config.gravity), config.block_width);
        bridge.spawn_player(
            Vec3::new(0.0, 1.0, 0.0),
            Collider::Capsule {
                half_height: 0.5,
                radius: 0.5,
            },
        );
        (controller, bridge, capture)
    }

    fn key(code: KeyCode, pressed: bool) -> InputEvent {
        InputEvent::Key { code, pressed }
    }

    fn horizontal(v: Vec3) -> Vec3 {
        Vec3::new(v.x, 0.0, v.z)
    }

    #[test]
    fn test_toggle_locks_and_unlocks() {
        let (mut ctl, mut bridge, capture) = setup();
        assert_eq!(ctl.mode(), ControlMode::Unlocked);

        ctl.handle_event(key(KeyCode::KeyE, true), &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Locked);

        // Auto-repeat does not toggle again
        ctl.handle_event(key(KeyCode::KeyE, true), &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Locked);

        ctl.handle_event(key(KeyCode::KeyE, false), &mut bridge);
        ctl.handle_event(key(KeyCode::KeyE, true), &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);
        assert_eq!(capture.releases.get(), 1);
        assert_eq!(ctl.last_unlock_position(), Some(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_keys_ignored_while_unlocked() {
        let (mut ctl, mut bridge, _) = setup();
        ctl.handle_event(key(KeyCode::KeyW, true), &mut bridge);
        assert_eq!(ctl.movement_vector(), Vec3::ZERO);
        ctl.tick(Duration::from_millis(16), &mut bridge);
        assert_eq!(horizontal(bridge.player_velocity().unwrap()), Vec3::ZERO);
    }

    #[test]
    fn test_walk_forward_at_move_speed() {
        let (mut ctl, mut bridge, _) = setup();
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        ctl.handle_event(key(KeyCode::KeyW, true), &mut bridge);
        ctl.handle_event(key(KeyCode::KeyD, true), &mut bridge);
        ctl.tick(Duration::from_millis(16), &mut bridge);

        let v = bridge.player_velocity().unwrap();
        assert!((horizontal(v).length() - 4.0).abs() < 1e-4, "{:?}", v);
        assert!(v.x > 0.0 && v.z < 0.0);
    }

    #[test]
    fn test_unlock_clears_held_keys() {
        let (mut ctl, mut bridge, _) = setup();
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        ctl.handle_event(key(KeyCode::KeyW, true), &mut bridge);
        ctl.tick(Duration::from_millis(16), &mut bridge);
        assert!(horizontal(bridge.player_velocity().unwrap()).length() > 0.0);

        // Unlock while W is still physically held, then lock again
        ctl.handle_event(key(KeyCode::KeyE, true), &mut bridge);
        ctl.handle_event(key(KeyCode::KeyE, false), &mut bridge);
        assert_eq!(horizontal(bridge.player_velocity().unwrap()), Vec3::ZERO);
        ctl.handle_event(key(KeyCode::KeyE, true), &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Locked);

        ctl.tick(Duration::from_millis(32), &mut bridge);
        assert_eq!(horizontal(bridge.player_velocity().unwrap()), Vec3::ZERO);
    }

    #[test]
    fn test_jump_only_when_grounded() {
        let (mut ctl, mut bridge, _) = setup();
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);

        bridge.set_player_velocity(Vec3::new(0.0, 3.0, 0.0)).unwrap();
        ctl.handle_event(key(KeyCode::Space, true), &mut bridge);
        ctl.tick(Duration::from_millis(16), &mut bridge);
        assert_eq!(ctl.stats().rejected_jumps, 1);
        assert_eq!(ctl.stats().jumps, 0);
        assert_eq!(bridge.player_velocity().unwrap().y, 3.0);

        bridge.set_player_velocity(Vec3::ZERO).unwrap();
        ctl.handle_event(key(KeyCode::Space, false), &mut bridge);
        ctl.handle_event(key(KeyCode::Space, true), &mut bridge);
        ctl.tick(Duration::from_millis(32), &mut bridge);
        assert_eq!(ctl.stats().jumps, 1);
        bridge.step(1.0 / 60.0);
        assert!(bridge.player_velocity().unwrap().y > 4.0);
    }

    #[test]
    fn test_lock_retry_cooldown() {
        let (mut ctl, mut bridge, capture) = setup();
        capture.refuse.set(true);
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);
        assert_eq!(capture.requests.get(), 1);

        // Host would grant now, but the cooldown has not elapsed
        capture.refuse.set(false);
        ctl.tick(Duration::from_millis(500), &mut bridge);
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);
        assert_eq!(capture.requests.get(), 1);

        ctl.tick(Duration::from_millis(1000), &mut bridge);
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Locked);
        assert_eq!(ctl.stats().refused_locks, 2);
    }

    #[test]
    fn test_hidden_session_unlocks() {
        let (mut ctl, mut bridge, _) = setup();
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        ctl.handle_event(InputEvent::VisibilityChanged { hidden: true }, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);

        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);
    }

    #[test]
    fn test_lost_capture_unlocks() {
        let (mut ctl, mut bridge, capture) = setup();
        ctl.handle_event(InputEvent::LockRequested, &mut bridge);
        ctl.handle_event(InputEvent::PointerCaptureChanged { captured: false }, &mut bridge);
        assert_eq!(ctl.mode(), ControlMode::Unlocked);
        assert_eq!(capture.releases.get(), 0);
    }

    #[test]
    fn test_camera_follows_player() {
        let (mut ctl, bridge, _) = setup();
        ctl.follow_player(&bridge);
        assert_eq!(ctl.camera_pose().position, Vec3::new(0.0, 2.5, 0.0));
    }
}
