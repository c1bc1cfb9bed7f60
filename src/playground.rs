//! Frame loop.
//!
//! One `tick` advances the whole playground by a frame:
//!
//! 1. player input becomes body velocity (and a jump impulse, if allowed)
//! 2. physics catches up in fixed steps
//! 3. the script scheduler resumes whatever run is due
//! 4. the camera follows the player
//! 5. a [`FrameSnapshot`] is produced for the renderer
//!
//! Scripts never block this loop: a suspended run simply is not resumed until
//! its deadline has passed and physics has stepped at least once since its
//! last command.

use std::time::Duration;

use glam::Vec3;
use serde::Serialize;

use crate::block_registry::{BlockRegistry, HeightAssignment, SlotLattice};
use crate::bridge::{BlockInstance, PhysicsBridge};
use crate::camera::CameraPose;
use crate::command_surface::CommandSurface;
use crate::config::PlaygroundConfig;
use crate::error::Result;
use crate::input::{ControlMode, InputEvent, PlayerController, PointerCapture};
use crate::physics::{Collider, PhysicsWorld};
use crate::scheduler::{RunStats, RunStatus, Scheduler};
use crate::script_diagnostics::ScriptDiagnostic;
use crate::scripting::{ScriptLimits, DEFAULT_SCRIPT};

/// Physics steps allowed per tick before the backlog is dropped.
const MAX_STEPS_PER_TICK: u32 = 5;

const PLAYER_HALF_HEIGHT: f32 = 0.5;
const PLAYER_RADIUS: f32 = 0.5;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    /// Seconds since the playground started.
    pub time: f32,
    pub blocks: Vec<BlockInstance>,
    pub camera: CameraPose,
    pub mode: ControlMode,
    /// Controls overlay is visible while the editor has focus.
    pub show_controls: bool,
    pub script_status: RunStatus,
}

/// Receives every frame the loop produces.
pub trait FrameSink {
    fn present(&mut self, frame: &FrameSnapshot) -> anyhow::Result<()>;
}

pub struct Playground<W: PhysicsWorld> {
    config: PlaygroundConfig,
    registry: BlockRegistry,
    bridge: PhysicsBridge<W>,
    surface: CommandSurface,
    scheduler: Scheduler,
    controller: PlayerController,
    script_text: String,
    now: Duration,
    ticks: u64,
    step_backlog: Duration,
}

impl<W: PhysicsWorld> Playground<W> {
    /// Build the scene: blocks on their slots, then the player capsule.
    pub fn new(
        config: PlaygroundConfig,
        world: W,
        capture: Box<dyn PointerCapture>,
        assignment: HeightAssignment,
    ) -> Result<Self> {
        let count = match &assignment {
            HeightAssignment::InOrder(heights) => heights.len(),
            HeightAssignment::Shuffled { heights, .. } => heights.len(),
            HeightAssignment::Random { .. } => config.block_count,
        };

        let lattice = SlotLattice {
            spacing: config.slot_spacing,
            rest_z: config.rest_z,
        };
        let mut registry = BlockRegistry::new(lattice);
        registry.initialize(count, assignment)?;

        let mut bridge = PhysicsBridge::new(world, config.block_width);
        bridge.spawn_blocks(&registry);
        bridge.spawn_player(
            config.spawn,
            Collider::Capsule {
                half_height: PLAYER_HALF_HEIGHT,
                radius: PLAYER_RADIUS,
            },
        );

        let mut surface = CommandSurface::new(config.rest_z, config.settle_delay());
        surface.refresh(&registry);

        let controller = PlayerController::new(&config, capture);
        let scheduler = Scheduler::new(ScriptLimits::from_config(&config));

        log::info!(
            "Playground ready: {} blocks, heights {:?}",
            registry.len(),
            registry.ordered_heights()
        );

        Ok(Self {
            config,
            registry,
            bridge,
            surface,
            scheduler,
            controller,
            script_text: DEFAULT_SCRIPT.to_string(),
            now: Duration::ZERO,
            ticks: 0,
            step_backlog: Duration::ZERO,
        })
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &PhysicsBridge<W> {
        &self.bridge
    }

    pub fn controller(&self) -> &PlayerController {
        &self.controller
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Heights in current left-to-right slot order.
    pub fn heights(&self) -> Vec<f32> {
        self.registry.ordered_heights()
    }

    pub fn script_text(&self) -> &str {
        &self.script_text
    }

    /// Editor contents changed. Does not start a run.
    pub fn set_script_text(&mut self, text: impl Into<String>) {
        self.script_text = text.into();
    }

    /// Run the editor's current text, superseding any active run.
    pub fn run_script(&mut self) -> RunStatus {
        self.scheduler
            .run(&self.script_text, &self.registry, &mut self.surface)
    }

    pub fn run_source(&mut self, source: &str) -> RunStatus {
        self.set_script_text(source);
        self.run_script()
    }

    pub fn cancel_script(&mut self) {
        self.scheduler.cancel();
    }

    pub fn script_status(&self) -> RunStatus {
        self.scheduler.status()
    }

    pub fn script_stats(&self) -> &RunStats {
        self.scheduler.stats()
    }

    pub fn last_script_error(&self) -> Option<&str> {
        self.scheduler.last_error.as_deref()
    }

    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        self.scheduler.take_diagnostics()
    }

    /// Swaps committed since the playground was built, across all runs.
    pub fn swap_count(&self) -> usize {
        self.surface.swap_count()
    }

    pub fn player_position(&self) -> Option<Vec3> {
        self.bridge.player_translation().ok()
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        self.controller.handle_event(event, &mut self.bridge);
    }

    /// Advance by `dt` and return the frame to draw.
    pub fn tick(&mut self, dt: Duration) -> FrameSnapshot {
        self.now += dt;
        self.ticks += 1;

        self.controller.tick(self.now, &mut self.bridge);

        let step = self.config.physics_step();
        self.step_backlog += dt;
        let mut steps = 0;
        while self.step_backlog >= step {
            if steps == MAX_STEPS_PER_TICK {
                log::debug!("Dropping {:?} of physics backlog", self.step_backlog);
                self.step_backlog = Duration::ZERO;
                break;
            }
            self.bridge.step(step.as_secs_f32());
            self.step_backlog -= step;
            steps += 1;
        }

        self.scheduler.tick(
            self.now,
            &mut self.registry,
            &mut self.bridge,
            &mut self.surface,
        );

        self.controller.follow_player(&self.bridge);
        self.snapshot()
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let mode = self.controller.mode();
        FrameSnapshot {
            tick: self.ticks,
            time: self.now.as_secs_f32(),
            blocks: self.bridge.current_frame_snapshot(&self.registry),
            camera: self.controller.camera_pose(),
            mode,
            show_controls: mode == ControlMode::Unlocked,
            script_status: self.scheduler.status(),
        }
    }

    /// Stop any run and destroy the blocks, both logical and physical.
    pub fn teardown(&mut self) {
        self.scheduler.cancel();
        self.bridge.despawn_blocks();
        self.registry.clear();
        self.surface.refresh(&self.registry);
    }
}
