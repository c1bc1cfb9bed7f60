pub mod config;
pub mod error;

// Scene state
pub mod block_registry;
pub mod physics;
pub mod bridge;
pub mod command_surface;

// Scripting
pub mod scripting;
pub mod scheduler;
pub mod script_log;
pub mod script_diagnostics;

// Player
pub mod camera;
pub mod input;

pub mod playground;

pub mod cli;
