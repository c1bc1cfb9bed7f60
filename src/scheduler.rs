//! Script run lifecycle and pacing.
//!
//! At most one run is active. Each frame-loop tick the scheduler services the
//! active run's requests until it suspends (`swap` settle or `sleep`) or
//! finishes. A suspended run resumes once its deadline has passed *and* the
//! physics world has stepped since the suspension, so the next statement
//! always observes the committed swap.
//!
//! Starting a run while another is active supersedes it. Physics commands the
//! old run already issued stay in effect.

use std::time::Duration;

use serde::Serialize;

use crate::block_registry::BlockRegistry;
use crate::bridge::PhysicsBridge;
use crate::command_surface::CommandSurface;
use crate::physics::PhysicsWorld;
use crate::script_diagnostics::ScriptDiagnostic;
use crate::scripting::{compile, ScriptLimits, ScriptReply, ScriptRequest, ScriptWorker, WorkerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Failed,
    Completed,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub run_id: u64,
    pub swaps: usize,
    pub rejected_swaps: usize,
    pub sleeps: usize,
    pub requests: usize,
}

#[derive(Debug, Clone, Copy)]
struct Wait {
    deadline: Duration,
    /// Physics step count when the run suspended.
    after_step: u64,
}

impl Wait {
    fn elapsed(&self, now: Duration, steps: u64) -> bool {
        now >= self.deadline && steps > self.after_step
    }
}

struct ActiveRun {
    worker: ScriptWorker,
    wait: Option<Wait>,
    stats: RunStats,
}

impl ActiveRun {
    /// Service requests until the run suspends (`None`) or finishes.
    fn pump<W: PhysicsWorld>(
        &mut self,
        now: Duration,
        registry: &mut BlockRegistry,
        bridge: &mut PhysicsBridge<W>,
        surface: &mut CommandSurface,
    ) -> Option<Result<(), ScriptDiagnostic>> {
        loop {
            if let Some(wait) = self.wait {
                if !wait.elapsed(now, bridge.steps()) {
                    return None;
                }
                self.wait = None;
                self.worker.reply(ScriptReply::Resume);
            }

            let request = match self.worker.recv() {
                Ok(WorkerEvent::Request(request)) => request,
                Ok(WorkerEvent::Finished(result)) => return Some(result),
                Err(_) => {
                    return Some(Err(ScriptDiagnostic::host_error(
                        "script worker exited without reporting a result",
                    )))
                }
            };
            self.stats.requests += 1;

            let reply = match request {
                ScriptRequest::Heights => ScriptReply::Heights(surface.heights(registry)),
                ScriptRequest::BlockCount => ScriptReply::Count(registry.len()),
                ScriptRequest::Refresh => {
                    surface.refresh(registry);
                    ScriptReply::Resume
                }
                ScriptRequest::BulkOffset(delta) => {
                    surface.bulk_offset(registry, bridge, delta);
                    ScriptReply::Resume
                }
                ScriptRequest::Swap(i, j) => match surface.swap(registry, bridge, i, j) {
                    Ok(settle) => {
                        self.stats.swaps += 1;
                        self.suspend(now + settle, bridge.steps());
                        continue;
                    }
                    Err(e) => {
                        log::warn!("Run {}: swap ignored: {}", self.stats.run_id, e);
                        self.stats.rejected_swaps += 1;
                        ScriptReply::Resume
                    }
                },
                ScriptRequest::Sleep(duration) => {
                    self.stats.sleeps += 1;
                    self.suspend(now + duration, bridge.steps());
                    continue;
                }
            };
            self.worker.reply(reply);
        }
    }

    fn suspend(&mut self, deadline: Duration, after_step: u64) {
        self.wait = Some(Wait {
            deadline,
            after_step,
        });
    }
}

pub struct Scheduler {
    limits: ScriptLimits,
    status: RunStatus,
    active: Option<ActiveRun>,
    next_run_id: u64,
    last_stats: RunStats,
    /// Last error message (for display).
    pub last_error: Option<String>,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl Scheduler {
    pub fn new(limits: ScriptLimits) -> Self {
        Self {
            limits,
            status: RunStatus::Idle,
            active: None,
            next_run_id: 1,
            last_stats: RunStats::default(),
            last_error: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Counters of the active run, or of the last finished one.
    pub fn stats(&self) -> &RunStats {
        match &self.active {
            Some(run) => &run.stats,
            None => &self.last_stats,
        }
    }

    /// Drain and return all pending diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn push_diagnostic(&mut self, diag: ScriptDiagnostic) {
        // Bounded so repeated failures don't grow without limit
        const MAX_DIAGNOSTICS: usize = 32;

        self.last_error = Some(diag.to_string());
        self.diagnostics.push(diag);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(0..excess);
        }
    }

    /// Start running `source`, superseding any active run.
    ///
    /// The surface is refreshed first so the script sees the registry's
    /// current slot order. A compile error leaves no run active.
    pub fn run(&mut self, source: &str, registry: &BlockRegistry, surface: &mut CommandSurface) -> RunStatus {
        if let Some(previous) = self.active.take() {
            log::info!(
                "Run {} superseded after {} swaps; its issued moves stay in place",
                previous.stats.run_id,
                previous.stats.swaps
            );
            self.last_stats = previous.stats.clone();
        }

        surface.refresh(registry);
        self.last_error = None;

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        self.last_stats = RunStats {
            run_id,
            ..RunStats::default()
        };

        if let Err(diag) = compile(source, &self.limits) {
            log::error!("Run {}: script failed to compile: {}", run_id, diag);
            self.push_diagnostic(diag);
            self.status = RunStatus::Failed;
            return self.status;
        }

        match ScriptWorker::spawn(run_id, source.to_string(), self.limits.clone()) {
            Ok(worker) => {
                log::info!("Run {} started", run_id);
                self.active = Some(ActiveRun {
                    worker,
                    wait: None,
                    stats: self.last_stats.clone(),
                });
                self.status = RunStatus::Running;
            }
            Err(e) => {
                self.push_diagnostic(ScriptDiagnostic::host_error(format!(
                    "could not start script worker: {}",
                    e
                )));
                self.status = RunStatus::Failed;
            }
        }
        self.status
    }

    /// Stop the active run without marking it failed.
    pub fn cancel(&mut self) {
        if let Some(run) = self.active.take() {
            log::info!("Run {} cancelled", run.stats.run_id);
            self.last_stats = run.stats.clone();
            self.status = RunStatus::Idle;
        }
    }

    /// Advance the active run as far as pacing allows at time `now`.
    pub fn tick<W: PhysicsWorld>(
        &mut self,
        now: Duration,
        registry: &mut BlockRegistry,
        bridge: &mut PhysicsBridge<W>,
        surface: &mut CommandSurface,
    ) {
        let Some(run) = self.active.as_mut() else {
            return;
        };
        run.worker.log_budget().reset();
        let Some(result) = run.pump(now, registry, bridge, surface) else {
            return;
        };

        if let Some(run) = self.active.take() {
            self.last_stats = run.stats;
        }
        match result {
            Ok(()) => {
                log::info!(
                    "Run {} completed: {} swaps, {} rejected",
                    self.last_stats.run_id,
                    self.last_stats.swaps,
                    self.last_stats.rejected_swaps
                );
                self.status = RunStatus::Completed;
            }
            Err(diag) => {
                log::error!("Run {} failed: {}", self.last_stats.run_id, diag);
                self.push_diagnostic(diag);
                self.status = RunStatus::Failed;
            }
        }
    }
}
