//! Rhai sandbox for block scripts.
//!
//! Scripts are plain Rhai programs. The only host capabilities they get are:
//! - `heights()` - Array of block heights in slot order
//! - `block_count()` - Number of blocks
//! - `swap(i, j)` - Exchange the blocks in slots i and j, then wait for them to settle
//! - `bulkOffset(#{ x, y, z })` / `bulkOffset(x, y, z)` - Translate every block
//! - `refresh()` - Resynchronize the slot order with the block registry
//! - `sleep(ms)` - Pause the script without blocking the frame loop
//!
//! Logging:
//! - `print(value)`, `debug(value)`
//! - `log_info(value)`, `log_warn(value)`, `log_error(value)`
//!
//! A script runs on its own worker thread, but it never touches host state:
//! every call above becomes a [`ScriptRequest`] answered by the scheduler on
//! the frame-loop timeline. `swap` and `sleep` only return once the host
//! decides the pacing deadline has passed.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::Vec3;
use rhai::{Dynamic, Engine, EvalAltResult, Position, AST};

use crate::config::PlaygroundConfig;
use crate::script_diagnostics::{from_eval_error, from_parse_error, ScriptDiagnostic};
use crate::script_log::{script_log, stringify_dynamic, LogLevel, TickBudget};

/// Text shown in a fresh editor.
pub const DEFAULT_SCRIPT: &str = r#"// Write your code here
fn example() {
    print("Hello, AlgoLand!");
}
"#;

/// Bubble sort over the block row, one swap per adjacent inversion.
pub const BUBBLE_SORT_SCRIPT: &str = r#"let n = block_count();
for i in 0..n {
    let swapped = false;
    for j in 0..(n - 1 - i) {
        let h = heights();
        if h[j] > h[j + 1] {
            swap(j, j + 1);
            swapped = true;
        }
    }
    if !swapped {
        break;
    }
}
print(heights());
"#;

/// A call from the script that the host must service.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptRequest {
    Heights,
    BlockCount,
    Swap(i64, i64),
    BulkOffset(Vec3),
    Refresh,
    Sleep(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptReply {
    Heights(Vec<f32>),
    Count(usize),
    Resume,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Request(ScriptRequest),
    /// The script ran to the end (`Ok`) or stopped with an uncaught error.
    Finished(Result<(), ScriptDiagnostic>),
}

/// Sandbox limits applied to every engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLimits {
    /// 0 means unlimited.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_array_size: usize,
}

impl ScriptLimits {
    pub fn from_config(config: &PlaygroundConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            max_call_levels: config.max_call_levels,
            max_array_size: config.max_array_size,
        }
    }
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self::from_config(&PlaygroundConfig::default())
    }
}

/// Create an engine with sandbox limits and no host vocabulary.
pub fn sandboxed_engine(limits: &ScriptLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_operations(limits.max_operations);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(500);
    engine.disable_symbol("eval");

    engine
}

/// Route `print`, `debug` and `log_*` through a run's log budget.
fn register_logging(engine: &mut Engine, budget: Arc<TickBudget>) {
    let b = budget.clone();
    engine.on_print(move |text| script_log(&b, LogLevel::Info, text));
    let b = budget.clone();
    engine.on_debug(move |text, _source, pos| match pos.line() {
        Some(line) => script_log(&b, LogLevel::Debug, &format!("[line {}] {}", line, text)),
        None => script_log(&b, LogLevel::Debug, text),
    });

    let b = budget.clone();
    engine.register_fn("log_info", move |value: Dynamic| {
        script_log(&b, LogLevel::Info, &stringify_dynamic(&value));
    });
    let b = budget.clone();
    engine.register_fn("log_warn", move |value: Dynamic| {
        script_log(&b, LogLevel::Warn, &stringify_dynamic(&value));
    });
    engine.register_fn("log_error", move |value: Dynamic| {
        script_log(&budget, LogLevel::Error, &stringify_dynamic(&value));
    });
}

/// Syntax-check a script without running it.
pub fn compile(source: &str, limits: &ScriptLimits) -> Result<AST, ScriptDiagnostic> {
    sandboxed_engine(limits)
        .compile(source)
        .map_err(|e| from_parse_error(&e))
}

/// Worker side of the channel pair.
struct HostLink {
    events: Sender<WorkerEvent>,
    replies: Receiver<ScriptReply>,
    cancelled: Arc<AtomicBool>,
    budget: Arc<TickBudget>,
}

fn cancelled_error() -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::from("run cancelled"), Position::NONE).into()
}

fn unexpected_reply(reply: ScriptReply) -> Box<EvalAltResult> {
    format!("host sent an unexpected reply: {:?}", reply).into()
}

impl HostLink {
    /// Send a request and block until the host answers it.
    fn call(&self, request: ScriptRequest) -> Result<ScriptReply, Box<EvalAltResult>> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(cancelled_error());
        }
        self.events
            .send(WorkerEvent::Request(request))
            .map_err(|_| cancelled_error())?;
        self.replies.recv().map_err(|_| cancelled_error())
    }

    fn call_resume(&self, request: ScriptRequest) -> Result<(), Box<EvalAltResult>> {
        match self.call(request)? {
            ScriptReply::Resume => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }
}

/// Numbers from scripts may arrive as INT or FLOAT.
fn as_number(value: &Dynamic) -> Option<f32> {
    if let Ok(f) = value.as_float() {
        return Some(f);
    }
    value.as_int().ok().map(|i| i as f32)
}

fn number_arg(name: &str, value: &Dynamic) -> Result<f32, Box<EvalAltResult>> {
    as_number(value).ok_or_else(|| format!("bulkOffset: {} must be a number", name).into())
}

fn sleep_duration(ms: f32) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_micros((ms * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Register the block vocabulary, routing every call through `link`.
fn register_block_api(engine: &mut Engine, link: Rc<HostLink>) {
    let l = link.clone();
    engine.register_fn("heights", move || -> Result<rhai::Array, Box<EvalAltResult>> {
        match l.call(ScriptRequest::Heights)? {
            ScriptReply::Heights(h) => Ok(h.into_iter().map(Dynamic::from).collect()),
            other => Err(unexpected_reply(other)),
        }
    });

    let l = link.clone();
    engine.register_fn("block_count", move || -> Result<i64, Box<EvalAltResult>> {
        match l.call(ScriptRequest::BlockCount)? {
            ScriptReply::Count(n) => Ok(n as i64),
            other => Err(unexpected_reply(other)),
        }
    });

    let l = link.clone();
    engine.register_fn("swap", move |i: i64, j: i64| l.call_resume(ScriptRequest::Swap(i, j)));

    let l = link.clone();
    engine.register_fn("bulkOffset", move |offset: rhai::Map| {
        let component = |key: &str| match offset.get(key) {
            Some(v) => number_arg(key, v),
            None => Ok(0.0),
        };
        let delta = Vec3::new(component("x")?, component("y")?, component("z")?);
        l.call_resume(ScriptRequest::BulkOffset(delta))
    });

    let l = link.clone();
    engine.register_fn("bulkOffset", move |x: Dynamic, y: Dynamic, z: Dynamic| {
        let delta = Vec3::new(number_arg("x", &x)?, number_arg("y", &y)?, number_arg("z", &z)?);
        l.call_resume(ScriptRequest::BulkOffset(delta))
    });

    let l = link.clone();
    engine.register_fn("refresh", move || l.call_resume(ScriptRequest::Refresh));

    let l = link.clone();
    engine.register_fn("sleep", move |ms: i64| {
        l.call_resume(ScriptRequest::Sleep(sleep_duration(ms as f32)))
    });

    let l = link.clone();
    engine.register_fn("sleep", move |ms: f32| l.call_resume(ScriptRequest::Sleep(sleep_duration(ms))));

    // Cancelled runs stop at the next operation even inside pure loops
    let cancelled = link.cancelled.clone();
    engine.on_progress(move |_ops| {
        if cancelled.load(Ordering::Relaxed) {
            Some(Dynamic::from("run cancelled"))
        } else {
            None
        }
    });
}

fn run_worker(source: String, limits: ScriptLimits, link: HostLink) {
    let events = link.events.clone();
    let link = Rc::new(link);

    let mut engine = sandboxed_engine(&limits);
    register_logging(&mut engine, link.budget.clone());
    register_block_api(&mut engine, link.clone());

    let result = engine
        .compile(&source)
        .map_err(|e| from_parse_error(&e))
        .and_then(|ast| engine.run_ast(&ast).map_err(|e| from_eval_error(&e)));

    if link.cancelled.load(Ordering::Relaxed) {
        log::debug!("Cancelled script worker exiting");
        return;
    }
    // The host may already be gone; nothing left to report to then.
    let _ = events.send(WorkerEvent::Finished(result));
}

/// Host side of one script run.
///
/// Dropping the worker cancels the run: its next host call fails and the
/// thread unwinds on its own.
pub struct ScriptWorker {
    events: Receiver<WorkerEvent>,
    replies: Sender<ScriptReply>,
    cancelled: Arc<AtomicBool>,
    budget: Arc<TickBudget>,
    _thread: thread::JoinHandle<()>,
}

impl ScriptWorker {
    pub fn spawn(run_id: u64, source: String, limits: ScriptLimits) -> std::io::Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let budget = Arc::new(TickBudget::new());

        let link = HostLink {
            events: event_tx,
            replies: reply_rx,
            cancelled: cancelled.clone(),
            budget: budget.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("script-run-{}", run_id))
            .spawn(move || run_worker(source, limits, link))?;

        Ok(Self {
            events: event_rx,
            replies: reply_tx,
            cancelled,
            budget,
            _thread: handle,
        })
    }

    /// This run's log allowance. The scheduler resets it every tick.
    pub fn log_budget(&self) -> &TickBudget {
        &self.budget
    }

    /// Block until the script issues its next request or finishes.
    pub fn recv(&self) -> Result<WorkerEvent, RecvError> {
        self.events.recv()
    }

    /// Answer the pending request. Returns false if the worker is gone.
    pub fn reply(&self, reply: ScriptReply) -> bool {
        self.replies.send(reply).is_ok()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Drop for ScriptWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}
