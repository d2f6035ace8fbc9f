// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide profiler wiring: one shared action registry and call tree,
//! one lazily built updater per thread, and an optional background flush
//! that writes JSON snapshots to a file.

use crate::actions::{ActionCode, ActionSet};
use crate::clock::{Clock, MonotonicClock};
use crate::concurrent::ConcurrentCallTree;
use crate::updater::{CallTreeUpdater, EnterMode};
use anyhow::Context;
use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, warn};

/// Configuration for a [`Profiler`], usually read from the environment.
#[derive(Clone, Debug, Default)]
pub struct ProfilerConfig {
    /// File the flush writes to. `None` disables file output.
    pub output_path: Option<PathBuf>,
    /// Interval of the background flush thread. `None` disables it.
    pub flush_interval: Option<Duration>,
}

impl ProfilerConfig {
    /// Reads `DD_CALL_TREE_OUTPUT` (path) and `DD_CALL_TREE_FLUSH_INTERVAL`
    /// (seconds, fractional allowed).
    pub fn from_env() -> Self {
        Self {
            output_path: parse_env::str_not_empty("DD_CALL_TREE_OUTPUT").map(PathBuf::from),
            flush_interval: parse_env::duration("DD_CALL_TREE_FLUSH_INTERVAL"),
        }
    }
}

pub(crate) mod parse_env {
    use std::{env, time::Duration};

    // try_from, not from: a negative or non-finite value must be ignored,
    // never panic the host during profiler setup.
    pub fn duration(name: &str) -> Option<Duration> {
        Duration::try_from_secs_f32(env::var(name).ok()?.parse::<f32>().ok()?).ok()
    }

    pub fn str_not_empty(name: &str) -> Option<String> {
        env::var(name).ok().filter(|s| !s.is_empty())
    }
}

/// Process-wide profiler.
///
/// Owns the shared [`ActionSet`] and [`ConcurrentCallTree`] that all
/// threads contribute into, plus the optional background flush thread.
/// [`Profiler::global`] exposes the process singleton; owned instances are
/// mostly useful for tests and embedders that manage their own lifetime.
///
/// Rust statics run no destructor, so the shutdown write of the collected
/// tree is the embedder's call: invoke [`Profiler::flush`] before exiting.
pub struct Profiler {
    actions: Arc<ActionSet>,
    tree: Arc<ConcurrentCallTree>,
    clock: Arc<dyn Clock>,
    config: ProfilerConfig,
    // Held for its Drop: stops and joins the flush thread.
    _flusher: Option<Flusher>,
}

impl Profiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: ProfilerConfig, clock: Arc<dyn Clock>) -> Self {
        let actions = Arc::new(ActionSet::new());
        let tree = Arc::new(ConcurrentCallTree::new(Arc::clone(&actions)));
        let flusher = match (&config.output_path, config.flush_interval) {
            (Some(path), Some(interval)) => {
                Some(Flusher::spawn(Arc::clone(&tree), path.clone(), interval))
            }
            _ => None,
        };
        Self {
            actions,
            tree,
            clock,
            config,
            _flusher: flusher,
        }
    }

    /// The process-wide profiler, configured from the environment on first
    /// use.
    pub fn global() -> &'static Profiler {
        static GLOBAL: OnceLock<Profiler> = OnceLock::new();
        GLOBAL.get_or_init(|| Profiler::new(ProfilerConfig::from_env()))
    }

    pub fn actions(&self) -> &Arc<ActionSet> {
        &self.actions
    }

    pub fn tree(&self) -> &Arc<ConcurrentCallTree> {
        &self.tree
    }

    pub fn define_new_action(&self, name: &str) -> ActionCode {
        self.actions.define_new_action(name)
    }

    /// Copies the shared tree and rewrites the configured output file with
    /// its JSON rendering. A no-op without an output path.
    pub fn flush(&self) -> anyhow::Result<()> {
        match &self.config.output_path {
            Some(path) => write_snapshot(&self.tree, path),
            None => Ok(()),
        }
    }

    /// Runs `f` with this thread's updater, creating it on first use.
    ///
    /// The updater is stored in thread-local storage and dropped with the
    /// thread; its `Drop` reports any still-open actions.
    pub fn with_updater<R>(&self, f: impl FnOnce(&mut CallTreeUpdater) -> R) -> R {
        UPDATER.with(|cell| {
            let mut slot = cell.borrow_mut();
            let updater = slot.get_or_insert_with(|| {
                CallTreeUpdater::new(Arc::clone(&self.tree), Arc::clone(&self.clock))
            });
            f(updater)
        })
    }
}

thread_local! {
    static UPDATER: RefCell<Option<CallTreeUpdater>> = const { RefCell::new(None) };
}

fn write_snapshot(tree: &ConcurrentCallTree, path: &Path) -> anyhow::Result<()> {
    let snapshot = tree.copy_call_tree();
    let file = File::create(path)
        .with_context(|| format!("failed to open call-tree output {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    snapshot.write_json(&mut writer, true)
}

struct Flusher {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    fn spawn(tree: Arc<ConcurrentCallTree>, path: PathBuf, interval: Duration) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = Arc::clone(&active);
        let handle = std::thread::Builder::new()
            .name("dd-call-tree-flush".into())
            .spawn(move || {
                while thread_active.load(Ordering::Relaxed) {
                    sleep_while_active(&thread_active, interval);
                    if !thread_active.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(err) = write_snapshot(&tree, &path) {
                        warn!("call-tree flush failed: {err:#}");
                    }
                }
            });
        match handle {
            Ok(handle) => Self {
                active,
                handle: Some(handle),
            },
            Err(err) => {
                error!("failed to spawn call-tree flush thread: {err}");
                Self {
                    active,
                    handle: None,
                }
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// Sleeps in small slices so a dropped profiler does not block a full
// interval waiting for the join.
fn sleep_while_active(active: &AtomicBool, interval: Duration) {
    const STEP: Duration = Duration::from_millis(10);
    let mut remaining = interval;
    while active.load(Ordering::Relaxed) && !remaining.is_zero() {
        let slice = remaining.min(STEP);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

/// Scope guard for one action on the global profiler.
///
/// Construction enters the action on this thread's updater; dropping the
/// guard exits it, on every control-flow path out of the scope, unwinding
/// included. When the measured work ends mid-block, [`ActionGuard::stop`]
/// stamps the stop tick early and the drop becomes a no-op. A skipped
/// guard (see [`ActionGuard::enter_sampled`]) is a pure no-op on both
/// ends.
///
/// Guard faults never panic the host process: an invalid code or an
/// unbalanced exit is reported with `tracing::error!`, plus a
/// `debug_assert!` at construction so test builds fail loudly.
pub struct ActionGuard {
    action_code: ActionCode,
    entered: bool,
    stopped: bool,
}

impl ActionGuard {
    pub fn enter(action_code: ActionCode, mode: EnterMode) -> Self {
        Self::enter_sampled(action_code, mode, false)
    }

    /// Like [`ActionGuard::enter`], but `skip` turns the guard into a
    /// no-op. Callers compute the flag, e.g. to sample every Nth call.
    pub fn enter_sampled(action_code: ActionCode, mode: EnterMode, skip: bool) -> Self {
        if skip {
            return Self {
                action_code,
                entered: false,
                stopped: false,
            };
        }
        let result = Profiler::global().with_updater(|updater| updater.enter(action_code, mode));
        let entered = match result {
            Ok(()) => true,
            Err(err) => {
                debug_assert!(false, "failed to enter action: {err}");
                error!(
                    "failed to enter action {}: {err}",
                    action_code.to_raw()
                );
                false
            }
        };
        Self {
            action_code,
            entered,
            stopped: false,
        }
    }

    /// Stamps the stop tick now instead of at the end of the scope, for
    /// call sites where the measured work ends mid-block (a branch, an
    /// early return path kept alive by other bindings). The later drop
    /// becomes a no-op.
    ///
    /// Stopping twice is a caller bug; the second call changes nothing
    /// and is reported with `tracing::error!`.
    pub fn stop(&mut self) {
        if !self.entered {
            return;
        }
        if self.stopped {
            error!("action {} stopped twice", self.action_code.to_raw());
            return;
        }
        self.stopped = true;
        self.exit();
    }

    fn exit(&self) {
        let result =
            Profiler::global().with_updater(|updater| updater.exit_action(self.action_code));
        if let Err(err) = result {
            // No assert here: this can run while unwinding.
            error!(
                "failed to exit action {}: {err}",
                self.action_code.to_raw()
            );
        }
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        if !self.entered || self.stopped {
            return;
        }
        self.exit();
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __action_code_for {
    ($name:expr) => {{
        static CODE: ::std::sync::OnceLock<$crate::ActionCode> = ::std::sync::OnceLock::new();
        *CODE.get_or_init(|| $crate::Profiler::global().define_new_action($name))
    }};
}

/// Times the rest of the enclosing block as one action, registering the
/// name once per call site. Every entry creates a new tree node.
#[macro_export]
macro_rules! profile_block {
    ($name:expr) => {
        let _dd_call_tree_guard = $crate::ActionGuard::enter(
            $crate::__action_code_for!($name),
            $crate::EnterMode::Distinct,
        );
    };
}

/// Like [`profile_block!`], but repeated entries at the same path update
/// one shared node instead of creating siblings.
#[macro_export]
macro_rules! profile_merge_block {
    ($name:expr) => {
        let _dd_call_tree_guard = $crate::ActionGuard::enter(
            $crate::__action_code_for!($name),
            $crate::EnterMode::Merge,
        );
    };
}

/// Like [`profile_merge_block!`], but records only every `$period`-th call
/// at this call site; the rest are no-ops.
#[macro_export]
macro_rules! profile_sampled_block {
    ($name:expr, $period:expr) => {
        let _dd_call_tree_guard = {
            static COUNTER: ::std::sync::atomic::AtomicU32 =
                ::std::sync::atomic::AtomicU32::new(0);
            let skip =
                COUNTER.fetch_add(1, ::std::sync::atomic::Ordering::Relaxed) % $period != 0;
            $crate::ActionGuard::enter_sampled(
                $crate::__action_code_for!($name),
                $crate::EnterMode::Merge,
                skip,
            )
        };
    };
}
