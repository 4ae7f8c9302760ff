//! Process-wide lock contention counters.
//!
//! Every lock in the crate reports through a [`LockHold`]: the acquisition
//! and its wait are counted when the hold starts, the hold time when it drops.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatKind {
    /// Shared/exclusive table locks taken through a lock handle.
    TableLock,
    /// The per-table single-writer commit section.
    Commit,
    /// The database-wide gate between commits and transaction open.
    CommitGate,
}

impl LockStatKind {
    const COUNT: usize = 3;

    fn slot(self) -> usize {
        match self {
            LockStatKind::TableLock => 0,
            LockStatKind::Commit => 1,
            LockStatKind::CommitGate => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct LockCounterSnapshot {
    pub acquires: u64,
    pub wait_ns: u64,
    pub hold_ns: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LockStatsSnapshot {
    pub table_lock: LockCounterSnapshot,
    pub commit: LockCounterSnapshot,
    pub commit_gate: LockCounterSnapshot,
}

impl LockStatsSnapshot {
    pub fn get(&self, kind: LockStatKind) -> &LockCounterSnapshot {
        match kind {
            LockStatKind::TableLock => &self.table_lock,
            LockStatKind::Commit => &self.commit,
            LockStatKind::CommitGate => &self.commit_gate,
        }
    }
}

struct Counter {
    acquires: AtomicU64,
    wait_ns: AtomicU64,
    hold_ns: AtomicU64,
}

impl Counter {
    const fn new() -> Self {
        Self {
            acquires: AtomicU64::new(0),
            wait_ns: AtomicU64::new(0),
            hold_ns: AtomicU64::new(0),
        }
    }

    fn load(&self) -> LockCounterSnapshot {
        LockCounterSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            wait_ns: self.wait_ns.load(Ordering::Relaxed),
            hold_ns: self.hold_ns.load(Ordering::Relaxed),
        }
    }

    fn clear(&self) {
        for value in [&self.acquires, &self.wait_ns, &self.hold_ns] {
            value.store(0, Ordering::Relaxed);
        }
    }
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static COUNTERS: [Counter; LockStatKind::COUNT] = [Counter::new(), Counter::new(), Counter::new()];

fn counter(kind: LockStatKind) -> &'static Counter {
    &COUNTERS[kind.slot()]
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

pub fn set_lock_stats_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn lock_stats_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn reset_lock_stats() {
    COUNTERS.iter().for_each(Counter::clear);
}

pub fn snapshot_lock_stats() -> LockStatsSnapshot {
    LockStatsSnapshot {
        table_lock: counter(LockStatKind::TableLock).load(),
        commit: counter(LockStatKind::Commit).load(),
        commit_gate: counter(LockStatKind::CommitGate).load(),
    }
}

/// One acquisition of a lock of `kind`. Inert when stats were disabled at
/// acquisition time.
#[derive(Debug)]
#[must_use = "the hold is measured until this value is dropped"]
pub struct LockHold {
    kind: LockStatKind,
    since: Option<Instant>,
}

impl LockHold {
    /// Count an acquisition that started waiting at `wait_start` and start
    /// timing the hold.
    pub fn acquired(kind: LockStatKind, wait_start: Instant) -> Self {
        if !lock_stats_enabled() {
            return Self { kind, since: None };
        }
        let now = Instant::now();
        let c = counter(kind);
        c.acquires.fetch_add(1, Ordering::Relaxed);
        c.wait_ns
            .fetch_add(nanos(now.saturating_duration_since(wait_start)), Ordering::Relaxed);
        Self { kind, since: Some(now) }
    }
}

impl Drop for LockHold {
    fn drop(&mut self) {
        if let Some(since) = self.since {
            counter(self.kind)
                .hold_ns
                .fetch_add(nanos(since.elapsed()), Ordering::Relaxed);
        }
    }
}

/// A lock guard that reports its hold time when released.
#[derive(Debug)]
pub struct TimedGuard<G> {
    guard: G,
    _hold: LockHold,
}

impl<G> Deref for TimedGuard<G> {
    type Target = G;

    fn deref(&self) -> &G {
        &self.guard
    }
}

/// Run `acquire`, counting the time it blocks as wait time for `kind`.
pub fn timed<G>(kind: LockStatKind, acquire: impl FnOnce() -> G) -> TimedGuard<G> {
    let wait_start = Instant::now();
    let guard = acquire();
    TimedGuard {
        guard,
        _hold: LockHold::acquired(kind, wait_start),
    }
}
