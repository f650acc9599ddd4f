//! Trigger engine
//!
//! Watches VCS change events and decides when a build configuration should
//! be queued. Two policies exist: per-check-in (one run per commit) and
//! coalescing, where commits arriving inside a debounce window collapse
//! into a single run. With `group_by_committer`, coalescing keeps one run
//! per committer so concurrent authors do not mask each other's breakage.
//!
//! The engine itself is synchronous and driven by explicit `Instant`s; the
//! orchestrator owns the async pump that feeds it events and polls expired
//! windows.

pub mod branch;

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use branch::BranchFilter;

use crate::core::run::CommitRef;

/// Trigger policy of one build configuration
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    pub filter: BranchFilter,
    pub per_checkin: bool,
    pub group_by_committer: bool,
    pub debounce: Duration,
}

impl TriggerPolicy {
    pub fn from_config(config: &crate::core::config::TriggerConfig) -> Self {
        TriggerPolicy {
            filter: BranchFilter::parse(&config.branch_filter),
            per_checkin: config.per_checkin,
            group_by_committer: config.group_by_committer,
            debounce: Duration::from_secs(config.debounce_secs),
        }
    }
}

/// A fired trigger: the commits it covers, most recent last
#[derive(Debug, Clone)]
pub struct TriggerFire {
    pub commits: Vec<CommitRef>,
}

impl TriggerFire {
    /// The commit a queued run is attributed to
    pub fn head(&self) -> &CommitRef {
        self.commits.last().expect("a fire covers at least one commit")
    }
}

/// Per-configuration trigger state machine
#[derive(Debug)]
pub struct TriggerEngine {
    policy: TriggerPolicy,
    pending: Vec<CommitRef>,
    window_deadline: Option<Instant>,
}

impl TriggerEngine {
    pub fn new(policy: TriggerPolicy) -> Self {
        TriggerEngine {
            policy,
            pending: Vec::new(),
            window_deadline: None,
        }
    }

    /// Whether this engine coalesces commits instead of firing per check-in
    fn coalesces(&self) -> bool {
        self.policy.group_by_committer || !self.policy.per_checkin
    }

    /// Feed one change event. Returns fires that are due immediately.
    pub fn observe(&mut self, commit: CommitRef, now: Instant) -> Vec<TriggerFire> {
        if !self.policy.filter.matches(&commit.branch) {
            return Vec::new();
        }

        if !self.coalesces() {
            return vec![TriggerFire {
                commits: vec![commit],
            }];
        }

        // Each new commit extends the quiet period
        self.pending.push(commit);
        self.window_deadline = Some(now + self.policy.debounce);
        Vec::new()
    }

    /// Fire pending groups whose debounce window has closed.
    pub fn poll(&mut self, now: Instant) -> Vec<TriggerFire> {
        match self.window_deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Vec::new(),
        }

        self.window_deadline = None;
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Vec::new();
        }

        if self.policy.group_by_committer {
            // One fire per committer, commit order preserved within a group
            let mut groups: Vec<(String, Vec<CommitRef>)> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for commit in pending {
                match index.get(&commit.committer) {
                    Some(&i) => groups[i].1.push(commit),
                    None => {
                        index.insert(commit.committer.clone(), groups.len());
                        groups.push((commit.committer.clone(), vec![commit]));
                    }
                }
            }
            groups
                .into_iter()
                .map(|(_, commits)| TriggerFire { commits })
                .collect()
        } else {
            vec![TriggerFire { commits: pending }]
        }
    }

    /// Deadline the async pump should wake up at, if a window is open
    pub fn next_deadline(&self) -> Option<Instant> {
        self.window_deadline
    }
}
