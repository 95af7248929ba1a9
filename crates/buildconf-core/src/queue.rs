//! Commit trigger policy: how commit events become queued build records.
//!
//! This mirrors what the server does with a build type's trigger so the
//! policy can be inspected and tested without a server:
//! - `per_checkin_triggering` decides between one build per commit and one
//!   build per batch of pending commits;
//! - `enable_queue_optimization` lets a newer request replace a pending one
//!   for the same build type and branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{BuildType, VcsRoot};

/// A commit landing on a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub revision: String,
    pub ref_name: String,
}

impl CommitEvent {
    pub fn new(revision: impl Into<String>, ref_name: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            ref_name: ref_name.into(),
        }
    }
}

/// State of a queued build record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    /// Replaced by a newer request under queue optimization.
    Superseded,
}

/// One build request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedBuild {
    pub seq: u64,
    pub build_type_id: String,
    pub branch: String,
    /// Revisions covered by this build, oldest first.
    pub revisions: Vec<String>,
    pub state: QueueState,
    pub queued_at: DateTime<Utc>,
}

/// Why a commit did not produce or touch a build request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoTrigger,
    NotRunnable,
    BranchNotMonitored,
    FilteredOut,
}

/// Outcome of feeding one commit to the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Ignored { reason: IgnoreReason },
    /// A new independent record.
    Enqueued { seq: u64 },
    /// The revision was added to a pending batch.
    Merged { seq: u64 },
    /// A new record replaced a pending one.
    Replaced { superseded: u64, seq: u64 },
}

/// In-memory build queue.
#[derive(Debug, Clone, Default)]
pub struct BuildQueue {
    next_seq: u64,
    entries: Vec<QueuedBuild>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a build type's trigger to one commit.
    pub fn on_commit(
        &mut self,
        build_type: &BuildType,
        vcs_root: &VcsRoot,
        event: &CommitEvent,
    ) -> TriggerDecision {
        let Some(trigger) = &build_type.trigger else {
            return ignored(IgnoreReason::NoTrigger);
        };
        if !build_type.is_runnable() {
            return ignored(IgnoreReason::NotRunnable);
        }
        let Some(branch) = vcs_root.logical_branch(&event.ref_name) else {
            return ignored(IgnoreReason::BranchNotMonitored);
        };
        if !trigger.accepts_branch(&branch) {
            return ignored(IgnoreReason::FilteredOut);
        }

        let pending = self.entries.iter().rposition(|e| {
            e.state == QueueState::Queued && e.build_type_id == build_type.id && e.branch == branch
        });

        let decision = match pending {
            Some(idx) if !trigger.per_checkin_triggering => {
                let entry = &mut self.entries[idx];
                entry.revisions.push(event.revision.clone());
                TriggerDecision::Merged { seq: entry.seq }
            }
            Some(idx) if trigger.enable_queue_optimization => {
                self.entries[idx].state = QueueState::Superseded;
                let superseded = self.entries[idx].seq;
                let seq = self.push(build_type, branch, &event.revision);
                TriggerDecision::Replaced { superseded, seq }
            }
            _ => {
                let seq = self.push(build_type, branch, &event.revision);
                TriggerDecision::Enqueued { seq }
            }
        };

        debug!(
            build_type = %build_type.id,
            revision = %event.revision,
            ?decision,
            "Commit processed"
        );
        decision
    }

    fn push(&mut self, build_type: &BuildType, branch: String, revision: &str) -> u64 {
        self.next_seq += 1;
        self.entries.push(QueuedBuild {
            seq: self.next_seq,
            build_type_id: build_type.id.clone(),
            branch,
            revisions: vec![revision.to_string()],
            state: QueueState::Queued,
            queued_at: Utc::now(),
        });
        self.next_seq
    }

    /// Records not yet popped, superseded ones included, in creation order.
    pub fn entries(&self) -> &[QueuedBuild] {
        &self.entries
    }

    /// Records still waiting to run.
    pub fn pending(&self) -> impl Iterator<Item = &QueuedBuild> {
        self.entries.iter().filter(|e| e.state == QueueState::Queued)
    }

    /// Take the oldest pending record off the queue.
    pub fn pop(&mut self) -> Option<QueuedBuild> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.state == QueueState::Queued)?;
        Some(self.entries.remove(idx))
    }
}

fn ignored(reason: IgnoreReason) -> TriggerDecision {
    TriggerDecision::Ignored { reason }
}
