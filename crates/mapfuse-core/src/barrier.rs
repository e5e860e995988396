//! Soft per-step barrier.
//!
//! Before a strategist round every participating agent announces that it
//! has folded its percept for the step. The round runs once everyone has
//! checked in, or when the coordinator gives up waiting. Check-ins for
//! later steps are kept so a fast agent does not lose its announcement.

use std::collections::{BTreeMap, BTreeSet};

use mapfuse_types::AgentId;
use tracing::warn;

/// Records which participants have checked in for which step.
#[derive(Debug, Clone, Default)]
pub struct CheckInBarrier {
    participants: BTreeSet<AgentId>,
    arrivals: BTreeMap<u64, BTreeSet<AgentId>>,
}

impl CheckInBarrier {
    /// A barrier over a fixed set of participants.
    pub fn new(participants: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            participants: participants.into_iter().collect(),
            arrivals: BTreeMap::new(),
        }
    }

    /// The participants.
    pub const fn participants(&self) -> &BTreeSet<AgentId> {
        &self.participants
    }

    /// Record that `agent` has updated its belief for `step`.
    ///
    /// Returns `true` if this check-in completed the step. Unknown agents
    /// are ignored.
    pub fn check_in(&mut self, agent: AgentId, step: u64) -> bool {
        if !self.participants.contains(&agent) {
            warn!(%agent, step, "check-in from non-participant ignored");
            return false;
        }
        self.arrivals.entry(step).or_default().insert(agent);
        self.is_complete(step)
    }

    /// Whether every participant has checked in for `step`.
    pub fn is_complete(&self, step: u64) -> bool {
        self.arrivals
            .get(&step)
            .is_some_and(|arrived| arrived.len() == self.participants.len())
    }

    /// Earliest step with at least one check-in.
    pub fn earliest(&self) -> Option<u64> {
        self.arrivals.keys().next().copied()
    }

    /// Close `step` and every earlier one, returning who checked in for
    /// `step` in id order.
    pub fn close(&mut self, step: u64) -> Vec<AgentId> {
        let later = step
            .checked_add(1)
            .map_or_else(BTreeMap::new, |next| self.arrivals.split_off(&next));
        let closed = std::mem::replace(&mut self.arrivals, later);
        closed
            .get(&step)
            .map(|arrived| arrived.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<AgentId> {
        raw.iter().copied().map(AgentId::new).collect()
    }

    #[test]
    fn completes_when_everyone_checked_in() {
        let mut b = CheckInBarrier::new(ids(&[1, 2, 3]));
        assert!(!b.check_in(AgentId::new(2), 0));
        assert!(!b.check_in(AgentId::new(1), 0));
        assert!(!b.check_in(AgentId::new(1), 0));
        assert!(b.check_in(AgentId::new(3), 0));
        assert_eq!(b.close(0), ids(&[1, 2, 3]));
        assert_eq!(b.earliest(), None);
    }

    #[test]
    fn later_steps_survive_close() {
        let mut b = CheckInBarrier::new(ids(&[1, 2]));
        b.check_in(AgentId::new(1), 0);
        b.check_in(AgentId::new(1), 1);
        assert_eq!(b.earliest(), Some(0));
        assert_eq!(b.close(0), ids(&[1]));
        assert_eq!(b.earliest(), Some(1));
        assert!(b.check_in(AgentId::new(2), 1));
    }

    #[test]
    fn strangers_are_ignored() {
        let mut b = CheckInBarrier::new(ids(&[1]));
        assert!(!b.check_in(AgentId::new(7), 0));
        assert_eq!(b.earliest(), None);
    }
}
