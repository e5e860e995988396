//! The coordination task.
//!
//! The [`Coordinator`] is a single-writer actor: it owns the [`Strategist`]
//! and is the only task that merges graphs or folds dimensions. Agent
//! sessions talk to it through a [`CoordinatorHandle`]:
//!
//! 1. A session folds its percept and sends [`CoordinatorEvent::Updated`].
//! 2. The coordinator records the check-in on its [`CheckInBarrier`].
//! 3. When every participant has checked in for the step, or the barrier
//!    timeout expires, it resolves each checked-in agent in id order.
//! 4. The completed step is published on a watch channel, which releases
//!    the sessions waiting on it.

use std::time::Duration;

use mapfuse_types::AgentId;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::barrier::CheckInBarrier;
use crate::config::CoordinationConfig;
use crate::error::CoreError;
use crate::strategist::{Dimensions, Strategist};

/// Messages accepted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// `agent` has folded its percept for `step`.
    Updated {
        /// The agent.
        agent: AgentId,
        /// The step it folded.
        step: u64,
    },
    /// Finish pending rounds and stop.
    Shutdown,
}

/// Totals reported when the coordinator stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorSummary {
    /// Rounds run.
    pub rounds: u64,
    /// Rounds started by the timeout rather than a full barrier.
    pub timeouts: u64,
    /// Graph merges performed.
    pub merges: u64,
    /// Offsets left ambiguous, summed over rounds.
    pub deferred: u64,
    /// Dimensions established by the end of the run.
    pub dimensions: Dimensions,
}

/// Session-side access to the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::Sender<CoordinatorEvent>,
    completed: watch::Receiver<Option<u64>>,
    timeout: Duration,
}

impl CoordinatorHandle {
    /// Announce that `agent` has folded its percept for `step`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelClosed`] if the coordinator has stopped.
    pub async fn check_in(&self, agent: AgentId, step: u64) -> Result<(), CoreError> {
        self.events
            .send(CoordinatorEvent::Updated { agent, step })
            .await
            .map_err(|_closed| CoreError::ChannelClosed)
    }

    /// Wait until the round for `step` has completed.
    ///
    /// Returns `false` if the barrier timeout elapsed first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelClosed`] if the coordinator has stopped.
    pub async fn wait_for_round(&self, step: u64) -> Result<bool, CoreError> {
        let mut completed = self.completed.clone();
        let done = completed.wait_for(|done| done.is_some_and(|d| d >= step));
        match tokio::time::timeout(self.timeout, done).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(_closed)) => Err(CoreError::ChannelClosed),
            Err(_elapsed) => Ok(false),
        }
    }

    /// Latest completed step.
    pub fn completed(&self) -> Option<u64> {
        *self.completed.borrow()
    }

    /// Ask the coordinator to stop once pending rounds are done.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelClosed`] if it has already stopped.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.events
            .send(CoordinatorEvent::Shutdown)
            .await
            .map_err(|_closed| CoreError::ChannelClosed)
    }
}

/// The coordination actor.
#[derive(Debug)]
pub struct Coordinator {
    strategist: Strategist,
    barrier: CheckInBarrier,
    events: mpsc::Receiver<CoordinatorEvent>,
    completed: watch::Sender<Option<u64>>,
    timeout: Duration,
    summary: CoordinatorSummary,
}

impl Coordinator {
    /// Create the actor and the handle sessions use to reach it.
    ///
    /// Every agent registered with the strategist's registry at this point
    /// becomes a barrier participant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockPoisoned`] if the registry lock is poisoned.
    pub fn new(
        strategist: Strategist,
        config: &CoordinationConfig,
    ) -> Result<(Self, CoordinatorHandle), CoreError> {
        let participants = strategist.registry().agents()?;
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (completed_tx, completed_rx) = watch::channel(None);
        let timeout = Duration::from_millis(config.barrier_timeout_ms);
        let coordinator = Self {
            strategist,
            barrier: CheckInBarrier::new(participants),
            events: events_rx,
            completed: completed_tx,
            timeout,
            summary: CoordinatorSummary::default(),
        };
        let handle = CoordinatorHandle {
            events: events_tx,
            completed: completed_rx,
            timeout,
        };
        Ok((coordinator, handle))
    }

    /// Process events until shutdown or until every handle is dropped.
    pub async fn run(mut self) -> CoordinatorSummary {
        info!(
            participants = self.barrier.participants().len(),
            timeout_ms = self.timeout.as_millis(),
            "coordinator started"
        );
        let mut deadline: Option<Instant> = None;

        loop {
            let event = match deadline {
                Some(at) => match tokio::time::timeout_at(at, self.events.recv()).await {
                    Ok(event) => event,
                    Err(_elapsed) => {
                        if let Some(step) = self.barrier.earliest() {
                            warn!(step, "barrier timed out, running partial round");
                            self.summary.timeouts = self.summary.timeouts.saturating_add(1);
                            self.run_round(step);
                        }
                        deadline = self.next_deadline();
                        continue;
                    }
                },
                None => self.events.recv().await,
            };

            match event {
                Some(CoordinatorEvent::Updated { agent, step }) => {
                    if self.completed.borrow().is_some_and(|done| step <= done) {
                        debug!(%agent, step, "late check-in for a completed step");
                        continue;
                    }
                    self.barrier.check_in(agent, step);
                    let mut progressed = false;
                    while let Some(earliest) = self.barrier.earliest() {
                        if !self.barrier.is_complete(earliest) {
                            break;
                        }
                        self.run_round(earliest);
                        progressed = true;
                    }
                    if progressed || deadline.is_none() {
                        deadline = self.next_deadline();
                    }
                }
                Some(CoordinatorEvent::Shutdown) | None => break,
            }
        }

        while let Some(step) = self.barrier.earliest() {
            self.run_round(step);
        }
        self.summary.merges = self.strategist.merges();
        self.summary.dimensions = self.strategist.dimensions();
        info!(
            rounds = self.summary.rounds,
            merges = self.summary.merges,
            timeouts = self.summary.timeouts,
            "coordinator stopped"
        );
        self.summary
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.barrier
            .earliest()
            .and_then(|_| Instant::now().checked_add(self.timeout))
    }

    fn run_round(&mut self, step: u64) {
        let agents = self.barrier.close(step);
        for agent in &agents {
            match self.strategist.resolve(*agent) {
                Ok(report) => {
                    let deferred = u64::try_from(report.deferred.len()).unwrap_or(u64::MAX);
                    self.summary.deferred = self.summary.deferred.saturating_add(deferred);
                }
                Err(e) => warn!(%agent, step, error = %e, "strategist round failed"),
            }
        }
        self.summary.rounds = self.summary.rounds.saturating_add(1);
        self.completed.send_replace(Some(step));
        debug!(step, agents = agents.len(), "round completed");
    }
}
