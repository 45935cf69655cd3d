//! Measurement run execution and result aggregation
//!
//! [`TestRunner`] drives one run through its steps:
//! - latency probe, download, upload, strictly one after the other
//! - the datagram exchange session, which owns the rest of the run
//! - finalization: persist the record, release the in-flight flag, add the
//!   run to the local history
//!
//! A run dropped before finalization still releases the flag.
//!
//! The in-flight flag and the history live in a [`SessionContext`] that is
//! passed in rather than held globally.

use crate::client::{
    ExchangeSession, HttpClient, HttpSignaler, HttpUtils, LatencyProbe, SessionConfig, SessionReport, TerminalReason,
};
use crate::defaults;
use crate::error::{AppError, Result};
use crate::logging;
use crate::models::{Config, MeasurementRun};
use crate::realtime::{RealtimeTransport, UdpTransport};
use crate::stats::LatencySummary;
use crate::types::{StepStatus, SubTest, TestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Everything known about one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run: MeasurementRun,
    pub steps: Vec<StepStatus>,
    pub latency_summary: Option<LatencySummary>,
    pub session: Option<SessionReport>,
    /// Id assigned by the server's result store
    pub saved_id: Option<String>,
    pub share_link: Option<String>,
    /// Why persisting failed; local results are unaffected
    pub persist_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn step(&self, step: SubTest) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.step == step)
    }
}

/// Partial results handed to finalization
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: MeasurementRun,
    pub steps: Vec<StepStatus>,
    pub latency_summary: Option<LatencySummary>,
    pub session: Option<SessionReport>,
    pub started_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self {
            run: MeasurementRun::new(),
            steps: Vec::new(),
            latency_summary: None,
            session: None,
            started_at: Utc::now(),
        }
    }
}

impl Default for RunOutcome {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    InProgress { run_id: Uuid },
    Finalizing { run_id: Uuid },
}

/// Per-client mutable state: the single in-flight flag and the bounded history
pub struct SessionContext {
    state: Mutex<RunState>,
    history: Mutex<VecDeque<RunReport>>,
    capacity: usize,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_capacity(defaults::HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        // A poisoned flag is still a valid flag
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<RunReport>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> RunState {
        *self.lock_state()
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state(), RunState::Idle)
    }

    /// Check-and-set the in-flight flag; fails while another run is active
    pub fn begin(&self) -> Result<Uuid> {
        let mut state = self.lock_state();
        if let RunState::InProgress { run_id } | RunState::Finalizing { run_id } = *state {
            return Err(AppError::test_execution(format!("run {} is still in progress", run_id)));
        }

        let run_id = Uuid::new_v4();
        *state = RunState::InProgress { run_id };
        Ok(run_id)
    }

    /// Claim the right to finalize `run_id`. Only the first caller gets it.
    fn claim_finalization(&self, run_id: Uuid) -> bool {
        let mut state = self.lock_state();
        match *state {
            RunState::InProgress { run_id: active } if active == run_id => {
                *state = RunState::Finalizing { run_id };
                true
            }
            _ => false,
        }
    }

    /// Record the finished run and release the flag
    fn complete(&self, report: RunReport) {
        {
            let mut history = self.lock_history();
            history.push_front(report);
            history.truncate(self.capacity);
        }
        *self.lock_state() = RunState::Idle;
    }

    /// Drop the flag of a run that never reached `complete`
    fn abandon(&self, run_id: Uuid) {
        let mut state = self.lock_state();
        if let RunState::InProgress { run_id: active } | RunState::Finalizing { run_id: active } = *state {
            if active == run_id {
                warn!(%run_id, "Run abandoned before it finished");
                *state = RunState::Idle;
            }
        }
    }

    /// Completed runs, most recent first
    pub fn history(&self) -> Vec<RunReport> {
        self.lock_history().iter().cloned().collect()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the in-flight flag when a run future is dropped midway
struct InFlight<'a> {
    context: &'a SessionContext,
    run_id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.context.abandon(self.run_id);
    }
}

type TransportFactory = Box<dyn Fn() -> Box<dyn RealtimeTransport> + Send + Sync>;

/// Runs measurement cycles against one server
pub struct TestRunner {
    config: Arc<Config>,
    client: Arc<dyn HttpClient>,
    context: Arc<SessionContext>,
    transports: TransportFactory,
}

impl TestRunner {
    /// Runner using the UDP transport towards the client's server
    pub fn new(config: Arc<Config>, client: Arc<dyn HttpClient>, context: Arc<SessionContext>) -> Self {
        let server_url = client.base_url().clone();
        let port_range = config.udp_port_range();
        let gather_timeout = config.gather_timeout();

        Self {
            config,
            client,
            context,
            transports: Box::new(move || {
                Box::new(UdpTransport::new(server_url.clone(), port_range, gather_timeout)) as Box<dyn RealtimeTransport>
            }),
        }
    }

    /// Replace the real-time transport, e.g. with an in-process fake
    pub fn with_transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RealtimeTransport> + Send + Sync + 'static,
    {
        self.transports = Box::new(factory);
        self
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Run `repeat` cycles back to back
    pub async fn run(&self, repeat: u32) -> Result<Vec<RunReport>> {
        let mut reports = Vec::with_capacity(repeat as usize);
        for i in 0..repeat.max(1) {
            debug!(iteration = i + 1, total = repeat, "Starting measurement run");
            reports.push(self.run_once().await?);
        }
        Ok(reports)
    }

    /// One full cycle. Sub-test failures never fail the run; only a run
    /// already in progress does.
    pub async fn run_once(&self) -> Result<RunReport> {
        let run_id = self.context.begin()?;
        let _in_flight = InFlight {
            context: self.context.as_ref(),
            run_id,
        };
        let span = logging::run_span(&run_id);

        async {
            info!(server = %self.client.base_url(), "Measurement run started");
            let outcome = self.measure().await;
            self.finalize(run_id, outcome)
                .await
                .ok_or_else(|| AppError::internal("run was finalized twice"))
        }
        .instrument(span)
        .await
    }

    async fn measure(&self) -> RunOutcome {
        let mut outcome = RunOutcome::new();
        let client = self.client.as_ref();

        match LatencyProbe::from_config(&self.config).run(client).await {
            Ok(latency) => {
                outcome.run.set_latency(Some(latency.mean_ms()));
                outcome.latency_summary = latency.summary();
                outcome.steps.push(StepStatus::success(SubTest::Latency));
            }
            Err(e) => outcome.steps.push(failed(SubTest::Latency, &e)),
        }

        match client.download(self.config.download_size_mb).await {
            Ok(transfer) => {
                outcome.run.set_download(transfer.mbps());
                outcome.steps.push(StepStatus::success(SubTest::Download));
            }
            Err(e) => outcome.steps.push(failed(SubTest::Download, &e)),
        }

        match client.upload(self.config.upload_size_mb).await {
            Ok(transfer) => {
                outcome.run.set_upload(transfer.mbps());
                outcome.steps.push(StepStatus::success(SubTest::Upload));
            }
            Err(e) => outcome.steps.push(failed(SubTest::Upload, &e)),
        }

        let mut transport = (self.transports)();
        let signaler = HttpSignaler::new(client);
        let session = ExchangeSession::new(SessionConfig::from_config(&self.config))
            .run(transport.as_mut(), &signaler)
            .await;

        if let Some(analysis) = &session.analysis {
            outcome.run.set_jitter(Some(analysis.jitter_ms));
            outcome.run.set_packet_loss(analysis.packet_loss_pct);
        }
        outcome.steps.push(match &session.reason {
            TerminalReason::SetupFailed(detail) => {
                StepStatus::with_status(SubTest::Exchange, TestStatus::SetupFailed, detail.clone())
            }
            TerminalReason::ConnectivityFailed(detail) => {
                StepStatus::with_status(SubTest::Exchange, TestStatus::TransportFailed, detail.clone())
            }
            _ => StepStatus::success(SubTest::Exchange),
        });
        outcome.session = Some(session);

        outcome
    }

    /// Finalize a run exactly once: persist, record history, release the flag.
    ///
    /// Any later call for the same run is a no-op returning `None`.
    pub async fn finalize(&self, run_id: Uuid, outcome: RunOutcome) -> Option<RunReport> {
        if !self.context.claim_finalization(run_id) {
            debug!(%run_id, "Run already finalized");
            return None;
        }

        let (saved_id, persist_error) = if self.config.save_results && outcome.run.has_any_measurement() {
            match self.client.save_result(&outcome.run).await {
                Ok(id) => (Some(id), None),
                Err(e) => {
                    warn!(error = %e, "Result not persisted");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };
        let share_link = saved_id
            .as_deref()
            .map(|id| HttpUtils::share_link(self.client.base_url(), id));

        let report = RunReport {
            run_id,
            run: outcome.run,
            steps: outcome.steps,
            latency_summary: outcome.latency_summary,
            session: outcome.session,
            saved_id,
            share_link,
            persist_error,
            started_at: outcome.started_at,
            finished_at: Utc::now(),
        };

        info!(
            measured = report.run.measured_count(),
            saved = report.saved_id.is_some(),
            "Measurement run finalized"
        );
        self.context.complete(report.clone());
        Some(report)
    }
}

fn failed(step: SubTest, error: &AppError) -> StepStatus {
    warn!(step = %step, error = %error, "Sub-test failed");
    StepStatus::failed(step, error)
}
