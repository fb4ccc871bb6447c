//! The host shell: the object the platform talks to.
//!
//! A shell owns the runtime handle, the bootstrap state machine and the host loop. Its
//! creation callback runs the bootstrap exactly once. A failed bootstrap leaves the shell
//! alive but inert: lifecycle callbacks become no-ops and the failure is kept for
//! inspection.

use crate::bootstrap::{Bootstrap, BootstrapState, Launch};
use crate::lifecycle::{GameLoop, HostContext};
use crate::report::{FailureReport, FailureReporter, TracingReporter};
use crate::runtime::RuntimeHandle;

/// What happened when the shell was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The application now receives lifecycle callbacks.
    Forwarded,
    /// Bootstrap failed; the shell is inert.
    Failed(FailureReport),
    /// The shell was already created; nothing was done.
    Ignored,
}

impl LaunchOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, LaunchOutcome::Forwarded)
    }
}

pub struct HostShell<H: HostContext = GameLoop> {
    launch: Option<Launch>,
    bootstrap: Bootstrap,
    runtime: Option<RuntimeHandle>,
    host: H,
    reporter: Box<dyn FailureReporter>,
    failure: Option<FailureReport>,
}

impl HostShell<GameLoop> {
    pub fn new(launch: Launch) -> Self {
        Self::with_host(launch, GameLoop::new())
    }
}

impl<H: HostContext> HostShell<H> {
    pub fn with_host(launch: Launch, host: H) -> Self {
        Self {
            launch: Some(launch),
            bootstrap: Bootstrap::new(),
            runtime: None,
            host,
            reporter: Box::new(TracingReporter),
            failure: None,
        }
    }

    /// Replace the default `tracing` reporter.
    pub fn with_reporter(mut self, reporter: impl FailureReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Platform creation callback. Saved state is accepted but not used.
    pub fn on_create(&mut self, saved_state: Option<&[u8]>) -> LaunchOutcome {
        let Some(launch) = self.launch.take() else {
            tracing::warn!(state = %self.bootstrap.state(), "shell already created, ignoring");
            return LaunchOutcome::Ignored;
        };

        if let Some(state) = saved_state {
            tracing::debug!(bytes = state.len(), "ignoring saved state");
        }

        match self
            .bootstrap
            .launch(&mut self.runtime, launch, &mut self.host)
        {
            Ok(()) => LaunchOutcome::Forwarded,
            Err(e) => {
                let stage = self.bootstrap.failed_at().unwrap_or(self.bootstrap.state());
                let report = FailureReport::new(stage, &e);
                self.reporter.report(&report);
                self.failure = Some(report.clone());
                LaunchOutcome::Failed(report)
            }
        }
    }

    pub fn on_frame(&mut self, delta_seconds: f32) {
        if !self.is_inert() {
            self.host.render(delta_seconds);
        }
    }

    pub fn on_pause(&mut self) {
        if !self.is_inert() {
            self.host.pause();
        }
    }

    pub fn on_resume(&mut self) {
        if !self.is_inert() {
            self.host.resume();
        }
    }

    /// Dispose the application. The runtime handle stays alive until the shell drops.
    pub fn on_destroy(&mut self) {
        if !self.is_inert() {
            self.host.dispose();
        }
    }

    /// True unless an application has been forwarded.
    pub fn is_inert(&self) -> bool {
        self.bootstrap.state() != BootstrapState::Forwarded
    }

    pub fn state(&self) -> BootstrapState {
        self.bootstrap.state()
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    pub fn runtime(&self) -> Option<&RuntimeHandle> {
        self.runtime.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: HostContext + std::fmt::Debug> std::fmt::Debug for HostShell<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostShell")
            .field("bootstrap", &self.bootstrap)
            .field("runtime", &self.runtime)
            .field("host", &self.host)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
