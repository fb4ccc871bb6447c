//! The bootstrap pipeline: load → resolve → invoke → adapt → forward.
//!
//! A [`Bootstrap`] runs at most once. Each stage either advances the state machine or
//! moves it to [`BootstrapState::Failed`]; later stages never run after a failure.

use std::fmt;

use crate::adapter;
use crate::config::LaunchConfig;
use crate::error::{BootstrapError, BootstrapResult};
use crate::lifecycle::{self, Application, HostContext};
use crate::namespace::NamespaceSource;
use crate::runtime::RuntimeHandle;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    Uninitialized,
    Loading,
    Resolving,
    Invoking,
    Adapting,
    Forwarded,
    Failed,
}

impl BootstrapState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BootstrapState::Forwarded | BootstrapState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::Loading => "loading",
            BootstrapState::Resolving => "resolving",
            BootstrapState::Invoking => "invoking",
            BootstrapState::Adapting => "adapting",
            BootstrapState::Forwarded => "forwarded",
            BootstrapState::Failed => "failed",
        }
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a native application directly.
pub type NativeFactory = Box<dyn FnOnce() -> Box<dyn Application>>;

/// Where the application object comes from.
pub enum Launch {
    /// Look the object up by name in a guest namespace.
    Guest {
        config: LaunchConfig,
        source: Box<dyn NamespaceSource>,
    },
    /// A statically typed application; resolution and adaptation are skipped.
    Native(NativeFactory),
}

impl Launch {
    pub fn guest(config: LaunchConfig, source: impl NamespaceSource + 'static) -> Self {
        Launch::Guest {
            config,
            source: Box::new(source),
        }
    }

    pub fn native<A, F>(factory: F) -> Self
    where
        A: Application + 'static,
        F: FnOnce() -> A + 'static,
    {
        Launch::Native(Box::new(move || Box::new(factory()) as Box<dyn Application>))
    }
}

impl fmt::Debug for Launch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launch::Guest { config, .. } => f
                .debug_struct("Guest")
                .field("config", config)
                .finish_non_exhaustive(),
            Launch::Native(_) => f.write_str("Native"),
        }
    }
}

/// One run of the bootstrap state machine.
#[derive(Debug)]
pub struct Bootstrap {
    state: BootstrapState,
    history: Vec<BootstrapState>,
    failed_at: Option<BootstrapState>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            state: BootstrapState::Uninitialized,
            history: vec![BootstrapState::Uninitialized],
            failed_at: None,
        }
    }
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[BootstrapState] {
        &self.history
    }

    /// The stage that was running when the bootstrap failed.
    pub fn failed_at(&self) -> Option<BootstrapState> {
        self.failed_at
    }

    fn enter(&mut self, next: BootstrapState) {
        tracing::debug!(from = %self.state, to = %next, "bootstrap stage");
        self.state = next;
        self.history.push(next);
    }

    /// Run the pipeline and forward the resulting application to `host`.
    ///
    /// `runtime` is the shell's runtime slot. It is filled on the first guest launch and
    /// reused afterwards; on failure whatever was created stays there. When the slot is
    /// already filled, a guest launch's source and runtime config are not used: the
    /// namespace is required from the existing runtime.
    pub fn launch<H: HostContext + ?Sized>(
        &mut self,
        runtime: &mut Option<RuntimeHandle>,
        launch: Launch,
        host: &mut H,
    ) -> BootstrapResult<()> {
        if self.state != BootstrapState::Uninitialized {
            return Err(BootstrapError::AlreadyStarted { state: self.state });
        }

        let app = match launch {
            Launch::Guest { config, source } => self.run_guest(runtime, config, source),
            Launch::Native(factory) => {
                tracing::info!("launching native application");
                Ok(factory())
            }
        };

        match app {
            Ok(app) => {
                lifecycle::forward(host, app);
                self.enter(BootstrapState::Forwarded);
                Ok(())
            }
            Err(e) => {
                self.failed_at = Some(self.state);
                self.enter(BootstrapState::Failed);
                Err(e)
            }
        }
    }

    fn run_guest(
        &mut self,
        runtime: &mut Option<RuntimeHandle>,
        config: LaunchConfig,
        source: Box<dyn NamespaceSource>,
    ) -> BootstrapResult<Box<dyn Application>> {
        let LaunchConfig {
            namespace,
            entry_symbol,
            runtime: runtime_config,
        } = config;

        self.enter(BootstrapState::Loading);
        let rt = match runtime {
            Some(rt) => {
                tracing::debug!(
                    %namespace,
                    "reusing existing runtime; launch source and runtime config ignored"
                );
                rt.clone()
            }
            None => {
                let rt = RuntimeHandle::new(&runtime_config, source)?;
                *runtime = Some(rt.clone());
                rt
            }
        };
        rt.require(&namespace)?;

        self.enter(BootstrapState::Resolving);
        let entry = rt.resolve(&namespace, &entry_symbol)?;

        self.enter(BootstrapState::Invoking);
        let value = rt.invoke(&entry)?;
        tracing::debug!(symbol = %entry_symbol, value = %value, "entry invoked");

        self.enter(BootstrapState::Adapting);
        let app = adapter::adapt(&rt, &entry, value)?;
        tracing::info!(
            %namespace,
            symbol = %entry_symbol,
            address = app.address(),
            "application adapted"
        );

        Ok(Box::new(app))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lifecycle::tests::Recorder;
    use crate::lifecycle::{GameLoop, LoopPhase};
    use crate::namespace::MemorySource;
    use BootstrapState::*;

    const CONFORMING: &str = include_str!("../../tests/fixtures/conforming.wat");

    fn source() -> MemorySource {
        MemorySource::new().with(LaunchConfig::default().namespace, CONFORMING)
    }

    #[test]
    fn conforming_guest_walks_every_stage() {
        let mut boot = Bootstrap::new();
        let mut runtime = None;
        let mut game = GameLoop::new();

        let launch = Launch::guest(LaunchConfig::default(), source());
        boot.launch(&mut runtime, launch, &mut game).unwrap();

        assert_eq!(
            boot.history(),
            [Uninitialized, Loading, Resolving, Invoking, Adapting, Forwarded]
        );
        assert_eq!(game.phase(), LoopPhase::Running);
        assert!(runtime.is_some());
    }

    #[test]
    fn failure_records_the_stage() {
        let mut boot = Bootstrap::new();
        let mut runtime = None;
        let mut game = GameLoop::new();
        let config = LaunchConfig::new("pps-physics.core", "no-such-game").unwrap();

        let err = boot
            .launch(&mut runtime, Launch::guest(config, source()), &mut game)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
        assert_eq!(boot.failed_at(), Some(Resolving));
        assert_eq!(boot.state(), Failed);
        assert!(!game.has_application());
    }

    #[test]
    fn a_bootstrap_runs_once() {
        let mut boot = Bootstrap::new();
        let mut runtime = None;
        let mut game = GameLoop::new();
        let app = Recorder::default();

        let native = app.clone();
        boot.launch(&mut runtime, Launch::native(move || native), &mut game)
            .unwrap();
        let err = boot
            .launch(&mut runtime, Launch::native(Recorder::default), &mut game)
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::AlreadyStarted { state: Forwarded }
        ));
        assert_eq!(app.calls(), ["initialize"]);
        assert!(runtime.is_none());
    }

    #[test]
    fn native_launch_skips_guest_stages() {
        let mut boot = Bootstrap::new();
        let mut runtime = None;
        let mut game = GameLoop::new();

        boot.launch(&mut runtime, Launch::native(Recorder::default), &mut game)
            .unwrap();

        assert_eq!(boot.history(), [Uninitialized, Forwarded]);
        assert!(game.has_application());
    }

    #[test]
    fn existing_runtime_is_reused() {
        let mut runtime = None;
        let mut game = GameLoop::new();
        let launch = Launch::guest(LaunchConfig::default(), source());
        Bootstrap::new()
            .launch(&mut runtime, launch, &mut game)
            .unwrap();
        let first = runtime.clone().unwrap();

        // A fresh bootstrap against the same runtime does not load the namespace again.
        let mut other = GameLoop::new();
        Bootstrap::new()
            .launch(
                &mut runtime,
                Launch::guest(LaunchConfig::default(), MemorySource::new()),
                &mut other,
            )
            .unwrap();

        let loads = first.guest_log().iter().filter(|l| *l == "loaded").count();
        assert_eq!(loads, 1);
        assert!(other.has_application());
        // The empty source of the second launch was never consulted.
        assert!(first.is_required(&LaunchConfig::default().namespace));
    }
}
