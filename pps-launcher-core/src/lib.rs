//! pps-launcher-core: boots a `pps-physics` application object out of a WASM guest and
//! hands it the host lifecycle.
//!
//! The bootstrap runs once, on the host's creation callback:
//! 1. bring up the Wasmtime runtime and require namespace `pps-physics.core`
//!    (instantiation runs its start function),
//! 2. resolve the export `pps-physics-game`,
//! 3. invoke it (read the global, or call the zero-argument accessor),
//! 4. adapt the value to the [`Application`] capability set
//!    (initialize / render / pause / resume / dispose),
//! 5. forward it to the host loop.
//!
//! Any failure is logged, kept on the [`HostShell`] and otherwise contained: the shell
//! stays alive and ignores further lifecycle callbacks.
//!
//! Everything runs synchronously on the callback thread. Compiling the guest can take
//! noticeable time on first launch.
//!
//! The guest object layout and imports are described in [`abi`] and mirrored by
//! `pps-launcher-sdk`.
//!
//! This crate is also a libretro core: the "ROM" is the guest module, registered under
//! the configured namespace.

pub mod abi;
pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod namespace;
pub mod report;
pub mod runtime;
pub mod shell;

pub use crate::adapter::GuestApplication;
pub use crate::bootstrap::{Bootstrap, BootstrapState, Launch};
pub use crate::config::{LaunchConfig, RuntimeConfig};
pub use crate::error::{BootstrapError, BootstrapResult, ErrorKind};
pub use crate::lifecycle::{Application, GameLoop, HostContext};
pub use crate::namespace::{DirectorySource, MemorySource, NamespaceReference, NamespaceSource};
pub use crate::report::FailureReport;
pub use crate::runtime::{GuestValue, RuntimeHandle};
pub use crate::shell::{HostShell, LaunchOutcome};

use libretro_backend::{AudioVideoInfo, Core, CoreInfo, GameData, LoadGameResult, libretro_core};

/// Nominal frame time handed to `render` on every libretro frame.
pub const FRAME_SECONDS: f32 = 1.0 / 60.0;

/// The libretro core instance.
#[derive(Default)]
pub struct PpsLauncherCore {
    config: LaunchConfig,
    shell: Option<HostShell>,
    game_data: Option<GameData>,
}

impl PpsLauncherCore {
    /// The shell of the loaded game, if any.
    pub fn shell(&self) -> Option<&HostShell> {
        self.shell.as_ref()
    }
}

impl Core for PpsLauncherCore {
    fn save_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn rtc_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn system_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn video_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn info() -> CoreInfo {
        CoreInfo::new("pps-launcher", env!("CARGO_PKG_VERSION"))
            .supports_roms_with_extension("wasm")
            .supports_roms_with_extension("wat")
    }

    fn on_load_game(&mut self, game_data: GameData) -> LoadGameResult {
        let Some(bytes) = game_data.data().map(<[u8]>::to_vec) else {
            tracing::error!("game has no data; the core needs the guest module in memory");
            return LoadGameResult::Failed(game_data);
        };
        self.game_data = Some(game_data);

        let source = MemorySource::new().with(self.config.namespace.clone(), bytes);
        let mut shell = HostShell::new(Launch::guest(self.config.clone(), source));

        // A failed bootstrap has already been reported; the core stays loaded but inert.
        if let LaunchOutcome::Failed(report) = shell.on_create(None) {
            tracing::debug!(stage = %report.stage, "core running without an application");
        }
        self.shell = Some(shell);

        LoadGameResult::Success(AudioVideoInfo::new())
    }

    fn on_unload_game(&mut self) -> GameData {
        if let Some(mut shell) = self.shell.take() {
            shell.on_destroy();
        }

        self.game_data
            .take()
            .expect("on_unload_game called without a loaded game")
    }

    fn on_run(&mut self, _handle: &mut libretro_backend::RuntimeHandle) {
        if let Some(shell) = &mut self.shell {
            shell.on_frame(FRAME_SECONDS);
        }
    }

    fn on_reset(&mut self) {
        if let Some(shell) = &mut self.shell {
            shell.on_pause();
            shell.on_resume();
        }
    }
}

libretro_core!(PpsLauncherCore);
