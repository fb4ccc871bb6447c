#![cfg_attr(not(feature = "std"), no_std)]

//! pps-launcher-sdk
//!
//! Used by **guest** crates that define a pps-physics application and are loaded by
//! `pps-launcher-core`.
//!
//! ABI model:
//! - The guest exports an entry symbol (`pps-physics-game` by default) that returns the
//!   address of an [`ObjectHeader`] in linear memory.
//! - The header carries the magic `PPSA`, the ABI version and five function pointers
//!   (table indices on wasm32): initialize, render, pause, resume, dispose.
//! - The host checks all of this before it calls anything.
//!
//! Guests implement [`Application`] and call [`export_application!`]. The guest must be
//! linked with `--export-table` so the host can see the function table.

use core::cell::UnsafeCell;

/// ABI version this SDK targets. Must match the host.
pub const ABI_VERSION: u32 = 1;

/// Magic bytes at the start of every application object.
pub const OBJECT_MAGIC: [u8; 4] = *b"PPSA";

/// Entry symbol the host resolves unless configured otherwise.
pub const DEFAULT_ENTRY_SYMBOL: &str = "pps-physics-game";

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// The capability set the host drives.
///
/// Only `render` is required; the other callbacks default to doing nothing.
pub trait Application {
    /// Called once, right after the host accepted the object.
    fn initialize(&mut self) {}

    /// Called once per host frame while running.
    fn render(&mut self, delta_seconds: f32);

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    /// Called once; the application is dropped afterwards.
    fn dispose(&mut self) {}
}

/// Capability method taking the object address.
pub type Method = extern "C" fn(this: u32);

/// `render` takes the frame delta in seconds as well.
pub type RenderMethod = extern "C" fn(this: u32, delta_seconds: f32);

/// The in-memory application object the host reads.
#[repr(C)]
pub struct ObjectHeader {
    magic: [u8; 4],
    version: u32,
    initialize: Option<Method>,
    render: Option<RenderMethod>,
    pause: Option<Method>,
    resume: Option<Method>,
    dispose: Option<Method>,
}

// Byte layout the host decodes: magic, version, then one 4-byte table index per method.
#[cfg(target_arch = "wasm32")]
const _: () = {
    use core::mem::{offset_of, size_of};
    assert!(size_of::<ObjectHeader>() == 28);
    assert!(offset_of!(ObjectHeader, version) == 4);
    assert!(offset_of!(ObjectHeader, initialize) == 8);
    assert!(offset_of!(ObjectHeader, render) == 12);
    assert!(offset_of!(ObjectHeader, pause) == 16);
    assert!(offset_of!(ObjectHeader, resume) == 20);
    assert!(offset_of!(ObjectHeader, dispose) == 24);
};

impl ObjectHeader {
    pub const fn new(
        initialize: Method,
        render: RenderMethod,
        pause: Method,
        resume: Method,
        dispose: Method,
    ) -> Self {
        Self {
            magic: OBJECT_MAGIC,
            version: ABI_VERSION,
            initialize: Some(initialize),
            render: Some(render),
            pause: Some(pause),
            resume: Some(resume),
            dispose: Some(dispose),
        }
    }

    /// Address the entry symbol hands to the host.
    pub fn address(&'static self) -> u32 {
        self as *const Self as usize as u32
    }

    pub fn magic(&self) -> [u8; 4] {
        self.magic
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Storage for the single application instance of a guest.
///
/// Empty until `initialize`, emptied again by `dispose`. Calls while empty do nothing.
pub struct AppCell<T> {
    slot: UnsafeCell<Option<T>>,
}

// SAFETY: guests are single-threaded and the host never calls into a guest concurrently.
unsafe impl<T> Sync for AppCell<T> {}

impl<T: Application> AppCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: UnsafeCell::new(None),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn slot(&self) -> &mut Option<T> {
        // SAFETY: see the `Sync` impl; no reference escapes a single host call.
        unsafe { &mut *self.slot.get() }
    }

    /// Construct the application if needed and initialize it.
    pub fn initialize(&self, ctor: impl FnOnce() -> T) {
        let slot = self.slot();
        if slot.is_some() {
            return;
        }
        slot.insert(ctor()).initialize();
    }

    pub fn with(&self, f: impl FnOnce(&mut T)) {
        if let Some(app) = self.slot() {
            f(app);
        }
    }

    /// Dispose and drop the application.
    pub fn dispose(&self) {
        if let Some(mut app) = self.slot().take() {
            app.dispose();
        }
    }

    pub fn is_live(&self) -> bool {
        self.slot().is_some()
    }
}

impl<T: Application> Default for AppCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Export an application object under an entry symbol.
///
/// ```ignore
/// export_application!(Game, Game::new());                 // "pps-physics-game"
/// export_application!("my-game", Game, Game::new());
/// ```
///
/// The constructor runs lazily, on the host's `initialize` call.
#[macro_export]
macro_rules! export_application {
    ($symbol:literal, $ty:ty, $ctor:expr $(,)?) => {
        const _: () = {
            static APP: $crate::AppCell<$ty> = $crate::AppCell::new();

            extern "C" fn initialize(_this: u32) {
                APP.initialize(|| $ctor);
            }

            extern "C" fn render(_this: u32, delta_seconds: f32) {
                APP.with(|app| $crate::Application::render(app, delta_seconds));
            }

            extern "C" fn pause(_this: u32) {
                APP.with($crate::Application::pause);
            }

            extern "C" fn resume(_this: u32) {
                APP.with($crate::Application::resume);
            }

            extern "C" fn dispose(_this: u32) {
                APP.dispose();
            }

            static HEADER: $crate::ObjectHeader =
                $crate::ObjectHeader::new(initialize, render, pause, resume, dispose);

            #[unsafe(export_name = $symbol)]
            pub extern "C" fn entry() -> u32 {
                HEADER.address()
            }
        };
    };
    ($ty:ty, $ctor:expr $(,)?) => {
        $crate::export_application!("pps-physics-game", $ty, $ctor);
    };
}

/// Low-level raw ABI imports.
#[cfg(target_arch = "wasm32")]
pub mod sys {
    unsafe extern "C" {
        #[link_name = "pps_abi_version"]
        pub fn abi_version() -> u32;
        #[link_name = "pps_log"]
        pub fn log(ptr: u32, len: u32);
        #[link_name = "pps_millis"]
        pub fn millis() -> u64;
    }
}

/// System API. Outside wasm32 these are inert so guest logic can be unit tested natively.
#[cfg(target_arch = "wasm32")]
pub mod system {
    use super::sys;

    /// Log a message through the host.
    pub fn log(message: &str) {
        unsafe { sys::log(message.as_ptr() as u32, message.len() as u32) }
    }

    /// Milliseconds since the host runtime started.
    pub fn millis() -> u64 {
        unsafe { sys::millis() }
    }

    /// ABI version the host implements.
    pub fn host_abi_version() -> u32 {
        unsafe { sys::abi_version() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub mod system {
    pub fn log(_message: &str) {}

    pub fn millis() -> u64 {
        0
    }

    pub fn host_abi_version() -> u32 {
        super::ABI_VERSION
    }
}

/// Convenience prelude for guest apps.
pub mod prelude {
    pub use crate::Application;
    pub use crate::export_application;
    pub use crate::system;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        initialized: u32,
        frames: u32,
        paused: bool,
    }

    impl Application for Counter {
        fn initialize(&mut self) {
            self.initialized += 1;
        }

        fn render(&mut self, _delta_seconds: f32) {
            self.frames += 1;
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn resume(&mut self) {
            self.paused = false;
        }
    }

    #[test]
    fn cell_is_empty_until_initialized() {
        let cell = AppCell::<Counter>::new();
        cell.with(|app| app.render(0.016));
        assert!(!cell.is_live());

        cell.initialize(Counter::default);
        cell.initialize(Counter::default);
        cell.with(|app| app.render(0.016));
        cell.with(|app| {
            assert_eq!(app.initialized, 1);
            assert_eq!(app.frames, 1);
        });
    }

    #[test]
    fn dispose_drops_the_application() {
        let cell = AppCell::<Counter>::new();
        cell.initialize(Counter::default);
        cell.with(Application::pause);
        cell.with(|app| assert!(app.paused));

        cell.dispose();
        assert!(!cell.is_live());
        cell.dispose();
    }

    extern "C" fn noop(_this: u32) {}
    extern "C" fn noop_render(_this: u32, _delta_seconds: f32) {}

    #[test]
    fn header_carries_magic_and_version() {
        static HEADER: ObjectHeader = ObjectHeader::new(noop, noop_render, noop, noop, noop);
        assert_eq!(&HEADER.magic(), b"PPSA");
        assert_eq!(HEADER.version(), ABI_VERSION);
        assert!(HEADER.render.is_some());
    }

    #[test]
    fn methods_follow_the_version_in_host_order() {
        use core::mem::{offset_of, size_of};

        let slot = size_of::<Method>();
        assert_eq!(size_of::<Option<Method>>(), slot);
        assert_eq!(size_of::<Option<RenderMethod>>(), slot);

        assert_eq!(offset_of!(ObjectHeader, magic), 0);
        assert_eq!(offset_of!(ObjectHeader, version), 4);
        let methods = [
            offset_of!(ObjectHeader, initialize),
            offset_of!(ObjectHeader, render),
            offset_of!(ObjectHeader, pause),
            offset_of!(ObjectHeader, resume),
            offset_of!(ObjectHeader, dispose),
        ];
        for (i, offset) in methods.into_iter().enumerate() {
            assert_eq!(offset, 8 + i * slot, "method {i}");
        }
        assert_eq!(size_of::<ObjectHeader>(), 8 + 5 * slot);
    }
}
