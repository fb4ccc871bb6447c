//! pps-launcher ABI module
//!
//! This module defines the contract between:
//! - **Host**: `pps-launcher-core` (the shell that owns the lifecycle)
//! - **Guest**: a namespace compiled to WASM that defines the application object
//!
//! ## Application objects
//! The entry symbol (a global or a zero-argument function export) yields an `i32`
//! address into the guest's exported `memory`. At that address the guest places an
//! [`ObjectHeader`]:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | magic, the bytes `PPSA`                  |
//! | 4      | 4    | ABI version (`u32`, little endian)      |
//! | 8      | 4    | `initialize` function table index       |
//! | 12     | 4    | `render` function table index           |
//! | 16     | 4    | `pause` function table index            |
//! | 20     | 4    | `resume` function table index           |
//! | 24     | 4    | `dispose` function table index          |
//!
//! Table indices refer to the guest's exported function table (see [`FUNCTION_TABLE`]).
//! A slot holding 0 means the capability is absent. Every method receives the object
//! address as its first argument.
//!
//! ## Imports (guest -> host)
//! Imported from module `"env"`:
//! - `pps_abi_version() -> i32`
//! - `pps_log(ptr: i32, len: i32)`
//! - `pps_millis() -> i64`
//!
//! ## ABI Stability
//! Incompatible changes bump [`ABI_VERSION`]. The adapter refuses objects that report a
//! different version.

use core::fmt;

/// Current ABI version expected by the host.
pub const ABI_VERSION: u32 = 1;

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Linear memory export holding application objects.
pub const MEMORY: &str = "memory";

/// Function table export holding capability methods.
///
/// This is the name `wasm-ld` uses with `--export-table`. When absent, the adapter falls
/// back to the single exported table, if there is exactly one.
pub const FUNCTION_TABLE: &str = "__indirect_function_table";

/// Namespace required at launch unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "pps-physics.core";

/// Entry symbol resolved at launch unless configured otherwise.
pub const DEFAULT_ENTRY_SYMBOL: &str = "pps-physics-game";

/// Host import names provided to the guest under [`IMPORT_MODULE`].
pub mod host_imports {
    pub const ABI_VERSION: &str = "pps_abi_version";
    pub const LOG: &str = "pps_log";
    pub const MILLIS: &str = "pps_millis";
}

/// Magic bytes at the start of every application object.
pub const OBJECT_MAGIC: [u8; 4] = *b"PPSA";

/// Size in bytes of [`ObjectHeader`] in guest memory.
pub const HEADER_LEN: usize = 28;

/// The fixed capability set the host drives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    Initialize,
    Render,
    Pause,
    Resume,
    Dispose,
}

impl Capability {
    /// All capabilities, in header slot order.
    pub const ALL: [Capability; 5] = [
        Capability::Initialize,
        Capability::Render,
        Capability::Pause,
        Capability::Resume,
        Capability::Dispose,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Capability::Initialize => "initialize",
            Capability::Render => "render",
            Capability::Pause => "pause",
            Capability::Resume => "resume",
            Capability::Dispose => "dispose",
        }
    }

    /// Byte offset of this capability's table index inside the header.
    pub const fn slot_offset(self) -> usize {
        8 + 4 * (self as usize)
    }

    /// Guest-side signature, for diagnostics.
    pub const fn signature(self) -> &'static str {
        match self {
            Capability::Render => "(i32, f32) -> ()",
            _ => "(i32) -> ()",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded application object header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectHeader {
    pub version: u32,
    /// Function table indices in [`Capability::ALL`] order.
    pub slots: [u32; 5],
}

/// Why a block of guest memory is not an application object header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HeaderError {
    TooShort(usize),
    BadMagic([u8; 4]),
}

impl ObjectHeader {
    /// Decode a header from raw guest bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderError::TooShort(bytes.len()));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != OBJECT_MAGIC {
            return Err(HeaderError::BadMagic(magic));
        }

        let word = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        let mut slots = [0u32; 5];
        for cap in Capability::ALL {
            slots[cap as usize] = word(cap.slot_offset());
        }

        Ok(Self {
            version: word(4),
            slots,
        })
    }

    /// Table index for a capability; `None` when the slot is empty.
    pub fn slot(&self, cap: Capability) -> Option<u32> {
        match self.slots[cap as usize] {
            0 => None,
            index => Some(index),
        }
    }
}
