//! Host import definitions.
//!
//! All imports live under module `"env"` (see [`crate::abi::IMPORT_MODULE`]).

use crate::abi::{ABI_VERSION, IMPORT_MODULE, MEMORY, host_imports};

use wasmtime::{Caller, Linker};

use super::HostState;

/// Longest guest log line the host will copy out of guest memory.
pub const MAX_LOG_BYTES: u32 = 4096;

/// Define all host imports expected by guests.
///
/// Must be called before instantiating any namespace.
pub fn define_imports(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::ABI_VERSION,
        |_caller: Caller<'_, HostState>| -> u32 { ABI_VERSION },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::LOG,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| {
            let memory = caller.get_export(MEMORY).and_then(|e| e.into_memory());
            let Some(memory) = memory else {
                tracing::warn!(target: "guest", "pps_log called without an exported memory");
                return;
            };

            let mut buf = vec![0u8; len.min(MAX_LOG_BYTES) as usize];
            if memory.read(&caller, ptr as usize, &mut buf).is_err() {
                tracing::warn!(target: "guest", ptr, len, "pps_log range is out of bounds");
                return;
            }

            let line = String::from_utf8_lossy(&buf).into_owned();
            tracing::info!(target: "guest", "{line}");
            caller.data_mut().push_log(line);
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::MILLIS,
        |caller: Caller<'_, HostState>| -> u64 { caller.data().millis() },
    )?;

    Ok(())
}
