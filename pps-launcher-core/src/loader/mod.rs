//! Loader utilities for pps-launcher-core.
//!
//! Responsibilities:
//! - Detect whether namespace bytes are a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//! - Compile a Wasmtime `Module` from the resulting WASM bytes.
//!
//! Sources do not always carry a trustworthy extension (the libretro ROM path, for one),
//! so we sniff the bytes themselves.

use std::borrow::Cow;

use thiserror::Error;
use wasmtime::{Engine, Module};

use crate::error::BoxError;

/// Error returned by loader helpers.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized module format (expected wasm or wat)")]
    UnrecognizedFormat,

    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),

    #[error("failed to compile WASM module: {0}")]
    CompileFailed(#[source] BoxError),
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModuleFormat {
    Wasm,
    Wat,
}

impl ModuleFormat {
    /// Best-effort detection.
    ///
    /// - The first 4 bytes being `\0asm` means WASM.
    /// - Otherwise, after skipping a UTF-8 BOM, whitespace and comments, a `(` means WAT.
    ///
    /// WAT detection does not require valid UTF-8; `wat::parse_bytes` accepts bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\0asm") {
            return Some(ModuleFormat::Wasm);
        }

        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match skip_trivia(body)?.first() {
            Some(b'(') => Some(ModuleFormat::Wat),
            _ => None,
        }
    }
}

/// Skip leading whitespace, `;;` line comments and nested `(; ;)` block comments.
///
/// `None` if a block comment is never closed.
fn skip_trivia(mut rest: &[u8]) -> Option<&[u8]> {
    loop {
        match rest {
            [b' ' | b'\t' | b'\r' | b'\n', tail @ ..] => rest = tail,
            [b';', b';', tail @ ..] => {
                rest = match tail.iter().position(|&b| b == b'\n') {
                    Some(end) => &tail[end + 1..],
                    None => &[],
                };
            }
            [b'(', b';', tail @ ..] => rest = skip_block_comment(tail)?,
            _ => return Some(rest),
        }
    }
}

/// `rest` starts just inside a block comment; returns what follows its closing `;)`.
fn skip_block_comment(mut rest: &[u8]) -> Option<&[u8]> {
    let mut depth = 1usize;
    while depth > 0 {
        match rest {
            [b'(', b';', tail @ ..] => {
                depth += 1;
                rest = tail;
            }
            [b';', b')', tail @ ..] => {
                depth -= 1;
                rest = tail;
            }
            [_, tail @ ..] => rest = tail,
            [] => return None,
        }
    }
    Some(rest)
}

/// Detect format and normalize to WASM bytes, borrowing when no conversion is needed.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<(ModuleFormat, Cow<'_, [u8]>), LoadError> {
    let format = ModuleFormat::sniff(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    let wasm = match format {
        ModuleFormat::Wasm => Cow::Borrowed(bytes),
        ModuleFormat::Wat => Cow::Owned(wat::parse_bytes(bytes)?.into_owned()),
    };

    Ok((format, wasm))
}

/// Load: detect -> (optional) wat->wasm -> compile.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let (format, wasm) = normalize_to_wasm(bytes)?;
    tracing::debug!(?format, len = wasm.len(), "compiling guest module");
    Module::new(engine, &wasm).map_err(|e| LoadError::CompileFailed(e.into()))
}
