//! Error taxonomy for the bootstrap pipeline.
//!
//! Each stage has its own error type; [`BootstrapError`] is the union handed to the
//! failure reporter and, from there, to whoever launched the shell.

use thiserror::Error;

use crate::abi::Capability;
use crate::bootstrap::BootstrapState;
use crate::loader::LoadError;
use crate::namespace::{NamespaceReference, SourceError};

/// Boxed error used to carry wasmtime (`anyhow`) failures as a `#[source]`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The runtime could not start, or a namespace failed to load.
#[derive(Debug, Error)]
pub enum RuntimeLoadError {
    #[error("failed to initialize the guest runtime: {0}")]
    Engine(#[source] BoxError),

    #[error("namespace '{namespace}' could not be located: {source}")]
    Source {
        namespace: NamespaceReference,
        #[source]
        source: SourceError,
    },

    #[error("namespace '{namespace}' failed to load: {source}")]
    Compile {
        namespace: NamespaceReference,
        #[source]
        source: LoadError,
    },

    #[error("namespace '{namespace}' failed to instantiate: {source}")]
    Instantiate {
        namespace: NamespaceReference,
        #[source]
        source: BoxError,
    },
}

/// Why a symbol did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// The namespace was never required.
    NamespaceNotRequired,
    /// The namespace is loaded but exports nothing under that name.
    UndefinedSymbol,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Unresolved::NamespaceNotRequired => "namespace has not been required",
            Unresolved::UndefinedSymbol => "no such export",
        })
    }
}

#[derive(Debug, Error)]
#[error("symbol `{symbol}` not found in namespace '{namespace}': {reason}")]
pub struct SymbolNotFoundError {
    pub namespace: NamespaceReference,
    pub symbol: String,
    pub reason: Unresolved,
}

/// Why a value is not an application object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeMismatch {
    #[error("value is null")]
    Null,

    #[error("expected an i32 object address, found {found}")]
    NotAnObject { found: String },

    #[error("entry takes {params} parameter(s) and returns {results} result(s), expected a zero-argument accessor")]
    NotAnAccessor { params: usize, results: usize },

    #[error("guest exports no linear memory to hold objects")]
    NoMemory,

    #[error("address {address:#x} is outside guest memory")]
    OutOfBounds { address: u32 },

    #[error("address {address:#x} does not hold an application object")]
    BadMagic { address: u32 },

    #[error("object ABI version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("object is missing capabilities: {}", capability_list(.missing))]
    MissingCapabilities { missing: Vec<Capability> },
}

fn capability_list(caps: &[Capability]) -> String {
    caps.iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The resolved value does not satisfy the application capability set.
#[derive(Debug, Error)]
#[error("entry `{symbol}` is not an application object: {reason}")]
pub struct TypeMismatchError {
    pub symbol: String,
    #[source]
    pub reason: TypeMismatch,
}

/// The entry accessor trapped.
#[derive(Debug, Error)]
#[error("entry `{symbol}` trapped while being invoked: {source}")]
pub struct EntryInvocationError {
    pub symbol: String,
    #[source]
    pub source: BoxError,
}

/// Any failure that ends a bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    RuntimeLoad(#[from] RuntimeLoadError),

    #[error(transparent)]
    SymbolNotFound(#[from] SymbolNotFoundError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    EntryInvocation(#[from] EntryInvocationError),

    #[error("bootstrap already ran (state: {state:?})")]
    AlreadyStarted { state: BootstrapState },
}

/// Coarse classification of a [`BootstrapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RuntimeLoad,
    SymbolNotFound,
    TypeMismatch,
    EntryInvocation,
    AlreadyStarted,
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BootstrapError::RuntimeLoad(_) => ErrorKind::RuntimeLoad,
            BootstrapError::SymbolNotFound(_) => ErrorKind::SymbolNotFound,
            BootstrapError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            BootstrapError::EntryInvocation(_) => ErrorKind::EntryInvocation,
            BootstrapError::AlreadyStarted { .. } => ErrorKind::AlreadyStarted,
        }
    }

    /// The specific mismatch, when this is a type mismatch.
    pub fn mismatch(&self) -> Option<&TypeMismatch> {
        match self {
            BootstrapError::TypeMismatch(e) => Some(&e.reason),
            _ => None,
        }
    }
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capabilities_are_listed_in_order() {
        let err = TypeMismatch::MissingCapabilities {
            missing: vec![Capability::Render, Capability::Dispose],
        };
        assert_eq!(
            err.to_string(),
            "object is missing capabilities: render, dispose"
        );
    }

    #[test]
    fn symbol_not_found_names_the_reason() {
        let err = SymbolNotFoundError {
            namespace: NamespaceReference::new("pps-physics.core").unwrap(),
            symbol: "pps-physics-game".into(),
            reason: Unresolved::NamespaceNotRequired,
        };
        assert_eq!(
            err.to_string(),
            "symbol `pps-physics-game` not found in namespace 'pps-physics.core': namespace has not been required"
        );
    }

    #[test]
    fn kind_follows_variant() {
        let err: BootstrapError = TypeMismatchError {
            symbol: "pps-physics-game".into(),
            reason: TypeMismatch::Null,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.mismatch(), Some(&TypeMismatch::Null));
        assert_eq!(
            err.to_string(),
            "entry `pps-physics-game` is not an application object: value is null"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BootstrapError>();
    }
}
