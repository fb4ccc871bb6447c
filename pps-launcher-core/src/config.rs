//! Launch configuration.
//!
//! The core reads no files or environment; hosts build a [`LaunchConfig`] (the defaults
//! carry the fixed `pps-physics.core` / `pps-physics-game` names) and the headless runner
//! maps its command line onto one.

use crate::abi::{DEFAULT_ENTRY_SYMBOL, DEFAULT_NAMESPACE};
use crate::namespace::{NamespaceError, NamespaceReference};

/// Settings for the embedded Wasmtime runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Enable the post-MVP proposals (SIMD, GC, threads, exceptions, ...) so modules from
    /// most guest toolchains validate.
    pub wasm_proposals: bool,

    /// Fuel granted before every call into the guest. `None` disables metering.
    pub fuel_per_call: Option<u64>,

    /// How many guest log lines the host retains; older lines are dropped first.
    pub guest_log_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wasm_proposals: true,
            fuel_per_call: None,
            guest_log_capacity: 1024,
        }
    }
}

/// What to load and which entry symbol yields the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub namespace: NamespaceReference,
    pub entry_symbol: String,
    pub runtime: RuntimeConfig,
}

impl LaunchConfig {
    pub fn new(namespace: &str, entry_symbol: &str) -> Result<Self, NamespaceError> {
        if entry_symbol.is_empty() {
            return Err(NamespaceError::EmptySymbol);
        }

        Ok(Self {
            namespace: NamespaceReference::new(namespace)?,
            entry_symbol: entry_symbol.to_string(),
            runtime: RuntimeConfig::default(),
        })
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_fuel(mut self, fuel_per_call: u64) -> Self {
        self.runtime.fuel_per_call = Some(fuel_per_call);
        self
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            namespace: NamespaceReference::new_unchecked(DEFAULT_NAMESPACE),
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
            runtime: RuntimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_name_the_physics_game() {
        let config = LaunchConfig::default();
        assert_eq!(config.namespace.as_str(), "pps-physics.core");
        assert_eq!(config.entry_symbol, "pps-physics-game");
        assert_eq!(config.runtime.fuel_per_call, None);
    }

    #[test]
    fn default_namespace_is_valid() {
        assert_eq!(
            NamespaceReference::new(DEFAULT_NAMESPACE).unwrap(),
            LaunchConfig::default().namespace
        );
    }

    #[test]
    fn new_validates_names() {
        assert_eq!(
            LaunchConfig::new("pps-physics.core", ""),
            Err(NamespaceError::EmptySymbol)
        );
        assert_eq!(
            LaunchConfig::new("", "pps-physics-game"),
            Err(NamespaceError::Empty)
        );
        let config = LaunchConfig::new("demo.app", "main-game")
            .unwrap()
            .with_fuel(10_000);
        assert_eq!(config.runtime.fuel_per_call, Some(10_000));
    }
}
