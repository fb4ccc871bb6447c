//! Wasmtime-backed guest runtime.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`/`Store`/`Linker` with feature flags enabled.
//! - Define host imports under module `"env"` matching the guest ABI.
//! - Require namespaces: fetch, compile and instantiate them, at most once each.
//! - Resolve entry symbols and dereference them into [`GuestValue`]s.
//!
//! Everything here is synchronous and runs on the thread that delivered the host
//! callback. Compiling a namespace can take a while; a host that cares about frame
//! latency should drive the bootstrap from a loading screen rather than mid-frame.

pub mod imports;
mod value;

pub use value::GuestValue;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use wasmtime::{Engine, Extern, Func, Global, Instance, Linker, Store, Val};

use crate::config::RuntimeConfig;
use crate::error::{
    BootstrapResult, EntryInvocationError, RuntimeLoadError, SymbolNotFoundError, TypeMismatch,
    TypeMismatchError, Unresolved,
};
use crate::loader;
use crate::namespace::{NamespaceReference, NamespaceSource};

/// Per-store host data visible to import functions.
pub struct HostState {
    started: Instant,
    log: VecDeque<String>,
    log_capacity: usize,
}

impl HostState {
    fn new(log_capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            log: VecDeque::new(),
            log_capacity,
        }
    }

    pub(crate) fn push_log(&mut self, line: String) {
        if self.log_capacity == 0 {
            return;
        }
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Milliseconds since the runtime was created.
    pub(crate) fn millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

struct Inner {
    engine: Engine,
    linker: Linker<HostState>,
    store: RefCell<Store<HostState>>,
    namespaces: RefCell<HashMap<NamespaceReference, Instance>>,
    source: Box<dyn NamespaceSource>,
    fuel_per_call: Option<u64>,
}

/// The initialized guest runtime.
///
/// A host shell creates one of these at most once and keeps it for its whole lifetime.
/// Clones share the same engine, store and required namespaces.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Rc<Inner>,
}

/// What an entry symbol is bound to.
#[derive(Clone, Debug)]
enum Binding {
    Global(Global),
    Func(Func),
    /// Memories, tables and other exports that cannot be dereferenced.
    Other(&'static str),
}

/// A resolved, not yet evaluated, export of a required namespace.
#[derive(Clone, Debug)]
pub struct EntryPointHandle {
    namespace: NamespaceReference,
    symbol: String,
    binding: Binding,
}

impl EntryPointHandle {
    pub fn namespace(&self) -> &NamespaceReference {
        &self.namespace
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Export kind: `"func"`, `"global"`, `"memory"`, ...
    pub fn kind(&self) -> &'static str {
        match self.binding {
            Binding::Global(_) => "global",
            Binding::Func(_) => "func",
            Binding::Other(kind) => kind,
        }
    }
}

fn engine_config(config: &RuntimeConfig) -> wasmtime::Config {
    let mut cfg = wasmtime::Config::new();

    if config.wasm_proposals {
        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);
        cfg.wasm_relaxed_simd(true);
        cfg.wasm_multi_memory(true);
        cfg.wasm_memory64(true);
        cfg.wasm_tail_call(true);
        cfg.wasm_function_references(true);
        cfg.wasm_gc(true);
        cfg.wasm_threads(true);
        cfg.wasm_exceptions(true);
    }

    cfg.consume_fuel(config.fuel_per_call.is_some());
    cfg
}

impl RuntimeHandle {
    /// Bring up the engine and host imports. No namespace is loaded yet.
    pub fn new(
        config: &RuntimeConfig,
        source: impl NamespaceSource + 'static,
    ) -> Result<Self, RuntimeLoadError> {
        let engine = wasmtime::Engine::new(&engine_config(config))
            .map_err(|e| RuntimeLoadError::Engine(e.into()))?;

        let mut linker = Linker::new(&engine);
        imports::define_imports(&mut linker).map_err(|e| RuntimeLoadError::Engine(e.into()))?;

        let store = Store::new(&engine, HostState::new(config.guest_log_capacity));
        tracing::debug!(
            proposals = config.wasm_proposals,
            fuel = ?config.fuel_per_call,
            "guest runtime initialized"
        );

        Ok(Self {
            inner: Rc::new(Inner {
                engine,
                linker,
                store: RefCell::new(store),
                namespaces: RefCell::new(HashMap::new()),
                source: Box::new(source),
                fuel_per_call: config.fuel_per_call,
            }),
        })
    }

    /// Load a namespace so its symbols become resolvable.
    ///
    /// Instantiation runs the module's start function. Requiring a namespace that is
    /// already loaded is a no-op: its start function does not run again.
    pub fn require(&self, namespace: &NamespaceReference) -> Result<(), RuntimeLoadError> {
        if self.is_required(namespace) {
            tracing::debug!(%namespace, "namespace already required");
            return Ok(());
        }

        let started = Instant::now();
        let bytes =
            self.inner
                .source
                .fetch(namespace)
                .map_err(|source| RuntimeLoadError::Source {
                    namespace: namespace.clone(),
                    source,
                })?;

        let module = loader::compile_module(&self.inner.engine, &bytes).map_err(|source| {
            RuntimeLoadError::Compile {
                namespace: namespace.clone(),
                source,
            }
        })?;

        let instance = self
            .with_store(|store| self.inner.linker.instantiate(&mut *store, &module))
            .map_err(|e| RuntimeLoadError::Instantiate {
                namespace: namespace.clone(),
                source: e.into(),
            })?;

        self.inner
            .namespaces
            .borrow_mut()
            .insert(namespace.clone(), instance);

        tracing::info!(
            %namespace,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "namespace required"
        );
        Ok(())
    }

    pub fn is_required(&self, namespace: &NamespaceReference) -> bool {
        self.inner.namespaces.borrow().contains_key(namespace)
    }

    /// Look up an export without evaluating it.
    pub fn resolve(
        &self,
        namespace: &NamespaceReference,
        symbol: &str,
    ) -> Result<EntryPointHandle, SymbolNotFoundError> {
        let not_found = |reason| SymbolNotFoundError {
            namespace: namespace.clone(),
            symbol: symbol.to_string(),
            reason,
        };

        let instance = self
            .instance(namespace)
            .ok_or_else(|| not_found(Unresolved::NamespaceNotRequired))?;

        let export = self.with_store(|store| instance.get_export(&mut *store, symbol));
        let binding = match export {
            Some(Extern::Func(func)) => Binding::Func(func),
            Some(Extern::Global(global)) => Binding::Global(global),
            Some(Extern::Memory(_)) => Binding::Other("memory"),
            Some(Extern::Table(_)) => Binding::Other("table"),
            Some(_) => Binding::Other("export"),
            None => return Err(not_found(Unresolved::UndefinedSymbol)),
        };

        let handle = EntryPointHandle {
            namespace: namespace.clone(),
            symbol: symbol.to_string(),
            binding,
        };
        tracing::debug!(%namespace, symbol, kind = handle.kind(), "symbol resolved");
        Ok(handle)
    }

    /// Dereference an entry point: read a global, or call a zero-argument function.
    pub fn invoke(&self, handle: &EntryPointHandle) -> BootstrapResult<GuestValue> {
        let func = match &handle.binding {
            Binding::Global(global) => {
                return Ok(self.with_store(|store| GuestValue::from_val(&global.get(&mut *store))));
            }
            Binding::Other(kind) => return Ok(GuestValue::Export(*kind)),
            Binding::Func(func) => func,
        };

        self.with_store(|store| -> BootstrapResult<GuestValue> {
            let ty = func.ty(&*store);
            let params = ty.params().len();
            let results = ty.results().len();
            if params != 0 || results > 1 {
                return Err(TypeMismatchError {
                    symbol: handle.symbol.clone(),
                    reason: TypeMismatch::NotAnAccessor { params, results },
                }
                .into());
            }

            let mut out = vec![Val::I32(0); results];
            func.call(&mut *store, &[], &mut out)
                .map_err(|e| EntryInvocationError {
                    symbol: handle.symbol.clone(),
                    source: e.into(),
                })?;

            Ok(out
                .first()
                .map(GuestValue::from_val)
                .unwrap_or(GuestValue::Null))
        })
    }

    /// Guest log lines retained so far, oldest first.
    pub fn guest_log(&self) -> Vec<String> {
        self.inner.store.borrow().data().log.iter().cloned().collect()
    }

    pub(crate) fn instance(&self, namespace: &NamespaceReference) -> Option<Instance> {
        self.inner.namespaces.borrow().get(namespace).copied()
    }

    /// Run `f` against the store, refuelling first when metering is on.
    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&mut Store<HostState>) -> R) -> R {
        let mut store = self.inner.store.borrow_mut();
        if let Some(fuel) = self.inner.fuel_per_call
            && let Err(e) = store.set_fuel(fuel)
        {
            tracing::warn!(error = %e, "failed to refuel guest store");
        }
        f(&mut store)
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespaces = self.inner.namespaces.borrow();
        f.debug_struct("RuntimeHandle")
            .field("namespaces", &namespaces.keys().collect::<Vec<_>>())
            .field("fuel_per_call", &self.inner.fuel_per_call)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use crate::namespace::MemorySource;

    const CONFORMING: &str = include_str!("../../tests/fixtures/conforming.wat");
    const SHAPES: &str = include_str!("../../tests/fixtures/shapes.wat");

    fn ns(name: &str) -> NamespaceReference {
        NamespaceReference::new(name).unwrap()
    }

    fn runtime_with(config: &RuntimeConfig) -> RuntimeHandle {
        let source = MemorySource::new()
            .with(ns("pps-physics.core"), CONFORMING)
            .with(ns("pps-physics.shapes"), SHAPES)
            .with(ns("pps-physics.broken"), "(module (func (result i32) (i64.const 1)))")
            .with(ns("pps-physics.garbage"), "definitely not wasm");
        RuntimeHandle::new(config, source).unwrap()
    }

    fn runtime() -> RuntimeHandle {
        runtime_with(&RuntimeConfig::default())
    }

    #[test]
    fn require_runs_top_level_code_once() {
        let rt = runtime();
        let core = ns("pps-physics.core");

        rt.require(&core).unwrap();
        rt.require(&core).unwrap();

        assert!(rt.is_required(&core));
        let loaded = rt.guest_log().iter().filter(|l| *l == "loaded").count();
        assert_eq!(loaded, 1);
    }

    #[test]
    fn require_reports_missing_and_invalid_modules() {
        let rt = runtime();
        assert!(matches!(
            rt.require(&ns("pps-physics.absent")),
            Err(RuntimeLoadError::Source { .. })
        ));
        assert!(matches!(
            rt.require(&ns("pps-physics.broken")),
            Err(RuntimeLoadError::Compile { .. })
        ));
        assert!(matches!(
            rt.require(&ns("pps-physics.garbage")),
            Err(RuntimeLoadError::Compile { .. })
        ));
        assert!(!rt.is_required(&ns("pps-physics.broken")));
    }

    #[test]
    fn resolve_before_require_is_an_error() {
        let rt = runtime();
        let err = rt
            .resolve(&ns("pps-physics.core"), "pps-physics-game")
            .unwrap_err();
        assert_eq!(err.reason, Unresolved::NamespaceNotRequired);
    }

    #[test]
    fn resolve_undefined_symbol() {
        let rt = runtime();
        let core = ns("pps-physics.core");
        rt.require(&core).unwrap();
        let err = rt.resolve(&core, "no-such-game").unwrap_err();
        assert_eq!(err.reason, Unresolved::UndefinedSymbol);
        assert_eq!(err.symbol, "no-such-game");
    }

    #[test]
    fn invoke_calls_accessors_and_reads_globals() {
        let rt = runtime();
        let shapes = ns("pps-physics.shapes");
        rt.require(&shapes).unwrap();

        let func = rt.resolve(&shapes, "as-integer").unwrap();
        assert_eq!(func.kind(), "func");
        assert_eq!(rt.invoke(&func).unwrap(), GuestValue::I64(42));

        let global = rt.resolve(&shapes, "object-global").unwrap();
        assert_eq!(global.kind(), "global");
        assert_eq!(rt.invoke(&global).unwrap(), GuestValue::I32(1024));

        let null = rt.resolve(&shapes, "null-ref").unwrap();
        assert_eq!(rt.invoke(&null).unwrap(), GuestValue::Null);

        let memory = rt.resolve(&shapes, "memory").unwrap();
        assert_eq!(rt.invoke(&memory).unwrap(), GuestValue::Export("memory"));
    }

    #[test]
    fn invoke_rejects_functions_that_need_arguments() {
        let rt = runtime();
        let shapes = ns("pps-physics.shapes");
        rt.require(&shapes).unwrap();

        let handle = rt.resolve(&shapes, "needs-args").unwrap();
        let err = rt.invoke(&handle).unwrap_err();
        assert_eq!(
            err.mismatch(),
            Some(&TypeMismatch::NotAnAccessor {
                params: 1,
                results: 1
            })
        );
    }

    #[test]
    fn invoke_reports_traps() {
        let rt = runtime();
        let shapes = ns("pps-physics.shapes");
        rt.require(&shapes).unwrap();

        let handle = rt.resolve(&shapes, "traps").unwrap();
        assert!(matches!(
            rt.invoke(&handle),
            Err(BootstrapError::EntryInvocation(_))
        ));
    }

    #[test]
    fn fuel_bounds_runaway_accessors() {
        let rt = runtime_with(&RuntimeConfig {
            fuel_per_call: Some(10_000),
            ..RuntimeConfig::default()
        });
        let shapes = ns("pps-physics.shapes");
        rt.require(&shapes).unwrap();

        let handle = rt.resolve(&shapes, "spins").unwrap();
        assert!(matches!(
            rt.invoke(&handle),
            Err(BootstrapError::EntryInvocation(_))
        ));
    }

    #[test]
    fn guest_log_is_bounded() {
        let mut state = HostState::new(2);
        state.push_log("a".into());
        state.push_log("b".into());
        state.push_log("c".into());
        assert_eq!(state.log, ["b", "c"]);

        let mut silent = HostState::new(0);
        silent.push_log("a".into());
        assert!(silent.log.is_empty());
    }
}
