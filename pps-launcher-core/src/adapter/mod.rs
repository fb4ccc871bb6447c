//! Interface adapter: the checked downcast from a raw [`GuestValue`] to an
//! [`Application`].
//!
//! The guest gives no static guarantee about what its entry symbol holds, so this is the
//! only place where a dynamic value becomes a typed object. Every step fails closed:
//! null, non-`i32` values, addresses outside memory, foreign data, unknown ABI versions
//! and incomplete capability tables are all rejected.

use wasmtime::{Ref, Store, Table, TypedFunc};

use crate::abi::{
    ABI_VERSION, Capability, FUNCTION_TABLE, HEADER_LEN, HeaderError, MEMORY, ObjectHeader,
};
use crate::error::{TypeMismatch, TypeMismatchError};
use crate::lifecycle::Application;
use crate::runtime::{EntryPointHandle, GuestValue, HostState, RuntimeHandle};

/// An application object living in a guest namespace.
///
/// Holds a clone of the runtime handle so capability calls can reach the store; the
/// runtime itself stays owned by the host shell.
pub struct GuestApplication {
    runtime: RuntimeHandle,
    address: u32,
    initialize: TypedFunc<u32, ()>,
    render: TypedFunc<(u32, f32), ()>,
    pause: TypedFunc<u32, ()>,
    resume: TypedFunc<u32, ()>,
    dispose: TypedFunc<u32, ()>,
}

impl GuestApplication {
    /// Guest address of the object header.
    pub fn address(&self) -> u32 {
        self.address
    }

    fn call(&self, method: &TypedFunc<u32, ()>) -> anyhow::Result<()> {
        self.runtime
            .with_store(|store| method.call(&mut *store, self.address))
    }
}

impl Application for GuestApplication {
    fn initialize(&mut self) -> anyhow::Result<()> {
        self.call(&self.initialize)
    }

    fn render(&mut self, delta_seconds: f32) -> anyhow::Result<()> {
        self.runtime
            .with_store(|store| self.render.call(&mut *store, (self.address, delta_seconds)))
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.call(&self.pause)
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        self.call(&self.resume)
    }

    fn dispose(&mut self) -> anyhow::Result<()> {
        self.call(&self.dispose)
    }
}

impl std::fmt::Debug for GuestApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestApplication")
            .field("address", &format_args!("{:#x}", self.address))
            .finish_non_exhaustive()
    }
}

/// Adapt the value an entry point produced into an application object.
pub fn adapt(
    runtime: &RuntimeHandle,
    entry: &EntryPointHandle,
    value: GuestValue,
) -> Result<GuestApplication, TypeMismatchError> {
    let mismatch = |reason| TypeMismatchError {
        symbol: entry.symbol().to_string(),
        reason,
    };

    let address = match value {
        v if v.is_null() => return Err(mismatch(TypeMismatch::Null)),
        GuestValue::I32(address) => address as u32,
        other => {
            return Err(mismatch(TypeMismatch::NotAnObject {
                found: other.to_string(),
            }));
        }
    };

    let Some(instance) = runtime.instance(entry.namespace()) else {
        // Handles only come out of `resolve`, which requires the namespace.
        return Err(mismatch(TypeMismatch::NoMemory));
    };

    let app = runtime.with_store(|store| -> Result<GuestApplication, TypeMismatch> {
        let memory = instance
            .get_memory(&mut *store, MEMORY)
            .ok_or(TypeMismatch::NoMemory)?;

        let mut bytes = [0u8; HEADER_LEN];
        memory
            .read(&*store, address as usize, &mut bytes)
            .map_err(|_| TypeMismatch::OutOfBounds { address })?;

        let header = ObjectHeader::decode(&bytes).map_err(|e| match e {
            HeaderError::TooShort(_) => TypeMismatch::OutOfBounds { address },
            HeaderError::BadMagic(_) => TypeMismatch::BadMagic { address },
        })?;

        if header.version != ABI_VERSION {
            return Err(TypeMismatch::UnsupportedVersion {
                found: header.version,
                expected: ABI_VERSION,
            });
        }

        let table = function_table(store, &instance);
        let mut methods = CapabilityMethods::default();
        let mut missing = Vec::new();
        for cap in Capability::ALL {
            let bound = table
                .zip(header.slot(cap))
                .is_some_and(|(table, index)| methods.bind(store, &table, cap, index));
            if !bound {
                tracing::debug!(
                    capability = %cap,
                    signature = cap.signature(),
                    "capability unavailable"
                );
                missing.push(cap);
            }
        }

        methods.finish(runtime.clone(), address, missing)
    });

    app.map_err(mismatch)
}

/// The exported function table: the conventional name first, otherwise the only table.
fn function_table(store: &mut Store<HostState>, instance: &wasmtime::Instance) -> Option<Table> {
    if let Some(table) = instance.get_table(&mut *store, FUNCTION_TABLE) {
        return Some(table);
    }

    let tables: Vec<Table> = instance
        .exports(&mut *store)
        .filter_map(|export| export.into_table())
        .collect();

    match tables.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

#[derive(Default)]
struct CapabilityMethods {
    initialize: Option<TypedFunc<u32, ()>>,
    render: Option<TypedFunc<(u32, f32), ()>>,
    pause: Option<TypedFunc<u32, ()>>,
    resume: Option<TypedFunc<u32, ()>>,
    dispose: Option<TypedFunc<u32, ()>>,
}

impl CapabilityMethods {
    /// Look up `index` in the table and check its signature. Returns whether it bound.
    fn bind(
        &mut self,
        store: &mut Store<HostState>,
        table: &Table,
        cap: Capability,
        index: u32,
    ) -> bool {
        let func = match table.get(&mut *store, u64::from(index)) {
            Some(Ref::Func(Some(func))) => func,
            _ => return false,
        };

        let slot = match cap {
            Capability::Render => {
                self.render = func.typed::<(u32, f32), ()>(&*store).ok();
                return self.render.is_some();
            }
            Capability::Initialize => &mut self.initialize,
            Capability::Pause => &mut self.pause,
            Capability::Resume => &mut self.resume,
            Capability::Dispose => &mut self.dispose,
        };
        *slot = func.typed::<u32, ()>(&*store).ok();
        slot.is_some()
    }

    fn finish(
        self,
        runtime: RuntimeHandle,
        address: u32,
        missing: Vec<Capability>,
    ) -> Result<GuestApplication, TypeMismatch> {
        match (self.initialize, self.render, self.pause, self.resume, self.dispose) {
            (Some(initialize), Some(render), Some(pause), Some(resume), Some(dispose)) => {
                Ok(GuestApplication {
                    runtime,
                    address,
                    initialize,
                    render,
                    pause,
                    resume,
                    dispose,
                })
            }
            _ => Err(TypeMismatch::MissingCapabilities { missing }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::namespace::{MemorySource, NamespaceReference};

    const CONFORMING: &str = include_str!("../../tests/fixtures/conforming.wat");
    const SHAPES: &str = include_str!("../../tests/fixtures/shapes.wat");

    fn core_only() -> (RuntimeHandle, NamespaceReference) {
        let core = NamespaceReference::new("pps-physics.core").unwrap();
        let source = MemorySource::new().with(core.clone(), CONFORMING);
        let rt = RuntimeHandle::new(&RuntimeConfig::default(), source).unwrap();
        rt.require(&core).unwrap();
        (rt, core)
    }

    fn setup() -> (RuntimeHandle, NamespaceReference, NamespaceReference) {
        let core = NamespaceReference::new("pps-physics.core").unwrap();
        let shapes = NamespaceReference::new("pps-physics.shapes").unwrap();
        let source = MemorySource::new()
            .with(core.clone(), CONFORMING)
            .with(shapes.clone(), SHAPES);
        let rt = RuntimeHandle::new(&RuntimeConfig::default(), source).unwrap();
        rt.require(&core).unwrap();
        rt.require(&shapes).unwrap();
        (rt, core, shapes)
    }

    fn adapt_symbol(
        rt: &RuntimeHandle,
        ns: &NamespaceReference,
        symbol: &str,
    ) -> Result<GuestApplication, TypeMismatch> {
        let entry = rt.resolve(ns, symbol).unwrap();
        let value = rt.invoke(&entry).unwrap();
        adapt(rt, &entry, value).map_err(|e| e.reason)
    }

    #[test]
    fn conforming_object_adapts_and_forwards_calls() {
        let (rt, core) = core_only();
        let mut app = adapt_symbol(&rt, &core, "pps-physics-game").unwrap();
        assert_eq!(app.address(), 256);

        app.initialize().unwrap();
        app.render(1.0 / 60.0).unwrap();
        app.pause().unwrap();
        app.resume().unwrap();
        app.dispose().unwrap();

        assert_eq!(
            rt.guest_log(),
            ["loaded", "initialize", "render", "pause", "resume", "dispose"]
        );
    }

    #[test]
    fn object_behind_a_global_adapts() {
        let (rt, _, shapes) = setup();
        let global = adapt_symbol(&rt, &shapes, "object-global").unwrap();
        assert_eq!(global.address(), 1024);
        let complete = adapt_symbol(&rt, &shapes, "complete").unwrap();
        assert_eq!(complete.address(), 1024);
    }

    #[test]
    fn null_values_fail_explicitly() {
        let (rt, _, shapes) = setup();
        for symbol in ["as-null", "null-ref", "returns-nothing"] {
            assert_eq!(
                adapt_symbol(&rt, &shapes, symbol).unwrap_err(),
                TypeMismatch::Null,
                "{symbol}"
            );
        }
    }

    #[test]
    fn non_address_values_are_not_objects() {
        let (rt, _, shapes) = setup();
        assert_eq!(
            adapt_symbol(&rt, &shapes, "as-integer").unwrap_err(),
            TypeMismatch::NotAnObject {
                found: "i64 42".into()
            }
        );
        assert!(matches!(
            adapt_symbol(&rt, &shapes, "as-float").unwrap_err(),
            TypeMismatch::NotAnObject { .. }
        ));
        assert_eq!(
            adapt_symbol(&rt, &shapes, "memory").unwrap_err(),
            TypeMismatch::NotAnObject {
                found: "memory export".into()
            }
        );
    }

    #[test]
    fn plain_integers_do_not_pass_the_magic_check() {
        let (rt, _, shapes) = setup();
        assert_eq!(
            adapt_symbol(&rt, &shapes, "as-small-int").unwrap_err(),
            TypeMismatch::BadMagic { address: 42 }
        );
        assert_eq!(
            adapt_symbol(&rt, &shapes, "far-away").unwrap_err(),
            TypeMismatch::OutOfBounds {
                address: 0x7fff_0000
            }
        );
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (rt, _, shapes) = setup();
        assert_eq!(
            adapt_symbol(&rt, &shapes, "old-version").unwrap_err(),
            TypeMismatch::UnsupportedVersion {
                found: 9,
                expected: ABI_VERSION
            }
        );
    }

    #[test]
    fn every_missing_capability_is_reported() {
        let (rt, _, shapes) = setup();
        assert_eq!(
            adapt_symbol(&rt, &shapes, "missing-render").unwrap_err(),
            TypeMismatch::MissingCapabilities {
                missing: vec![Capability::Render]
            }
        );
        assert_eq!(
            adapt_symbol(&rt, &shapes, "bad-methods").unwrap_err(),
            TypeMismatch::MissingCapabilities {
                missing: vec![Capability::Pause, Capability::Dispose]
            }
        );
    }

    #[test]
    fn objects_without_a_function_table_have_no_capabilities() {
        let ns = NamespaceReference::new("tableless").unwrap();
        let wat = r#"(module
            (memory (export "memory") 1)
            (data (i32.const 8) "PPSA" "\01\00\00\00"
                "\01\00\00\00" "\02\00\00\00" "\03\00\00\00"
                "\04\00\00\00" "\05\00\00\00")
            (func (export "pps-physics-game") (result i32) (i32.const 8)))"#;
        let rt = RuntimeHandle::new(
            &RuntimeConfig::default(),
            MemorySource::new().with(ns.clone(), wat),
        )
        .unwrap();
        rt.require(&ns).unwrap();

        assert_eq!(
            adapt_symbol(&rt, &ns, "pps-physics-game").unwrap_err(),
            TypeMismatch::MissingCapabilities {
                missing: Capability::ALL.to_vec()
            }
        );
    }
}
