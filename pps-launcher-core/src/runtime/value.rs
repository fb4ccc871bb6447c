use core::fmt;

use wasmtime::Val;

/// A value read out of the guest, before any adaptation.
///
/// Non-null references keep only their kind; the host never dereferences them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuestValue {
    /// A null reference, or an accessor that returns nothing.
    Null,
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
    /// A non-null reference (`funcref`, `externref`, ...).
    Reference(&'static str),
    /// An export that is not a value at all (memory, table, ...).
    Export(&'static str),
}

impl GuestValue {
    pub fn from_val(val: &Val) -> Self {
        match val {
            Val::I32(v) => GuestValue::I32(*v),
            Val::I64(v) => GuestValue::I64(*v),
            Val::F32(bits) => GuestValue::F32(f32::from_bits(*bits)),
            Val::F64(bits) => GuestValue::F64(f64::from_bits(*bits)),
            Val::V128(v) => GuestValue::V128(v.as_u128()),
            Val::FuncRef(None)
            | Val::ExternRef(None)
            | Val::AnyRef(None)
            | Val::ExnRef(None)
            | Val::ContRef(None) => GuestValue::Null,
            Val::FuncRef(Some(_)) => GuestValue::Reference("funcref"),
            Val::ExternRef(Some(_)) => GuestValue::Reference("externref"),
            Val::AnyRef(Some(_)) => GuestValue::Reference("anyref"),
            Val::ExnRef(Some(_)) => GuestValue::Reference("exnref"),
            Val::ContRef(Some(_)) => GuestValue::Reference("contref"),
        }
    }

    /// Null in the object ABI: a null reference, no value, or address 0.
    pub fn is_null(&self) -> bool {
        matches!(self, GuestValue::Null | GuestValue::I32(0))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            GuestValue::Null => "null",
            GuestValue::I32(_) => "i32",
            GuestValue::I64(_) => "i64",
            GuestValue::F32(_) => "f32",
            GuestValue::F64(_) => "f64",
            GuestValue::V128(_) => "v128",
            GuestValue::Reference(kind) | GuestValue::Export(kind) => *kind,
        }
    }
}

impl fmt::Display for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Null => f.write_str("null"),
            GuestValue::I32(v) => write!(f, "i32 {v}"),
            GuestValue::I64(v) => write!(f, "i64 {v}"),
            GuestValue::F32(v) => write!(f, "f32 {v}"),
            GuestValue::F64(v) => write!(f, "f64 {v}"),
            GuestValue::V128(v) => write!(f, "v128 {v:#034x}"),
            GuestValue::Reference(kind) => write!(f, "non-null {kind}"),
            GuestValue::Export(kind) => write!(f, "{kind} export"),
        }
    }
}
