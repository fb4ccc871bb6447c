//! Build script for the physics guest.
//!
//! The host finds capability methods through the guest's function table, which `wasm-ld`
//! only exports when asked to.

fn main() {
    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("wasm32") {
        println!("cargo:rustc-link-arg-cdylib=--export-table");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
