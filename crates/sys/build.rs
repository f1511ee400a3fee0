//! Link configuration for the native engine.
//!
//! Only active with the `native` feature. The library name defaults to `rt`
//! (the engine's own build output); `RAYBRIDGE_ENGINE_LIB` overrides it and
//! `RAYBRIDGE_ENGINE_DIR` adds a search path.

fn main() {
    println!("cargo:rerun-if-env-changed=RAYBRIDGE_ENGINE_LIB");
    println!("cargo:rerun-if-env-changed=RAYBRIDGE_ENGINE_DIR");

    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Ok(dir) = std::env::var("RAYBRIDGE_ENGINE_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    }
    let lib = std::env::var("RAYBRIDGE_ENGINE_LIB").unwrap_or_else(|_| "rt".to_string());
    println!("cargo:rustc-link-lib=dylib={lib}");
}
