//! Build script for the crowd-cast OBS control layer
//!
//! When built against a real libobs (`--features libobs`) on macOS, this sets up
//! the rpath needed to find libobs.framework and its dylibs at runtime.

fn main() {
    let libobs_enabled = std::env::var_os("CARGO_FEATURE_LIBOBS").is_some();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    if libobs_enabled && target_os == "macos" {
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@loader_path");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/..");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@loader_path/..");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/../Frameworks");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@loader_path/../Frameworks");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
