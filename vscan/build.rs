use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // Host builds (tests) don't link against the board's memory map.
    if env::var("CARGO_CFG_TARGET_OS").as_ref().map(String::as_str) == Ok("none") {
        install_memory_map();
    }
    println!("cargo:rerun-if-changed=memory.x");
}

/// Puts `memory.x` where `cortex-m-rt`'s `link.x` will find it.
fn install_memory_map() {
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR unset"));
    fs::write(out.join("memory.x"), include_bytes!("memory.x"))
        .expect("can't write memory.x");
    println!("cargo:rustc-link-search={}", out.display());
}
