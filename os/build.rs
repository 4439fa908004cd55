use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(armv7m)");
    println!("cargo:rustc-check-cfg=cfg(has_fpu)");
    println!("cargo:rustc-check-cfg=cfg(ffs_table)");

    // thumbv7m / thumbv7em 都带 rbit + clz
    if target.starts_with("thumbv7m") || target.starts_with("thumbv7em") {
        println!("cargo:rustc-cfg=armv7m");
    }
    // ARMv6-M 没有 rbit / clz，也没有原生的 ctz；`ffs-table` 特性强制查表
    if target.starts_with("thumbv6m") || env::var_os("CARGO_FEATURE_FFS_TABLE").is_some() {
        println!("cargo:rustc-cfg=ffs_table");
    }
    if target.starts_with("thumbv7em") && target.ends_with("eabihf") {
        println!("cargo:rustc-cfg=has_fpu");
    }
}
