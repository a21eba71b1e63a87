fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Propagate the ESP-IDF toolchain environment only for firmware builds.
    // Host builds (simulator, tests) have no use for it.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
