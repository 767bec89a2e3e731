fn main() {
    // ESP-IDF link arguments are only needed for the firmware image.
    // Host builds (tests, simulation) skip the sysenv probe.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
