#[test]
fn logging_installs_a_single_global_subscriber() {
    vm::init_logging().expect("first init should install the subscriber");
    assert!(vm::init_logging().is_err());
    tracing::info!("logging initialized");
}
