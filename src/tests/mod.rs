pub mod test_checkpoint;

/// Route `log` output through env_logger so RUST_LOG is honored while the
/// tests run. Safe to call from every test; only the first call installs
/// the logger.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
