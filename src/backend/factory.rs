//! Late-bound resolution of backend identifiers to concrete engines.
//!
//! Backends register as `(identifier, constructor)` pairs in a compile-time
//! table, so call sites resolve engines by name and adding an engine never
//! touches existing callers.

use crate::backend::burn::BurnBackend;
use crate::backend::dense::DenseBackend;
use crate::backend::{BackendConfig, NetworkBackend};
use crate::error::{QforgeError, Result};

type BackendConstructor = fn(&BackendConfig) -> Result<Box<dyn NetworkBackend>>;

const REGISTRY: &[(&str, BackendConstructor)] = &[
    (DenseBackend::IDENTIFIER, |config| {
        Ok(Box::new(DenseBackend::build(config)?))
    }),
    (BurnBackend::IDENTIFIER, |config| {
        Ok(Box::new(BurnBackend::build(config)?))
    }),
];

/// Identifiers of all registered backends.
pub fn supported_libraries() -> Vec<&'static str> {
    REGISTRY.iter().map(|(id, _)| *id).collect()
}

/// Resolve `library` against the registry and construct the backend.
///
/// Fails with [`QforgeError::UnsupportedLibrary`] when the identifier is not
/// registered.
pub fn create(library: &str, config: &BackendConfig) -> Result<Box<dyn NetworkBackend>> {
    let constructor = REGISTRY
        .iter()
        .find(|(id, _)| *id == library)
        .map(|(_, constructor)| constructor)
        .ok_or_else(|| QforgeError::UnsupportedLibrary(library.to_string()))?;
    constructor(config)
}
