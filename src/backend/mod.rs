//! Pluggable numeric engines behind a common network contract.
//!
//! Each backend consumes a resolved [`LayerSpec`](crate::layers::LayerSpec)
//! and owns its engine-native computation graph, optimizer state, and seed
//! configuration. The agent only ever holds a `Box<dyn NetworkBackend>`.

use std::path::Path;

use ndarray::{Array1, ArrayView1};

use crate::error::{QforgeError, Result};
use crate::layers::LayerSpec;

pub mod burn;
pub mod dense;
pub mod factory;

pub use factory::create;

/// Construction parameters common to every numeric engine.
///
/// `gamma` and `batch_size` are intentionally absent: both live on
/// [`DqnConfig`](crate::agent::DqnConfig), since the Bellman target is
/// assembled in the agent and updates are single-sample.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub action_size: usize,
    pub state_size: usize,
    pub layer_spec: LayerSpec,
    pub learning_rate: f32,
    pub seed: Option<u64>,
}

/// Common contract every numeric engine satisfies.
///
/// Operations are blocking and the instance is exclusively owned by one
/// agent; no synchronization is provided or required.
pub trait NetworkBackend {
    /// Registry identifier of the engine backing this instance.
    fn identifier(&self) -> &'static str;

    /// Pure forward pass: one Q-value per action, no state mutation.
    fn infer(&self, state: ArrayView1<f32>) -> Result<Array1<f32>>;

    /// One supervised-regression step toward `target` (MSE loss, Adam with
    /// the fixed learning rate supplied at construction).
    fn update(&mut self, state: ArrayView1<f32>, target: ArrayView1<f32>) -> Result<()>;

    /// Persist engine-native weights under `dir` using the `model_<name>`
    /// file prefix.
    fn save_weights(&self, dir: &Path, name: &str) -> Result<()>;

    /// Restore weights previously written by [`save_weights`].
    ///
    /// The graph must already be rebuilt from an identical [`LayerSpec`];
    /// fails with [`QforgeError::MissingCheckpoint`] when the file is absent
    /// and [`QforgeError::DimensionMismatch`] when shapes do not line up.
    ///
    /// [`save_weights`]: NetworkBackend::save_weights
    fn load_weights(&mut self, dir: &Path, name: &str) -> Result<()>;

    /// Re-seed the engine's random number generators. `None` is a no-op.
    fn set_seed(&mut self, seed: Option<u64>);

    /// Constrained inference used during action selection: repeatedly strip
    /// the current arg-max from consideration until the selected index is
    /// not excluded. Fails with [`QforgeError::AllActionsExcluded`] when
    /// nothing remains.
    fn infer_constrained(
        &self,
        state: ArrayView1<f32>,
        excluded_actions: &[usize],
    ) -> Result<usize> {
        let q_values = self.infer(state)?;
        constrained_argmax(q_values.view(), excluded_actions)
    }
}

/// Arg-max over `q_values` with excluded indices masked out one strip at a
/// time, preserving action identity while stripping.
pub(crate) fn constrained_argmax(
    q_values: ArrayView1<f32>,
    excluded_actions: &[usize],
) -> Result<usize> {
    let mut candidates = q_values.to_owned();
    let mut remaining = candidates.len();

    loop {
        if remaining == 0 {
            return Err(QforgeError::AllActionsExcluded);
        }
        let (idx, _) = candidates
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or(QforgeError::AllActionsExcluded)?;
        if !excluded_actions.contains(&idx) {
            return Ok(idx);
        }
        candidates[idx] = f32::NEG_INFINITY;
        remaining -= 1;
    }
}
