use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::backend::{factory, BackendConfig, NetworkBackend};
use crate::error::{QforgeError, Result};
use crate::layers::LayerSpec;

/// Construction parameters for a [`DqnAgent`].
///
/// `save_path` and `file_name` are required; everything else defaults to the
/// standard hyperparameters.
#[derive(Debug, Clone)]
pub struct DqnConfig {
    /// Registry identifier of the numeric engine ("ndarray" or "burn").
    pub library: String,
    /// Network topology; the default spec is resolved against the agent's
    /// state/action sizes, a custom spec is used verbatim.
    pub layer_spec: LayerSpec,
    /// Discount factor for the Bellman backup.
    pub gamma: f32,
    /// Fixed learning rate handed to the engine's optimizer.
    pub learning_rate: f32,
    /// Seed for the agent's RNG and the engine's RNGs; `None` seeds from
    /// entropy.
    pub seed: Option<u64>,
    /// Surfaced for construction-parameter parity; single-sample updates do
    /// not consume it.
    pub batch_size: usize,
    /// Directory under which the checkpoint directory is created.
    pub save_path: PathBuf,
    /// Model name keying the checkpoint directory and file prefix.
    pub file_name: String,
    /// Human-readable agent label, used in log messages only.
    pub name: String,
    /// Exploration probability at decay step 0.
    pub explore_start: f32,
    /// Exploration probability floor.
    pub explore_stop: f32,
    /// Exponential decay rate of the exploration probability.
    pub decay_rate: f32,
}

impl DqnConfig {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(save_path: P, file_name: S) -> Self {
        DqnConfig {
            library: "ndarray".to_string(),
            layer_spec: LayerSpec::default_spec(),
            gamma: 0.95,
            learning_rate: 0.0002,
            seed: None,
            batch_size: 32,
            save_path: save_path.into(),
            file_name: file_name.into(),
            name: "DQN".to_string(),
            explore_start: 1.0,
            explore_stop: 0.01,
            decay_rate: 0.0001,
        }
    }
}

/// Auxiliary training state persisted next to the engine-native weights.
///
/// The resolved layer spec must be restored before the graph is rebuilt,
/// because weight restoration needs matching shapes.
#[derive(Serialize, Deserialize)]
struct AuxState {
    decay_step: u64,
    layer_spec: LayerSpec,
}

/// Q-learning agent with epsilon-greedy exploration, agnostic to which
/// numeric engine computes gradients.
///
/// # Example
///
/// ```no_run
/// use ndarray::array;
/// use qforge::agent::{DqnAgent, DqnConfig};
///
/// let config = DqnConfig::new("models/saved", "cartpole");
/// let mut agent = DqnAgent::new(2, 4, config).unwrap();
///
/// let state = array![0.1, -0.2, 0.3, -0.1];
/// let action = agent.choose_action(state.view(), &[]).unwrap();
///
/// let next_state = array![0.15, -0.25, 0.35, -0.05];
/// agent
///     .learn(state.view(), action, 1.0, next_state.view(), false, false)
///     .unwrap();
/// ```
pub struct DqnAgent {
    backend: Box<dyn NetworkBackend>,
    action_size: usize,
    state_size: usize,
    gamma: f32,
    learning_rate: f32,
    seed: Option<u64>,
    library: String,
    layer_spec: LayerSpec,
    save_path: PathBuf,
    file_name: String,
    name: String,
    explore_start: f32,
    explore_stop: f32,
    decay_rate: f32,
    decay_step: u64,
    rng: StdRng,
}

impl DqnAgent {
    /// Construct an agent, resolving the configured library identifier
    /// through the backend factory.
    pub fn new(action_size: usize, state_size: usize, config: DqnConfig) -> Result<Self> {
        Self::validate(action_size, state_size, &config)?;
        let layer_spec = config.layer_spec.resolve(state_size, action_size);
        let backend = factory::create(
            &config.library,
            &BackendConfig {
                action_size,
                state_size,
                layer_spec: layer_spec.clone(),
                learning_rate: config.learning_rate,
                seed: config.seed,
            },
        )?;
        Self::assemble(backend, action_size, state_size, layer_spec, config)
    }

    /// Construct an agent around a caller-built backend, bypassing the
    /// factory. The backend must already be built from `config.layer_spec`
    /// resolved against the same sizes.
    pub fn with_backend(
        backend: Box<dyn NetworkBackend>,
        action_size: usize,
        state_size: usize,
        config: DqnConfig,
    ) -> Result<Self> {
        Self::validate(action_size, state_size, &config)?;
        let layer_spec = config.layer_spec.resolve(state_size, action_size);
        Self::assemble(backend, action_size, state_size, layer_spec, config)
    }

    fn validate(action_size: usize, state_size: usize, config: &DqnConfig) -> Result<()> {
        if config.save_path.as_os_str().is_empty() {
            return Err(QforgeError::invalid_parameter(
                "save_path",
                "a save path is required",
            ));
        }
        if config.file_name.is_empty() {
            return Err(QforgeError::invalid_parameter(
                "file_name",
                "a file name is required",
            ));
        }
        if action_size == 0 {
            return Err(QforgeError::invalid_parameter(
                "action_size",
                "must be greater than 0",
            ));
        }
        if state_size == 0 {
            return Err(QforgeError::invalid_parameter(
                "state_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    fn assemble(
        backend: Box<dyn NetworkBackend>,
        action_size: usize,
        state_size: usize,
        layer_spec: LayerSpec,
        config: DqnConfig,
    ) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(DqnAgent {
            backend,
            action_size,
            state_size,
            gamma: config.gamma,
            learning_rate: config.learning_rate,
            seed: config.seed,
            library: config.library,
            layer_spec,
            save_path: config.save_path,
            file_name: config.file_name,
            name: config.name,
            explore_start: config.explore_start,
            explore_stop: config.explore_stop,
            decay_rate: config.decay_rate,
            decay_step: 0,
            rng,
        })
    }

    /// Current exploration probability:
    /// `stop + (start - stop) * exp(-decay_rate * decay_step)`.
    pub fn explore_probability(&self) -> f32 {
        explore_probability(
            self.explore_start,
            self.explore_stop,
            self.decay_rate,
            self.decay_step,
        )
    }

    pub fn decay_step(&self) -> u64 {
        self.decay_step
    }

    /// Epsilon-greedy action selection. Increments the decay step, then
    /// either explores uniformly over the non-excluded actions or delegates
    /// to [`predict`](DqnAgent::predict).
    ///
    /// Fails with [`QforgeError::AllActionsExcluded`] when `excluded_actions`
    /// covers the whole action set.
    pub fn choose_action(
        &mut self,
        state: ArrayView1<f32>,
        excluded_actions: &[usize],
    ) -> Result<usize> {
        self.decay_step += 1;

        let tradeoff: f32 = self.rng.gen();
        if self.explore_probability() > tradeoff {
            let candidates: Vec<usize> = (0..self.action_size)
                .filter(|a| !excluded_actions.contains(a))
                .collect();
            if candidates.is_empty() {
                return Err(QforgeError::AllActionsExcluded);
            }
            Ok(candidates[self.rng.gen_range(0..candidates.len())])
        } else {
            self.predict(state, excluded_actions)
        }
    }

    /// Greedy action selection through the backend's constrained inference.
    pub fn predict(
        &self,
        state: ArrayView1<f32>,
        excluded_actions: &[usize],
    ) -> Result<usize> {
        self.backend.infer_constrained(state, excluded_actions)
    }

    /// Raw Q-values for a state.
    pub fn q_values(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.backend.infer(state)
    }

    /// One Q-learning step: single-sample, full-vector regression.
    ///
    /// The current Q-vector for `state` is recomputed, the taken action's
    /// entry is overwritten with `reward` (terminal) or
    /// `reward + gamma * max Q(next_state)` (one-step Bellman backup), and
    /// the backend regresses toward that whole vector.
    pub fn learn(
        &mut self,
        state: ArrayView1<f32>,
        action: usize,
        reward: f32,
        next_state: ArrayView1<f32>,
        done: bool,
        _is_last_step: bool,
    ) -> Result<()> {
        if action >= self.action_size {
            return Err(QforgeError::invalid_parameter(
                "action".to_string(),
                format!("{} is out of range for {} actions", action, self.action_size),
            ));
        }

        let mut q_values = self.backend.infer(state)?;
        let target = if done {
            reward
        } else {
            let next_q = self.backend.infer(next_state)?;
            let max_next_q = next_q.iter().fold(f32::NEG_INFINITY, |max, &v| max.max(v));
            reward + self.gamma * max_next_q
        };
        q_values[action] = target;

        self.backend.update(state, q_values.view())
    }

    fn checkpoint_dir(&self) -> PathBuf {
        self.save_path.join(&self.file_name)
    }

    fn aux_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("model_{}.meta", name))
    }

    /// Persist engine-native weights and the auxiliary state blob into the
    /// checkpoint directory. Both are written unconditionally on every call.
    pub fn save(&self) -> Result<()> {
        let dir = self.checkpoint_dir();
        fs::create_dir_all(&dir)?;

        self.backend.save_weights(&dir, &self.file_name)?;

        let aux = AuxState {
            decay_step: self.decay_step,
            layer_spec: self.layer_spec.clone(),
        };
        fs::write(
            Self::aux_path(&dir, &self.file_name),
            bincode::serialize(&aux)?,
        )?;
        info!("saved agent '{}' to {}", self.name, dir.display());
        Ok(())
    }

    /// Restore a checkpoint written by [`save`](DqnAgent::save).
    ///
    /// Order matters: the auxiliary state is restored first because the
    /// resolved layer spec it carries determines the graph shape; the graph
    /// is then rebuilt from scratch before the weights are restored. A
    /// failed load leaves the agent in an undefined state; callers must not
    /// continue training against it.
    pub fn load(&mut self) -> Result<()> {
        let dir = self.checkpoint_dir();

        let aux_path = Self::aux_path(&dir, &self.file_name);
        if !aux_path.is_file() {
            return Err(QforgeError::MissingCheckpoint(aux_path));
        }
        let aux: AuxState = bincode::deserialize(&fs::read(&aux_path)?)?;
        self.decay_step = aux.decay_step;
        self.layer_spec = aux.layer_spec;

        self.backend = factory::create(
            &self.library,
            &BackendConfig {
                action_size: self.action_size,
                state_size: self.state_size,
                layer_spec: self.layer_spec.clone(),
                learning_rate: self.learning_rate,
                seed: self.seed,
            },
        )?;
        self.backend.load_weights(&dir, &self.file_name)?;
        info!("loaded agent '{}' from {}", self.name, dir.display());
        Ok(())
    }
}

fn explore_probability(start: f32, stop: f32, decay_rate: f32, decay_step: u64) -> f32 {
    stop + (start - stop) * (-decay_rate * decay_step as f32).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_config(dir: &Path) -> DqnConfig {
        let mut config = DqnConfig::new(dir, "test");
        config.seed = Some(42);
        config
    }

    #[test]
    fn test_explore_probability_boundaries() {
        assert!((explore_probability(1.0, 0.01, 0.0001, 0) - 1.0).abs() < 1e-6);
        // 0.01 + 0.99 * e^-1
        let p = explore_probability(1.0, 0.01, 0.0001, 10_000);
        assert!((p - 0.374_175).abs() < 1e-3, "got {}", p);
        let p = explore_probability(1.0, 0.01, 0.0001, 10_000_000);
        assert!((p - 0.01).abs() < 1e-4, "got {}", p);
    }

    proptest::proptest! {
        #[test]
        fn test_explore_probability_monotonic(step in 0u64..1_000_000) {
            let p0 = explore_probability(1.0, 0.01, 0.0001, step);
            let p1 = explore_probability(1.0, 0.01, 0.0001, step + 1);
            proptest::prop_assert!(p1 <= p0);
            proptest::prop_assert!(p1 >= 0.01);
        }
    }

    #[test]
    fn test_missing_save_path_fails_construction() {
        let mut config = DqnConfig::new("", "model");
        config.seed = Some(1);
        assert!(matches!(
            DqnAgent::new(2, 4, config),
            Err(QforgeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_file_name_fails_construction() {
        let config = DqnConfig::new("models", "");
        assert!(matches!(
            DqnAgent::new(2, 4, config),
            Err(QforgeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_choose_action_all_excluded_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = DqnAgent::new(2, 4, test_config(dir.path())).unwrap();
        let state = array![0.0, 0.1, 0.2, 0.3];
        // decay step 1 keeps the explore probability at ~1.0, forcing the
        // exploration branch
        assert!(matches!(
            agent.choose_action(state.view(), &[0, 1]),
            Err(QforgeError::AllActionsExcluded)
        ));
    }

    #[test]
    fn test_choose_action_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = DqnAgent::new(3, 4, test_config(dir.path())).unwrap();
        let state = array![0.0, 0.1, 0.2, 0.3];
        for _ in 0..50 {
            let action = agent.choose_action(state.view(), &[1]).unwrap();
            assert_ne!(action, 1);
        }
        assert_eq!(agent.decay_step(), 50);
    }

    #[test]
    fn test_predict_all_excluded_fails() {
        let dir = tempfile::tempdir().unwrap();
        let agent = DqnAgent::new(2, 4, test_config(dir.path())).unwrap();
        let state = array![0.0, 0.1, 0.2, 0.3];
        assert!(matches!(
            agent.predict(state.view(), &[0, 1]),
            Err(QforgeError::AllActionsExcluded)
        ));
    }

    /// Test double that reports canned Q-values and records update targets.
    struct RecordingBackend {
        q_values: Array1<f32>,
        updates: Rc<RefCell<Vec<Array1<f32>>>>,
    }

    impl NetworkBackend for RecordingBackend {
        fn identifier(&self) -> &'static str {
            "recording"
        }

        fn infer(&self, _state: ArrayView1<f32>) -> Result<Array1<f32>> {
            Ok(self.q_values.clone())
        }

        fn update(&mut self, _state: ArrayView1<f32>, target: ArrayView1<f32>) -> Result<()> {
            self.updates.borrow_mut().push(target.to_owned());
            Ok(())
        }

        fn save_weights(&self, _dir: &Path, _name: &str) -> Result<()> {
            Ok(())
        }

        fn load_weights(&mut self, _dir: &Path, _name: &str) -> Result<()> {
            Ok(())
        }

        fn set_seed(&mut self, _seed: Option<u64>) {}
    }

    fn recording_agent(
        dir: &Path,
        q_values: Array1<f32>,
        gamma: f32,
    ) -> (DqnAgent, Rc<RefCell<Vec<Array1<f32>>>>) {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let backend = RecordingBackend {
            q_values,
            updates: Rc::clone(&updates),
        };
        let mut config = test_config(dir);
        config.gamma = gamma;
        let agent = DqnAgent::with_backend(Box::new(backend), 2, 4, config).unwrap();
        (agent, updates)
    }

    #[test]
    fn test_learn_terminal_target_is_reward() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, updates) = recording_agent(dir.path(), array![0.2, 0.8], 0.9);

        let s = array![0.0, 0.0, 0.0, 0.0];
        agent
            .learn(s.view(), 0, 1.0, s.view(), true, false)
            .unwrap();

        let recorded = updates.borrow();
        assert_eq!(recorded.len(), 1);
        // Taken action regresses to exactly r, the other entry is untouched.
        assert_eq!(recorded[0], array![1.0, 0.8]);
    }

    #[test]
    fn test_learn_bellman_target() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, updates) = recording_agent(dir.path(), array![0.2, 0.8], 0.95);

        let s = array![0.0, 0.0, 0.0, 0.0];
        agent
            .learn(s.view(), 0, 0.0, s.view(), false, false)
            .unwrap();

        let recorded = updates.borrow();
        // target = 0.0 + 0.95 * max([0.2, 0.8]) = 0.76
        assert!((recorded[0][0] - 0.76).abs() < 1e-6);
        assert_eq!(recorded[0][1], 0.8);
    }

    #[test]
    fn test_learn_rejects_out_of_range_action() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, _) = recording_agent(dir.path(), array![0.2, 0.8], 0.95);
        let s = array![0.0, 0.0, 0.0, 0.0];
        assert!(matches!(
            agent.learn(s.view(), 5, 0.0, s.view(), false, false),
            Err(QforgeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = DqnAgent::new(2, 4, test_config(dir.path())).unwrap();

        let s = array![0.1, 0.2, 0.3, 0.4];
        let s2 = array![0.2, 0.3, 0.4, 0.5];
        for _ in 0..10 {
            let action = agent.choose_action(s.view(), &[]).unwrap();
            agent
                .learn(s.view(), action, 1.0, s2.view(), false, false)
                .unwrap();
        }
        let expected = agent.q_values(s.view()).unwrap();
        agent.save().unwrap();

        let mut config = test_config(dir.path());
        config.seed = Some(1234);
        let mut restored = DqnAgent::new(2, 4, config).unwrap();
        restored.load().unwrap();

        assert_eq!(restored.decay_step(), 10);
        let actual = restored.q_values(s.view()).unwrap();
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert!((e - a).abs() < 1e-6, "expected {} got {}", e, a);
        }
    }

    #[test]
    fn test_load_without_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = DqnAgent::new(2, 4, test_config(dir.path())).unwrap();
        assert!(matches!(
            agent.load(),
            Err(QforgeError::MissingCheckpoint(_))
        ));
    }
}
