//! Hand-rolled dense engine over `ndarray` with explicit backpropagation.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendConfig, NetworkBackend};
use crate::error::{QforgeError, Result};

/// Activation applied by a [`DenseLayer`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, input: &mut Array1<f32>) {
        match self {
            Activation::Relu => input.mapv_inplace(|v| v.max(0.0)),
            Activation::Linear => {}
        }
    }

    fn derivative(&self, pre_activation: &Array1<f32>) -> Array1<f32> {
        match self {
            Activation::Relu => pre_activation.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear => Array1::ones(pre_activation.len()),
        }
    }
}

/// A fully connected layer: weights of shape `(input, output)` plus biases.
#[derive(Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn new(input_size: usize, output_size: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let weights =
            Array2::random_using((input_size, output_size), Uniform::new(-0.1, 0.1), rng);
        let biases = Array1::zeros(output_size);
        DenseLayer {
            weights,
            biases,
            activation,
        }
    }

    /// Pure forward pass for one input vector.
    fn forward(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let mut output = input.dot(&self.weights) + &self.biases;
        self.activation.apply(&mut output);
        output
    }
}

/// Adam optimizer with first/second moment buffers per layer.
#[derive(Clone, Serialize, Deserialize)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Array2<f32>>,
    v_weights: Vec<Array2<f32>>,
    m_biases: Vec<Array1<f32>>,
    v_biases: Vec<Array1<f32>>,
    t: i32,
}

impl Adam {
    fn new(layers: &[DenseLayer]) -> Self {
        Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m_weights: layers
                .iter()
                .map(|l| Array2::zeros(l.weights.dim()))
                .collect(),
            v_weights: layers
                .iter()
                .map(|l| Array2::zeros(l.weights.dim()))
                .collect(),
            m_biases: layers
                .iter()
                .map(|l| Array1::zeros(l.biases.dim()))
                .collect(),
            v_biases: layers
                .iter()
                .map(|l| Array1::zeros(l.biases.dim()))
                .collect(),
            t: 0,
        }
    }

    /// Apply one Adam step to a single layer's parameters. `advance_step`
    /// must be called once per update pass, after all layers are stepped.
    fn step_layer(
        &mut self,
        index: usize,
        layer: &mut DenseLayer,
        weight_gradients: &Array2<f32>,
        bias_gradients: &Array1<f32>,
        learning_rate: f32,
    ) {
        let t = self.t + 1;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        let m_w = &mut self.m_weights[index];
        let v_w = &mut self.v_weights[index];
        *m_w = &*m_w * self.beta1 + &(weight_gradients * (1.0 - self.beta1));
        *v_w = &*v_w * self.beta2 + &(weight_gradients * weight_gradients * (1.0 - self.beta2));
        let m_hat = m_w.mapv(|x| x / bias_correction1);
        let v_hat = v_w.mapv(|x| x / bias_correction2);
        layer.weights -= &((&m_hat / (v_hat.mapv(f32::sqrt) + self.epsilon)) * learning_rate);

        let m_b = &mut self.m_biases[index];
        let v_b = &mut self.v_biases[index];
        *m_b = &*m_b * self.beta1 + &(bias_gradients * (1.0 - self.beta1));
        *v_b = &*v_b * self.beta2 + &(bias_gradients * bias_gradients * (1.0 - self.beta2));
        let m_hat = m_b.mapv(|x| x / bias_correction1);
        let v_hat = v_b.mapv(|x| x / bias_correction2);
        layer.biases -= &((&m_hat / (v_hat.mapv(f32::sqrt) + self.epsilon)) * learning_rate);
    }

    fn advance_step(&mut self) {
        self.t += 1;
    }
}

/// Serialized form of the engine's weight file.
#[derive(Serialize, Deserialize)]
struct WeightFile {
    layers: Vec<DenseLayer>,
    optimizer: Adam,
}

/// The `ndarray` numeric engine.
pub struct DenseBackend {
    layers: Vec<DenseLayer>,
    optimizer: Adam,
    learning_rate: f32,
    /// Seed driving weight initialization. `set_seed` records a new value,
    /// which takes effect on the next rebuild.
    pub seed: Option<u64>,
}

impl DenseBackend {
    pub const IDENTIFIER: &'static str = "ndarray";

    /// Build the network layer-by-layer from the resolved layer spec: ReLU
    /// on every hidden layer, linear output.
    pub fn build(config: &BackendConfig) -> Result<Self> {
        let dims = config.layer_spec.layer_dims(config.action_size)?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let layer_count = dims.len();
        let layers = dims
            .into_iter()
            .enumerate()
            .map(|(i, (input, output))| {
                let activation = if i + 1 == layer_count {
                    Activation::Linear
                } else {
                    Activation::Relu
                };
                DenseLayer::new(input, output, activation, &mut rng)
            })
            .collect::<Vec<_>>();

        debug!(
            "built {} dense layers for state size {} / action size {}",
            layers.len(),
            config.state_size,
            config.action_size
        );

        let optimizer = Adam::new(&layers);
        Ok(DenseBackend {
            layers,
            optimizer,
            learning_rate: config.learning_rate,
            seed: config.seed,
        })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    fn weight_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("model_{}.bin", name))
    }
}

impl NetworkBackend for DenseBackend {
    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn infer(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        if state.len() != self.layers[0].weights.dim().0 {
            return Err(QforgeError::dimension_mismatch(
                format!("state of length {}", self.layers[0].weights.dim().0),
                format!("length {}", state.len()),
            ));
        }
        let mut output = state.to_owned();
        for layer in &self.layers {
            output = layer.forward(output.view());
        }
        Ok(output)
    }

    fn update(&mut self, state: ArrayView1<f32>, target: ArrayView1<f32>) -> Result<()> {
        // Forward pass, recording per-layer inputs and pre-activations
        // locally so inference stays free of caching side effects.
        let mut inputs = vec![state.to_owned()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let z = inputs.last().unwrap().dot(&layer.weights) + &layer.biases;
            pre_activations.push(z.clone());
            let mut a = z;
            layer.activation.apply(&mut a);
            inputs.push(a);
        }

        let output = inputs.last().unwrap();
        if output.len() != target.len() {
            return Err(QforgeError::dimension_mismatch(
                format!("target of length {}", output.len()),
                format!("length {}", target.len()),
            ));
        }

        // Backward pass for the MSE loss, output layer first.
        let mut error = output - &target;
        let mut gradients = Vec::with_capacity(self.layers.len());
        for i in (0..self.layers.len()).rev() {
            let delta = &error * &self.layers[i].activation.derivative(&pre_activations[i]);
            let weight_gradients = inputs[i]
                .view()
                .insert_axis(Axis(1))
                .dot(&delta.view().insert_axis(Axis(0)));
            let bias_gradients = delta.clone();
            if i != 0 {
                error = delta.dot(&self.layers[i].weights.t());
            }
            gradients.push((weight_gradients, bias_gradients));
        }
        gradients.reverse();

        for (i, (weight_gradients, bias_gradients)) in gradients.iter().enumerate() {
            self.optimizer.step_layer(
                i,
                &mut self.layers[i],
                weight_gradients,
                bias_gradients,
                self.learning_rate,
            );
        }
        self.optimizer.advance_step();
        Ok(())
    }

    fn save_weights(&self, dir: &Path, name: &str) -> Result<()> {
        let path = Self::weight_path(dir, name);
        let file = WeightFile {
            layers: self.layers.clone(),
            optimizer: self.optimizer.clone(),
        };
        fs::write(&path, bincode::serialize(&file)?)?;
        info!("saved ndarray weights to {}", path.display());
        Ok(())
    }

    fn load_weights(&mut self, dir: &Path, name: &str) -> Result<()> {
        let path = Self::weight_path(dir, name);
        if !path.is_file() {
            return Err(QforgeError::MissingCheckpoint(path));
        }
        let file: WeightFile = bincode::deserialize(&fs::read(&path)?)?;

        if file.layers.len() != self.layers.len() {
            return Err(QforgeError::dimension_mismatch(
                format!("{} layers", self.layers.len()),
                format!("{} layers", file.layers.len()),
            ));
        }
        for (current, restored) in self.layers.iter().zip(&file.layers) {
            if current.weights.dim() != restored.weights.dim() {
                return Err(QforgeError::dimension_mismatch(
                    format!("{:?}", current.weights.dim()),
                    format!("{:?}", restored.weights.dim()),
                ));
            }
        }

        self.layers = file.layers;
        self.optimizer = file.optimizer;
        info!("restored ndarray weights from {}", path.display());
        Ok(())
    }

    fn set_seed(&mut self, seed: Option<u64>) {
        if seed.is_some() {
            self.seed = seed;
        }
    }
}
