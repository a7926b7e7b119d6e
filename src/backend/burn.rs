//! `burn` engine over the autodiff ndarray backend.

use std::path::{Path, PathBuf};

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Linear, LinearConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use log::{debug, info};
use ndarray::{Array1, ArrayView1};

use crate::backend::{BackendConfig, NetworkBackend};
use crate::error::{QforgeError, Result};

type AD = Autodiff<NdArray>;
type Recorder = BinFileRecorder<FullPrecisionSettings>;

/// Feed-forward Q-network: ReLU on every layer except the last.
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> QNetwork<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.layers[..self.layers.len() - 1] {
            x = relu(layer.forward(x));
        }
        self.layers[self.layers.len() - 1].forward(x)
    }
}

/// The `burn` numeric engine.
pub struct BurnBackend {
    network: QNetwork<AD>,
    optimizer: OptimizerAdaptor<Adam, QNetwork<AD>, AD>,
    device: NdArrayDevice,
    state_size: usize,
    learning_rate: f64,
}

impl BurnBackend {
    pub const IDENTIFIER: &'static str = "burn";

    /// Build the module layer-by-layer from the resolved layer spec.
    pub fn build(config: &BackendConfig) -> Result<Self> {
        if let Some(seed) = config.seed {
            AD::seed(seed);
        }
        let device = NdArrayDevice::default();

        let dims = config.layer_spec.layer_dims(config.action_size)?;
        let layers = dims
            .iter()
            .map(|&(input, output)| LinearConfig::new(input, output).init(&device))
            .collect::<Vec<_>>();
        debug!(
            "built {} burn linear layers for state size {} / action size {}",
            layers.len(),
            config.state_size,
            config.action_size
        );

        Ok(BurnBackend {
            network: QNetwork { layers },
            optimizer: AdamConfig::new().init(),
            device,
            state_size: config.state_size,
            learning_rate: config.learning_rate as f64,
        })
    }

    fn weight_path(dir: &Path, name: &str) -> PathBuf {
        // The recorder force-sets its .bin extension on whatever path it is
        // given. Appending the extension here keeps that a no-op, so model
        // names containing a dot resolve to the same file on save and load.
        dir.join(format!("model_{}.bin", name))
    }

    fn input_tensor<B>(&self, state: ArrayView1<f32>) -> Result<Tensor<B, 2>>
    where
        B: Backend<Device = NdArrayDevice>,
    {
        if state.len() != self.state_size {
            return Err(QforgeError::dimension_mismatch(
                format!("state of length {}", self.state_size),
                format!("length {}", state.len()),
            ));
        }
        let data = TensorData::new(state.to_vec(), [1, state.len()]);
        Ok(Tensor::from_data(data, &self.device))
    }
}

impl NetworkBackend for BurnBackend {
    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn infer(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        // The validated (inner-backend) module runs the forward pass without
        // building an autodiff graph.
        let network = self.network.valid();
        let input = self.input_tensor::<NdArray>(state)?;
        let output = network.forward(input);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| QforgeError::Numerical(format!("{:?}", e)))?;
        Ok(Array1::from(values))
    }

    fn update(&mut self, state: ArrayView1<f32>, target: ArrayView1<f32>) -> Result<()> {
        let input = self.input_tensor::<AD>(state)?;
        let target = Tensor::<AD, 2>::from_data(
            TensorData::new(target.to_vec(), [1, target.len()]),
            &self.device,
        );

        let output = self.network.forward(input);
        let loss = MseLoss::new().forward(output, target, Reduction::Mean);
        let grads = GradientsParams::from_grads(loss.backward(), &self.network);
        self.network = self
            .optimizer
            .step(self.learning_rate, self.network.clone(), grads);
        Ok(())
    }

    fn save_weights(&self, dir: &Path, name: &str) -> Result<()> {
        let path = Self::weight_path(dir, name);
        self.network
            .clone()
            .save_file(&path, &Recorder::new())
            .map_err(|e| QforgeError::Serialization(e.to_string()))?;
        info!("saved burn weights to {}", path.display());
        Ok(())
    }

    fn load_weights(&mut self, dir: &Path, name: &str) -> Result<()> {
        let path = Self::weight_path(dir, name);
        if !path.is_file() {
            return Err(QforgeError::MissingCheckpoint(path));
        }
        self.network = self
            .network
            .clone()
            .load_file(&path, &Recorder::new(), &self.device)
            .map_err(|e| QforgeError::Serialization(e.to_string()))?;
        info!("restored burn weights from {}", path.display());
        Ok(())
    }

    fn set_seed(&mut self, seed: Option<u64>) {
        if let Some(seed) = seed {
            AD::seed(seed);
        }
    }
}
