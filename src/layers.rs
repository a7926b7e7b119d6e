use serde::{Deserialize, Serialize};

use crate::error::{QforgeError, Result};

/// Placeholder used by the default spec for sizes that are resolved against
/// the agent's actual state/action sizes at build time.
const UNRESOLVED: usize = 0;

/// A single layer descriptor in a [`LayerSpec`].
///
/// The descriptor is declarative: it carries sizes and names only, and every
/// backend turns the same sequence of descriptors into its own engine-native
/// layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerDescriptor {
    /// Network input; `shape` is the state-vector length.
    Input { shape: usize },
    /// Hidden fully-connected layer with ReLU activation.
    FullyConnected { nodes: usize, name: String },
    /// Network output; `length` is the action count, no activation.
    Output { length: usize },
}

/// Declarative, ordered description of a feed-forward network's layers.
///
/// Invariants enforced at build time (not at construction): exactly one
/// `Input` descriptor and it must be first, exactly one `Output` descriptor
/// and it must be last. Any number of `FullyConnected` descriptors may sit
/// in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    descriptors: Vec<LayerDescriptor>,
}

impl LayerSpec {
    /// Create a spec from an explicit descriptor sequence.
    pub fn new(descriptors: Vec<LayerDescriptor>) -> Self {
        LayerSpec { descriptors }
    }

    /// The default topology: two hidden layers of 50 nodes, with input and
    /// output sizes left unresolved until the agent binds them.
    pub fn default_spec() -> Self {
        LayerSpec {
            descriptors: vec![
                LayerDescriptor::Input { shape: UNRESOLVED },
                LayerDescriptor::FullyConnected {
                    nodes: 50,
                    name: "fc1".to_string(),
                },
                LayerDescriptor::FullyConnected {
                    nodes: 50,
                    name: "fc2".to_string(),
                },
                LayerDescriptor::Output { length: UNRESOLVED },
            ],
        }
    }

    pub fn descriptors(&self) -> &[LayerDescriptor] {
        &self.descriptors
    }

    /// Resolve a spec against the agent's actual state/action sizes.
    ///
    /// Only the recognized default spec gets its input shape and output
    /// length filled in; a custom spec is returned verbatim and the caller
    /// is responsible for keeping it coherent with the sizes. Always returns
    /// a fresh value so no shared default is ever mutated in place.
    pub fn resolve(&self, state_size: usize, action_size: usize) -> LayerSpec {
        let mut resolved = self.clone();
        if *self == LayerSpec::default_spec() {
            resolved.descriptors[0] = LayerDescriptor::Input { shape: state_size };
            let last = resolved.descriptors.len() - 1;
            resolved.descriptors[last] = LayerDescriptor::Output {
                length: action_size,
            };
        }
        resolved
    }

    /// Walk the descriptors and produce the `(input, output)` size of each
    /// concrete layer, in order. The output layer's width is always
    /// `action_size`.
    ///
    /// This is the shared structural-validation step every backend runs at
    /// build time: a misplaced `Input`, a leading non-`Input`, a
    /// mid-sequence `Output`, or a missing `Output` tail fails with
    /// [`QforgeError::IncoherentBuildModel`] before any layer is built.
    pub fn layer_dims(&self, action_size: usize) -> Result<Vec<(usize, usize)>> {
        let mut dims = Vec::new();
        let mut prev_width: Option<usize> = None;

        for (idx, descriptor) in self.descriptors.iter().enumerate() {
            match descriptor {
                LayerDescriptor::Input { shape } => {
                    if idx != 0 {
                        return Err(QforgeError::IncoherentBuildModel(
                            "Input layer must be the first one".to_string(),
                        ));
                    }
                    prev_width = Some(*shape);
                }
                LayerDescriptor::FullyConnected { nodes, .. } => {
                    let input = prev_width.ok_or_else(|| {
                        QforgeError::IncoherentBuildModel(
                            "fully-connected layer has no preceding layer".to_string(),
                        )
                    })?;
                    dims.push((input, *nodes));
                    prev_width = Some(*nodes);
                }
                LayerDescriptor::Output { .. } => {
                    let input = prev_width.ok_or_else(|| {
                        QforgeError::IncoherentBuildModel(
                            "output layer has no preceding layer".to_string(),
                        )
                    })?;
                    if idx != self.descriptors.len() - 1 {
                        return Err(QforgeError::IncoherentBuildModel(
                            "Output layer must be the last one".to_string(),
                        ));
                    }
                    dims.push((input, action_size));
                }
            }
        }

        match self.descriptors.last() {
            Some(LayerDescriptor::Output { .. }) => Ok(dims),
            _ => Err(QforgeError::IncoherentBuildModel(
                "layer specification must end with an Output layer".to_string(),
            )),
        }
    }
}

impl Default for LayerSpec {
    fn default() -> Self {
        Self::default_spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_resolution() {
        let spec = LayerSpec::default_spec();
        let resolved = spec.resolve(10, 4);

        assert_eq!(
            resolved.descriptors()[0],
            LayerDescriptor::Input { shape: 10 }
        );
        assert_eq!(
            resolved.descriptors()[3],
            LayerDescriptor::Output { length: 4 }
        );
        // The original spec is untouched
        assert_eq!(spec, LayerSpec::default_spec());
    }

    #[test]
    fn test_custom_spec_used_verbatim() {
        let custom = LayerSpec::new(vec![
            LayerDescriptor::Input { shape: 6 },
            LayerDescriptor::FullyConnected {
                nodes: 16,
                name: "hidden".to_string(),
            },
            LayerDescriptor::Output { length: 3 },
        ]);
        let resolved = custom.resolve(99, 99);
        assert_eq!(resolved, custom);
    }

    #[test]
    fn test_layer_dims_chain() {
        let spec = LayerSpec::default_spec().resolve(10, 4);
        let dims = spec.layer_dims(4).unwrap();
        assert_eq!(dims, vec![(10, 50), (50, 50), (50, 4)]);
    }

    #[test]
    fn test_misplaced_input_fails() {
        let spec = LayerSpec::new(vec![
            LayerDescriptor::FullyConnected {
                nodes: 8,
                name: "fc1".to_string(),
            },
            LayerDescriptor::Input { shape: 4 },
            LayerDescriptor::Output { length: 2 },
        ]);
        match spec.layer_dims(2) {
            Err(QforgeError::IncoherentBuildModel(_)) => {}
            other => panic!("expected IncoherentBuildModel, got {:?}", other),
        }
    }

    #[test]
    fn test_output_not_last_fails() {
        let spec = LayerSpec::new(vec![
            LayerDescriptor::Input { shape: 4 },
            LayerDescriptor::Output { length: 2 },
            LayerDescriptor::FullyConnected {
                nodes: 8,
                name: "fc1".to_string(),
            },
        ]);
        assert!(matches!(
            spec.layer_dims(2),
            Err(QforgeError::IncoherentBuildModel(_))
        ));
    }

    #[test]
    fn test_no_hidden_layers_is_valid() {
        let spec = LayerSpec::new(vec![
            LayerDescriptor::Input { shape: 4 },
            LayerDescriptor::Output { length: 2 },
        ]);
        assert_eq!(spec.layer_dims(2).unwrap(), vec![(4, 2)]);
    }
}
