//! In-process backend returning canned tensors, for tests

use anyhow::Result;
use ndarray::Array4;
use parking_lot::Mutex;

use super::pool::{InferenceBackend, ModelType, OutputTensor};

type InferFn = dyn Fn(ModelType, &Array4<f32>) -> Result<OutputTensor> + Send + Sync;

pub struct MockBackend {
    infer_fn: Box<InferFn>,
    calls: Mutex<Vec<(ModelType, Vec<usize>)>>,
}

impl MockBackend {
    pub fn new<F>(infer_fn: F) -> Self
    where
        F: Fn(ModelType, &Array4<f32>) -> Result<OutputTensor> + Send + Sync + 'static,
    {
        Self {
            infer_fn: Box::new(infer_fn),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Detector always returns `detections`; classifiers are not expected
    pub fn with_detections(detections: OutputTensor) -> Self {
        Self::new(move |model, _| match model {
            ModelType::Detector => Ok(detections.clone()),
            other => anyhow::bail!("unexpected {} call", other.as_str()),
        })
    }

    /// Canned outputs for all three models
    pub fn with_outputs(detections: OutputTensor, gender: Vec<f32>, age: Vec<f32>) -> Self {
        Self::new(move |model, _| {
            Ok(match model {
                ModelType::Detector => detections.clone(),
                ModelType::Gender => OutputTensor::new(vec![1, gender.len()], gender.clone()),
                ModelType::Age => OutputTensor::new(vec![1, age.len()], age.clone()),
            })
        })
    }

    /// Model and input shape of every call so far
    pub fn calls(&self) -> Vec<(ModelType, Vec<usize>)> {
        self.calls.lock().clone()
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, model: ModelType, input: &Array4<f32>) -> Result<OutputTensor> {
        self.calls.lock().push((model, input.shape().to_vec()));
        (self.infer_fn)(model, input)
    }
}
