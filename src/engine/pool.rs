//! Model Pool
//!
//! Loads the detector and both attribute classifiers once at startup and
//! shares them read-only for the lifetime of the process.

use std::ops::Deref;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use parking_lot::Mutex;
use tracing::info;

use crate::config::{InferenceConfig, ModelsConfig};

/// Wrapper for OpenVINO Core that implements Send + Sync
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync.
///
/// The Rust bindings need `&mut` to create an infer request, so creation is
/// serialized behind a mutex. The request itself runs unlocked.
pub struct SafeCompiledModel(Mutex<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    fn new(compiled: CompiledModel) -> Self {
        Self(Mutex::new(compiled))
    }

    /// Create an inference request
    pub fn create_infer_request(&self) -> Result<openvino::InferRequest> {
        let mut compiled = self.0.lock();
        compiled.create_infer_request().map_err(|e| e.into())
    }
}

/// Model types that can be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Detector,
    Gender,
    Age,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Detector => "detector",
            ModelType::Gender => "gender",
            ModelType::Age => "age",
        }
    }
}

/// Flat f32 output of a single forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// Runs one NCHW f32 input through one of the loaded models.
///
/// Implemented by [`ModelPool`] for OpenVINO; pre- and post-processing only
/// ever talk to this trait.
pub trait InferenceBackend: Send + Sync + 'static {
    fn infer(&self, model: ModelType, input: &Array4<f32>) -> Result<OutputTensor>;
}

/// Immutable set of compiled models
pub struct ModelPool {
    // compiled models must not outlive the runtime core
    _core: SafeCore,
    device: String,
    detector: SafeCompiledModel,
    gender: SafeCompiledModel,
    age: SafeCompiledModel,
}

impl ModelPool {
    /// Load every model. Any failure here is fatal for the service.
    pub fn load(config: &InferenceConfig, models: &ModelsConfig) -> Result<Self> {
        let mut core = Core::new().context("Failed to initialize OpenVINO runtime")?;

        let detector = Self::compile(&mut core, &config.device, ModelType::Detector, &models.detector)?;
        let gender = Self::compile(&mut core, &config.device, ModelType::Gender, &models.gender)?;
        let age = Self::compile(&mut core, &config.device, ModelType::Age, &models.age)?;

        Ok(Self {
            _core: SafeCore(core),
            device: config.device.clone(),
            detector,
            gender,
            age,
        })
    }

    fn compile(
        core: &mut Core,
        device: &str,
        model_type: ModelType,
        path: &Path,
    ) -> Result<SafeCompiledModel> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Model path is not valid UTF-8: {:?}", path))?;

        info!("Loading model: {} from {}", model_type.as_str(), path_str);
        let start = Instant::now();

        let model = core
            .read_model_from_file(path_str, "")
            .with_context(|| format!("Failed to read {} model from {}", model_type.as_str(), path_str))?;
        let compiled = core
            .compile_model(&model, device.into())
            .with_context(|| format!("Failed to compile {} model for {}", model_type.as_str(), device))?;

        info!("Model {} loaded in {:?}", model_type.as_str(), start.elapsed());
        Ok(SafeCompiledModel::new(compiled))
    }

    /// Device the models were compiled for
    pub fn device(&self) -> &str {
        &self.device
    }

    fn model(&self, model_type: ModelType) -> &SafeCompiledModel {
        match model_type {
            ModelType::Detector => &self.detector,
            ModelType::Gender => &self.gender,
            ModelType::Age => &self.age,
        }
    }
}

impl InferenceBackend for ModelPool {
    fn infer(&self, model_type: ModelType, input: &Array4<f32>) -> Result<OutputTensor> {
        let mut request = self.model(model_type).create_infer_request()?;

        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_shape = Shape::new(&dims)?;
        let mut tensor = Tensor::new(ElementType::F32, &input_shape)?;
        write_f32(tensor.get_raw_data_mut()?, input.iter().copied());

        request.set_input_tensor(&tensor)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let shape: Vec<usize> = output
            .get_shape()?
            .get_dimensions()
            .iter()
            .map(|&d| d.max(0) as usize)
            .collect();
        let data = read_f32(output.get_raw_data()?);

        tracing::debug!("{} output shape {:?}", model_type.as_str(), shape);
        Ok(OutputTensor::new(shape, data))
    }
}

/// Copy f32 values into a raw native-endian tensor buffer
fn write_f32(dst: &mut [u8], values: impl Iterator<Item = f32>) {
    for (chunk, value) in dst.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Read a raw native-endian tensor buffer as f32 values
fn read_f32(src: &[u8]) -> Vec<f32> {
    src.chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_as_str() {
        assert_eq!(ModelType::Detector.as_str(), "detector");
        assert_eq!(ModelType::Gender.as_str(), "gender");
        assert_eq!(ModelType::Age.as_str(), "age");
    }

    #[test]
    fn test_raw_buffer_roundtrip() {
        let values = [0.0f32, -1.5, 78.4263, f32::MAX];
        let mut raw = vec![0u8; values.len() * 4];
        write_f32(&mut raw, values.iter().copied());
        assert_eq!(read_f32(&raw), values.to_vec());
    }

    #[test]
    fn test_read_ignores_trailing_bytes() {
        let mut raw = 2.0f32.to_ne_bytes().to_vec();
        raw.push(0xff);
        assert_eq!(read_f32(&raw), vec![2.0]);
    }
}
