//! ONNX Runtime session wrapper for fixed-topology detection models.

use anyhow::{Context, Result};
use half::f16;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{ExecutionProvider,
                          CPUExecutionProvider,
                          CUDAExecutionProvider,
                          TensorRTExecutionProvider,
                          CoreMLExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::{Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, Value},
};
use crate::common::{InferenceDevice, ModelConfig};
use crate::data::{TimeCalc, CROSS_MARK, X};
use crate::utils::human_bytes;

/// Names, element types and dimensions of a session's inputs or outputs.
#[derive(Debug, Clone, Default)]
pub struct OrtTensorAttr {
    pub names: Vec<String>,
    pub dtypes: Vec<TensorElementType>,
    /// Dynamic axes are reported as 0.
    pub dimss: Vec<Vec<usize>>,
}

/// One named output converted to `f32`.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub name: String,
    pub data: Array<f32, IxDyn>,
}

/// ONNXRuntime Backend
#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
    device: InferenceDevice,
    inputs_attrs: OrtTensorAttr,
    outputs_attrs: OrtTensorAttr,
    model_bytes: u64,
    pub infer_time: TimeCalc,
}

impl OrtEngine {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model_bytes = std::fs::metadata(&config.model_path)
            .with_context(|| format!("model file {} is not readable", config.model_path))?
            .len();

        match &config.ort_lib_path {
            Some(path) => {
                ort::init_from(path).commit().context("Failed to commit ORT")?;
            }
            None => {
                ort::init().commit().context("Failed to commit ORT")?;
            }
        }

        let mut builder = Session::builder()?;

        let mut device = config.inference_device;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CUDA(device_id) => {
                Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CoreML(_) => Self::build_coreml(&mut builder).unwrap_or_else(|err| {
                log::warn!("{err}, Using cpu");
                device = InferenceDevice::CPU;
            }),
            InferenceDevice::CPU => {
                Self::build_cpu(&mut builder)?;
            }
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to build session from {}", config.model_path))?;

        let inputs_attrs = Self::io_attrs(session.inputs.iter().map(|x| (x.name.as_str(), &x.input_type)));
        let outputs_attrs = Self::io_attrs(session.outputs.iter().map(|x| (x.name.as_str(), &x.output_type)));
        if inputs_attrs.names.is_empty() {
            anyhow::bail!("{CROSS_MARK} Model {} declares no tensor inputs", config.model_path);
        }

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Model: {} ({}) | Inputs: {:?} {:?} | Outputs: {:?}",
            device,
            config.model_path,
            human_bytes(model_bytes as f64),
            inputs_attrs.dtypes,
            inputs_attrs.dimss,
            outputs_attrs.names,
        );

        Ok(Self {
            session,
            device,
            inputs_attrs,
            outputs_attrs,
            model_bytes,
            infer_time: TimeCalc::default(),
        })
    }

    fn build_trt(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_engine_cache(true)
            .with_engine_cache_path("trt-cache");
        if trt.is_available()? {
            match trt.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err) }
            }
            log::info!("🐢 Initial model serialization with TensorRT may takes some time...");
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_coreml(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CoreMLExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CoreML initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CoreML execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CPU initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn io_attrs<'a>(values: impl Iterator<Item = (&'a str, &'a ort::value::ValueType)>) -> OrtTensorAttr {
        let mut attrs = OrtTensorAttr::default();
        for (name, value_type) in values {
            let Some(dtype) = value_type.tensor_type() else {
                continue;
            };
            let dims = value_type
                .tensor_dimensions()
                .map(|dims| dims.iter().map(|&d| usize::try_from(d).unwrap_or(0)).collect())
                .unwrap_or_default();
            attrs.names.push(name.to_string());
            attrs.dtypes.push(dtype);
            attrs.dimss.push(dims);
        }
        attrs
    }

    /// Aligns the byte tensor with the model's declared input type.
    ///
    /// Quantized models take the bytes unchanged; float models take `(x - 127.5) / 127.5`.
    fn tensor_preprocess(x: &X, dtype: &TensorElementType) -> Result<DynValue> {
        let normalize = |v: u8| (v as f32 - 127.5) / 127.5;
        let x = match dtype {
            TensorElementType::Uint8 => Value::from_array(x.0.clone())?.into_dyn(),
            TensorElementType::Int8 => Value::from_array(x.mapv(|v| (v as i16 - 128) as i8))?.into_dyn(),
            TensorElementType::Float32 => Value::from_array(x.mapv(normalize))?.into_dyn(),
            TensorElementType::Float16 => Value::from_array(x.mapv(|v| f16::from_f32(normalize(v))))?.into_dyn(),
            _ => anyhow::bail!("{CROSS_MARK} Unsupported model input type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue, dtype: &TensorElementType) -> Result<Array<f32, IxDyn>> {
        fn _extract_and_convert<T>(x: &DynValue, map_fn: impl Fn(T) -> f32) -> Result<Array<f32, IxDyn>>
        where
            T: Clone + 'static + ort::tensor::PrimitiveTensorElementType,
        {
            let view = x.try_extract_tensor::<T>()?;
            Ok(view.mapv(map_fn))
        }
        let x = match dtype {
            TensorElementType::Float32 => _extract_and_convert::<f32>(x, |x| x)?,
            TensorElementType::Float16 => _extract_and_convert::<f16>(x, f16::to_f32)?,
            TensorElementType::Float64 => _extract_and_convert::<f64>(x, |x| x as f32)?,
            TensorElementType::Int64 => _extract_and_convert::<i64>(x, |x| x as f32)?,
            TensorElementType::Int32 => _extract_and_convert::<i32>(x, |x| x as f32)?,
            TensorElementType::Uint8 => _extract_and_convert::<u8>(x, |x| x as f32)?,
            _ => return Err(anyhow::anyhow!("Unsupported ort tensor type: {:?}", dtype)),
        };

        Ok(x)
    }

    /// Runs one forward pass. Outputs come back in session declaration order.
    pub fn engine_run(&mut self, x: &X) -> Result<Vec<EngineOutput>> {
        let t_pre = std::time::Instant::now();
        let xs_ = vec![SessionInputValue::from(Self::tensor_preprocess(x, &self.inputs_attrs.dtypes[0])?)];
        self.infer_time.add_or_push(0, t_pre.elapsed());

        let t_run = std::time::Instant::now();
        let outputs = self.session.run(&xs_[..])?;
        self.infer_time.add_or_push(1, t_run.elapsed());

        let t_post = std::time::Instant::now();
        let mut ys = Vec::with_capacity(self.outputs_attrs.names.len());
        for (dtype, name) in self.outputs_attrs.dtypes.iter().zip(self.outputs_attrs.names.iter()) {
            let data = Self::tensor_postprocess(&outputs[name.as_str()], dtype)
                .with_context(|| format!("Failed to read output {name}"))?;
            ys.push(EngineOutput {
                name: name.clone(),
                data,
            });
        }
        self.infer_time.add_or_push(2, t_post.elapsed());

        Ok(ys)
    }

    pub fn in_names(&self) -> &Vec<String> {
        &self.inputs_attrs.names
    }

    pub fn in_dtypes(&self) -> &Vec<TensorElementType> {
        &self.inputs_attrs.dtypes
    }

    pub fn in_dimss(&self) -> &Vec<Vec<usize>> {
        &self.inputs_attrs.dimss
    }

    pub fn out_names(&self) -> &Vec<String> {
        &self.outputs_attrs.names
    }

    /// Side of the square NHWC input, when the model declares a static one.
    pub fn input_side(&self) -> Option<u32> {
        match self.inputs_attrs.dimss.first()?.as_slice() {
            [_, h, w, 3] if *h > 0 && h == w => Some(*h as u32),
            _ => None,
        }
    }

    pub fn device(&self) -> &InferenceDevice {
        &self.device
    }

    pub fn model_bytes(&self) -> u64 {
        self.model_bytes
    }

    pub fn ts(&self) -> &TimeCalc {
        &self.infer_time
    }
}
