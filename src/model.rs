use std::fs;
use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use tensorflow::{
    Graph, ImportGraphDefOptions, Output, SavedModelBundle, Session, SessionOptions,
    SessionRunArgs, Tensor, DEFAULT_SERVING_SIGNATURE_DEF_KEY,
};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::AppError;

const SERVE_TAG: &str = "serve";

/// Anything that maps a (batch, height, width, channels) tensor to per-row class scores.
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Optimizer {
    Adamax { learning_rate: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    CategoricalCrossentropy,
}

/// Settings the model was trained and compiled with. Inference never reads them, they
/// travel with the handle so every loaded model is described identically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileSettings {
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub metrics: &'static [&'static str],
}

pub const COMPILE_SETTINGS: CompileSettings = CompileSettings {
    optimizer: Optimizer::Adamax {
        learning_rate: 0.001,
    },
    loss: Loss::CategoricalCrossentropy,
    metrics: &["accuracy"],
};

#[derive(Debug, Clone)]
struct TensorName {
    op: String,
    index: i32,
}

struct Loaded {
    graph: Graph,
    session: Session,
}

/// A TensorFlow graph loaded once and shared by every request.
pub struct TfModel {
    inner: Mutex<Loaded>,
    input: TensorName,
    output: TensorName,
    /// `None` when the graph does not declare a rank.
    input_shape: Option<Vec<Option<i64>>>,
    compile: CompileSettings,
}

impl TfModel {
    /// Loads a SavedModel directory, or a frozen GraphDef when `path` is a file.
    pub fn load(config: &ModelConfig) -> Result<Self, AppError> {
        let path = config.path.as_path();
        if !path.exists() {
            return Err(AppError::ModelNotFound(path.display().to_string()));
        }

        let (graph, session, input, output) = if path.is_dir() {
            load_saved_model(path)?
        } else {
            load_frozen_graph(path, &config.input_op, &config.output_op)?
        };

        let input_op = graph.operation_by_name_required(&input.op)?;
        let shape = graph.tensor_shape(Output {
            operation: input_op,
            index: input.index,
        })?;
        let input_shape = shape
            .dims()
            .map(|rank| (0..rank).map(|i| shape[i]).collect::<Vec<_>>());

        info!(
            path = %path.display(),
            input = %input.op,
            output = %output.op,
            shape = ?input_shape,
            "loaded model"
        );

        Ok(TfModel {
            inner: Mutex::new(Loaded { graph, session }),
            input,
            output,
            input_shape,
            compile: COMPILE_SETTINGS,
        })
    }

    pub fn compile_settings(&self) -> &CompileSettings {
        &self.compile
    }

    pub fn check_input_shape(&self, got: &[usize]) -> Result<(), AppError> {
        match &self.input_shape {
            Some(declared) => check_shape(declared, got),
            None => Ok(()),
        }
    }
}

impl Classifier for TfModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, AppError> {
        self.check_input_shape(batch.shape())?;

        let dims: Vec<u64> = batch.shape().iter().map(|&d| d as u64).collect();
        let rows = batch.shape()[0];
        let values: Vec<f32> = batch.iter().copied().collect();
        let input_tensor = Tensor::new(&dims).with_values(&values)?;

        let loaded = self.inner.lock().map_err(|_| AppError::Poisoned)?;
        let input_op = loaded.graph.operation_by_name_required(&self.input.op)?;
        let output_op = loaded.graph.operation_by_name_required(&self.output.op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_op, self.input.index, &input_tensor);
        let output_token = args.request_fetch(&output_op, self.output.index);
        loaded.session.run(&mut args)?;
        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        drop(loaded);

        let scores: Vec<f32> = output_tensor.to_vec();
        let classes = if rows == 0 { 0 } else { scores.len() / rows };
        debug!(rows, classes, "forward pass complete");

        Array2::from_shape_vec((rows, classes), scores).map_err(|_| AppError::ShapeMismatch {
            expected: vec![Some(rows as i64), None],
            got: output_tensor.dims().iter().map(|&d| d as usize).collect(),
        })
    }
}

/// Compares a batch shape against a declared one. Unknown declared dims match anything.
pub fn check_shape(declared: &[Option<i64>], got: &[usize]) -> Result<(), AppError> {
    let matches = declared.len() == got.len()
        && declared.iter().zip(got).all(|(want, &have)| match want {
            Some(d) if *d >= 0 => *d as usize == have,
            _ => true,
        });

    if matches {
        Ok(())
    } else {
        Err(AppError::ShapeMismatch {
            expected: declared.to_vec(),
            got: got.to_vec(),
        })
    }
}

fn load_saved_model(path: &Path) -> Result<(Graph, Session, TensorName, TensorName), AppError> {
    let mut graph = Graph::new();
    let bundle = SavedModelBundle::load(&SessionOptions::new(), [SERVE_TAG], &mut graph, path)?;
    let signature = bundle
        .meta_graph_def()
        .get_signature(DEFAULT_SERVING_SIGNATURE_DEF_KEY)?;

    let single = |infos: Vec<&tensorflow::TensorInfo>, what: &str| match infos.as_slice() {
        [info] => Ok(TensorName {
            op: info.name().name.clone(),
            index: info.name().index,
        }),
        _ => Err(AppError::ModelNotFound(format!(
            "{}: serving signature must have exactly one {what}, found {}",
            path.display(),
            infos.len()
        ))),
    };
    let input = single(signature.inputs().values().collect(), "input")?;
    let output = single(signature.outputs().values().collect(), "output")?;

    Ok((graph, bundle.session, input, output))
}

fn load_frozen_graph(
    path: &Path,
    input_op: &str,
    output_op: &str,
) -> Result<(Graph, Session, TensorName, TensorName), AppError> {
    let mut graph = Graph::new();
    let model_bytes = fs::read(path)?;
    graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;
    let session = Session::new(&SessionOptions::new(), &graph)?;

    Ok((
        graph,
        session,
        TensorName {
            op: input_op.to_string(),
            index: 0,
        },
        TensorName {
            op: output_op.to_string(),
            index: 0,
        },
    ))
}
