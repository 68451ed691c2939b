//! TensorFlow SavedModel backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use tensorflow::{
    Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Status, Tensor, TensorInfo,
};

use crate::error::{ClassifyError, ModelLoadError};
use crate::model::{Classifier, ModelLoader};
use crate::preprocess::ImageTensor;
use crate::profile::PreprocessingProfile;
use crate::Timer;

const SERVE_TAG: &str = "serve";
const SERVING_SIGNATURE: &str = "serving_default";

/// Loads a SavedModel export directory on demand.
pub struct SavedModelLoader {
    export_dir: PathBuf,
}

impl SavedModelLoader {
    pub fn new(export_dir: &Path) -> Self {
        SavedModelLoader {
            export_dir: export_dir.to_path_buf(),
        }
    }
}

impl ModelLoader for SavedModelLoader {
    fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        if !self.export_dir.is_dir() {
            return Err(ModelLoadError::NotFound(self.export_dir.clone()));
        }

        let profile = PreprocessingProfile::for_model_dir(&self.export_dir)?;
        let classifier = SavedModelClassifier::new(&self.export_dir, profile)
            .map_err(|status| ModelLoadError::Backend(status.to_string()))?;

        Ok(Arc::new(classifier))
    }

    fn describe(&self) -> String {
        self.export_dir.display().to_string()
    }
}

struct SavedModelClassifier {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    /// Input operation name and output index
    input: (String, i32),

    /// Output operation name and output index
    output: (String, i32),

    profile: PreprocessingProfile,
}

impl SavedModelClassifier {
    fn new(export_dir: &Path, profile: PreprocessingProfile) -> tensorflow::Result<Self> {
        let mut graph = Graph::new();
        let bundle =
            SavedModelBundle::load(&SessionOptions::new(), &[SERVE_TAG], &mut graph, export_dir)?;

        let signature = bundle.meta_graph_def().get_signature(SERVING_SIGNATURE)?;
        let input = single_tensor(signature.inputs())?;
        let output = single_tensor(signature.outputs())?;

        debug!("Serving input {:?}, output {:?}", input, output);

        Ok(SavedModelClassifier {
            graph,
            session: bundle.session,
            input,
            output,
            profile,
        })
    }
}

fn single_tensor(tensors: &HashMap<String, TensorInfo>) -> tensorflow::Result<(String, i32)> {
    let info: &TensorInfo = match tensors.values().next() {
        Some(info) if tensors.len() == 1 => info,
        _ => {
            return Err(Status::new_set_lossy(
                tensorflow::Code::InvalidArgument,
                "serving signature must have exactly one input and one output",
            ))
        }
    };

    Ok((info.name().name.clone(), info.name().index))
}

fn inference_error(status: Status) -> ClassifyError {
    ClassifyError::Inference(status.to_string())
}

impl Classifier for SavedModelClassifier {
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
        let mut t = Timer::new_start("Running session");

        let input = Tensor::new(tensor.dims())
            .with_values(tensor.data())
            .map_err(inference_error)?;

        let mut args = SessionRunArgs::new();

        let input_op = self
            .graph
            .operation_by_name_required(&self.input.0)
            .map_err(inference_error)?;
        args.add_feed(&input_op, self.input.1, &input);

        let output_op = self
            .graph
            .operation_by_name_required(&self.output.0)
            .map_err(inference_error)?;
        let result = args.request_fetch(&output_op, self.output.1);

        self.session.run(&mut args).map_err(inference_error)?;
        let output: Tensor<f32> = args.fetch(result).map_err(inference_error)?;

        t.stop();

        Ok(output.to_vec())
    }

    fn profile(&self) -> &PreprocessingProfile {
        &self.profile
    }
}
