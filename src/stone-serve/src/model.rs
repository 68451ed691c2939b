//! Model seams and the lazily initialized model provider.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::error::{ClassifyError, ModelLoadError};
use crate::preprocess::ImageTensor;
use crate::profile::PreprocessingProfile;
use crate::Timer;

/// A loaded model able to score one image.
pub trait Classifier: Send + Sync {
    /// Class probabilities for `tensor`, one entry per trained class.
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError>;

    /// Preprocessing the model was trained with.
    fn profile(&self) -> &PreprocessingProfile;
}

/// Knows how to bring a model artifact into memory.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError>;

    /// Human readable description of the artifact, for logs.
    fn describe(&self) -> String;
}

/// Owns the process-wide model, loading it on first use.
///
/// The check-and-load sequence runs under a mutex: concurrent first callers
/// wait for a single load and then share its result. A failed load leaves
/// the cell empty so the next caller retries.
pub struct ModelProvider {
    loader: Box<dyn ModelLoader>,
    model: Mutex<Option<Arc<dyn Classifier>>>,
}

impl ModelProvider {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        ModelProvider {
            loader,
            model: Mutex::new(None),
        }
    }

    pub fn get_model(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let mut cell = self.cell();

        if let Some(model) = cell.as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut t = Timer::new_start(&format!("Loading model from {}", self.loader.describe()));
        let model = self.loader.load().map_err(|e| {
            warn!("Model load failed: {}", e);
            e
        })?;
        t.stop();

        info!(
            "Model loaded with preprocessing profile {} v{}",
            model.profile().name,
            model.profile().version
        );

        *cell = Some(Arc::clone(&model));

        Ok(model)
    }

    /// Drop the cached model. The next `get_model` loads it again.
    pub fn force_reload(&self) {
        if self.cell().take().is_some() {
            info!("Dropped cached model");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell().is_some()
    }

    // The cell only ever holds `None` or a complete model, so a panic in
    // another holder cannot leave it half written.
    fn cell(&self) -> MutexGuard<'_, Option<Arc<dyn Classifier>>> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
