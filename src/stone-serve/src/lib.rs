//! Stone recognition pipeline.
//!
//! Decodes an uploaded image, runs it through a lazily loaded classifier and
//! returns the three most likely stone types with renormalized confidences.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

pub mod engine;
pub mod error;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod profile;
#[cfg(feature = "tensorflow")]
pub mod saved_model;
pub mod upload;

pub use engine::{InferenceEngine, PredictionEntry, PredictionResult};
pub use error::{ClassifyError, LabelMapError, ModelLoadError};
pub use labels::LabelMap;
pub use model::{Classifier, ModelLoader, ModelProvider};
pub use preprocess::{prepare, ImageTensor};
pub use profile::{ChannelOrder, PreprocessingProfile, ResizeFilter};
#[cfg(feature = "tensorflow")]
pub use saved_model::SavedModelLoader;
pub use upload::{DiskUploadStore, UploadStore};

pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
            duration: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    /// Start the timer
    pub fn start(&mut self) {
        debug!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
        self.duration = None;
    }

    /// Stop the timer
    pub fn stop(&mut self) {
        match self.tstamp {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                self.tstamp = None;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }
    }

    /// Duration of the last completed run in milliseconds
    pub fn duration(&self) -> i64 {
        match self.duration {
            None => 0,
            Some(dur) => dur.num_milliseconds(),
        }
    }
}
