use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use structopt::StructOpt;
use stone_serve::{
    InferenceEngine, LabelMap, ModelProvider, PredictionResult, SavedModelLoader, Timer,
};

use log::{error, info};
use serde::Serialize;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "stone-classify",
    about = "CLI app to recognize stone types in images with TensorFlow"
)]
struct CmdArgs {
    #[structopt(parse(from_os_str), help = "Export directory of TensorFlow SavedModel")]
    export_dir: PathBuf,

    #[structopt(
        parse(from_os_str),
        help = "Path to class labels (JSON index map or one label per line)"
    )]
    labels_path: PathBuf,

    #[structopt(parse(from_os_str), required = true, help = "Images to classify")]
    images: Vec<PathBuf>,

    #[structopt(long, default_value = "3", help = "Number of candidate stones to report")]
    top_k: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    image: &'a str,
    predictions: PredictionResult,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let labels = LabelMap::load(&args.labels_path)?;
    let provider = ModelProvider::new(Box::new(SavedModelLoader::new(&args.export_dir)));
    let engine = InferenceEngine::new(labels, provider);

    let stdout = io::stdout();
    let failures = classify_all(&engine, &args.images, args.top_k, &mut stdout.lock())?;

    info!(
        "Classified {} of {} images",
        args.images.len() - failures,
        args.images.len()
    );

    if failures > 0 {
        return Err(format!("{} images could not be classified", failures).into());
    }

    Ok(())
}

/// Print one JSON report per classified image to `out` and return how many
/// images could not be read or classified.
fn classify_all(
    engine: &InferenceEngine,
    images: &[PathBuf],
    top_k: usize,
    out: &mut impl Write,
) -> Result<usize, Box<dyn Error>> {
    let mut failures = 0;
    for path in images {
        let mut t = Timer::new_start(&format!("Classifying {}", path.display()));

        let name = path.to_string_lossy();
        match engine.predict_file_top_k(path, top_k) {
            Ok(predictions) => {
                let report = Report {
                    image: &name,
                    predictions,
                };
                writeln!(out, "{}", serde_json::to_string(&report)?)?;
            }
            Err(err) => {
                error!("{}: {}", path.display(), err);
                failures += 1;
            }
        }

        t.stop();
    }

    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;
    use stone_serve::{
        Classifier, ClassifyError, ImageTensor, ModelLoadError, ModelLoader, PreprocessingProfile,
    };

    struct Marble(PreprocessingProfile);

    impl Classifier for Marble {
        fn infer(&self, _tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
            Ok(vec![0.7, 0.2, 0.1])
        }

        fn profile(&self) -> &PreprocessingProfile {
            &self.0
        }
    }

    struct MarbleLoader;

    impl ModelLoader for MarbleLoader {
        fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
            Ok(Arc::new(Marble(PreprocessingProfile::default())))
        }

        fn describe(&self) -> String {
            "marble".to_owned()
        }
    }

    #[test]
    fn unreadable_file_counts_as_failure_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("slab.png");
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([220, 220, 215])))
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        fs::write(&good, buf).unwrap();

        let labels = LabelMap::from_lines("carrara\nstatuario\nemperador").unwrap();
        let engine = InferenceEngine::new(labels, ModelProvider::new(Box::new(MarbleLoader)));

        let images = vec![dir.path().join("missing.png"), good];
        let mut out = Vec::new();
        let failures = classify_all(&engine, &images, 3, &mut out).unwrap();

        assert_eq!(failures, 1);

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 1);

        let report: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(report["predictions"][0]["stone"], "carrara");
        assert_eq!(report["predictions"][0]["probability"], 0.7);
    }
}
