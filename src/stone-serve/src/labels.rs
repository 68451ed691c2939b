//! Class index to stone label mapping.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::info;

use crate::error::LabelMapError;

/// Immutable class index to label mapping, validated when built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<usize, String>,
}

impl LabelMap {
    /// Load the label artifact at `path`.
    ///
    /// `.json` files hold an object of stringified indices to labels
    /// (`{"0": "taj-mahal", ...}`). Anything else is read as a tags file
    /// with one label per line, the line number being the class index.
    pub fn load(path: &Path) -> Result<Self, LabelMapError> {
        let raw = fs::read_to_string(path).map_err(|source| LabelMapError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let labels = if is_json {
            Self::from_json_str(&raw)?
        } else {
            Self::from_lines(&raw)?
        };

        info!("Loaded {} labels from {}", labels.len(), path.display());

        Ok(labels)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LabelMapError> {
        let entries: HashMap<String, String> = serde_json::from_str(raw)?;

        let mut labels = BTreeMap::new();
        for (key, label) in entries {
            let index = key
                .trim()
                .parse::<usize>()
                .map_err(|_| LabelMapError::InvalidIndex(key.clone()))?;

            Self::insert(&mut labels, index, label)?;
        }

        Ok(LabelMap { labels })
    }

    pub fn from_lines(raw: &str) -> Result<Self, LabelMapError> {
        let mut labels = BTreeMap::new();
        for (index, line) in raw.lines().enumerate() {
            Self::insert(&mut labels, index, line.to_owned())?;
        }

        Ok(LabelMap { labels })
    }

    fn insert(
        labels: &mut BTreeMap<usize, String>,
        index: usize,
        label: String,
    ) -> Result<(), LabelMapError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(LabelMapError::EmptyLabel(index));
        }

        if labels.insert(index, label.to_owned()).is_some() {
            return Err(LabelMapError::DuplicateIndex(index));
        }

        Ok(())
    }

    /// Label for `index`, or `"Class {index}"` when the index is unmapped.
    pub fn resolve(&self, index: usize) -> String {
        match self.labels.get(&index) {
            Some(label) => label.clone(),
            None => format!("Class {}", index),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_json_mapping() {
        let labels =
            LabelMap::from_json_str(r#"{"0": "taj-mahal", "1": "nero-marquina"}"#).unwrap();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.resolve(0), "taj-mahal");
        assert_eq!(labels.resolve(1), "nero-marquina");
    }

    #[test]
    fn unmapped_index_gets_placeholder() {
        let labels = LabelMap::from_json_str(r#"{"0": "taj-mahal"}"#).unwrap();
        assert_eq!(labels.resolve(999), "Class 999");
    }

    #[test]
    fn rejects_non_integer_key() {
        let err = LabelMap::from_json_str(r#"{"zero": "taj-mahal"}"#).unwrap_err();
        assert!(matches!(err, LabelMapError::InvalidIndex(key) if key == "zero"));
    }

    #[test]
    fn rejects_negative_key() {
        let err = LabelMap::from_json_str(r#"{"-1": "taj-mahal"}"#).unwrap_err();
        assert!(matches!(err, LabelMapError::InvalidIndex(_)));
    }

    #[test]
    fn rejects_blank_label() {
        let err = LabelMap::from_json_str(r#"{"3": "  "}"#).unwrap_err();
        assert!(matches!(err, LabelMapError::EmptyLabel(3)));
    }

    #[test]
    fn rejects_aliased_index() {
        let err = LabelMap::from_json_str(r#"{"1": "a", "01": "b"}"#).unwrap_err();
        assert!(matches!(err, LabelMapError::DuplicateIndex(1)));
    }

    #[test]
    fn rejects_non_object() {
        let err = LabelMap::from_json_str(r#"["taj-mahal"]"#).unwrap_err();
        assert!(matches!(err, LabelMapError::Format(_)));
    }

    #[test]
    fn tags_file_uses_line_numbers() {
        let labels = LabelMap::from_lines("background\ncalacatta\nemperador\n").unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.resolve(2), "emperador");
        assert_eq!(labels.resolve(3), "Class 3");
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("class_indices.json");
        fs::write(&json, r#"{"7": "travertine"}"#).unwrap();
        assert_eq!(LabelMap::load(&json).unwrap().resolve(7), "travertine");

        let txt = dir.path().join("labels.txt");
        let mut f = fs::File::create(&txt).unwrap();
        writeln!(f, "granite").unwrap();
        writeln!(f, "onyx").unwrap();
        assert_eq!(LabelMap::load(&txt).unwrap().resolve(1), "onyx");
    }

    #[test]
    fn load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LabelMap::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, LabelMapError::Io { .. }));
    }
}
