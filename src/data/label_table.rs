use std::path::Path;
use regex::Regex;
use crate::common::{DetectorError, UNKNOWN_LABEL};
use crate::utils;

/// Ordered, read-only class label lookup loaded once at start-up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Reads a newline-delimited label file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let lines = utils::file_to_vec(path)
            .map_err(|e| DetectorError::load(format!("unable to read labels {}: {}", path.display(), e)))?;
        let table = Self::from_lines(&lines);
        if table.is_empty() {
            return Err(DetectorError::load(format!("label file {} is empty", path.display())));
        }
        log::info!("Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Accepts plain `label` lines, or `<index> <label>` lines when every non-empty line has an index.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut lines: Vec<&str> = lines.iter().map(|l| l.as_ref().trim_end_matches('\r')).collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }

        let indexed = Regex::new(r"^\s*(\d+)[\s:]+(\S.*?)\s*$").ok();
        let all_indexed = indexed.as_ref().is_some_and(|re| {
            let mut non_empty = lines.iter().filter(|l| !l.trim().is_empty()).peekable();
            non_empty.peek().is_some() && non_empty.all(|l| re.is_match(l))
        });

        let labels = match indexed {
            Some(re) if all_indexed => {
                let mut labels: Vec<String> = Vec::new();
                for line in lines.iter().filter(|l| !l.trim().is_empty()) {
                    if let Some(caps) = re.captures(line) {
                        let idx: usize = match caps[1].parse() {
                            Ok(idx) => idx,
                            Err(_) => continue,
                        };
                        if idx >= labels.len() {
                            labels.resize(idx + 1, UNKNOWN_LABEL.to_string());
                        }
                        labels[idx] = caps[2].to_string();
                    }
                }
                labels
            }
            _ => lines.iter().map(|l| l.trim().to_string()).collect(),
        };

        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Direct lookup; out-of-range and negative indices map to the unknown label.
    pub fn get(&self, index: i64) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// Resolves a model class id, skipping `offset` reserved leading entries.
    pub fn label_for_class(&self, class_id: i64, offset: i64) -> &str {
        match class_id.checked_add(offset) {
            Some(index) => self.get(index),
            None => UNKNOWN_LABEL,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LabelTable {
        LabelTable::from_lines(&["???", "person", "bicycle", "bottle", ""])
    }

    #[test]
    fn offset_skips_background_entry() {
        let t = table();
        assert_eq!(t.len(), 4);
        assert_eq!(t.label_for_class(0, 1), "person");
        assert_eq!(t.label_for_class(2, 1), "bottle");
    }

    #[test]
    fn out_of_range_is_unknown() {
        let t = table();
        assert_eq!(t.label_for_class(9999, 1), UNKNOWN_LABEL);
        assert_eq!(t.label_for_class(-5, 1), UNKNOWN_LABEL);
        assert_eq!(t.label_for_class(i64::MAX, 1), UNKNOWN_LABEL);
    }

    #[test]
    fn indexed_label_lines() {
        let t = LabelTable::from_lines(&["0 background", "1 person", "3 car"]);
        assert_eq!(t.get(1), "person");
        assert_eq!(t.get(2), UNKNOWN_LABEL);
        assert_eq!(t.get(3), "car");
    }

    #[test]
    fn plain_labels_with_digits_stay_untouched() {
        let t = LabelTable::from_lines(&["person", "7 up"]);
        assert_eq!(t.get(1), "7 up");
    }

    #[test]
    fn missing_file_is_load_failure() {
        let err = LabelTable::from_file("/nonexistent/labels.txt").unwrap_err();
        assert!(matches!(err, DetectorError::ModelLoadFailure(_)));
    }
}
