//! Queue paths and their flattening to storage table/resource names

use std::fmt;

/// A hierarchical queue address, e.g. `["orders", "step1"]`.
///
/// Flattened to a storage identifier by joining segments with `-`; the
/// empty path flattens to `root`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueuePath(Vec<String>);

impl QueuePath {
    pub fn root() -> Self {
        QueuePath(Vec::new())
    }

    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        QueuePath(segments.into_iter().map(Into::into).collect())
    }

    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        QueuePath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The flattened storage identifier for this path.
    pub fn flattened(&self) -> String {
        if self.0.is_empty() {
            "root".to_string()
        } else {
            self.0.join("-")
        }
    }
}

impl fmt::Display for QueuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flattened())
    }
}

impl From<&str> for QueuePath {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            QueuePath::root()
        } else {
            QueuePath(s.split('/').filter(|s| !s.is_empty()).map(String::from).collect())
        }
    }
}
