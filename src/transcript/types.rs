use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::ranges::TimeRange;

/// One timed unit produced by speech recognition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFragment {
    pub text: String,
    pub time_range: TimeRange,
    /// Recognizers that already assign stable ids can pass them through
    #[serde(default)]
    pub id: Option<String>,
}

/// One-shot recognition result consumed by `HistoryStore::load`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub duration: f64,
    pub fragments: Vec<RecognizedFragment>,
}

/// A transcript fragment with its deletion flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub text: String,
    /// Immutable once the fragment exists
    pub time_range: TimeRange,
    #[serde(default)]
    pub deleted: bool,
}

impl Fragment {
    pub fn new(id: impl Into<String>, text: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            time_range,
            deleted: false,
        }
    }

    pub fn start(&self) -> f64 {
        self.time_range.start
    }

    pub fn end(&self) -> f64 {
        self.time_range.end
    }

    pub fn duration(&self) -> f64 {
        self.time_range.duration()
    }
}

impl From<RecognizedFragment> for Fragment {
    fn from(recognized: RecognizedFragment) -> Self {
        let id = recognized
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Fragment::new(id, recognized.text, recognized.time_range)
    }
}

/// Partial update of the mutable fragment fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

impl FragmentPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn deleted(deleted: bool) -> Self {
        Self {
            deleted: Some(deleted),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.deleted.is_none()
    }

    /// Current values of `fragment` for every key present in this patch
    pub fn reverse_for(&self, fragment: &Fragment) -> FragmentPatch {
        FragmentPatch {
            text: self.text.as_ref().map(|_| fragment.text.clone()),
            deleted: self.deleted.map(|_| fragment.deleted),
        }
    }

    /// Later keys win
    pub fn merge(&mut self, later: FragmentPatch) {
        if later.text.is_some() {
            self.text = later.text;
        }
        if later.deleted.is_some() {
            self.deleted = later.deleted;
        }
    }

    pub fn apply(&self, fragment: &mut Fragment) {
        if let Some(text) = &self.text {
            fragment.text = text.clone();
        }
        if let Some(deleted) = self.deleted {
            fragment.deleted = deleted;
        }
    }
}

/// Reversible single-fragment edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOperation {
    pub fragment_id: String,
    pub previous: FragmentPatch,
    pub next: FragmentPatch,
}
