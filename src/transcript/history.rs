// Fragment edit store - holds the transcript fragments with their deletion
// flags and a coalescing undo/redo history

use std::time::{Duration, Instant};

use log::{debug, info};

use super::types::{EditOperation, Fragment, FragmentPatch, TranscriptionResult};
use crate::timeline::segments::{
    deleted_segments, editing_stats, kept_segments, to_video_segments, EditingStats, TimeSegment,
    VideoSegment,
};

pub const DEFAULT_MERGE_THRESHOLD: Duration = Duration::from_millis(500);
pub const DEFAULT_LANGUAGE: &str = "en";

/// Owned edit state for one transcript.
///
/// Mutators take `&mut self`; hosts that share a store across tasks wrap it
/// (see `state::EditorState`). Derived text and duration are recomputed after
/// every change so readers never observe stale values.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    fragments: Vec<Fragment>,
    language: String,
    undo_stack: Vec<EditOperation>,
    redo_stack: Vec<EditOperation>,
    last_update: Option<Instant>,
    merge_threshold: Duration,
    text: String,
    duration: f64,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            fragments: Vec::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            last_update: None,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            text: String::new(),
            duration: 0.0,
        }
    }

    pub fn with_merge_threshold(merge_threshold: Duration) -> Self {
        Self {
            merge_threshold,
            ..Self::new()
        }
    }

    /// Replace the whole transcript with a fresh recognition result
    pub fn load(&mut self, result: TranscriptionResult) {
        let fragments = result.fragments.into_iter().map(Fragment::from).collect();
        self.load_fragments(fragments, result.language);
    }

    /// Replace the whole transcript with already-built fragments
    pub fn load_fragments(&mut self, mut fragments: Vec<Fragment>, language: impl Into<String>) {
        fragments.sort_by(|a, b| a.start().total_cmp(&b.start()));

        self.fragments = fragments;
        self.language = language.into();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_update = None;
        self.recompute();

        info!(
            "Loaded transcript: {} fragments, language={}, duration={:.2}s",
            self.fragments.len(),
            self.language,
            self.duration
        );
    }

    pub fn update(&mut self, id: &str, patch: FragmentPatch) {
        self.update_at(id, patch, Instant::now());
    }

    /// `update` with an explicit clock reading for the coalescing window.
    ///
    /// Text edits to the same fragment inside the merge threshold fold into
    /// the previous undo entry. Deletion flag changes always open a new entry
    /// so a toggle followed by its reverse stays two undo steps.
    pub fn update_at(&mut self, id: &str, patch: FragmentPatch, now: Instant) {
        if patch.is_empty() {
            return;
        }

        let Some(index) = self.index_of(id) else {
            debug!("update: unknown fragment id {}, ignoring", id);
            return;
        };

        let previous = patch.reverse_for(&self.fragments[index]);
        patch.apply(&mut self.fragments[index]);

        let within_window = self
            .last_update
            .map(|last| now.saturating_duration_since(last) < self.merge_threshold)
            .unwrap_or(false);
        let coalesce = within_window && patch.deleted.is_none();

        match self.undo_stack.last_mut() {
            Some(last) if coalesce && last.fragment_id == id => {
                // Keys first touched by this patch still need their origin value
                if last.previous.text.is_none() {
                    last.previous.text = previous.text;
                }
                if last.previous.deleted.is_none() {
                    last.previous.deleted = previous.deleted;
                }
                last.next.merge(patch);
                debug!("update: coalesced edit into last entry for {}", id);
            }
            _ => self.undo_stack.push(EditOperation {
                fragment_id: id.to_string(),
                previous,
                next: patch,
            }),
        }

        self.redo_stack.clear();
        self.last_update = Some(now);
        self.recompute();
    }

    pub fn toggle_deleted(&mut self, id: &str) {
        self.toggle_deleted_at(id, Instant::now());
    }

    pub fn toggle_deleted_at(&mut self, id: &str, now: Instant) {
        let Some(current) = self.fragment(id).map(|f| f.deleted) else {
            debug!("toggle_deleted: unknown fragment id {}, ignoring", id);
            return;
        };
        self.update_at(id, FragmentPatch::deleted(!current), now);
    }

    pub fn delete_batch<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.set_deleted_batch(ids, true, Instant::now());
    }

    pub fn restore_batch<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.set_deleted_batch(ids, false, Instant::now());
    }

    /// Apply one deletion flag to many fragments as a single batch.
    ///
    /// Only fragments whose flag actually changes get an undo entry; all
    /// entries share the `now` timestamp. Nothing changes means nothing is
    /// recorded, including the timestamp.
    pub fn set_deleted_batch<I>(&mut self, ids: I, deleted: bool, now: Instant)
    where
        I: IntoIterator<Item = String>,
    {
        let mut operations = Vec::new();

        for id in ids {
            let Some(index) = self.index_of(&id) else {
                debug!("batch: unknown fragment id {}, skipping", id);
                continue;
            };
            let fragment = &mut self.fragments[index];
            if fragment.deleted == deleted {
                continue;
            }

            operations.push(EditOperation {
                fragment_id: id,
                previous: FragmentPatch::deleted(fragment.deleted),
                next: FragmentPatch::deleted(deleted),
            });
            fragment.deleted = deleted;
        }

        if operations.is_empty() {
            return;
        }

        debug!(
            "batch: {} {} fragments",
            if deleted { "deleted" } else { "restored" },
            operations.len()
        );

        self.undo_stack.extend(operations);
        self.redo_stack.clear();
        self.last_update = Some(now);
        self.recompute();
    }

    pub fn undo(&mut self) {
        let Some(operation) = self.undo_stack.last() else {
            return;
        };
        let Some(index) = self.index_of(&operation.fragment_id) else {
            debug!("undo: target {} no longer exists", operation.fragment_id);
            return;
        };

        operation.previous.apply(&mut self.fragments[index]);
        if let Some(operation) = self.undo_stack.pop() {
            self.redo_stack.push(operation);
        }
        self.recompute();
    }

    pub fn redo(&mut self) {
        let Some(operation) = self.redo_stack.last() else {
            return;
        };
        let Some(index) = self.index_of(&operation.fragment_id) else {
            debug!("redo: target {} no longer exists", operation.fragment_id);
            return;
        };

        operation.next.apply(&mut self.fragments[index]);
        if let Some(operation) = self.redo_stack.pop() {
            self.undo_stack.push(operation);
        }
        self.recompute();
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Back to the empty initial state, keeping nothing
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.fragments.iter().position(|f| f.id == id)
    }

    fn recompute(&mut self) {
        // Fragments stay sorted by start since time ranges never change
        let active = self.fragments.iter().filter(|f| !f.deleted);

        self.text = active
            .clone()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.duration = active.map(|f| f.duration()).sum();
    }

    // --- read side ---

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment(&self, id: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn last_undo(&self) -> Option<&EditOperation> {
        self.undo_stack.last()
    }

    pub fn merge_threshold(&self) -> Duration {
        self.merge_threshold
    }

    pub fn set_merge_threshold(&mut self, merge_threshold: Duration) {
        self.merge_threshold = merge_threshold;
    }

    pub fn kept_segments(&self) -> Vec<TimeSegment> {
        kept_segments(&self.fragments)
    }

    pub fn deleted_segments(&self) -> Vec<TimeSegment> {
        deleted_segments(&self.fragments)
    }

    /// Reconstruction input for the current edit state
    pub fn video_segments(&self) -> Vec<VideoSegment> {
        to_video_segments(&self.kept_segments(), &self.deleted_segments())
    }

    pub fn editing_stats(&self, original_duration: f64) -> EditingStats {
        editing_stats(&self.fragments, original_duration)
    }
}
