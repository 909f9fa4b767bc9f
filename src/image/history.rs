//! Non-destructive edit history carried alongside the pixels.
//!
//! A history is an ordered list of steps. Each step may record the filter
//! that produced it and the files it refers to (the original it was loaded
//! from, intermediates written on the way). Nothing here touches pixels; the
//! history is data for whoever saves or catalogs the image.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a referenced file plays in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryImageKind {
    #[default]
    Original,
    Source,
    Intermediate,
    Current,
}

/// A file referenced from a history step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryImageId {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    pub file_name: String,
    pub path: String,
    pub unique_hash: String,
    pub file_size: u64,
    pub kind: HistoryImageKind,
}

impl HistoryImageId {
    pub fn is_valid(&self) -> bool {
        !self.uuid.is_empty() || (!self.file_name.is_empty() && !self.unique_hash.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    /// Same input always gives the same output.
    Reproducible,
    /// Output depends on something outside the parameters (randomness, time).
    Complex,
    /// Only the identifier is recorded.
    DocumentedHistory,
}

/// Filter action flag marking the start of a new version branch.
pub const EXPLICIT_BRANCH: u32 = 1 << 0;

/// One editing operation as recorded in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterAction {
    pub identifier: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub category: FilterCategory,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl FilterAction {
    pub fn new(identifier: impl Into<String>, version: u32, category: FilterCategory) -> Self {
        Self {
            identifier: identifier.into(),
            version,
            description: String::new(),
            category,
            flags: 0,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn add_flag(&mut self, flag: u32) {
        self.flags |= flag;
    }

    pub fn remove_flag(&mut self, flag: u32) {
        self.flags &= !flag;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<FilterAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referred_images: Vec<HistoryImageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHistory {
    entries: Vec<HistoryEntry>,
}

impl ImageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [HistoryEntry] {
        &mut self.entries
    }

    /// Append a step for `action`.
    pub fn add_action(&mut self, action: FilterAction) {
        self.entries.push(HistoryEntry {
            action: Some(action),
            referred_images: Vec::new(),
        });
    }

    /// Attach `id` to the last step, opening one if the history is empty.
    /// Invalid ids are ignored.
    pub fn add_referred_image(&mut self, id: HistoryImageId) {
        if !id.is_valid() {
            return;
        }
        match self.entries.last_mut() {
            Some(last) => last.referred_images.push(id),
            None => self.entries.push(HistoryEntry {
                action: None,
                referred_images: vec![id],
            }),
        }
    }

    /// Attach `id` to step `after_step`, clamped to the last step.
    pub fn insert_referred_image(&mut self, after_step: usize, id: HistoryImageId) {
        if !id.is_valid() {
            return;
        }
        if self.entries.is_empty() {
            self.add_referred_image(id);
            return;
        }
        let step = after_step.min(self.entries.len() - 1);
        self.entries[step].referred_images.push(id);
    }

    /// Drop references to `path/file_name` from every step.
    pub fn purge_path_from_referred_images(&mut self, path: &str, file_name: &str) {
        for entry in &mut self.entries {
            entry
                .referred_images
                .retain(|id| !(id.path == path && id.file_name == file_name));
        }
    }

    /// Set the uuid of the current-version reference, adding one if needed.
    pub fn adjust_current_uuid(&mut self, uuid: &str) {
        if let Some(last) = self.entries.last_mut()
            && let Some(current) = last
                .referred_images
                .iter_mut()
                .rev()
                .find(|id| id.kind == HistoryImageKind::Current)
        {
            current.uuid = uuid.to_string();
            return;
        }
        self.add_referred_image(HistoryImageId {
            uuid: uuid.to_string(),
            kind: HistoryImageKind::Current,
            ..Default::default()
        });
    }

    /// Toggle the explicit-branch flag on the first of the last `steps`
    /// entries. Out of range or actionless entries are left alone.
    pub fn set_branch_for_last_steps(&mut self, steps: usize, is_branch: bool) {
        let Some(first) = self.entries.len().checked_sub(steps) else {
            return;
        };
        if let Some(action) = self
            .entries
            .get_mut(first)
            .and_then(|entry| entry.action.as_mut())
        {
            if is_branch {
                action.add_flag(EXPLICIT_BRANCH);
            } else {
                action.remove_flag(EXPLICIT_BRANCH);
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
