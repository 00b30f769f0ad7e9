use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::{
    flatten::DocumentSnapshot,
    foundation::core::BBox,
    foundation::error::ValidationError,
};

/// Which recovery strategy produced the JSON array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTier {
    /// The whole reply was a JSON array.
    Direct,
    /// The array came from a ``` fenced block.
    Fenced,
    /// The array came from the first `[` to the last `]`.
    Bracketed,
}

/// Proposed placement of one layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProposalEntry {
    /// Layer id.
    pub id: u32,
    /// Name as reported by the oracle, or the snapshot name when missing.
    pub name: String,
    /// Kind as reported by the oracle. Informational only.
    pub kind_hint: Option<String>,
    /// Box the oracle believes the layer had.
    pub original_bbox: Option<BBox>,
    /// Target box in the output canvas.
    pub new_bbox: BBox,
    /// Whether to paint the layer.
    pub visible: bool,
    /// Free-text reason given by the oracle.
    pub rationale: Option<String>,
    /// Warnings the oracle attached to this layer.
    pub warnings: Vec<String>,
}

/// Immutable id-keyed layout proposal.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayoutProposal {
    entries: BTreeMap<u32, ProposalEntry>,
}

impl LayoutProposal {
    /// Proposal that keeps every layer where it is.
    pub fn identity(snapshot: &DocumentSnapshot) -> Self {
        let entries = snapshot
            .layers
            .iter()
            .map(|l| {
                let entry = ProposalEntry {
                    id: l.id,
                    name: l.name.clone(),
                    kind_hint: Some(l.kind.label().to_string()),
                    original_bbox: Some(l.bbox),
                    new_bbox: l.bbox,
                    visible: l.visible,
                    rationale: None,
                    warnings: Vec::new(),
                };
                (l.id, entry)
            })
            .collect();
        Self { entries }
    }

    /// Entry for `id`.
    pub fn get(&self, id: u32) -> Option<&ProposalEntry> {
        self.entries.get(&id)
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> impl Iterator<Item = &ProposalEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no layer has an entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ProposalEntry> for LayoutProposal {
    /// Later entries with an already-seen id are ignored.
    fn from_iter<I: IntoIterator<Item = ProposalEntry>>(iter: I) -> Self {
        let mut entries = BTreeMap::new();
        for entry in iter {
            entries.entry(entry.id).or_insert(entry);
        }
        Self { entries }
    }
}

/// A reply item that was dropped or adjusted during validation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProposalWarning {
    /// Position of the item in the reply array.
    pub index: usize,
    /// Layer id, when one could be read.
    pub layer_id: Option<u32>,
    /// What was wrong.
    pub message: String,
}

/// A proposal recovered from an oracle reply.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedLayout {
    /// Accepted entries.
    pub proposal: LayoutProposal,
    /// Strategy that recovered the array.
    pub tier: RecoveryTier,
    /// Dropped or adjusted items.
    pub warnings: Vec<ProposalWarning>,
}

static FENCED_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*(\[[\s\S]*?\])\s*```").expect("fenced-array regex is valid")
});

/// Find a JSON array in free text.
///
/// Tiers are tried in order and the first that parses wins. `None` when none parses.
pub fn recover_json_array(raw: &str) -> Option<(Vec<Value>, RecoveryTier)> {
    if let Ok(items) = serde_json::from_str::<Vec<Value>>(raw.trim()) {
        return Some((items, RecoveryTier::Direct));
    }

    if let Some(items) = FENCED_ARRAY
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| serde_json::from_str::<Vec<Value>>(m.as_str()).ok())
    {
        return Some((items, RecoveryTier::Fenced));
    }

    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<Value>>(&raw[start..=end])
        .ok()
        .map(|items| (items, RecoveryTier::Bracketed))
}

/// Turn an untrusted oracle reply into a layout proposal for `snapshot`.
///
/// Fails only when no JSON array can be recovered; bad items are dropped with a warning.
///
/// Only `id` (a known layer) and `new_coords` (four finite numbers) are required per item.
/// Missing `name` and `visible` fall back to the snapshot record. `type` and `original_coords`
/// are kept as hints when present, and `level` is ignored.
pub fn validate_response(
    raw: &str,
    snapshot: &DocumentSnapshot,
) -> Result<ValidatedLayout, ValidationError> {
    let Some((items, tier)) = recover_json_array(raw) else {
        return Err(ValidationError::new(raw));
    };

    let mut warnings = Vec::new();
    let mut entries = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        match parse_item(item, snapshot) {
            Ok((entry, notes)) => {
                let id = entry.id;
                if entries.contains_key(&id) {
                    warnings.push(ProposalWarning {
                        index,
                        layer_id: Some(id),
                        message: "duplicate id; keeping the first occurrence".to_string(),
                    });
                    continue;
                }
                warnings.extend(notes.into_iter().map(|message| ProposalWarning {
                    index,
                    layer_id: Some(id),
                    message,
                }));
                entries.insert(id, entry);
            }
            Err((layer_id, message)) => {
                tracing::debug!(index, ?layer_id, %message, "dropping proposal item");
                warnings.push(ProposalWarning {
                    index,
                    layer_id,
                    message,
                });
            }
        }
    }

    tracing::debug!(
        ?tier,
        accepted = entries.len(),
        dropped_or_adjusted = warnings.len(),
        "validated oracle reply"
    );
    Ok(ValidatedLayout {
        proposal: LayoutProposal { entries },
        tier,
        warnings,
    })
}

type ItemError = (Option<u32>, String);

fn parse_item(
    item: &Value,
    snapshot: &DocumentSnapshot,
) -> Result<(ProposalEntry, Vec<String>), ItemError> {
    let obj = item
        .as_object()
        .ok_or_else(|| (None, "item is not an object".to_string()))?;

    let id = match obj.get("id") {
        None => return Err((None, "missing id".to_string())),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| (None, format!("id is not a non-negative integer: {v}")))?,
    };
    let record = snapshot
        .layer(id)
        .ok_or_else(|| (Some(id), format!("unknown layer id {id}")))?;

    let coords = obj
        .get("new_coords")
        .ok_or_else(|| (Some(id), "missing new_coords".to_string()))?;
    let new_bbox = parse_coords(coords).map_err(|m| (Some(id), format!("new_coords: {m}")))?;
    let original_bbox = obj.get("original_coords").and_then(|v| parse_coords(v).ok());

    let mut notes = Vec::new();
    let visible = match obj.get("visible").and_then(Value::as_bool) {
        Some(v) => {
            if v != record.visible {
                notes.push(format!(
                    "visibility changed from {} to {v}",
                    record.visible
                ));
            }
            v
        }
        None => record.visible,
    };

    let string_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    };
    let rationale = string_field("adjustment_reason").or_else(|| string_field("adjustment_notes"));
    let oracle_warnings = obj
        .get("warnings")
        .and_then(Value::as_array)
        .map(|ws| {
            ws.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let entry = ProposalEntry {
        id,
        name: string_field("name").unwrap_or_else(|| record.name.clone()),
        kind_hint: string_field("type"),
        original_bbox,
        new_bbox,
        visible,
        rationale,
        warnings: oracle_warnings,
    };
    Ok((entry, notes))
}

fn parse_coords(v: &Value) -> Result<BBox, String> {
    let obj = v.as_object().ok_or("not an object")?;
    let coord = |key: &str| -> Result<i32, String> {
        let n = obj
            .get(key)
            .ok_or_else(|| format!("missing {key}"))?
            .as_f64()
            .ok_or_else(|| format!("{key} is not a number"))?;
        if !n.is_finite() {
            return Err(format!("{key} is not finite"));
        }
        Ok(n.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
    };
    Ok(BBox::new(
        coord("left")?,
        coord("top")?,
        coord("right")?,
        coord("bottom")?,
    ))
}

#[cfg(test)]
#[path = "../tests/unit/validate.rs"]
mod tests;
