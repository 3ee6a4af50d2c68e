use crate::{
    library::{ModRecord, OrderedRegistry},
    metadata::Language,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

/// Language used for the human-readable name stored in preset files.
pub const PRESET_HINT_LANGUAGE: Language = Language::Cn;
const PRESET_EXT: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub id: String,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(rename = "e")]
    pub enabled: bool,
}

/// A preset reference with no installed mod behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRef {
    pub id: String,
    pub hint: String,
}

impl std::fmt::Display for MissingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.hint, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub order: OrderedRegistry,
    pub missing: Vec<MissingRef>,
}

/// Applies a preset to the installed mods. Preset entries come first in
/// preset order; installed mods the preset does not mention follow in their
/// previous order, disabled. Unknown ids are reported, never added. The result
/// holds at most one record per id.
pub fn reconcile(entries: &[PresetEntry], registry: &OrderedRegistry) -> Reconciliation {
    let mut slots: Vec<Option<ModRecord>> = registry.iter().cloned().map(Some).collect();
    let mut lookup: HashMap<&str, usize> = HashMap::new();
    for (index, record) in registry.iter().enumerate() {
        lookup.entry(record.id()).or_insert(index);
    }

    let mut order = Vec::with_capacity(slots.len());
    let mut missing = Vec::new();

    for entry in entries {
        let taken = lookup
            .remove(entry.id.as_str())
            .and_then(|index| slots[index].take());
        match taken {
            Some(mut record) => {
                record.enabled = entry.enabled;
                order.push(record);
            }
            None => missing.push(MissingRef {
                id: entry.id.clone(),
                hint: entry.hint.clone().unwrap_or_else(|| entry.id.clone()),
            }),
        }
    }

    let mut placed: HashSet<String> = order
        .iter()
        .map(|record| record.id().to_string())
        .collect();
    for mut record in slots.into_iter().flatten() {
        if placed.insert(record.id().to_string()) {
            record.enabled = false;
            order.push(record);
        }
    }

    Reconciliation {
        order: OrderedRegistry::from_records(order),
        missing,
    }
}

/// Preset form of the current order.
pub fn project(registry: &OrderedRegistry) -> Vec<PresetEntry> {
    registry
        .iter()
        .map(|record| PresetEntry {
            id: record.id().to_string(),
            hint: Some(record.display_name(PRESET_HINT_LANGUAGE)),
            enabled: record.enabled,
        })
        .collect()
}

pub fn read_preset(path: &Path) -> Result<Vec<PresetEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read preset {}", path.display()))?;
    let entries = serde_json::from_str(&raw)
        .with_context(|| format!("parse preset {}", path.display()))?;
    Ok(entries)
}

pub fn write_preset(path: &Path, entries: &[PresetEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("create preset dir")?;
    }
    let raw = serde_json::to_string_pretty(entries).context("serialize preset")?;
    fs::write(path, raw).with_context(|| format!("write preset {}", path.display()))?;
    Ok(())
}

/// Resolves a preset argument: anything that looks like a path is used as
/// is, a bare name lands in `preset_dir`. `.json` is appended unless already
/// present.
pub fn resolve_preset_path(preset_dir: &Path, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    let path = if candidate.is_absolute() || candidate.components().count() > 1 {
        candidate.to_path_buf()
    } else {
        preset_dir.join(candidate)
    };
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(PRESET_EXT))
        .unwrap_or(false);
    if is_json {
        return path;
    }
    let mut name = path.into_os_string();
    name.push(".");
    name.push(PRESET_EXT);
    PathBuf::from(name)
}

pub fn list_presets(preset_dir: &Path) -> Result<Vec<PathBuf>> {
    if !preset_dir.exists() {
        return Ok(Vec::new());
    }
    let mut presets = Vec::new();
    for entry in fs::read_dir(preset_dir).context("read preset dir")? {
        let path = entry.context("read preset entry")?.path();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(PRESET_EXT))
            .unwrap_or(false);
        if path.is_file() && is_json {
            presets.push(path);
        }
    }
    presets.sort();
    Ok(presets)
}
