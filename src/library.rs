use crate::{
    error::CoreError,
    load_order::LoadOrderEntry,
    metadata::{self, DescriptorOutcome, Language, LocalizedMeta},
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRecord {
    id: String,
    pub enabled: bool,
    pub image_path: Option<PathBuf>,
    pub meta: LocalizedMeta,
}

impl ModRecord {
    pub fn new(id: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            enabled,
            image_path: None,
            meta: LocalizedMeta::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name and description for `lang`, see [`metadata::resolve_display`].
    pub fn display(&self, lang: Language) -> (String, String) {
        metadata::resolve_display(&self.meta, &self.id, lang)
    }

    pub fn display_name(&self, lang: Language) -> String {
        self.display(lang).0
    }
}

/// Mods whose descriptor could not be read during a load. Their records are
/// still present, with empty metadata.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub degraded: Vec<CoreError>,
}

/// The live load order. Position is precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedRegistry {
    mods: Vec<ModRecord>,
}

impl OrderedRegistry {
    pub fn from_records(mods: Vec<ModRecord>) -> Self {
        Self { mods }
    }

    /// Builds a registry from parsed load order entries, reading metadata from
    /// `<mod_root>/<id>`. Duplicate ids produce duplicate records.
    pub fn load(entries: &[LoadOrderEntry], mod_root: &Path) -> (Self, LoadReport) {
        let mut report = LoadReport::default();
        let mods = entries
            .iter()
            .map(|entry| {
                let mut record = ModRecord::new(entry.id.clone(), entry.enabled);
                let scan = metadata::scan_mod_dir(mod_root, &entry.id);
                record.image_path = scan.image_path;
                record.meta = match scan.descriptor {
                    DescriptorOutcome::Degraded(err) => {
                        report.degraded.push(err);
                        LocalizedMeta::default()
                    }
                    outcome => outcome.into_meta(),
                };
                record
            })
            .collect();
        (Self { mods }, report)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModRecord> {
        self.mods.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ModRecord> {
        self.mods.get(index)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.mods.iter().position(|record| record.id == id)
    }

    /// Moves one mod to `to`; everything else keeps its relative order.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), CoreError> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let record = self.mods.remove(from);
        self.mods.insert(to, record);
        Ok(())
    }

    pub fn move_up(&mut self, index: usize) -> Result<(), CoreError> {
        self.check_index(index)?;
        self.reorder(index, index.saturating_sub(1))
    }

    pub fn move_down(&mut self, index: usize) -> Result<(), CoreError> {
        self.check_index(index)?;
        self.reorder(index, (index + 1).min(self.mods.len() - 1))
    }

    /// Flips the enabled flag and returns the new value.
    pub fn toggle(&mut self, index: usize) -> Result<bool, CoreError> {
        self.check_index(index)?;
        let record = &mut self.mods[index];
        record.enabled = !record.enabled;
        Ok(record.enabled)
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), CoreError> {
        self.check_index(index)?;
        self.mods[index].enabled = enabled;
        Ok(())
    }

    pub fn snapshot_for_save(&self) -> &[ModRecord] {
        &self.mods
    }

    fn check_index(&self, index: usize) -> Result<(), CoreError> {
        if index < self.mods.len() {
            Ok(())
        } else {
            Err(CoreError::IndexError {
                index,
                len: self.mods.len(),
            })
        }
    }
}
