use crate::{
    backup::{self, SaveOutcome},
    error::{CoreError, PathKind},
    library::OrderedRegistry,
    load_order::{ConfigDocument, LOAD_ORDER_SECTION, MOD_COUNT_KEY},
    preset::{self, MissingRef, PresetEntry},
};
use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub count: usize,
    /// `NumberOfModFiles` as written in the file, when present and numeric.
    pub declared_count: Option<usize>,
    pub section_found: bool,
    pub degraded: Vec<CoreError>,
}

/// One editing session over a game config file: the parsed document and the
/// single live load order. Mutations need `&mut Session`.
#[derive(Debug)]
pub struct Session {
    config_path: PathBuf,
    mod_root: PathBuf,
    document: Option<ConfigDocument>,
    registry: OrderedRegistry,
}

impl Session {
    pub fn new(config_path: impl Into<PathBuf>, mod_root: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            mod_root: mod_root.into(),
            document: None,
            registry: OrderedRegistry::default(),
        }
    }

    pub fn open(
        config_path: impl Into<PathBuf>,
        mod_root: impl Into<PathBuf>,
    ) -> Result<(Self, LoadSummary)> {
        let mut session = Self::new(config_path, mod_root);
        let summary = session.load()?;
        Ok((session, summary))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn mod_root(&self) -> &Path {
        &self.mod_root
    }

    pub fn validate_paths(&self) -> Result<(), CoreError> {
        if self.config_path.as_os_str().is_empty() || !self.config_path.exists() {
            return Err(CoreError::PathInvalid {
                kind: PathKind::ConfigFile,
                path: self.config_path.clone(),
            });
        }
        if self.mod_root.as_os_str().is_empty() || !self.mod_root.exists() {
            return Err(CoreError::PathInvalid {
                kind: PathKind::ModRoot,
                path: self.mod_root.clone(),
            });
        }
        Ok(())
    }

    /// Reads the config file and rebuilds the load order, dropping the previous
    /// one.
    pub fn load(&mut self) -> Result<LoadSummary> {
        self.validate_paths()?;
        let document = ConfigDocument::read(&self.config_path)?;
        let entries = document.load_order();
        let (registry, report) = OrderedRegistry::load(&entries, &self.mod_root);

        let summary = LoadSummary {
            count: registry.len(),
            declared_count: document
                .get(LOAD_ORDER_SECTION, MOD_COUNT_KEY)
                .and_then(|value| value.parse().ok()),
            section_found: document.has_load_order_section(),
            degraded: report.degraded,
        };
        self.document = Some(document);
        self.registry = registry;
        Ok(summary)
    }

    pub fn registry(&self) -> &OrderedRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OrderedRegistry {
        &mut self.registry
    }

    /// Writes the current order back into the config file, backing it up
    /// first. See [`backup::persist`] for the confirmation callback.
    pub fn save<F>(&mut self, confirm_without_backup: F) -> Result<SaveOutcome>
    where
        F: FnOnce(&CoreError) -> bool,
    {
        let Some(document) = &self.document else {
            return Err(CoreError::NotLoaded.into());
        };
        if self.registry.is_empty() {
            return Ok(SaveOutcome::NothingToSave);
        }

        let mut updated = document.clone();
        updated.set_load_order(
            self.registry
                .snapshot_for_save()
                .iter()
                .map(|record| (record.id(), record.enabled)),
        );
        let outcome = backup::persist(
            &self.config_path,
            &updated.render(),
            confirm_without_backup,
        )?;
        if matches!(outcome, SaveOutcome::Saved { .. }) {
            self.document = Some(updated);
        }
        Ok(outcome)
    }

    /// Replaces the live order with the reconciled preset and returns the
    /// references that could not be resolved.
    pub fn apply_preset(&mut self, entries: &[PresetEntry]) -> Vec<MissingRef> {
        let reconciliation = preset::reconcile(entries, &self.registry);
        self.registry = reconciliation.order;
        reconciliation.missing
    }

    pub fn export_preset(&self) -> Vec<PresetEntry> {
        preset::project(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backup::BackupStatus, library::ModRecord, metadata::Language};
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = "\
[Graphics]
Quality=High
[LoadOrder]
Mod3Directory=C,True
Mod1Directory=A,True
Mod2Directory=B,False
NumberOfModFiles=3
";

    struct Fixture {
        _temp: TempDir,
        config: PathBuf,
        mods: PathBuf,
    }

    fn fixture(config: &str) -> Fixture {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("Config.ini");
        let mods = temp.path().join("workshop");
        fs::create_dir_all(mods.join("A")).unwrap();
        fs::write(
            mods.join("A").join("_info.ini"),
            "[language_cn]\nName=甲\n[language_en]\nName=Alpha\n",
        )
        .unwrap();
        fs::write(&config_path, config).unwrap();
        Fixture {
            config: config_path,
            mods,
            _temp: temp,
        }
    }

    fn ids(session: &Session) -> Vec<String> {
        session
            .registry()
            .iter()
            .map(|record| record.id().to_string())
            .collect()
    }

    #[test]
    fn load_sorts_and_hydrates() {
        let fx = fixture(CONFIG);
        let (session, summary) = Session::open(&fx.config, &fx.mods).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.declared_count, Some(3));
        assert!(summary.section_found);
        assert_eq!(ids(&session), vec!["A", "B", "C"]);
        assert_eq!(
            session.registry().get(0).unwrap().display_name(Language::En),
            "Alpha"
        );
    }

    #[test]
    fn invalid_paths_block_load() {
        let fx = fixture(CONFIG);
        let err = Session::open(fx.config.with_extension("missing"), &fx.mods).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::PathInvalid {
                kind: PathKind::ConfigFile,
                ..
            })
        ));

        let err = Session::open(&fx.config, fx.mods.join("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::PathInvalid {
                kind: PathKind::ModRoot,
                ..
            })
        ));
    }

    #[test]
    fn missing_section_loads_empty() {
        let fx = fixture("[Graphics]\nQuality=Low\n");
        let (session, summary) = Session::open(&fx.config, &fx.mods).unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.declared_count, None);
        assert!(!summary.section_found);
        assert!(session.registry().is_empty());
    }

    #[test]
    fn save_writes_reordered_config_and_backup() {
        let fx = fixture(CONFIG);
        let (mut session, _) = Session::open(&fx.config, &fx.mods).unwrap();
        session.registry_mut().reorder(2, 0).unwrap();
        session.registry_mut().toggle(2).unwrap();

        let outcome = session.save(|_| false).unwrap();
        assert!(matches!(
            outcome,
            SaveOutcome::Saved {
                backup: BackupStatus::Created(_)
            }
        ));
        assert_eq!(
            fs::read_to_string(&fx.config).unwrap(),
            "[Graphics]\nQuality=High\n[LoadOrder]\nMod1Directory=C,True\nMod2Directory=A,True\nMod3Directory=B,True\nNumberOfModFiles=3\n"
        );
        assert_eq!(
            fs::read_to_string(backup::backup_path(&fx.config)).unwrap(),
            CONFIG
        );
    }

    #[test]
    fn reload_discards_unsaved_changes() {
        let fx = fixture(CONFIG);
        let (mut session, _) = Session::open(&fx.config, &fx.mods).unwrap();
        session.registry_mut().reorder(0, 2).unwrap();
        session.load().unwrap();
        assert_eq!(ids(&session), vec!["A", "B", "C"]);
    }

    #[test]
    fn save_requires_load() {
        let fx = fixture(CONFIG);
        let mut session = Session::new(&fx.config, &fx.mods);
        let err = session.save(|_| true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::NotLoaded)
        ));
    }

    #[test]
    fn empty_order_is_not_written() {
        let fx = fixture("[LoadOrder]\n");
        let (mut session, _) = Session::open(&fx.config, &fx.mods).unwrap();
        let outcome = session.save(|_| true).unwrap();
        assert!(matches!(outcome, SaveOutcome::NothingToSave));
        assert!(!backup::backup_path(&fx.config).exists());
    }

    #[test]
    fn preset_round_trip_through_session() {
        let fx = fixture(CONFIG);
        let (mut session, _) = Session::open(&fx.config, &fx.mods).unwrap();
        let exported = session.export_preset();
        assert_eq!(exported[0].hint.as_deref(), Some("甲"));

        let missing = session.apply_preset(&[
            PresetEntry {
                id: "B".to_string(),
                hint: None,
                enabled: true,
            },
            PresetEntry {
                id: "gone".to_string(),
                hint: Some("Gone Mod".to_string()),
                enabled: true,
            },
        ]);
        assert_eq!(missing.len(), 1);
        assert_eq!(ids(&session), vec!["B", "A", "C"]);
        let enabled: Vec<bool> = session.registry().iter().map(|r| r.enabled).collect();
        assert_eq!(enabled, vec![true, false, false]);

        let missing = session.apply_preset(&exported);
        assert!(missing.is_empty());
        assert_eq!(ids(&session), vec!["A", "B", "C"]);
        let restored: Vec<&ModRecord> = session.registry().iter().collect();
        assert!(restored[0].enabled && !restored[1].enabled && restored[2].enabled);
    }
}
