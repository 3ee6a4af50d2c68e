use crate::{error::CoreError, load_order::split_lines};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const DESCRIPTOR_FILE: &str = "_info.ini";
const LEGACY_DESCRIPTOR_PREFIX: &str = "_info";
const LEGACY_DESCRIPTOR_EXT: &str = ".txt";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const NAME_KEY: &str = "Name=";
const DESCRIPTION_KEY: &str = "Description=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Cn,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Cn, Language::En];

    pub fn code(self) -> &'static str {
        match self {
            Language::Cn => "cn",
            Language::En => "en",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(value))
    }

    /// Single-level fallback used when a localized field is empty.
    pub fn fallback(self) -> Language {
        match self {
            Language::Cn => Language::En,
            Language::En => Language::Cn,
        }
    }

    fn section_marker(self) -> &'static str {
        match self {
            Language::Cn => "[language_cn]",
            Language::En => "[language_en]",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText {
    pub name: String,
    pub description: String,
}

/// Name/description for every supported language. Fields default to empty
/// strings, so lookups never miss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedMeta {
    cn: LocalizedText,
    en: LocalizedText,
}

impl LocalizedMeta {
    pub fn get(&self, lang: Language) -> &LocalizedText {
        match lang {
            Language::Cn => &self.cn,
            Language::En => &self.en,
        }
    }

    pub fn get_mut(&mut self, lang: Language) -> &mut LocalizedText {
        match lang {
            Language::Cn => &mut self.cn,
            Language::En => &mut self.en,
        }
    }
}

/// Result of reading one mod's descriptor. Failures stay local to the mod.
#[derive(Debug)]
pub enum DescriptorOutcome {
    Parsed(LocalizedMeta),
    Absent,
    Degraded(CoreError),
}

impl DescriptorOutcome {
    pub fn into_meta(self) -> LocalizedMeta {
        match self {
            DescriptorOutcome::Parsed(meta) => meta,
            DescriptorOutcome::Absent | DescriptorOutcome::Degraded(_) => LocalizedMeta::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModScan {
    pub image_path: Option<PathBuf>,
    pub descriptor: DescriptorOutcome,
}

/// Looks up the thumbnail and descriptor for `<mod_root>/<mod_id>`.
pub fn scan_mod_dir(mod_root: &Path, mod_id: &str) -> ModScan {
    let dir = mod_root.join(mod_id);
    if !dir.is_dir() {
        return ModScan {
            image_path: None,
            descriptor: DescriptorOutcome::Absent,
        };
    }

    let descriptor = match find_descriptor(&dir) {
        Some(path) => read_descriptor(&path, mod_id),
        None => DescriptorOutcome::Absent,
    };

    ModScan {
        image_path: find_image(&dir),
        descriptor,
    }
}

pub fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    let preferred = dir.join(DESCRIPTOR_FILE);
    if preferred.is_file() {
        return Some(preferred);
    }

    list_files(dir).into_iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy())
            .map(|name| {
                name.starts_with(LEGACY_DESCRIPTOR_PREFIX) && name.ends_with(LEGACY_DESCRIPTOR_EXT)
            })
            .unwrap_or(false)
    })
}

pub fn find_image(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(usize, PathBuf)> = list_files(dir)
        .into_iter()
        .filter_map(|path| {
            let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
            let priority = IMAGE_EXTENSIONS.iter().position(|known| *known == ext)?;
            Some((priority, path))
        })
        .collect();
    // list_files is already lexical; the stable sort keeps that within a priority.
    candidates.sort_by_key(|(priority, _)| *priority);
    candidates.into_iter().next().map(|(_, path)| path)
}

pub fn read_descriptor(path: &Path, mod_id: &str) -> DescriptorOutcome {
    match fs::read(path) {
        Ok(bytes) => DescriptorOutcome::Parsed(parse_descriptor(&String::from_utf8_lossy(&bytes))),
        Err(err) => DescriptorOutcome::Degraded(CoreError::DescriptorParseFailure {
            mod_id: mod_id.to_string(),
            reason: format!("{}: {err}", path.display()),
        }),
    }
}

pub fn parse_descriptor(raw: &str) -> LocalizedMeta {
    let mut meta = LocalizedMeta::default();
    let mut active: Option<Language> = None;

    for line in split_lines(raw) {
        let line = line.trim();
        let lower = line.to_lowercase();

        if let Some(lang) = Language::ALL
            .into_iter()
            .find(|lang| lower.starts_with(lang.section_marker()))
        {
            active = Some(lang);
        } else if line.starts_with('[') && line.ends_with(']') {
            active = None;
        }

        let Some(lang) = active else {
            continue;
        };
        if let Some(value) = line.strip_prefix(NAME_KEY) {
            meta.get_mut(lang).name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix(DESCRIPTION_KEY) {
            meta.get_mut(lang).description = value.trim().to_string();
        }
    }

    meta
}

/// Picks name and description for `lang`, falling back to the other language
/// and, for the name only, to the mod id.
pub fn resolve_display(meta: &LocalizedMeta, id: &str, lang: Language) -> (String, String) {
    let primary = meta.get(lang);
    let secondary = meta.get(lang.fallback());

    let name = [primary.name.as_str(), secondary.name.as_str(), id]
        .into_iter()
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string();
    let description = if primary.description.is_empty() {
        secondary.description.clone()
    } else {
        primary.description.clone()
    };

    (name, description)
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta_with(cn: (&str, &str), en: (&str, &str)) -> LocalizedMeta {
        let mut meta = LocalizedMeta::default();
        meta.get_mut(Language::Cn).name = cn.0.to_string();
        meta.get_mut(Language::Cn).description = cn.1.to_string();
        meta.get_mut(Language::En).name = en.0.to_string();
        meta.get_mut(Language::En).description = en.1.to_string();
        meta
    }

    #[test]
    fn last_name_in_section_wins() {
        let meta = parse_descriptor("[language_en]\nName=First\nName=Second\n");
        assert_eq!(meta.get(Language::En).name, "Second");
    }

    #[test]
    fn parses_both_languages() {
        let raw = "[language_cn]\nName= 显示名称 \nDescription=简介文本\n[language_en]\nName=Display Name\nDescription=Blurb text\n";
        let meta = parse_descriptor(raw);
        assert_eq!(meta.get(Language::Cn).name, "显示名称");
        assert_eq!(meta.get(Language::Cn).description, "简介文本");
        assert_eq!(meta.get(Language::En).name, "Display Name");
        assert_eq!(meta.get(Language::En).description, "Blurb text");
    }

    #[test]
    fn unknown_section_deactivates_language() {
        let raw = "[Language_EN]\nName=Kept\n[General]\nName=Ignored\nDescription=Ignored\n";
        let meta = parse_descriptor(raw);
        assert_eq!(meta.get(Language::En).name, "Kept");
        assert!(meta.get(Language::En).description.is_empty());
        assert!(meta.get(Language::Cn).name.is_empty());
    }

    #[test]
    fn carriage_return_only_descriptor() {
        let meta = parse_descriptor("[language_en]\rName=Old Mac\rDescription=CR lines\r");
        assert_eq!(meta.get(Language::En).name, "Old Mac");
        assert_eq!(meta.get(Language::En).description, "CR lines");
    }

    #[test]
    fn field_prefixes_are_case_sensitive() {
        let meta = parse_descriptor("[language_en]\nname=lower\nNAME=upper\n");
        assert!(meta.get(Language::En).name.is_empty());
    }

    #[test]
    fn lines_before_any_section_are_ignored() {
        let meta = parse_descriptor("Name=Orphan\n[language_cn]\n");
        assert_eq!(meta, LocalizedMeta::default());
    }

    #[test]
    fn display_falls_back_to_other_language_then_id() {
        let meta = meta_with(("", ""), ("Foo", "Bar"));
        assert_eq!(
            resolve_display(&meta, "123", Language::Cn),
            ("Foo".to_string(), "Bar".to_string())
        );

        let empty = LocalizedMeta::default();
        assert_eq!(
            resolve_display(&empty, "123", Language::Cn),
            ("123".to_string(), String::new())
        );
    }

    #[test]
    fn display_prefers_requested_language() {
        let meta = meta_with(("中文", "说明"), ("English", "Text"));
        assert_eq!(resolve_display(&meta, "1", Language::En).0, "English");
        assert_eq!(resolve_display(&meta, "1", Language::Cn).1, "说明");
    }

    #[test]
    fn language_codes_round_trip() {
        assert_eq!(Language::parse("EN"), Some(Language::En));
        assert_eq!(Language::parse(" cn "), Some(Language::Cn));
        assert_eq!(Language::parse("de"), None);
        assert_eq!(Language::Cn.fallback(), Language::En);
        assert_eq!(Language::En.fallback(), Language::Cn);
    }

    #[test]
    fn prefers_ini_descriptor_over_legacy_txt() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("42");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("_info_old.txt"), "[language_en]\nName=Legacy\n").unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), "[language_en]\nName=Current\n").unwrap();

        let scan = scan_mod_dir(temp.path(), "42");
        assert_eq!(scan.descriptor.into_meta().get(Language::En).name, "Current");
    }

    #[test]
    fn falls_back_to_legacy_txt_descriptor() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("42");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("readme.txt"), "[language_en]\nName=Wrong\n").unwrap();
        fs::write(dir.join("_info_v2.txt"), "[language_en]\nName=Legacy\n").unwrap();

        let scan = scan_mod_dir(temp.path(), "42");
        assert_eq!(scan.descriptor.into_meta().get(Language::En).name, "Legacy");
    }

    #[test]
    fn image_scan_uses_extension_priority() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("7");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.PNG"), b"png").unwrap();
        fs::write(dir.join("z.JPG"), b"jpg").unwrap();
        fs::write(dir.join("b.gif"), b"gif").unwrap();

        let image = find_image(&dir).unwrap();
        assert_eq!(image.file_name().unwrap(), "z.JPG");
    }

    #[test]
    fn missing_mod_dir_is_an_absence() {
        let temp = TempDir::new().unwrap();
        let scan = scan_mod_dir(temp.path(), "nope");
        assert!(scan.image_path.is_none());
        assert!(matches!(scan.descriptor, DescriptorOutcome::Absent));
    }

    #[test]
    fn unreadable_descriptor_degrades() {
        let temp = TempDir::new().unwrap();
        let outcome = read_descriptor(&temp.path().join("missing.ini"), "99");
        match outcome {
            DescriptorOutcome::Degraded(CoreError::DescriptorParseFailure { mod_id, .. }) => {
                assert_eq!(mod_id, "99")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DESCRIPTOR_FILE);
        let mut bytes = b"[language_en]\nName=Ok".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"\n");
        fs::write(&path, bytes).unwrap();

        let meta = read_descriptor(&path, "1").into_meta();
        assert!(meta.get(Language::En).name.starts_with("Ok"));
    }
}
