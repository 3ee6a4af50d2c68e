use anyhow::{Context, Result};
use std::{fs, path::Path};

pub const LOAD_ORDER_SECTION: &str = "LoadOrder";
pub const MOD_COUNT_KEY: &str = "NumberOfModFiles";

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOrderEntry {
    pub position: u64,
    pub id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Section { raw: String, name: String },
    Pair { raw: String, key: String, value: String },
    Other(String),
}

impl Line {
    fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            return Line::Other(raw.to_string());
        }
        if trimmed.starts_with('[') {
            if let Some(close) = trimmed.rfind(']') {
                if close > 1 {
                    return Line::Section {
                        raw: raw.to_string(),
                        name: trimmed[1..close].to_string(),
                    };
                }
            }
        }
        // Indented lines are continuations, never keys.
        if raw.starts_with(char::is_whitespace) {
            return Line::Other(raw.to_string());
        }
        match trimmed.find(|c| c == '=' || c == ':') {
            Some(split) => Line::Pair {
                raw: raw.to_string(),
                key: trimmed[..split].trim().to_string(),
                value: trimmed[split + 1..].trim().to_string(),
            },
            None => Line::Other(raw.to_string()),
        }
    }

    fn pair(key: &str, value: &str) -> Self {
        Line::Pair {
            raw: format!("{key}={value}"),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn raw(&self) -> &str {
        match self {
            Line::Section { raw, .. } | Line::Pair { raw, .. } | Line::Other(raw) => raw,
        }
    }
}

/// The game configuration file, kept line by line so everything outside the
/// load order keys is written back untouched.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    lines: Vec<Line>,
    newline: &'static str,
    trailing_newline: bool,
    bom: bool,
}

impl ConfigDocument {
    pub fn parse(raw: &str) -> Self {
        let (bom, body) = match raw.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let newline = if body.contains("\r\n") {
            "\r\n"
        } else if !body.contains('\n') && body.contains('\r') {
            "\r"
        } else {
            "\n"
        };
        let trailing_newline = body.ends_with('\n') || body.ends_with('\r');
        let lines = split_lines(body).into_iter().map(Line::classify).collect();

        Self {
            lines,
            newline,
            trailing_newline,
            bom,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("read game config {}", path.display()))?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        let body: Vec<&str> = self.lines.iter().map(Line::raw).collect();
        out.push_str(&body.join(self.newline));
        if self.trailing_newline {
            out.push_str(self.newline);
        }
        out
    }

    pub fn has_load_order_section(&self) -> bool {
        self.lines.iter().any(
            |line| matches!(line, Line::Section { name, .. } if name == LOAD_ORDER_SECTION),
        )
    }

    /// Value of `key` in `section`, first occurrence.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section_pairs(section)
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value)
    }

    /// Load order entries sorted by the number in their `Mod<N>Directory` key.
    /// Values without a comma are skipped. Entries sharing a number keep their
    /// declaration order.
    pub fn load_order(&self) -> Vec<LoadOrderEntry> {
        let mut entries: Vec<LoadOrderEntry> = self
            .section_pairs(LOAD_ORDER_SECTION)
            .filter_map(|(key, value)| {
                let position = parse_mod_key(key)?;
                let (id, enabled) = parse_mod_value(value)?;
                Some(LoadOrderEntry {
                    position,
                    id,
                    enabled,
                })
            })
            .collect();
        entries.sort_by_key(|entry| entry.position);
        entries
    }

    /// Replaces every `Mod*Directory*` key of the load order section with a
    /// freshly numbered block and updates the mod count.
    pub fn set_load_order<'a, I>(&mut self, mods: I)
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut block: Vec<Line> = mods
            .into_iter()
            .enumerate()
            .map(|(index, (id, enabled))| {
                let literal = if enabled { "True" } else { "False" };
                Line::pair(&format!("Mod{}Directory", index + 1), &format!("{id},{literal}"))
            })
            .collect();
        let count = block.len().to_string();

        let mut out = Vec::with_capacity(self.lines.len() + block.len() + 1);
        let mut in_section = false;
        let mut insert_at: Option<usize> = None;
        let mut section_tail: Option<usize> = None;
        let mut count_written = false;

        for line in self.lines.drain(..) {
            match &line {
                Line::Section { name, .. } => {
                    in_section = name == LOAD_ORDER_SECTION;
                    out.push(line);
                    if in_section && section_tail.is_none() {
                        section_tail = Some(out.len());
                    }
                }
                Line::Pair { key, .. } if in_section && is_stale_mod_key(key) => {
                    insert_at.get_or_insert(out.len());
                }
                Line::Pair { key, .. } if in_section && key == MOD_COUNT_KEY => {
                    out.push(Line::pair(MOD_COUNT_KEY, &count));
                    count_written = true;
                    section_tail = Some(out.len());
                }
                Line::Pair { .. } if in_section => {
                    out.push(line);
                    section_tail = Some(out.len());
                }
                _ => out.push(line),
            }
        }

        if !count_written {
            block.push(Line::pair(MOD_COUNT_KEY, &count));
        }

        match insert_at.or(section_tail) {
            Some(at) => {
                out.splice(at..at, block);
            }
            None => {
                if out.last().map(|line| !line.raw().trim().is_empty()).unwrap_or(false) {
                    out.push(Line::Other(String::new()));
                }
                out.push(Line::Section {
                    raw: format!("[{LOAD_ORDER_SECTION}]"),
                    name: LOAD_ORDER_SECTION.to_string(),
                });
                out.extend(block);
                self.trailing_newline = true;
            }
        }

        self.lines = out;
    }

    fn section_pairs<'a>(&'a self, section: &str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let section = section.to_string();
        let mut current: Option<&'a str> = None;
        self.lines.iter().filter_map(move |line| match line {
            Line::Section { name, .. } => {
                current = Some(name.as_str());
                None
            }
            Line::Pair { key, value, .. } if current == Some(section.as_str()) => {
                Some((key.as_str(), value.as_str()))
            }
            _ => None,
        })
    }
}

/// Number `N` of a `Mod<N>Directory` key, matched case-insensitively from the
/// start of the key. Numbers past `u64::MAX` saturate so the entry still sorts
/// last instead of being dropped.
pub fn parse_mod_key(key: &str) -> Option<u64> {
    let lower = key.to_ascii_lowercase();
    let rest = lower.strip_prefix("mod")?;
    let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len == 0 || !rest[digits_len..].starts_with("directory") {
        return None;
    }
    Some(rest[..digits_len].parse().unwrap_or(u64::MAX))
}

/// Splits on `\n`, `\r\n` or a lone `\r`. A final terminator does not open
/// an empty trailing line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        match c {
            '\n' => {
                lines.push(&text[start..index]);
                start = index + 1;
            }
            '\r' => {
                lines.push(&text[start..index]);
                start = index + 1;
                if let Some((_, '\n')) = chars.peek() {
                    chars.next();
                    start += 1;
                }
            }
            _ => {}
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn parse_mod_value(value: &str) -> Option<(String, bool)> {
    let mut parts = value.split(',');
    let id = parts.next()?.trim().to_string();
    let flag = parts.next()?.trim();
    Some((id, flag.eq_ignore_ascii_case("true")))
}

fn is_stale_mod_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("mod") && lower.contains("directory")
}
