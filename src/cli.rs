use crate::{
    app::{App, PathOverrides},
    backup::{BackupStatus, SaveOutcome},
    error::CoreError,
    library::{ModRecord, OrderedRegistry},
    metadata::Language,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

const MISSING_PREVIEW: usize = 10;
const DEFAULT_LOG_LINES: usize = 40;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Default)]
struct GlobalOptions {
    format: Option<OutputFormat>,
    lang: Option<Language>,
    overrides: PathOverrides,
    assume_yes: bool,
}

impl GlobalOptions {
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or(OutputFormat::Text)
    }
}

/// A mod id, or a 1-based position when no id matches.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModRef(String);

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    List,
    Show(ModRef),
    Toggle(ModRef),
    SetEnabled(ModRef, bool),
    Move { from: ModRef, to: usize },
    Up(ModRef),
    Down(ModRef),
    Save,
    PresetSave(Option<String>),
    PresetLoad(String),
    PresetList,
    SettingsShow,
    SettingsSetConfig(String),
    SettingsSetMods(String),
    SettingsSetLang(Language),
    SettingsSetFontSize(u32),
    Log(usize),
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("modorder v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize()?;
            if let Some(lang) = global.lang {
                app.lang = lang;
            }
            run_command(&mut app, command, &global)
        }
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut global = GlobalOptions::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            match inline.clone().or_else(|| iter.next().cloned()) {
                Some(value) => Ok(value),
                None => bail!("{name} requires a value"),
            }
        };
        match flag {
            "--format" => {
                let raw = value("--format")?;
                global.format = Some(
                    OutputFormat::parse(&raw)
                        .with_context(|| format!("Unknown format: {raw} (use 'text' or 'json')"))?,
                );
            }
            "--lang" => {
                let raw = value("--lang")?;
                global.lang = Some(parse_lang(&raw)?);
            }
            "--config" => global.overrides.config_path = Some(PathBuf::from(value("--config")?)),
            "--mods" => global.overrides.mod_root = Some(PathBuf::from(value("--mods")?)),
            "--yes" | "-y" => global.assume_yes = true,
            _ => tokens.push(arg.to_string()),
        }
    }
    Ok((global, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        [] | ["list"] | ["mods"] | ["mods", "list"] => CliCommand::List,
        ["help"] | ["--help"] | ["-h"] => CliCommand::Help,
        ["version"] | ["--version"] | ["-V"] => CliCommand::Version,
        ["show", target] => CliCommand::Show(mod_ref(target)),
        ["toggle", target] => CliCommand::Toggle(mod_ref(target)),
        ["enable", target] => CliCommand::SetEnabled(mod_ref(target), true),
        ["disable", target] => CliCommand::SetEnabled(mod_ref(target), false),
        ["move", from, to] => CliCommand::Move {
            from: mod_ref(from),
            to: parse_position(to)?,
        },
        ["up", target] => CliCommand::Up(mod_ref(target)),
        ["down", target] => CliCommand::Down(mod_ref(target)),
        ["save"] => CliCommand::Save,
        ["preset", "save"] => CliCommand::PresetSave(None),
        ["preset", "save", name] => CliCommand::PresetSave(Some(name.to_string())),
        ["preset", "load", name] => CliCommand::PresetLoad(name.to_string()),
        ["preset", "list"] | ["presets"] => CliCommand::PresetList,
        ["settings"] | ["settings", "show"] => CliCommand::SettingsShow,
        ["settings", "set-config", path] => CliCommand::SettingsSetConfig(path.to_string()),
        ["settings", "set-mods", path] => CliCommand::SettingsSetMods(path.to_string()),
        ["settings", "set-lang", lang] => CliCommand::SettingsSetLang(parse_lang(lang)?),
        ["settings", "set-font-size", size] => CliCommand::SettingsSetFontSize(
            size.parse()
                .with_context(|| format!("Invalid font size: {size}"))?,
        ),
        ["log"] => CliCommand::Log(DEFAULT_LOG_LINES),
        ["log", lines] => CliCommand::Log(
            lines
                .parse()
                .with_context(|| format!("Invalid line count: {lines}"))?,
        ),
        [head, ..] => bail!("Unknown command: {} (see 'modorder help')", head),
    };
    Ok(command)
}

fn mod_ref(value: &str) -> ModRef {
    ModRef(value.to_string())
}

fn parse_position(value: &str) -> Result<usize> {
    let position: usize = value
        .parse()
        .with_context(|| format!("Invalid position: {value}"))?;
    if position == 0 {
        bail!("Positions start at 1");
    }
    Ok(position - 1)
}

fn parse_lang(value: &str) -> Result<Language> {
    Language::parse(value).with_context(|| format!("Unknown language: {value} (use 'cn' or 'en')"))
}

/// Ids win over positions, so numeric workshop ids stay addressable.
fn resolve_mod_ref(registry: &OrderedRegistry, target: &ModRef) -> Result<usize> {
    let ModRef(token) = target;
    if let Some(index) = registry.position_of(token) {
        return Ok(index);
    }
    match token.parse::<usize>() {
        Ok(position) if position >= 1 && position <= registry.len() => Ok(position - 1),
        _ => bail!("No mod with id or position {token}"),
    }
}

fn run_command(app: &mut App, command: CliCommand, global: &GlobalOptions) -> Result<()> {
    match command {
        CliCommand::SettingsShow => return show_settings(app, global.format()),
        CliCommand::SettingsSetConfig(path) => {
            app.settings.config_path = path;
            return save_settings(app);
        }
        CliCommand::SettingsSetMods(path) => {
            app.settings.mod_root_path = path;
            return save_settings(app);
        }
        CliCommand::SettingsSetLang(lang) => {
            app.settings.lang = lang;
            return save_settings(app);
        }
        CliCommand::SettingsSetFontSize(size) => {
            app.settings.font_size = size;
            return save_settings(app);
        }
        CliCommand::PresetList => {
            for path in app.list_presets()? {
                println!("{}", path.display());
            }
            return Ok(());
        }
        CliCommand::Log(lines) => {
            println!("{}", app.log_tail_text(lines)?);
            return Ok(());
        }
        _ => {}
    }

    app.open_session(&global.overrides)?;

    match command {
        CliCommand::List => list_mods(app, global.format()),
        CliCommand::Show(target) => show_mod(app, &target, global.format()),
        CliCommand::Toggle(target) => {
            let session = app.session_mut()?;
            let index = resolve_mod_ref(session.registry(), &target)?;
            let enabled = session.registry_mut().toggle(index)?;
            let id = session.registry().get(index).map(ModRecord::id).unwrap_or_default();
            println!("{} {}", id, if enabled { "enabled" } else { "disabled" });
            save_with_prompt(app, global)
        }
        CliCommand::SetEnabled(target, enabled) => {
            let session = app.session_mut()?;
            let index = resolve_mod_ref(session.registry(), &target)?;
            session.registry_mut().set_enabled(index, enabled)?;
            save_with_prompt(app, global)
        }
        CliCommand::Move { from, to } => {
            let session = app.session_mut()?;
            let from = resolve_mod_ref(session.registry(), &from)?;
            session.registry_mut().reorder(from, to)?;
            save_with_prompt(app, global)
        }
        CliCommand::Up(target) => {
            let session = app.session_mut()?;
            let index = resolve_mod_ref(session.registry(), &target)?;
            session.registry_mut().move_up(index)?;
            save_with_prompt(app, global)
        }
        CliCommand::Down(target) => {
            let session = app.session_mut()?;
            let index = resolve_mod_ref(session.registry(), &target)?;
            session.registry_mut().move_down(index)?;
            save_with_prompt(app, global)
        }
        CliCommand::Save => save_with_prompt(app, global),
        CliCommand::PresetSave(name) => {
            let path = app.save_preset(name.as_deref())?;
            println!("Preset saved: {}", path.display());
            Ok(())
        }
        CliCommand::PresetLoad(name) => {
            let missing = app.load_preset(&name)?;
            println!("Preset loaded.");
            if !missing.is_empty() {
                println!("Warning: the following mods are in the preset but missing locally:");
                for item in missing.iter().take(MISSING_PREVIEW) {
                    println!("  {item}");
                }
                if missing.len() > MISSING_PREVIEW {
                    println!("  ... and {} more", missing.len() - MISSING_PREVIEW);
                }
            }
            save_with_prompt(app, global)
        }
        CliCommand::SettingsShow
        | CliCommand::SettingsSetConfig(_)
        | CliCommand::SettingsSetMods(_)
        | CliCommand::SettingsSetLang(_)
        | CliCommand::SettingsSetFontSize(_)
        | CliCommand::PresetList
        | CliCommand::Log(_)
        | CliCommand::Help
        | CliCommand::Version => Ok(()),
    }
}

fn save_with_prompt(app: &mut App, global: &GlobalOptions) -> Result<()> {
    let assume_yes = global.assume_yes;
    let outcome = app.save_config(|err| confirm_without_backup(err, assume_yes))?;
    match outcome {
        SaveOutcome::Saved { backup } => {
            if let BackupStatus::Skipped(err) = backup {
                eprintln!("Warning: saved without backup ({err})");
            }
            println!("Configuration saved.");
        }
        SaveOutcome::Aborted { reason } => println!("Save aborted: {reason}"),
        SaveOutcome::NothingToSave => println!("Nothing to save."),
    }
    Ok(())
}

fn confirm_without_backup(err: &CoreError, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    eprint!("{err}\nContinue saving without a backup? [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn save_settings(app: &mut App) -> Result<()> {
    app.settings.save()?;
    app.log_info("Settings updated".to_string());
    println!("Settings saved.");
    Ok(())
}

#[derive(Serialize)]
struct ModListItem {
    position: usize,
    id: String,
    name: String,
    description: String,
    enabled: bool,
    image: Option<String>,
}

impl ModListItem {
    fn from_record(position: usize, record: &ModRecord, lang: Language) -> Self {
        let (name, description) = record.display(lang);
        Self {
            position,
            id: record.id().to_string(),
            name,
            description,
            enabled: record.enabled,
            image: record
                .image_path
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }
}

fn list_mods(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<ModListItem> = app
        .session()?
        .registry()
        .iter()
        .enumerate()
        .map(|(index, record)| ModListItem::from_record(index + 1, record, app.lang))
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No mods in load order.");
            }
            for item in items {
                let enabled = if item.enabled { "x" } else { " " };
                println!("{:>3} [{enabled}] {} ({})", item.position, item.name, item.id);
            }
        }
    }
    Ok(())
}

fn show_mod(app: &App, target: &ModRef, format: OutputFormat) -> Result<()> {
    let registry = app.session()?.registry();
    let index = resolve_mod_ref(registry, target)?;
    let record = registry
        .get(index)
        .with_context(|| format!("No mod at position {}", index + 1))?;
    let item = ModListItem::from_record(index + 1, record, app.lang);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        OutputFormat::Text => {
            println!("{}", item.name);
            println!("Id: {}", item.id);
            println!("Position: {}", item.position);
            println!("Enabled: {}", if item.enabled { "yes" } else { "no" });
            println!("Image: {}", item.image.as_deref().unwrap_or("none"));
            println!();
            if item.description.is_empty() {
                println!("No description available for this language.");
            } else {
                println!("{}", item.description);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SettingsOutput<'a> {
    config_path: &'a str,
    mod_root_path: &'a str,
    font_size: u32,
    lang: &'a str,
    preset_dir: String,
    log_path: String,
}

fn show_settings(app: &App, format: OutputFormat) -> Result<()> {
    let output = SettingsOutput {
        config_path: &app.settings.config_path,
        mod_root_path: &app.settings.mod_root_path,
        font_size: app.settings.font_size,
        lang: app.settings.lang.code(),
        preset_dir: app.settings.preset_dir().display().to_string(),
        log_path: app.log_path().display().to_string(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Game config: {}", output.config_path);
            println!("Mod directory: {}", output.mod_root_path);
            println!("Font size: {}", output.font_size);
            println!("Language: {}", output.lang);
            println!("Presets: {}", output.preset_dir);
            println!("Log: {}", output.log_path);
        }
    }
    Ok(())
}

fn print_help() {
    println!("modorder v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  modorder [list]                       Show the load order");
    println!("  modorder show <id|pos>                Show one mod's details");
    println!("  modorder toggle <id|pos>              Flip a mod on/off and save");
    println!("  modorder enable|disable <id|pos>      Set a mod's state and save");
    println!("  modorder move <id|pos> <pos>          Move a mod and save");
    println!("  modorder up|down <id|pos>             Move a mod one step and save");
    println!("  modorder save                         Rewrite the config (with backup)");
    println!("  modorder preset save [name|path]      Save the current order as a preset");
    println!("  modorder preset load <name|path>      Apply a preset and save");
    println!("  modorder preset list                  List saved presets");
    println!("  modorder settings [show]              Show stored settings");
    println!("  modorder settings set-config <path>   Store the game config path");
    println!("  modorder settings set-mods <path>     Store the mod directory");
    println!("  modorder settings set-lang <cn|en>    Store the display language");
    println!("  modorder settings set-font-size <n>   Store the font size");
    println!("  modorder log [lines]                  Show the session log");
    println!();
    println!("Global options:");
    println!("  --config <path>                       Game config file for this run");
    println!("  --mods <path>                         Mod directory for this run");
    println!("  --lang <cn|en>                        Display language for this run");
    println!("  --format <json|text>                  Output format for list/show/settings");
    println!("  -y, --yes                             Keep saving if the backup fails");
    println!("  -h, --help                            Show help");
    println!("  -V, --version                         Show version");
}
