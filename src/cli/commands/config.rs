use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{ensure_config_dir, get_config_dir, settings_path, Settings};
use crate::errors::Result;
use console::style;
use std::path::Path;

/// Handle configuration commands
pub async fn run(action: ConfigAction) -> Result<()> {
    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;
    let config_file = settings_path(&config_dir);

    match action {
        ConfigAction::Set { key, value } => set_config_value(&config_file, &key, &value),
        ConfigAction::Get { key } => get_config_value(&config_file, &key),
        ConfigAction::List => list_config_values(&config_file),
    }
}

fn set_config_value(config_file: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from_file(config_file)?;
    settings.set_value(key, value)?;
    settings.validate()?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {value}"));

    match key {
        "store.path" => {
            Output::tip("Existing stacks stay in the old store; move the file to keep them")
        }
        "git.remote" => Output::tip("Stacks are keyed by the repository name this remote resolves to"),
        _ => {}
    }

    Ok(())
}

fn get_config_value(config_file: &Path, key: &str) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;
    let value = settings.get_value(key)?;
    println!("{key} = {}", display_value(&value));
    Ok(())
}

fn list_config_values(config_file: &Path) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;

    Output::section(format!("Configuration ({})", config_file.display()));
    for key in Settings::keys() {
        let value = settings.get_value(key)?;
        println!("  {} = {}", style(key).cyan(), display_value(&value));
    }
    Ok(())
}

fn display_value(value: &str) -> String {
    if value.is_empty() {
        style("(not set)").dim().to_string()
    } else {
        value.to_string()
    }
}
