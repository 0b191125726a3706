use super::Context;
use crate::cli::output::Output;
use crate::errors::{GrapheneError, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, MultiSelect};

/// Configure which branches count as base branches for this repository
pub async fn init(base_branches: Vec<String>) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;
    tracing::debug!("Configuring repository {}", manager.repository_name());

    let selected = if base_branches.is_empty() {
        prompt_base_branches(&manager.base_branch_candidates()?)?
    } else {
        base_branches
    };

    manager.configure_repository(selected.clone())?;

    Output::success(format!(
        "Configured {}",
        style(manager.repository_name()).cyan()
    ));
    for branch in &selected {
        Output::sub_item(format!("Base branch: {}", style(branch).cyan()));
    }

    Output::spacing();
    Output::tip("Start a stack from a base branch with:");
    Output::command_example("gr create <branch-name>");
    Ok(())
}

fn prompt_base_branches(candidates: &[(String, bool)]) -> Result<Vec<String>> {
    if candidates.is_empty() {
        return Err(GrapheneError::validation("Repository has no local branches"));
    }

    let items: Vec<&str> = candidates.iter().map(|(name, _)| name.as_str()).collect();
    let defaults: Vec<bool> = candidates.iter().map(|(_, selected)| *selected).collect();

    let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the base branches of this repository")
        .items(&items)
        .defaults(&defaults)
        .interact()
        .map_err(|e| GrapheneError::config(format!("Prompt failed: {e}")))?;

    Ok(chosen.into_iter().map(|i| items[i].to_string()).collect())
}
