use super::Context;
use crate::cli::output::Output;
use crate::errors::{GrapheneError, Result};
use crate::git::VcsGateway;
use crate::stack::HistoryImporter;
use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect};

#[derive(Subcommand)]
pub enum StackAction {
    /// Create a stack from the branches between HEAD and a base branch
    Import {
        /// Name of the stack (prompted for when omitted)
        name: Option<String>,
    },

    /// List the stacks of this repository
    List,

    /// Rename the current stack
    Rename {
        /// New name for the stack
        name: String,
    },

    /// Delete stacks and their branch records (git branches are kept)
    Delete {
        /// Stacks to delete (prompted for when omitted)
        names: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

pub async fn run(action: StackAction) -> Result<()> {
    match action {
        StackAction::Import { name } => import(name).await,
        StackAction::List => list().await,
        StackAction::Rename { name } => rename(&name).await,
        StackAction::Delete { names, yes } => delete(names, yes).await,
    }
}

async fn import(name: Option<String>) -> Result<()> {
    let mut ctx = Context::open()?;
    let name = match name {
        Some(name) => name,
        None => Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("What do you want to name the stack?")
            .interact_text()
            .map_err(|e| GrapheneError::config(format!("Prompt failed: {e}")))?,
    };

    let repository_name = ctx.repo.repository_name()?;
    let imported = HistoryImporter::new(&mut ctx.store, &ctx.repo, &ctx.settings)
        .import_stack(&name, &repository_name)?;

    Output::success(format!(
        "Created stack {} on {}",
        style(&imported.stack_name).cyan(),
        style(&imported.base_branch).cyan()
    ));
    for branch in imported.branches.iter().rev() {
        Output::sub_item(format!("{} (position {})", branch.name, branch.position));
    }
    Ok(())
}

async fn list() -> Result<()> {
    let mut ctx = Context::open()?;
    let manager = ctx.manager()?;
    let stacks = manager.list_stacks()?;

    if stacks.is_empty() {
        Output::info("No stacks in this repository");
        return Ok(());
    }

    Output::section(format!("Stacks in {}", manager.repository_name()));
    for stack in stacks {
        Output::bullet(format!(
            "{} {} {}",
            style(&stack.name).cyan(),
            style(format!("({} branches on {})", stack.branch_count, stack.base_branch)).dim(),
            style(stack.id).dim()
        ));
    }
    Ok(())
}

async fn rename(new_name: &str) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;

    let old_name = manager.rename_current_stack(new_name)?;
    Output::success(format!(
        "Renamed stack {} → {}",
        style(old_name).yellow(),
        style(new_name).cyan()
    ));
    Ok(())
}

async fn delete(names: Vec<String>, yes: bool) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;
    let theme = ColorfulTheme::default();

    let names = if names.is_empty() {
        let stacks: Vec<String> = manager.list_stacks()?.into_iter().map(|s| s.name).collect();
        if stacks.is_empty() {
            Output::info("No stacks to delete");
            return Ok(());
        }
        let chosen = MultiSelect::with_theme(&theme)
            .with_prompt("Select stacks to delete")
            .items(&stacks)
            .interact()
            .map_err(|e| GrapheneError::config(format!("Prompt failed: {e}")))?;
        chosen.into_iter().map(|i| stacks[i].clone()).collect()
    } else {
        names
    };

    if names.is_empty() {
        Output::info("Nothing selected");
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::with_theme(&theme)
            .with_prompt(format!("Delete {} stack(s)?", names.len()))
            .default(false)
            .interact()
            .map_err(|e| GrapheneError::config(format!("Prompt failed: {e}")))?;
        if !confirmed {
            Output::info("Nothing deleted");
            return Ok(());
        }
    }

    let deleted = manager.delete_stacks(&names)?;
    Output::success(format!("Deleted {deleted} stack(s)"));
    for name in &names {
        Output::sub_item(name);
    }
    Ok(())
}
