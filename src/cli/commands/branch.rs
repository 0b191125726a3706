use super::Context;
use crate::cli::output::Output;
use crate::errors::{GrapheneError, PreconditionError, Result};
use crate::git::VcsGateway;
use crate::stack::FoldOutcome;
use crate::store::BranchStatus;
use clap::ValueEnum;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// CLI argument version of BranchStatus
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StatusArg {
    Active,
    Merged,
    Abandoned,
}

impl From<StatusArg> for BranchStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => BranchStatus::Active,
            StatusArg::Merged => BranchStatus::Merged,
            StatusArg::Abandoned => BranchStatus::Abandoned,
        }
    }
}

pub async fn create(name: &str) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;

    let branch = manager.create_branch_in_stack(name)?;
    let stack = manager.current_stack()?.stack;

    Output::success(format!("Created branch {}", style(name).cyan()));
    Output::sub_item(format!(
        "Stack: {} (position {})",
        style(&stack.name).cyan(),
        branch.position
    ));
    if let Some(parent) = manager.parent_branch(name)? {
        Output::sub_item(format!("Parent: {}", style(parent).cyan()));
    } else {
        Output::sub_item(format!("Base: {}", style(&stack.base_branch).cyan()));
    }
    Ok(())
}

pub async fn track(name: &str) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;

    let branch = manager.track_branch(name)?;
    let stack = manager.current_stack()?.stack;

    Output::success(format!(
        "Tracked {} at the top of {} (position {})",
        style(name).cyan(),
        style(&stack.name).cyan(),
        branch.position
    ));
    Ok(())
}

pub async fn untrack(name: Option<String>) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;
    let name = match name {
        Some(name) => name,
        None => manager.current_branch()?,
    };

    manager.untrack_branch(&name)?;
    Output::success(format!("Untracked {}", style(&name).cyan()));
    Output::sub_item("The git branch was left in place");
    Ok(())
}

pub async fn fold(yes: bool) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;

    let current = manager.current_branch()?;
    let into = manager
        .downstream_branch()?
        .ok_or_else(|| PreconditionError::NoDownstreamBranch(current.clone()))?;

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Fold {current} into {into}?"))
            .default(false)
            .interact()
            .map_err(|e| GrapheneError::config(format!("Prompt failed: {e}")))?;
        if !confirmed {
            Output::info("Fold cancelled");
            return Ok(());
        }
    }

    Output::progress(format!(
        "Folding {} into {}",
        style(&current).cyan(),
        style(&into).cyan()
    ));

    match manager.fold()? {
        FoldOutcome::Folded { branch, into } => {
            Output::success(format!("Folded {branch} → {into}"));
            Ok(())
        }
        FoldOutcome::Paused(conflict) => {
            Output::conflict(&conflict);
            Err(conflict.into())
        }
    }
}

pub async fn up() -> Result<()> {
    let mut ctx = Context::open()?;
    let manager = ctx.manager()?;

    match manager.up()? {
        Some(branch) => Output::success(format!("Checked out {}", style(branch).cyan())),
        None => Output::warning("Already at the top of the stack"),
    }
    Ok(())
}

pub async fn down() -> Result<()> {
    let mut ctx = Context::open()?;
    let manager = ctx.manager()?;

    let branch = manager.down()?;
    Output::success(format!("Checked out {}", style(branch).cyan()));
    Ok(())
}

pub async fn mark(status: StatusArg, branch: Option<String>) -> Result<()> {
    let mut ctx = Context::open()?;
    let mut manager = ctx.manager()?;
    let name = match branch {
        Some(name) => name,
        None => manager.current_branch()?,
    };

    let status = BranchStatus::from(status);
    manager.set_branch_status(&name, status)?;
    Output::success(format!("Marked {} as {status}", style(&name).cyan()));
    Ok(())
}

/// Branches grouped by stack, top of each stack first, base branches last
pub async fn list() -> Result<()> {
    let mut ctx = Context::open()?;
    let manager = ctx.manager()?;
    let current = manager.current_branch()?;

    let groups = manager.list_branches()?;
    if groups.is_empty() {
        Output::info("No stacks yet");
        Output::tip("Create one with:");
        Output::command_example("gr create <branch-name>");
    }

    for group in &groups {
        Output::section(&group.stack.name);
        for branch in group.branches.iter().rev() {
            Output::branch_line(branch, &current);
        }
        println!("  {} {}", style("└").dim(), style(&group.stack.base_branch).dim());
    }

    Output::section("Base branches");
    for base in manager.list_base_branches()? {
        if base == current {
            println!("  {} {}", style("◉").green(), style(base).green().bold());
        } else {
            println!("  {} {}", style("◯").dim(), base);
        }
    }
    Output::spacing();
    Ok(())
}

pub async fn about(branch: Option<String>) -> Result<()> {
    let mut ctx = Context::open()?;
    let name = match branch {
        Some(name) => name,
        None => ctx.repo.current_branch()?,
    };
    let commit = ctx.repo.latest_commit(&name)?;
    let manager = ctx.manager()?;

    let parent = manager.parent_branch(&name)?;
    let stack = manager.stack_for_branch(&name)?;

    Output::section(format!("Branch {name}"));
    Output::divider();
    field("Parent", parent.unwrap_or_else(|| "none".to_string()));
    field("Stack", stack.unwrap_or_else(|| "not in stack".to_string()));
    field("Commit", &commit.sha[..commit.sha.len().min(7)]);
    field("Author", &commit.author);
    field("Message", &commit.message);
    Output::divider();
    Ok(())
}

fn field<T: std::fmt::Display>(label: &str, value: T) {
    println!("{} {}", style(format!("{label:<10}")).bold(), style(value).yellow());
}
