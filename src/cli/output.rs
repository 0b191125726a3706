use crate::errors::Conflict;
use crate::store::{BranchStatus, TrackedBranch};
use console::style;
use std::fmt::Display;

/// Centralized output formatting utilities for consistent CLI presentation
pub struct Output;

impl Output {
    /// Print a success message with checkmark
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    /// Print an error message with X mark
    pub fn error<T: Display>(message: T) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Print a sub-item with arrow prefix
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    /// Print a section header
    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    /// Print progress indicator
    pub fn progress<T: Display>(message: T) {
        println!("{} {}", style("→").cyan(), message);
    }

    pub fn divider() {
        println!("{}", style("─".repeat(50)).dim());
    }

    /// Print a command example
    pub fn command_example<T: Display>(command: T) {
        println!("  {}", style(command).yellow());
    }

    /// A conflicted branch, its unmerged files and how to carry on
    pub fn conflict(conflict: &Conflict) {
        Self::error(format!(
            "Conflicts in branch {}",
            style(&conflict.branch).yellow()
        ));
        for file in &conflict.files {
            Self::bullet(style(file).yellow());
        }
        println!();
        Self::tip("Resolve the conflicts, stage the files, then run:");
        Self::command_example("gr continue");
        Self::tip("Or give up and restore the original branch:");
        Self::command_example("gr abort");
    }

    /// One stack member, marking the checked-out branch
    pub fn branch_line(branch: &TrackedBranch, current: &str) {
        let marker = if branch.name == current {
            style("◉").green().to_string()
        } else {
            style("◯").dim().to_string()
        };
        let name = if branch.name == current {
            style(&branch.name).green().bold().to_string()
        } else {
            branch.name.clone()
        };
        let status = match branch.status {
            BranchStatus::Active => String::new(),
            other => format!(" {}", style(format!("({other})")).dim()),
        };
        println!("  {marker} {name}{status}");
    }

    /// Print empty line for spacing
    pub fn spacing() {
        println!();
    }
}
