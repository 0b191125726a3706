use super::Context;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::{
    ContinueOutcome, FoldOutcome, PendingOperation, RebaseOrchestrator, RestackOutcome,
};
use console::style;

/// Rebase the current stack, up to the checked-out branch unless `all` is set
pub async fn restack(all: bool) -> Result<()> {
    let mut ctx = Context::open()?;
    let manager = ctx.manager()?;
    let current = manager.current_stack()?;

    Output::progress(format!(
        "Restacking {} onto {}",
        style(&current.stack.name).cyan(),
        style(&current.stack.base_branch).cyan()
    ));

    let outcome = if all {
        manager.restack_stack(&current.stack.name)?
    } else {
        manager.restack_current()?
    };
    report(outcome)
}

/// Continue whichever operation is paused
pub async fn continue_operation() -> Result<()> {
    let mut ctx = Context::open()?;

    if let Some(PendingOperation::Fold(_)) = ctx.journal.load()? {
        Output::progress("Continuing fold");
        let mut manager = ctx.manager()?;
        return match manager.continue_fold()? {
            FoldOutcome::Folded { branch, into } => {
                Output::success(format!("Folded {branch} → {into}"));
                Ok(())
            }
            FoldOutcome::Paused(conflict) => {
                Output::conflict(&conflict);
                Err(conflict.into())
            }
        };
    }

    let orchestrator = RebaseOrchestrator::new(&ctx.store, &ctx.repo, &ctx.journal);
    match orchestrator.continue_restack()? {
        ContinueOutcome::NothingToContinue => {
            Output::info("No rebase in progress");
            Ok(())
        }
        ContinueOutcome::StillConflicted(conflict) => {
            Output::conflict(&conflict);
            Err(conflict.into())
        }
        ContinueOutcome::BranchCompleted => {
            Output::success("Rebase completed");
            Ok(())
        }
        ContinueOutcome::Resumed(outcome) => report(outcome),
    }
}

/// Abort whichever operation is paused and return to where it started
pub async fn abort_operation() -> Result<()> {
    let mut ctx = Context::open()?;

    if let Some(PendingOperation::Fold(_)) = ctx.journal.load()? {
        let branch = ctx.manager()?.abort_fold()?;
        Output::success(format!("Fold aborted, back on {}", style(branch).cyan()));
        return Ok(());
    }

    let orchestrator = RebaseOrchestrator::new(&ctx.store, &ctx.repo, &ctx.journal);
    match orchestrator.abort()? {
        Some(branch) => Output::success(format!("Restack aborted, back on {}", style(branch).cyan())),
        None => Output::success("Rebase aborted"),
    }
    Ok(())
}

fn report(outcome: RestackOutcome) -> Result<()> {
    match outcome {
        RestackOutcome::Completed { rebased } => {
            Output::success(format!("Restacked {} branch(es)", rebased.len()));
            for branch in rebased {
                Output::sub_item(branch);
            }
            Ok(())
        }
        RestackOutcome::Paused(conflict) => {
            Output::conflict(&conflict);
            Err(conflict.into())
        }
    }
}
