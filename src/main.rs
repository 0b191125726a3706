use clap::Parser;
use graphene_cli::cli::output::Output;
use graphene_cli::cli::Cli;
use graphene_cli::GrapheneError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.run().await {
        // Conflicts were already reported with their files and next steps
        if !matches!(err, GrapheneError::Conflict(_)) {
            Output::error(&err);
        }
        std::process::exit(err.exit_code());
    }

    Ok(())
}
