use txlog::cli::{commands, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    let config = cli.config();

    // Initialize tracing
    config.logging.init_tracing()?;

    // Execute the command
    commands::execute_command(cli.command, config).await?;

    Ok(())
}
