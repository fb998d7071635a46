// Commands module
/// Seek command implementation
pub mod seek;
/// Subscribe command implementation
pub mod subscribe;

use crate::cli::Commands;
use crate::config::TxlogConfig;

/// Execute a CLI command
pub async fn execute_command(command: Commands, config: TxlogConfig) -> anyhow::Result<()> {
    match command {
        Commands::Subscribe(args) => subscribe::execute(args, config).await,
        Commands::Seek(args) => seek::execute(args, config).await,
    }
}
