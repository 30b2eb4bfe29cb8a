use std::sync::Arc;

use clap::{Args, Subcommand};
use storefront_app::remote::RemoteStore;

mod balance;

#[derive(Debug, Args)]
pub(crate) struct PointsCommand {
    #[command(subcommand)]
    command: PointsSubcommand,
}

#[derive(Debug, Subcommand)]
enum PointsSubcommand {
    Balance(balance::BalanceArgs),
}

pub(crate) async fn run(command: PointsCommand, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    match command.command {
        PointsSubcommand::Balance(args) => balance::run(args, remote).await,
    }
}
