use std::sync::Arc;

use clap::{Args, Subcommand};
use storefront_app::remote::RemoteStore;

mod check;

#[derive(Debug, Args)]
pub(crate) struct PromoCommand {
    #[command(subcommand)]
    command: PromoSubcommand,
}

#[derive(Debug, Subcommand)]
enum PromoSubcommand {
    Check(check::CheckArgs),
}

pub(crate) async fn run(command: PromoCommand, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    match command.command {
        PromoSubcommand::Check(args) => check::run(args, remote).await,
    }
}
