use std::sync::Arc;

use clap::{Args, Subcommand};
use storefront_app::remote::RemoteStore;

mod show;

#[derive(Debug, Args)]
pub(crate) struct OrderCommand {
    #[command(subcommand)]
    command: OrderSubcommand,
}

#[derive(Debug, Subcommand)]
enum OrderSubcommand {
    Show(show::ShowArgs),
}

pub(crate) async fn run(command: OrderCommand, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    match command.command {
        OrderSubcommand::Show(args) => show::run(args, remote).await,
    }
}
