use std::sync::Arc;

use clap::{Parser, Subcommand};
use storefront_app::{
    config::{db::DatabaseConfig, observability::LoggingConfig},
    database,
    observability::init_subscriber,
    remote::{PgRemoteStore, RemoteStore},
};

mod order;
mod points;
mod promo;

#[derive(Debug, Parser)]
#[command(name = "storefront", about = "Storefront support CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten)]
    logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Points(points::PointsCommand),
    Promo(promo::PromoCommand),
    Order(order::OrderCommand),
}

impl Cli {
    /// Read `.env`, then parse arguments with environment fallbacks.
    pub(crate) fn load() -> Self {
        let _env = dotenvy::dotenv();

        Self::parse()
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        init_subscriber(&self.logging)
            .map_err(|error| format!("failed to initialise logging: {error}"))?;

        let pool = database::connect(&self.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let remote: Arc<dyn RemoteStore> = Arc::new(PgRemoteStore::new(pool));

        match self.command {
            Commands::Points(command) => points::run(command, remote).await,
            Commands::Promo(command) => promo::run(command, remote).await,
            Commands::Order(command) => order::run(command, remote).await,
        }
    }
}
