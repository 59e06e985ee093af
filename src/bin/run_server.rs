use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::error;

use home_inventory::config::ServerArgs;
use home_inventory::service::InventoryService;
use home_inventory::store::SqliteStore;
use home_inventory::{server, telemetry, Error};

#[tokio::main]
async fn main() {
    telemetry::init();

    let args = ServerArgs::parse();

    if let Err(err) = serve(args).await {
        error!(error = %err, "server failed");
        process::exit(1);
    }
}

async fn serve(args: ServerArgs) -> Result<(), Error> {
    let store = Arc::new(SqliteStore::connect(&args.database).await?);
    let service = InventoryService::new(store.clone());

    let listener = server::bind(&args.host, args.port).await?;

    server::run(listener, service, args.settings(), signal::ctrl_c()).await;

    store.close().await;

    Ok(())
}
