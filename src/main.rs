use anyhow::Context;
use clap::Parser;
use postage_rates::config::{Cli, Command, QuoteArgs, ServeArgs, UpstreamArgs};
use postage_rates::server::{self, AppState, NO_VALID_COMBINATIONS};
use postage_rates::session::{JsonFileStore, QuerySession};
use postage_rates::{logging, normalize, PriceOutcome, PriceService, RequestBuilder, UspsClient};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logger(cli.verbose, cli.log_format);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Quote(args) => quote(args).await,
    }
}

fn price_service(upstream: &UpstreamArgs) -> anyhow::Result<Arc<PriceService<UspsClient>>> {
    let config = upstream.client_config();
    let client = UspsClient::new(&config).context("failed to create the rate client")?;
    let builder = RequestBuilder::new(config.user_id.clone(), config.max_packages_per_request);
    Ok(Arc::new(PriceService::new(client, builder)))
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let addr = args.bind_addr().context("invalid listen address")?;
    let state = AppState::new(price_service(&args.upstream)?);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server::serve(listener, state, shutdown_signal()).await?;
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("received Ctrl+C, shutting down");
}

async fn quote(args: QuoteArgs) -> anyhow::Result<()> {
    let query = args.query()?;
    let service = price_service(&args.upstream)?;

    let outcome = match &args.session {
        Some(path) => {
            let mut session = QuerySession::open(JsonFileStore::new(path), Arc::clone(&service))
                .with_context(|| format!("failed to open session {}", path.display()))?;
            session.set_package(args.package())?;
            session.submit(query).await.context("price query did not complete")??
        }
        None => service.quote(&query).await?,
    };

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &PriceOutcome) {
    let PriceOutcome::Packages(outcomes) = outcome else {
        println!("{NO_VALID_COMBINATIONS}");
        return;
    };

    match normalize(outcomes) {
        Ok(lines) => {
            let width = lines
                .iter()
                .map(|line| line.service_name.chars().count())
                .max()
                .unwrap_or(0);
            for line in lines {
                println!("{:<width$}  ${:>8.2}", line.service_name, line.price);
            }
        }
        Err(e) => println!("{e}"),
    }
}
