use accrual_poller::mock;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use warp::Filter;

/// Stand-in accrual authority
#[derive(Parser, Debug)]
#[command(name = "mock-accrual")]
struct Args {
    /// Address to listen on
    #[arg(short = 'a', long, env = "MOCK_ACCRUAL_ADDRESS", default_value = "127.0.0.1:8081")]
    address: SocketAddr,

    /// Answer every n-th request with 429 (0 never does)
    #[arg(long, default_value_t = 0)]
    rate_limit_every: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Mock accrual authority listening on {}", args.address);

    let routes = mock::routes(args.rate_limit_every).with(warp::log("mock_accrual"));
    let (_, server) = warp::serve(routes).try_bind_with_graceful_shutdown(args.address, async {
        let _ = tokio::signal::ctrl_c().await;
    })?;
    server.await;

    info!("Mock accrual authority stopped");
    Ok(())
}
