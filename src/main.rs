use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().flatten_event(true))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = lifedash::cli::run(args).await {
        eprintln!("{}", format!("Application error: {}", e).red());
        std::process::exit(1);
    }
}
