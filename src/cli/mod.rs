use colored::Colorize;

use crate::errors::Result;

pub mod commands;

/// Manual dispatch over process arguments. No arguments starts the HTTP
/// server, which is the common deployment path.
pub async fn run(args: Vec<String>) -> Result<()> {
    match args.first().map(String::as_str) {
        None | Some("serve") => crate::api::start_http_server().await,
        Some("export") => commands::run_export(&args[1..]).await,
        Some("etl") => commands::run_etl(&args[1..]).await,
        Some("help") | Some("--help") | Some("-h") => {
            commands::print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("{} unknown command '{}'", "error:".red().bold(), other);
            commands::print_help();
            std::process::exit(2);
        }
    }
}
