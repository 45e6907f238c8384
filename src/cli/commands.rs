use std::path::Path;

use colored::Colorize;

use crate::config::get_settings;
use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::etl::export::{export_category, EXPORT_CATEGORIES};
use crate::etl::{run_etl as run_warehouse_load, Warehouse};

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// `export --user <email> [--category <c>] [--output <dir>]`
pub async fn run_export(args: &[String]) -> Result<()> {
    let email = flag_value(args, "--user").ok_or_else(|| {
        AppError::ValidationError("--user <email> is required for export".to_string())
    })?;
    let category = flag_value(args, "--category").unwrap_or_else(|| "all".to_string());
    let output = flag_value(args, "--output").unwrap_or_else(|| "exports".to_string());

    let db = SqliteDatabase::new(&get_settings().database_path).await?;
    let user = db
        .get_user_by_email(&email.trim().to_lowercase())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user with email '{}'", email)))?;

    let files = export_category(&db, user.id, &category).await?;
    std::fs::create_dir_all(&output)
        .map_err(|e| AppError::InternalError(format!("Cannot create '{}': {}", output, e)))?;

    for (filename, contents) in &files {
        let path = Path::new(&output).join(filename);
        std::fs::write(&path, contents)
            .map_err(|e| AppError::InternalError(format!("Cannot write {}: {}", path.display(), e)))?;
        println!(
            "{} {} ({} lines)",
            "wrote".green().bold(),
            path.display(),
            contents.lines().count().saturating_sub(1)
        );
    }

    println!(
        "{} exported {} file(s) for {}",
        "done:".green().bold(),
        files.len(),
        user.email.cyan()
    );
    Ok(())
}

/// `etl [--warehouse <path>]`
pub async fn run_etl(args: &[String]) -> Result<()> {
    let warehouse_path =
        flag_value(args, "--warehouse").unwrap_or_else(|| get_settings().warehouse_path.clone());

    let db = SqliteDatabase::new(&get_settings().database_path).await?;
    let warehouse = Warehouse::open(&warehouse_path).await?;
    let report = run_warehouse_load(&db, &warehouse).await?;

    println!("{} warehouse load finished", "done:".green().bold());
    println!("  users:        {}", report.users.to_string().cyan());
    println!("  health:       {}", report.health_rows.to_string().cyan());
    println!("  finance:      {}", report.finance_rows.to_string().cyan());
    println!("  productivity: {}", report.productivity_rows.to_string().cyan());
    println!("  learning:     {}", report.learning_rows.to_string().cyan());
    Ok(())
}

pub fn print_help() {
    println!("{}", "lifedash - personal life dashboard backend".bold());
    println!();
    println!("{}", "USAGE:".yellow().bold());
    println!("  lifedash [serve]                         start the HTTP API server");
    println!("  lifedash export --user <email>           export entries as CSV");
    println!("           [--category <c>] [--output <dir>]");
    println!("  lifedash etl [--warehouse <path>]        load the analytics warehouse");
    println!("  lifedash help                            show this help");
    println!();
    println!("{}", "EXPORT CATEGORIES:".yellow().bold());
    println!("  {}", EXPORT_CATEGORIES.join(", "));
    println!();
    println!("{}", "ENVIRONMENT:".yellow().bold());
    println!("  JWT_SECRET        signing secret for access tokens (required)");
    println!("  DATABASE_PATH     sqlite file (default: data/lifedash.db)");
    println!("  WAREHOUSE_PATH    warehouse sqlite file (default: data/warehouse.db)");
    println!("  PORT              http port (default: 8080)");
    println!("  CORS_ORIGINS      comma separated origins, or *");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing() {
        let args: Vec<String> = ["--user", "me@example.com", "--category", "health"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_value(&args, "--user").as_deref(), Some("me@example.com"));
        assert_eq!(flag_value(&args, "--category").as_deref(), Some("health"));
        assert_eq!(flag_value(&args, "--output"), None);
        // Flag at the end with no value
        assert_eq!(flag_value(&args[..3].to_vec(), "--category"), None);
    }
}
