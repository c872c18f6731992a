use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use cvitanok_core::provider::BoxError;
use cvitanok_core::{Config, db, logging};

mod commands;

#[derive(Parser)]
#[command(name = "manage")]
#[command(about = "Cvitanok management CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database management commands
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Show the total number of users in the database
    CountUsers,
    /// List users from the database
    ListUsers {
        /// Maximum number of users to show
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Run pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    logging::init_logging_with_level("warn");

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<(), BoxError> {
    let config = Config::from_env()?;
    let conn = db::connect(&config).await?;

    match command {
        Commands::Db { action } => match action {
            DbCommands::CountUsers => {
                let total = commands::count_users(&conn).await?;
                println!("\n{} {}\n", "Total Users:".green().bold(), total);
            }
            DbCommands::ListUsers { limit } => {
                let users = commands::list_users(&conn, limit).await?;
                let table = commands::render_users_table(&users, limit);
                if users.is_empty() {
                    println!("{}", table.yellow());
                } else {
                    println!("{table}");
                }
            }
            DbCommands::Migrate => {
                let applied = commands::migrate(&conn).await?;
                println!("{} {} migration(s) applied", "Done:".green().bold(), applied);
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_users_limit() {
        let cli = Cli::parse_from(["manage", "db", "list-users", "--limit", "3"]);
        assert!(matches!(
            cli.command,
            Commands::Db { action: DbCommands::ListUsers { limit: 3 } }
        ));

        let cli = Cli::parse_from(["manage", "db", "list-users"]);
        assert!(matches!(
            cli.command,
            Commands::Db { action: DbCommands::ListUsers { limit: 10 } }
        ));
    }

    #[test]
    fn parses_count_users() {
        let cli = Cli::parse_from(["manage", "db", "count-users"]);
        assert!(matches!(cli.command, Commands::Db { action: DbCommands::CountUsers }));
    }
}
