use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use eventdesk::db::SqliteDirectory;
use eventdesk::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "eventdesk operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Role changes made here bypass a running server's permission cache; they
/// take effect there once the cached entry expires.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user, optionally with roles (first one is the primary role)
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Assign a role to an existing user
    AssignRole {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try CWD first; fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateUser {
            name,
            email,
            password,
            roles,
        } => {
            let directory = SqliteDirectory::new(get_pool().await?);
            let password_hash = hash_password(&password)?;
            let identity = directory.create_user(&name, &email, &password_hash, &roles).await?;
            println!(
                "Created user {} <{}> with roles [{}]",
                identity.id,
                identity.email,
                identity.role_names().join(", ")
            );
        }
        Commands::AssignRole { user_id, role } => {
            let directory = SqliteDirectory::new(get_pool().await?);
            if directory.assign_role(user_id, &role).await? {
                println!("Assigned {} to {}", role, user_id);
            } else {
                println!("{} already holds {}", user_id, role);
            }
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let tracked: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if tracked.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .context("failed to load migrations")
}
