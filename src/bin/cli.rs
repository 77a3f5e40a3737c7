use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use gatepass::pickup::engine;
use gatepass::utils::{fmt_ts, hash_password, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "gatepass operations tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Insert a demo organization, users, student and reasons
    Seed,
    /// Delete pickup codes that are both expired and unconsumed
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may
    // differ, so fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
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
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::Seed => {
            let pool = get_pool().await?;
            seed(&pool).await?;
            println!("Demo data seeded");
        }
        Commands::Sweep => {
            let pool = get_pool().await?;
            let removed = engine::sweep_expired(&pool, utc_now()).await?;
            println!("Removed {} expired pickup code(s)", removed);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations)
        .await
        .context("failed to load migrations")?;
    Ok(migrator)
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::create_dir_all("migrations")?;
    fs::write(&path, "-- Write your migration here\n")?;
    Ok(path)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: HashSet<i64> = match sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows.iter().map(|row| row.get::<i64, _>("version")).collect(),
        Err(_) => HashSet::new(),
    };

    for migration in migrator.iter() {
        let marker = if applied.contains(&migration.version) { "applied" } else { "pending" };
        println!("{:>8}  {} {}", marker, migration.version, migration.description);
    }

    Ok(())
}

async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let now = fmt_ts(utc_now());

    let org_id = Uuid::new_v4();
    sqlx::query("INSERT OR IGNORE INTO organizations (id, name, created_at) VALUES (?, ?, ?)")
        .bind(org_id.to_string())
        .bind("North Campus")
        .bind(&now)
        .execute(pool)
        .await?;

    let org_id: String = sqlx::query_scalar("SELECT id FROM organizations WHERE name = ?")
        .bind("North Campus")
        .fetch_one(pool)
        .await?;

    let demo_users = [
        ("Dana Admin", "admin@example.com", "admin"),
        ("Omar Operator", "operator@example.com", "operator"),
        ("Grace Guardian", "guardian@example.com", "guardian"),
    ];

    let mut guardian_id = String::new();
    for (name, email, role) in demo_users {
        let user_id = Uuid::new_v4();
        let password_hash = hash_password("password123").map_err(|err| anyhow::anyhow!("{err}"))?;
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        let user_id: String = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(pool)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO organization_members (user_id, organization_id, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user_id)
        .bind(&org_id)
        .bind(role)
        .bind(&now)
        .execute(pool)
        .await?;

        if role == "guardian" {
            guardian_id = user_id;
        }
    }

    sqlx::query(
        "INSERT OR IGNORE INTO students (id, external_id, name, organization_id, group_name, guardian_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind("S-1001")
    .bind("Mina Park")
    .bind(&org_id)
    .bind("Grade 3-B")
    .bind(&guardian_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    for label in ["Medical appointment", "Family emergency", "Early dismissal"] {
        sqlx::query("INSERT OR IGNORE INTO reasons (id, label, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(label)
            .bind(&now)
            .execute(pool)
            .await?;
    }

    Ok(())
}
