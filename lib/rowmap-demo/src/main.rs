//! bookshelf: connects to PostgreSQL, runs smoke queries, and walks an
//! author/book pair through insert, select and delete.
//!
//! Environment variables:
//!   DB_NAME, DB_USER, DB_PASS, DB_HOST, DB_PORT   # required
//!   DB_SSLMODE                                    # default: disable
//!   ROWMAP_DEBUG                                  # 0 none, 1 failures, 2 every statement
//!   RUST_LOG                                      # log filter (default: info)

mod models;

use anyhow::{Context, Result, anyhow};
use rowmap::{BuiltStatement, Delete, Gateway, Insert, RelationStrategy, Select};
use rowmap_postgres::{PgPool, PostgresConfig, debug_hook_from_env};
use tracing_subscriber::EnvFilter;

use models::{Author, Book, CREATE_AUTHORS, CREATE_BOOKS};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the variables may come from the shell.
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let config = PostgresConfig::from_env().context("loading database configuration")?;
    let gateway = Gateway::with_shared_hook(debug_hook_from_env()?);

    tracing::info!(dsn = %config, "connecting");
    let pool = PgPool::connect_with(&config)
        .await
        .context("connecting to database")?;
    pool.ping().await.context("pinging database")?;

    let outcome = run(&gateway, &pool).await;
    pool.close().await;
    outcome
}

async fn run(gateway: &Gateway, pool: &PgPool) -> Result<()> {
    let select_one = BuiltStatement::raw("SELECT 1", vec![]);
    let affected = gateway.execute(pool, &select_one).await?;
    let one: i32 = gateway.query_scalar(pool, &select_one).await?;
    tracing::info!(affected, one, "smoke queries passed");

    for ddl in [CREATE_AUTHORS, CREATE_BOOKS] {
        gateway.execute(pool, &BuiltStatement::raw(ddl, vec![])).await?;
    }

    let mut author = Author {
        name: "Ursula K. Le Guin".into(),
        ..Default::default()
    };
    let insert = Insert::new(&author).returning_all().build()?;
    gateway.execute_returning(pool, &insert, &mut author).await?;
    tracing::info!(id = author.id, name = %author.name, "inserted author");

    let mut book = Book {
        title: "The Dispossessed".into(),
        author_id: author.id,
        ..Default::default()
    };
    let insert = Insert::new(&book).returning(["id"]).build()?;
    gateway.execute_returning(pool, &insert, &mut book).await?;
    tracing::info!(id = book.id, title = %book.title, "inserted book");

    let joined = Select::<Book>::new()
        .relation("author")
        .where_expr("author.id = ?", [author.id])
        .build()?;
    for found in gateway.fetch::<_, Book>(pool, &joined).await? {
        tracing::info!(
            book = %found.title,
            author = found.author.as_ref().map(|a| a.name.as_str()).unwrap_or("-"),
            "joined"
        );
    }

    let batched = Select::<Book>::new()
        .relation_with("author", RelationStrategy::Query)
        .eq("id", book.id)
        .build()?;
    let found: Option<Book> = gateway.fetch_optional(pool, &batched).await?;
    let found = found.ok_or_else(|| anyhow!("book {} not found after insert", book.id))?;
    tracing::info!(
        book = %found.title,
        author = found.author.as_ref().map(|a| a.name.as_str()).unwrap_or("-"),
        "batched"
    );

    let deleted = gateway
        .execute(pool, &Delete::record(&book)?.build()?)
        .await?;
    let deleted_authors = gateway
        .execute(pool, &Delete::record(&author)?.build()?)
        .await?;
    tracing::info!(books = deleted, authors = deleted_authors, "deleted");

    Ok(())
}
