//! Pipelined simple queries against a local server
//!
//! Run with:
//! `RUST_LOG=pgline=trace cargo run --example simple_query`
//!
//! Connection settings come from `POSTGRES_HOST`, `POSTGRES_PORT`,
//! `POSTGRES_USER`, `POSTGRES_PASSWORD` and `POSTGRES_DB`.

use pgline::sink::TracingSink;
use pgline::{ConnectionConfig, Session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> pgline::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(env_or("RUST_LOG", "pgline=trace")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = env_or("POSTGRES_HOST", "localhost");
    let port = env_or("POSTGRES_PORT", "5432").parse().unwrap_or(5432);

    let mut builder = ConnectionConfig::builder(
        env_or("POSTGRES_DB", "postgres"),
        env_or("POSTGRES_USER", "postgres"),
    );
    if let Ok(password) = std::env::var("POSTGRES_PASSWORD") {
        builder = builder.password(password);
    }
    let config = builder.build();

    let session = Session::connect(&host, port, &config, Some(Box::new(TracingSink))).await?;
    tracing::info!(
        server_version = session.properties().server_version().unwrap_or("?"),
        "connected"
    );

    // All three go out before any response is read
    let mut pending = Vec::new();
    for sql in ["SELECT 1", "SELECT now()", "SELECT version()"] {
        pending.push((sql, session.simple_query(sql).await?));
    }

    for (sql, response) in pending {
        for result in response.await? {
            let rows: Vec<String> = result
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| match cell {
                            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                            None => "NULL".to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect();
            println!("{} -> {:?}", sql, rows);
        }
    }

    session.close().await
}
