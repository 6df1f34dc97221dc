//! `tcp` protocol - plain TCP connect probe

use crate::context::{Context, LoginEvent};
use crate::plugin::{ArgContributor, ProtocolHandler, ResultNavigator, SchemaInitializer};
use crate::target::TargetSpec;
use async_trait::async_trait;
use clap::{value_parser, Arg};
use nexec_foundation::{Error, ProtocolStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

pub const NAME: &str = "tcp";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS hosts (
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        last_seen TEXT NOT NULL,
        PRIMARY KEY (host, port)
    );
    CREATE TABLE IF NOT EXISTS banners (
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        banner TEXT NOT NULL,
        captured_at TEXT NOT NULL,
        PRIMARY KEY (host, port)
    );
";

/// Connect timeout for a run: `--timeout`, else the default.
pub fn connect_timeout(ctx: &Context) -> Duration {
    Duration::from_secs(ctx.args().timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

/// Open a connection, bounded by `timeout`.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Connection(format!("{}:{}: {}", host, port, e))),
        Err(_) => Err(Error::Timeout(format!("connecting to {}:{}", host, port))),
    }
}

pub struct TcpProtocol;

#[async_trait]
impl ProtocolHandler for TcpProtocol {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: Arc<Context>, target: TargetSpec) -> Result<()> {
        let port = target
            .port
            .or_else(|| ctx.args().extra_value("port").and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT);
        let endpoint = target.clone().with_port(port);

        let stream = connect(&endpoint.host, port, connect_timeout(&ctx)).await?;
        drop(stream);

        ctx.log().success(format!("{} open", endpoint));
        let host = endpoint.host.clone();
        ctx.with_store(move |store| record_host(store, &host, port)).await?;

        ctx.run_login_hooks(&LoginEvent::new(NAME, &endpoint)).await;
        Ok(())
    }
}

fn record_host(store: &ProtocolStore, host: &str, port: u16) -> Result<()> {
    let seen = chrono::Utc::now().to_rfc3339();
    store.with_connection(|conn| {
        conn.execute(
            "INSERT INTO hosts (host, port, last_seen) VALUES (?1, ?2, ?3)
             ON CONFLICT(host, port) DO UPDATE SET last_seen = excluded.last_seen",
            (host, port, &seen),
        )
    })?;
    Ok(())
}

pub struct TcpSchema;

impl SchemaInitializer for TcpSchema {
    fn init_schema(&self, store: &ProtocolStore) -> Result<()> {
        store.execute_batch(SCHEMA)
    }
}

pub struct TcpNavigator;

impl ResultNavigator for TcpNavigator {
    fn summarize(&self, store: &ProtocolStore) -> Result<Vec<String>> {
        store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.host, h.port, h.last_seen, b.banner
                 FROM hosts h LEFT JOIN banners b ON b.host = h.host AND b.port = h.port
                 ORDER BY h.host, h.port",
            )?;
            let rows = stmt.query_map([], |row| {
                let host: String = row.get(0)?;
                let port: u16 = row.get(1)?;
                let seen: String = row.get(2)?;
                let banner: Option<String> = row.get(3)?;
                let endpoint = TargetSpec::new(host).with_port(port);
                Ok(match banner {
                    Some(banner) => format!("{:<28} last seen {}  {}", endpoint, seen, banner),
                    None => format!("{:<28} last seen {}", endpoint, seen),
                })
            })?;
            rows.collect()
        })
    }
}

pub struct TcpArgs;

impl ArgContributor for TcpArgs {
    fn contribute(&self, command: clap::Command) -> Result<clap::Command> {
        Ok(command.arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Port to probe when a target does not name one (default: 80)"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexec_foundation::RunArgs;
    use tokio::net::TcpListener;

    fn context(args: RunArgs) -> Arc<Context> {
        let store = Arc::new(ProtocolStore::in_memory(NAME).unwrap());
        TcpSchema.init_schema(&store).unwrap();
        Arc::new(Context::new(store, Arc::new(args)))
    }

    #[tokio::test]
    async fn test_open_port_is_recorded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = context(RunArgs::for_protocol(NAME));

        TcpProtocol
            .run(ctx.clone(), TargetSpec::new("127.0.0.1").with_port(port))
            .await
            .unwrap();

        let lines = TcpNavigator.summarize(ctx.store()).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(&format!("127.0.0.1:{}", port)));
    }

    #[tokio::test]
    async fn test_port_argument_applies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut args = RunArgs::for_protocol(NAME);
        args.extra.insert("port".into(), vec![port.to_string()]);
        let ctx = context(args);

        TcpProtocol
            .run(ctx.clone(), TargetSpec::new("127.0.0.1"))
            .await
            .unwrap();
        assert_eq!(TcpNavigator.summarize(ctx.store()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpProtocol
            .run(
                context(RunArgs::for_protocol(NAME)),
                TargetSpec::new("127.0.0.1").with_port(port),
            )
            .await;
        assert!(result.unwrap_err().is_network());
    }

    #[test]
    fn test_contributes_port() {
        let command = TcpArgs.contribute(clap::Command::new(NAME)).unwrap();
        let matches = command.try_get_matches_from(["tcp", "--port", "8080"]).unwrap();
        assert_eq!(matches.get_one::<u16>("port"), Some(&8080));
    }
}
