//! `banner` extension - capture what a service says first

use super::tcp;
use crate::context::{Context, LoginEvent};
use crate::plugin::{
    ExtensionCategory, ExtensionDeclaration, ExtensionFactory, ExtensionModule, ModuleOptions,
};
use async_trait::async_trait;
use nexec_foundation::{Error, Result};
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub const NAME: &str = "banner";
const DEFAULT_BYTES: usize = 128;
const DEFAULT_WAIT_SECS: u64 = 3;

pub struct BannerFactory;

impl ExtensionFactory for BannerFactory {
    fn declaration(&self) -> ExtensionDeclaration {
        ExtensionDeclaration::new(NAME)
            .description("Read the service banner of every reachable endpoint")
            .category(ExtensionCategory::Enumeration)
            .supports([tcp::NAME])
            .options_doc(
                "BYTES    Maximum banner length in bytes (default: 128)\n\
                 WAIT     Seconds to wait for the service to speak (default: 3)",
            )
            .with_options()
            .with_on_login()
    }

    fn instantiate(&self) -> Result<Box<dyn ExtensionModule>> {
        Ok(Box::new(BannerModule {
            max_bytes: DEFAULT_BYTES,
            wait: Duration::from_secs(DEFAULT_WAIT_SECS),
        }))
    }
}

#[derive(Debug)]
pub struct BannerModule {
    max_bytes: usize,
    wait: Duration,
}

impl BannerModule {
    async fn grab(&self, host: &str, port: u16, connect_timeout: Duration) -> Result<String> {
        let mut stream = tcp::connect(host, port, connect_timeout).await?;
        let mut buf = vec![0u8; self.max_bytes];
        let read = match tokio::time::timeout(self.wait, stream.read(&mut buf)).await {
            Ok(read) => read?,
            // silent service
            Err(_) => 0,
        };
        Ok(printable(&buf[..read]))
    }
}

/// Keep printable ASCII, collapse everything else to spaces.
fn printable(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() {
                *b as char
            } else {
                ' '
            }
        })
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ExtensionModule for BannerModule {
    fn options(&mut self, _ctx: &Context, options: &ModuleOptions) -> Result<()> {
        if let Some(bytes) = options.get("BYTES") {
            self.max_bytes = bytes
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::extension(NAME, "BYTES must be a positive integer"))?;
        }
        if let Some(wait) = options.get("WAIT") {
            let secs: u64 = wait
                .parse()
                .map_err(|_| Error::extension(NAME, "WAIT must be a number of seconds"))?;
            self.wait = Duration::from_secs(secs);
        }
        Ok(())
    }

    async fn on_login(&self, ctx: &Context, event: &LoginEvent<'_>) -> Result<()> {
        let host = &event.target.host;
        let port = event.target.port_or(tcp::DEFAULT_PORT);

        let banner = self.grab(host, port, tcp::connect_timeout(ctx)).await?;
        if banner.is_empty() {
            ctx.log().debug(format!("{} sent no banner", event.target));
            return Ok(());
        }

        ctx.log().highlight(format!("{}  {}", event.target, banner));
        let captured = chrono::Utc::now().to_rfc3339();
        let host = host.clone();
        ctx.with_store(move |store| {
            store.with_connection(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO banners (host, port, banner, captured_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    (&host, port, &banner, &captured),
                )
            })?;
            Ok(())
        })
        .await
    }
}
