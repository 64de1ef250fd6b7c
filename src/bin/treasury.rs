use anyhow::{Context, Result};
use treasury_anchor::{auth, config, mode};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "config/treasury.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let first = args.next();

    // `treasury token <user-id> [config]` prints a bearer token for local use
    if first.as_deref() == Some("token") {
        let user: Uuid = args
            .next()
            .context("usage: treasury token <user-id> [config]")?
            .parse()
            .context("user id must be a uuid")?;
        let cfg = config::load(&args.next().unwrap_or_else(|| DEFAULT_CONFIG.into()))?;
        println!("{}", auth::issue_token(&cfg.auth.jwt_secret, user, 86_400)?);
        return Ok(());
    }

    let cfg = config::load(first.as_deref().unwrap_or(DEFAULT_CONFIG))?;

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install default crypto provider"))?;

    mode::server::run(cfg).await
}
