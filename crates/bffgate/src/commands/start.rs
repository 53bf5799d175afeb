//! Start command - launches the gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum_extra::extract::cookie::Key;
use clap::Args;
use url::Url;

use bffgate_config::{GatewayConfig, StoreBackend};
use bffgate_oauth::{OidcClient, OidcConfig};
use bffgate_server::{AppState, Server, ServerConfig};
use bffgate_session::{
    MemorySessionStore, RedisSessionStore, SharedSessionStore, StoreConfig as SessionStoreConfig,
};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file and environment values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to config file (overrides default discovery)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to, e.g. 0.0.0.0:8080 (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    // ── Load configuration ──────────────────────────────────────────────

    let loaded = bffgate_config::load_config(args.config.as_deref())?;

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        match loaded.source {
            Some(ref path) => println!("Loaded config: {}", path.display()),
            None => println!("No config file found, using defaults + environment"),
        }
        for name in &loaded.env_overrides {
            println!("Override from environment: {}", name);
        }
    }

    let mut config = loaded.config;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate().context("invalid configuration")?;

    // ── Build components ────────────────────────────────────────────────

    let oidc = build_oidc_client(&config)?;
    let store = build_store(&config).await?;
    let cookie_key = build_cookie_key(&config)?;
    let server_config = ServerConfig::from_gateway(&config)?;

    let state = AppState::new(server_config, oidc, store, cookie_key)?;

    // Discovery is retried on first login if the provider is not up yet.
    match state.oidc.discover().await {
        Ok(doc) => tracing::info!(issuer = %doc.issuer, "Identity provider discovered"),
        Err(e) => tracing::warn!(error = %e, "Identity provider discovery failed; will retry on first login"),
    }

    tracing::info!(
        bind = %state.config.bind_address,
        upstream = %state.config.upstream_base,
        store = ?config.store.backend,
        "Starting bffgate"
    );

    Server::new(state).run().await?;
    Ok(())
}

fn build_oidc_client(config: &GatewayConfig) -> Result<OidcClient> {
    let idp = &config.idp;
    let mut oidc_config = OidcConfig::new(
        idp.discovery_url.parse::<Url>().context("idp.discovery_url")?,
        idp.client_id.clone(),
        idp.redirect_uri.parse::<Url>().context("idp.redirect_uri")?,
    )
    .with_scopes(idp.scopes.clone())
    .with_timeout(idp.timeout());

    if let Some(ref secret) = idp.client_secret {
        oidc_config = oidc_config.with_client_secret(secret.clone());
    }

    Ok(OidcClient::new(oidc_config)?)
}

fn session_store_config(config: &GatewayConfig) -> SessionStoreConfig {
    SessionStoreConfig::new()
        .with_ttl(config.session.ttl())
        .with_sliding(config.session.sliding)
        .with_key_prefix(config.store.key_prefix.clone())
}

async fn build_store(config: &GatewayConfig) -> Result<SharedSessionStore> {
    let store_config = session_store_config(config);

    let store: SharedSessionStore = match config.store.backend {
        StoreBackend::Redis => Arc::new(
            RedisSessionStore::connect(&config.store.url, store_config)
                .await
                .context("failed to connect to the session store")?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory session store; sessions are lost on restart and not shared between replicas");
            Arc::new(MemorySessionStore::new(store_config))
        }
    };

    Ok(store)
}

/// Key for the encrypted login cookie.
fn build_cookie_key(config: &GatewayConfig) -> Result<Key> {
    match config.cookies.secret {
        Some(ref secret) => Key::try_from(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("cookies.secret: {}", e)),
        None => {
            tracing::warn!("No cookie secret configured; generated a random key. Logins in flight will not survive a restart");
            Ok(Key::generate())
        }
    }
}
