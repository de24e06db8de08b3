use eyre::Context;
use std::io::IsTerminal;
use threads_client::config::{ClientConfig, Credentials};
use threads_client::credentials::{DEFAULT_ACCOUNT, InMemoryCredentialStore};
use threads_client::oauth::LoginOptions;
use threads_client::setup_client;
use threads_client::threads_api::{ListOptions, MediaSpec};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let credentials = Credentials::from_env().context("read app credentials")?;
    let config = ClientConfig::from_env().context("read client configuration")?;
    // nothing is persisted, so every run goes through the browser login
    let store = InMemoryCredentialStore::new();

    let client = setup_client(
        &store,
        DEFAULT_ACCOUNT,
        credentials,
        config,
        LoginOptions::default(),
    )
    .await
    .context("set up Threads client")?;

    // cancel in-flight work on ^C
    let cancel = client.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let me = client.get_me().await.context("fetch profile")?;
    eprintln!("==> @{} ({})", me.username.as_deref().unwrap_or("?"), me.id);

    let limit = client.publishing_limit().await.context("fetch quota")?;
    eprintln!(
        "quota    : {}/{} used, {} left",
        limit.quota_usage,
        limit.config.quota_total,
        limit.remaining()
    );

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        let post = client
            .create_and_publish(&MediaSpec::text(text), client.config().poll)
            .await
            .context("publish post")?;
        eprintln!("published: {}", post.id);
    }

    let mut recent = client
        .list_user_posts(&me.id, ListOptions::default().with_limit(5))
        .context("list posts")?;
    let page = recent.next_page().await.context("fetch recent posts")?;
    for post in page.items {
        eprintln!(
            "recent   : {} {}",
            post.timestamp.as_deref().unwrap_or("-"),
            post.text.as_deref().unwrap_or("<no text>")
        );
    }

    Ok(())
}
