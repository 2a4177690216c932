use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use confab::client::ConfabClient;
use confab::config::{Config, FlatConfig};
use confab::http;
use confab::service::DiscussionService;
use confab::storage::FileStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tracing_layer = tracing_subscriber::fmt::layer();
    let filter = filter::Targets::new()
        .with_target("tower_http::trace::on_response", Level::DEBUG)
        .with_target("tower_http::trace::make_span", Level::DEBUG)
        .with_default(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_layer)
        .with(filter)
        .init();

    let config: Config = FlatConfig::parse().into();
    info!("{:?}", &config);

    let workdir = get_or_create_workdir_path(&config.db.workdir)?;
    let db_path = get_or_create_db_path(&workdir)?;

    let mut client = ConfabClient::new(FileStorage::new(db_path));
    client.init().await?;
    info!("discussion count: {}", client.get_discussion_count());

    let service = DiscussionService::new(client);
    http::serve(config, service).await
}

fn get_or_create_workdir_path(workdir: &str) -> anyhow::Result<PathBuf> {
    let workdir = Path::new(workdir).to_path_buf();
    if !workdir.exists() {
        std::fs::create_dir_all(&workdir)?;
    }
    if !workdir.is_dir() {
        anyhow::bail!("workdir is not a directory");
    }
    let workdir = workdir.canonicalize()?;
    info!("workdir: {}", workdir.display());
    Ok(workdir)
}

fn get_or_create_db_path(workdir: &Path) -> anyhow::Result<PathBuf> {
    let db_path = workdir.join("confab.db.json");
    if db_path.exists() && !db_path.is_file() {
        anyhow::bail!("db_path is not a file");
    }
    if !db_path.exists() {
        std::fs::write(&db_path, "")?;
    }
    info!("db_path: {}", db_path.display());
    Ok(db_path)
}
