use anyhow::{Context, Result, bail};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shadowsync::SyncConfig;
use shadowsync::repository::{Database, LocalRepository};
use shadowsync::sync::Synchronizer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let repo_path = args.next().unwrap_or_else(|| ".".to_string());
    let db_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => default_db_path(Path::new(&repo_path))?,
    };
    info!(path = %db_path.display(), "using shadow database");

    let repo = LocalRepository::open(&repo_path)
        .await
        .with_context(|| format!("Could not open repository: {}", repo_path))?;

    // Connect to database
    let db_path_str = db_path.to_str().context("Invalid path encoding")?;
    let db = Database::new(db_path_str).await?;
    db.init_schema().await?;

    // Progress bars on unless SHADOWSYNC_PROGRESS says otherwise
    let config = SyncConfig::default().with_progress(true).with_env();
    let sync = Synchronizer::new(Arc::new(repo), &db, config);

    let summary = sync.sync().await?;
    eprintln!("{summary}");

    let report = sync.verify().await?;
    eprintln!("{report}");
    if !report.consistent {
        bail!("shadow database does not match the repository");
    }

    Ok(())
}

/// `<cache_dir>/shadowsync/<repo-name>_<hash>.db`, unique per repository path
fn default_db_path(repo_path: &Path) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("shadowsync");
    fs::create_dir_all(&cache_dir)?;

    let abs_repo_path = fs::canonicalize(repo_path)
        .with_context(|| format!("Could not resolve path: {}", repo_path.display()))?;
    let repo_name = abs_repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo");
    let mut hasher = DefaultHasher::new();
    abs_repo_path.hash(&mut hasher);
    let hash = hasher.finish();
    Ok(cache_dir.join(format!("{}_{:016x}.db", repo_name, hash)))
}
