use facegate::{
    common::{Config, Paths},
    core::{EmbeddingCipher, EmbeddingKey},
    credentials::HmacCredentialIssuer,
    encoder::SocketFaceEncoder,
    service::FaceGateServer,
    storage::{FileAccountStore, FileTemplateStore},
    workflow::{AuditSink, JsonLinesAuditSink, TracingAuditSink},
};
use anyhow::Context as _;
use clap::Parser;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facegate-service")]
#[command(about = "Face enrollment and login service")]
struct Args {
    /// Run in development mode (state under ./dev_data)
    #[arg(long)]
    dev: bool,

    /// Config file to load instead of the run mode's default
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.dev { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!("Starting facegate service (dev_mode: {})", args.dev);

    let paths = Paths::new(args.dev, !args.dev)?;
    let config = Config::resolve(&paths, args.config.as_deref())?;

    // Fail closed: without both secrets nothing can be sealed, opened or issued.
    let key = EmbeddingKey::from_env(&config.crypto.key_env)
        .context("Embedding key is not configured")?;
    let cipher = EmbeddingCipher::new(&key)?;
    let issuer = HmacCredentialIssuer::from_config(&config.credentials)
        .context("Token secret is not configured")?;

    let templates = FileTemplateStore::new(config.storage.templates_dir.clone())?;
    let accounts = FileAccountStore::new(config.storage.accounts_file.clone());
    let encoder = SocketFaceEncoder::from_config(&config.encoder);
    tracing::info!("Using face encoder at {}", encoder.socket_path().display());

    let audit: Box<dyn AuditSink> = match &config.storage.audit_log {
        Some(path) => Box::new(JsonLinesAuditSink::new(path.clone())),
        None => Box::new(TracingAuditSink),
    };

    let socket_path = config.service.socket_path.clone();
    if socket_path.exists() {
        fs::remove_file(&socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&socket_path).context("Failed to bind Unix socket")?;

    // Any local user may attempt a login; enrollment is gated by access token.
    fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o666))?;
    tracing::info!("Listening on {}", socket_path.display());

    let server = FaceGateServer::new(
        config,
        Box::new(encoder),
        cipher,
        Box::new(templates),
        Box::new(accounts),
        issuer,
    )
    .with_audit(audit);

    server.serve(&listener);
    Ok(())
}
