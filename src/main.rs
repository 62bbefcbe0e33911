use facegate::{
    common::{Config, Paths},
    core::EmbeddingKey,
    credentials::{CredentialIssuer, HmacCredentialIssuer},
    encoder::ImageInput,
    service::ServiceClient,
    storage::{Account, AccountDirectory, AccountStatus, FileAccountStore, FileTemplateStore, TemplateStore},
    Identity,
};

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face enrollment and 1:N face login")]
struct Cli {
    /// Enable development mode (state under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Use the system-wide configuration
    #[arg(long, global = true)]
    system: bool,

    /// Config file to load instead of the run mode's default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh random 32-byte key, base64 encoded
    Keygen,
    /// Manage the local account store
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Issue an access token for an account (needs the token secret)
    IssueToken {
        identity: String,
    },
    /// Enroll the signed-in user's face from 1 to 5 photos
    Enroll {
        /// Access token of the user being enrolled
        #[arg(short, long, env = "FACEGATE_ACCESS_TOKEN")]
        token: String,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Log in with a single photo
    Login {
        image: PathBuf,
    },
    /// List stored templates (metadata only)
    Templates,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create or replace an account
    Add {
        identity: String,
        #[arg(short, long, default_value = "active")]
        status: String,
    },
    /// Show one account
    Show {
        identity: String,
    },
    /// List all accounts
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let paths = Paths::new(cli.dev, cli.system)?;
    let config = Config::resolve(&paths, cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen => {
            println!("{}", EmbeddingKey::generate().to_base64());
        }
        Commands::Account { command } => run_account(command, &config)?,
        Commands::IssueToken { identity } => {
            let identity = Identity::new(identity)?;
            let accounts = FileAccountStore::new(config.storage.accounts_file.clone());
            match accounts.find(&identity)? {
                Some(account) if account.is_active() => {}
                Some(_) => bail!("Account {} is not active", identity),
                None => bail!("No account named {}", identity),
            }
            let issuer = HmacCredentialIssuer::from_config(&config.credentials)?;
            println!("{}", issuer.issue(&identity)?.access_token);
        }
        Commands::Enroll { token, images } => {
            if images.len() > config.enrollment.max_images {
                bail!("At most {} images may be enrolled at once", config.enrollment.max_images);
            }
            let images = images
                .iter()
                .map(|path| ImageInput::from_path(path))
                .collect::<facegate::Result<Vec<_>>>()?;

            let resp = ServiceClient::new(&config.service).enroll(&token, images)?;
            if !resp.success {
                bail!("Enrollment failed: {}", resp.message);
            }
            println!("✅ {}", resp.message);
            if let (Some(quality), Some(model)) = (resp.quality, resp.model_version) {
                println!("   quality {:.3}, model {}", quality, model);
            }
        }
        Commands::Login { image } => {
            let image = ImageInput::from_path(&image)?;
            let resp = ServiceClient::new(&config.service).authenticate(image)?;
            if !resp.success {
                bail!("Login failed: {}", resp.message);
            }
            println!("✅ Logged in as {}", resp.identity.unwrap_or_default());
            if let Some(score) = resp.score {
                println!("   score {:.4}", score);
            }
            if let Some(credentials) = resp.credentials {
                println!("access_token={}", credentials.access_token);
                println!("refresh_token={}", credentials.refresh_token);
                println!("expires_in={}", credentials.expires_in);
            }
        }
        Commands::Templates => {
            let store = FileTemplateStore::new(config.storage.templates_dir.clone())?;
            let templates = store.all()?;
            if templates.is_empty() {
                println!("No templates enrolled");
            }
            for template in templates {
                let enrolled = format_millis(template.enrolled_at)
                    .unwrap_or_else(|| template.enrolled_at.to_string());
                println!(
                    "{:<24} model {:<24} quality {:.3} enrolled {}",
                    template.identity, template.model_version, template.quality_score, enrolled
                );
            }
        }
    }

    Ok(())
}

fn run_account(command: AccountCommands, config: &Config) -> Result<()> {
    let store = FileAccountStore::new(config.storage.accounts_file.clone());

    match command {
        AccountCommands::Add { identity, status } => {
            let status: AccountStatus = status.parse()?;
            let identity = Identity::new(identity)?;
            store.set_status(&identity, status)?;
            println!("Saved account {} ({:?})", identity, status);
        }
        AccountCommands::Show { identity } => {
            let identity = Identity::new(identity)?;
            match store.find(&identity)? {
                Some(account) => print_account(&account),
                None => bail!("No account named {}", identity),
            }
        }
        AccountCommands::List => {
            for account in store.list()? {
                print_account(&account);
            }
        }
    }

    Ok(())
}

fn print_account(account: &Account) {
    let last_login = account
        .last_login_at
        .and_then(format_millis)
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{:<24} {:?} enrolled={} last_login={}",
        account.identity, account.status, account.face_enrolled, last_login
    );
}

fn format_millis(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis).single().map(|at| at.to_rfc3339())
}

fn setup_logging(dev_mode: bool) {
    let default_level = if dev_mode { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if dev_mode {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}
