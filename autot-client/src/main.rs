use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use autot_client::model::Credentials;
use autot_client::{ApiPayload, AutotClient, ClientConfig, ProgressState};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Target};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "autot", about = "autot media library client", version)]
struct Cli {
    /// Server root; overrides AUTOT_SERVER_URL and the derived API/auth URLs
    #[arg(long, global = true)]
    server: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange credentials for a session
    Login {
        #[arg(long)]
        username: String,
        /// Falls back to AUTOT_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show session and endpoint information
    Status,
    Get {
        path: String,
    },
    Delete {
        path: String,
    },
    Post {
        path: String,
        /// JSON request body
        body: String,
    },
    Put {
        path: String,
        body: String,
    },
    Patch {
        path: String,
        body: String,
    },
    /// Download a media image resolved against the server root
    Image {
        path: String,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Show pending background jobs
    Progress {
        /// Keep polling until all jobs have finished
        #[arg(long)]
        watch: bool,
    },
}

fn init_logger() {
    Builder::new()
        .target(Target::Stdout)
        .filter_level(LevelFilter::Warn)
        .filter_module("autot_client", LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    let config = match &cli.server {
        Some(server) => {
            let mut config = ClientConfig::from_environment()?;
            let derived = ClientConfig::for_server(server)?;
            config.server_origin = derived.server_origin;
            config.api_base = derived.api_base;
            config.auth_base = derived.auth_base;
            config
        }
        None => ClientConfig::from_environment()?,
    };

    let client = AutotClient::connect(config)
        .await
        .context("failed to initialise client")?;

    run(cli.command, client).await
}

async fn run(command: Command, client: AutotClient) -> Result<()> {
    let api = &client.api;
    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => std::env::var("AUTOT_PASSWORD")
                    .context("--password not given and AUTOT_PASSWORD is unset")?,
            };
            let credentials = Credentials::new(username, password);
            if let Err(e) = api.login(&credentials).await {
                bail!("{}", api.error().unwrap_or_else(|| e.to_string()));
            }
            println!("Logged in");
        }
        Command::Logout => {
            api.logout().await;
            println!("Logged out");
        }
        Command::Status => {
            let config = api.config();
            println!("api:       {}", config.api_base);
            println!("auth:      {}", config.auth_base);
            println!("logged in: {}", api.is_logged_in());
        }
        Command::Get { path } => print_payload(api.get(&path).await?)?,
        Command::Delete { path } => print_payload(api.del(&path).await?)?,
        Command::Post { path, body } => print_payload(api.post(&path, &parse_body(&body)?).await?)?,
        Command::Put { path, body } => print_payload(api.put(&path, &parse_body(&body)?).await?)?,
        Command::Patch { path, body } => {
            print_payload(api.patch(&path, &parse_body(&body)?).await?)?
        }
        Command::Image { path, output } => {
            let image = api.get_image(&path).await?;
            tokio::fs::write(&output, &image.bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Saved {} ({} bytes) to {}",
                image.content_type,
                image.bytes.len(),
                output.display()
            );
        }
        Command::Progress { watch } => {
            let poller = &client.progress;
            poller.check_now().await;
            print_progress(&poller.state());
            if !watch || !poller.state().has_pending_jobs() {
                return Ok(());
            }

            let mut updates = poller.subscribe();
            poller.start();
            while updates.changed().await.is_ok() {
                let state = *updates.borrow_and_update();
                print_progress(&state);
                if !state.has_pending_jobs() {
                    break;
                }
            }
            poller.stop();
        }
    }
    Ok(())
}

fn parse_body(body: &str) -> Result<serde_json::Value> {
    serde_json::from_str(body).context("request body is not valid JSON")
}

fn print_payload(payload: ApiPayload) -> Result<()> {
    match payload {
        ApiPayload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ApiPayload::Image(image) => println!(
            "<{} image, {} bytes>",
            image.content_type,
            image.bytes.len()
        ),
        ApiPayload::Empty => println!("ok"),
    }
    Ok(())
}

fn print_progress(state: &ProgressState) {
    println!(
        "pending jobs: {}{}",
        state.pending_jobs,
        if state.is_polling { " (polling)" } else { "" }
    );
}
