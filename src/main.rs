//! # Passkey Probe
//!
//! Diagnostic CLI for a relying-party deployment. It runs the `*-start` half
//! of a ceremony and prints what a browser would receive, without touching
//! an authenticator and without ever calling a finish endpoint.
//!
//! ## Usage
//! ```bash
//! export PASSKEY_FUNCTIONS_URL=https://project.supabase.co/functions/v1
//! export PASSKEY_API_KEY=public-anon-key
//!
//! passkey-probe login
//! passkey-probe register --access-token "$ACCESS_TOKEN"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use passkey_ceremony::webauthn::types::ChallengeOptions;
use passkey_ceremony::webauthn::{authentication, registration};
use passkey_ceremony::{CeremonyKind, Codec, Config, RelyingParty, RelyingPartyClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Probe a passkey relying party's start endpoints
#[derive(Parser)]
#[command(name = "passkey-probe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call login-start and summarize the request options
    Login,

    /// Call register-start and summarize the creation options
    Register {
        /// Bearer token of a signed-in principal
        #[arg(long, env = "PASSKEY_ACCESS_TOKEN")]
        access_token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Default: info for dependencies, debug for the ceremony crate.
    // Override with RUST_LOG.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_ceremony=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing::info!(
        functions_url = %config.functions_url,
        encoding = ?config.wire_encoding,
        "configuration loaded"
    );

    let codec = Codec::new(config.wire_encoding);
    let locale = config.locale;
    let client = RelyingPartyClient::new(config)?;

    let (kind, token) = match &cli.command {
        Commands::Login => (CeremonyKind::Login, None),
        Commands::Register { access_token } => {
            (CeremonyKind::Registration, Some(access_token.as_str()))
        }
    };

    let started = match client.start(kind, token).await {
        Ok(started) => started,
        Err(err) => {
            eprintln!("{}", err.user_message(locale));
            return Err(err).context(format!("{kind}-start failed"));
        }
    };

    println!("{kind}-start OK");
    println!("  expected challenge: {} chars", started.expected_challenge.as_str().len());
    match &started.options {
        ChallengeOptions::Creation(options) => {
            let decoded = registration::creation_options_for_platform(&codec, options)?;
            println!("  challenge bytes:     {}", decoded.challenge.len());
            println!("  relying party:       {}", options.rp.name);
            println!("  user:                {}", options.user.name);
            let algorithms: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
            println!("  algorithms:          {algorithms:?}");
            println!("  excluded credentials: {}", decoded.exclude_credentials.len());
        }
        ChallengeOptions::Request(options) => {
            let decoded = authentication::request_options_for_platform(&codec, options)?;
            println!("  challenge bytes:     {}", decoded.challenge.len());
            println!("  allowed credentials: {}", decoded.allow_credentials.len());
            println!("  discoverable mode:   {}", options.is_discoverable());
            println!(
                "  user verification:   {}",
                options.user_verification.as_deref().unwrap_or("(default)")
            );
        }
    }

    Ok(())
}
