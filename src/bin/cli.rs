// Adept Core - Adobe Digital Editions DRM Lifecycle Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use adept_core::drm::{DecryptOutcome, Decryptor, PdfPatcher};
use adept_core::worker::{spawn_authorize, spawn_decrypt, spawn_fulfill};
use adept_core::{
    AdeVersion, AdeptError, AuthConfig, AuthorizeRequest, ConfigStore, Credentials, HttpTransport,
    ProgressEvent, Reporter,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "adept-cli")]
#[command(about = "ADE DRM lifecycle tool: authorize, fulfill, decrypt", long_about = None)]
struct Cli {
    /// Config directory (defaults to ~/.deacsm)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Emit progress as JSON lines instead of plain text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize an Adobe account (or this device anonymously)
    Authorize {
        /// Adobe ID email
        #[arg(short, long)]
        email: Option<String>,
        /// Adobe ID password
        #[arg(short, long)]
        password: Option<String>,
        /// Authorize anonymously instead of with an Adobe ID
        #[arg(long)]
        anonymous: bool,
        /// ADE protocol version: 2.0 or 3.0
        #[arg(long, default_value = "3.0")]
        ade_version: String,
    },
    /// Fulfill an ACSM ticket into an EPUB or PDF
    Fulfill {
        /// Path to the .acsm file
        acsm: PathBuf,
        /// Directory for the fulfilled file (defaults to the config dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Decrypt a fulfilled container with the exported account key
    Decrypt {
        /// Encrypted input file
        input: PathBuf,
        /// Destination for the DRM-free copy
        output: PathBuf,
    },
    /// Show authorization status
    Status,
    /// Delete all device and account state
    Reset {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
}

/// PDF patching is an external capability; this build has none wired in.
struct UnavailablePatcher;

impl PdfPatcher for UnavailablePatcher {
    fn patch(
        &self,
        _input: &Path,
        _rights_xml: &str,
        _output: &Path,
        _resource: &str,
    ) -> adept_core::Result<()> {
        Err(AdeptError::pdf_patch(
            "no PDF patcher is configured in this build",
        ))
    }
}

/// Content decryption is an external capability; this build has none.
struct UnavailableDecryptor;

impl Decryptor for UnavailableDecryptor {
    fn decrypt(
        &self,
        _key: &[u8],
        _input: &Path,
        _output: &Path,
    ) -> adept_core::Result<DecryptOutcome> {
        Err(AdeptError::invalid_input(
            "no content decryptor is configured in this build",
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(match &cli.config_dir {
        Some(dir) => ConfigStore::new(dir.clone()),
        None => ConfigStore::open_default(),
    });

    match cli.command {
        Commands::Authorize {
            email,
            password,
            anonymous,
            ade_version,
        } => {
            let version = parse_version(&ade_version)?;
            let request = if anonymous {
                AuthorizeRequest::anonymous(version)
            } else {
                let email = email.context("provide --email or use --anonymous")?;
                let password = password.context("provide --password")?;
                AuthorizeRequest::adobe_id(Credentials::new(email, password), version)
            };

            let transport = Arc::new(HttpTransport::with_defaults()?);
            let (reporter, rx) = Reporter::channel();
            let printer = spawn_printer(rx, cli.json);
            let handle = spawn_authorize(store, transport, AuthConfig::default(), request, reporter)?;

            let result = handle.await?;
            printer.await?;
            result?;
        }
        Commands::Fulfill { acsm, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| store.base().to_path_buf());
            let transport = Arc::new(HttpTransport::with_defaults()?);
            let (reporter, rx) = Reporter::channel();
            let printer = spawn_printer(rx, cli.json);
            let handle = spawn_fulfill(
                store,
                transport,
                Arc::new(UnavailablePatcher),
                acsm,
                output_dir,
                reporter,
            )?;

            let result = handle.await?;
            printer.await?;
            result?;
        }
        Commands::Decrypt { input, output } => {
            let (reporter, rx) = Reporter::channel();
            let printer = spawn_printer(rx, cli.json);
            let handle = spawn_decrypt(
                store,
                Arc::new(UnavailableDecryptor),
                input,
                output,
                reporter,
            )?;

            let result = handle.await?;
            printer.await?;
            result?;
        }
        Commands::Status => {
            println!("Config directory: {}", store.base().display());
            if store.is_authorized() {
                println!("Authorized: {}", store.account_key_path().display());
            } else {
                println!("Not authorized. Run `adept-cli authorize` first.");
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes all device and account state; re-run with --yes");
            }
            store.reset().await?;
            println!("Device and account state removed.");
        }
    }

    Ok(())
}

fn parse_version(raw: &str) -> anyhow::Result<AdeVersion> {
    match raw {
        "2.0" | "2" => Ok(AdeVersion::Ade20),
        "3.0" | "3" => Ok(AdeVersion::Ade30),
        other => bail!("unknown ADE version '{}'; expected 2.0 or 3.0", other),
    }
}

/// Print progress events until the stream closes
fn spawn_printer(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
    json: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Error: failed to encode event: {}", e),
                }
                continue;
            }
            match event {
                ProgressEvent::Status { message } => println!("{}", message),
                ProgressEvent::Finished { success, message } => {
                    if success {
                        println!("{}", message);
                    } else {
                        eprintln!("Error: {}", message);
                    }
                }
            }
        }
    })
}
