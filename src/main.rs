//! resilient-sftp command line
//!
//! Connection settings come from the `SFTP_*` environment variables; flags
//! override them. The password is only read from `SFTP_PASSWORD`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::error;

use resilient_sftp::{init_logging, SftpConfig, SftpError, SshSessionFactory, SshSftpClient};

/// SFTP client that reconnects in the background
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Remote host (overrides SFTP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// SSH port (overrides SFTP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Username (overrides SFTP_USER)
    #[arg(long)]
    user: Option<String>,

    /// Pinned host key "<key-type> <base64>" (overrides SFTP_TRUSTED_HOST_KEY)
    #[arg(long, value_name = "KEY")]
    trusted_host_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a remote directory
    Ls { dir: String },
    /// List every file under a remote directory
    Walk { dir: String },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
    /// Write a string to a remote file
    PutString { text: String, remote: String },
    /// Rename a remote file
    Mv { src: String, dst: String },
    /// Delete a remote file
    Rm { path: String },
    /// Print a remote file
    Cat { path: String },
}

impl Args {
    fn config(&self) -> SftpConfig {
        let mut config = SftpConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(key) = &self.trusted_host_key {
            config.trusted_host_key = Some(key.clone());
        }
        config
    }
}

async fn run(client: &SshSftpClient, command: Command) -> Result<(), SftpError> {
    match command {
        Command::Ls { dir } => {
            for entry in client.files(&dir).await? {
                println!(
                    "{} {:>10} {}",
                    entry.permissions,
                    entry.size,
                    if entry.is_dir() {
                        format!("{}/", entry.name)
                    } else {
                        entry.name
                    }
                );
            }
        }
        Command::Walk { dir } => match client.walk_files(&dir).await {
            Ok(files) => files.iter().for_each(|f| println!("{}", f)),
            Err(e) => {
                e.partial.iter().for_each(|f| println!("{}", f));
                return Err(e.source);
            }
        },
        Command::Put { local, remote } => {
            let bytes = client.put_file(&local, &remote).await?;
            println!("{} bytes", bytes);
        }
        Command::PutString { text, remote } => client.put_string(&text, &remote).await?,
        Command::Mv { src, dst } => client.move_file(&src, &dst).await?,
        Command::Rm { path } => client.remove_file(&path).await?,
        Command::Cat { path } => {
            let label = path.clone();
            let text = client
                .get_records(&path, |mut file| async move {
                    let mut text = String::new();
                    file.read_to_string(&mut text)
                        .await
                        .map_err(|e| SftpError::parse(label, e.to_string()))?;
                    Ok::<_, SftpError>(text)
                })
                .await?;
            print!("{}", text);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();
    let config = args.config();

    let client = match SshSftpClient::connect(SshSessionFactory::new(config)).await {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to connect: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&client, args.command).await;
    let _ = client.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
