use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use reqwest::multipart;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face recognition CLI")]
struct Cli {
    /// Base URL of the facegated HTTP API
    #[arg(long, env = "FACEGATE_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize the faces in an image file
    Recognize {
        /// Probe image (jpg or png)
        image: PathBuf,
    },
    /// Add a reference face for an identity
    Add {
        /// Identity label (becomes the reference file name)
        #[arg(short, long)]
        name: String,
        /// Reference image (jpg, jpeg or png)
        file: PathBuf,
    },
    /// Show the recognition event log
    History,
    /// List identities in the reference store
    People,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let response: Value = match cli.command {
        Commands::Recognize { image } => {
            let body = serde_json::json!({ "image": data_url(&image)? });
            tracing::debug!(path = %image.display(), "sending probe");
            client
                .post(format!("{base}/api/recognize"))
                .json(&body)
                .send()
                .await?
                .json()
                .await?
        }
        Commands::Add { name, file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("upload")
                .to_string();
            let form = multipart::Form::new()
                .text("name", name)
                .part("file", multipart::Part::bytes(bytes).file_name(file_name));
            client
                .post(format!("{base}/api/add_person"))
                .multipart(form)
                .send()
                .await?
                .json()
                .await?
        }
        Commands::History => {
            let log: Value = client.get(format!("{base}/api/history")).send().await?.json().await?;
            if let Some(lines) = log["log"].as_array() {
                for line in lines.iter().filter_map(Value::as_str) {
                    print!("{line}");
                }
                return Ok(());
            }
            log
        }
        Commands::People => client.get(format!("{base}/api/people")).send().await?.json().await?,
        Commands::Status => client.get(format!("{base}/api/status")).send().await?.json().await?,
    };

    if let Some(err) = response.get("error").and_then(Value::as_str) {
        bail!("facegated: {err}");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Encode an image file as a `data:<mime>;base64,` URL.
fn data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn test_data_url_has_header_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let url = data_url(&path).unwrap();
        let (header, payload) = url.split_once(',').unwrap();
        assert_eq!(header, "data:image/png;base64");
        assert_eq!(STANDARD.decode(payload).unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_cli_parses_add() {
        let cli = Cli::try_parse_from(["facegate", "add", "--name", "alice", "alice.jpg"]).unwrap();
        assert_eq!(cli.server, "http://127.0.0.1:8000");
        match cli.command {
            Commands::Add { name, file } => {
                assert_eq!(name, "alice");
                assert_eq!(file, PathBuf::from("alice.jpg"));
            }
            _ => panic!("expected add"),
        }
    }
}
