use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facerec_store::FaceStore;
use reqwest::multipart::{Form, Part};

#[derive(Parser)]
#[command(name = "facerec", about = "facerec face registration and recognition CLI")]
struct Cli {
    /// Base URL of the facerecd server
    #[arg(long, global = true, env = "FACEREC_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the face in an image under a name
    Register {
        /// Name to store the face under
        #[arg(short, long)]
        name: String,
        /// Image file containing one face
        image: PathBuf,
    },
    /// Recognize the face in an image
    Recognize {
        /// Image file containing one face
        image: PathBuf,
    },
    /// List registered faces, reading the database directly
    List {
        /// Path to the face database
        #[arg(long, env = "FACEREC_DB_PATH")]
        db: Option<PathBuf>,
    },
}

async fn image_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Part::bytes(bytes).file_name(filename))
}

/// POST a multipart form and print the JSON reply; non-2xx replies are errors.
async fn submit(url: &str, form: Form) -> Result<()> {
    let response = reqwest::Client::new()
        .post(url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("contacting {url}"))?;

    let status = response.status();
    let text = response.text().await.context("reading server reply")?;
    tracing::debug!(%status, body = %text, "server replied");

    if !status.is_success() {
        anyhow::bail!("{status}: {}", error_message(&text));
    }
    let body: serde_json::Value = serde_json::from_str(&text).context("decoding server reply")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// The `message` of a JSON error reply, or the raw body when it is not one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| match body.trim() {
            "" => "no response body".to_string(),
            raw => raw.to_string(),
        })
}

async fn list(db: Option<PathBuf>) -> Result<()> {
    let path = db.unwrap_or_else(|| facerec_core::default_data_dir().join("faces.db"));
    let store = FaceStore::open_existing(&path).await?;

    let session = store.session().await?;
    let count = session.count().await;
    let records = session.load_all().await;
    session.close().await?;
    let (count, records) = (count?, records?);

    if count == 0 {
        println!("No faces registered");
        return Ok(());
    }
    println!("{count} face(s) registered in {}", path.display());
    for record in records {
        println!(
            "{:>5}  {:<24} dim={:<4} {}",
            record.id,
            record.name,
            record.embedding.dim(),
            record.created_at.to_rfc3339()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Register { name, image } => {
            let form = Form::new().text("name", name).part("file", image_part(&image).await?);
            submit(&format!("{base}/register"), form).await
        }
        Commands::Recognize { image } => {
            let form = Form::new().part("file", image_part(&image).await?);
            submit(&format!("{base}/recognize"), form).await
        }
        Commands::List { db } => list(db).await,
    }
}
