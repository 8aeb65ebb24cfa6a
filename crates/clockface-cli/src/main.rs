use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clockface_core::{codec, EmbeddingExtractor, OnnxModelLoader, DEFAULT_EMBEDDING_DIM, DEFAULT_THRESHOLD};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "clockface", about = "clockface attendance CLI")]
struct Cli {
    /// Daemon base URL (default: $CLOCKFACE_URL or http://127.0.0.1:3000)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Register an employee's face from an image file
    Enroll {
        /// Employee id
        #[arg(short, long)]
        employee: String,
        image: PathBuf,
    },
    /// Identify the face in an image file
    Identify { image: PathBuf },
    /// Clock in or out at the terminal
    Clock {
        /// Employee internal code (e.g. AEM123)
        #[arg(long, conflicts_with_all = ["id", "face"])]
        code: Option<String>,
        /// Employee id
        #[arg(long, conflicts_with = "face")]
        id: Option<String>,
        /// Identify the employee from this image instead
        #[arg(long)]
        face: Option<PathBuf>,
        /// Free-text observation stored with the record
        #[arg(long)]
        note: Option<String>,
    },
    /// Compute an embedding locally and print it as stored in the database
    Embed {
        image: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Compare the faces in two images locally
    Compare {
        first: PathBuf,
        second: PathBuf,
        /// Match threshold (exclusive)
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Directory containing the ONNX model files
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,
    #[arg(long, default_value = "det_10g.onnx")]
    detector: String,
    #[arg(long, default_value = "face_descriptor.onnx")]
    recognizer: String,
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    dim: usize,
    #[arg(long, default_value_t = 0.5)]
    min_confidence: f32,
}

impl ModelArgs {
    fn extractor(&self) -> EmbeddingExtractor<OnnxModelLoader> {
        let loader = OnnxModelLoader {
            detector_path: self.model_dir.join(&self.detector),
            recognizer_path: self.model_dir.join(&self.recognizer),
            min_confidence: self.min_confidence,
            dim: self.dim,
        };
        EmbeddingExtractor::new(loader, self.dim)
    }
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn new(server: Option<String>) -> Self {
        let base = server
            .or_else(|| std::env::var("CLOCKFACE_URL").ok())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .with_context(|| format!("cannot reach clockfaced at {}", self.base))?;
        read_json(response).await
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("cannot reach clockfaced at {}", self.base))?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.context("daemon sent a non-JSON response")?;
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("request failed");
        bail!("{message} ({status})");
    }
    Ok(body)
}

fn image_part(path: &Path) -> Result<Part> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

fn extract(extractor: &EmbeddingExtractor<OnnxModelLoader>, path: &Path) -> Result<clockface_core::Embedding> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    extractor
        .extract(&bytes)
        .with_context(|| format!("extracting face from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(cli.server);

    match cli.command {
        Commands::Status => {
            let health = client.get("/api/health").await?;
            println!("clockfaced {} at {}", health["version"].as_str().unwrap_or("?"), client.base);
            println!("  status:        {}", health["status"].as_str().unwrap_or("unknown"));
            println!("  models loaded: {}", health["models_loaded"]);
        }
        Commands::Enroll { employee, image } => {
            let form = Form::new().part("image", image_part(&image)?);
            let body = client
                .post_form(&format!("/api/employees/{employee}/face"), form)
                .await?;
            println!("Face registered for {employee} ({} dimensions)", body["dimensions"]);
        }
        Commands::Identify { image } => {
            let form = Form::new().part("image", image_part(&image)?);
            let body = client.post_form("/api/face/identify", form).await?;
            match body["result"].as_str() {
                Some("identified") => println!(
                    "Identified {} (distance {:.4})",
                    body["employee_id"].as_str().unwrap_or("?"),
                    body["distance"].as_f64().unwrap_or(f64::NAN)
                ),
                _ => println!("No enrolled employee matched"),
            }
        }
        Commands::Clock { code, id, face, note } => {
            let mut form = Form::new();
            form = match (code, id, face) {
                (Some(code), _, _) => form.text("employee_code", code).text("auth_method", "code"),
                (None, Some(id), _) => form.text("employee_id", id).text("auth_method", "id"),
                (None, None, Some(image)) => form
                    .text("auth_method", "face")
                    .part("image", image_part(&image)?),
                (None, None, None) => bail!("one of --code, --id or --face is required"),
            };
            if let Some(note) = note {
                form = form.text("observations", note);
            }
            let body = client.post_form("/api/attendance/register", form).await?;
            println!("{}", body["message"].as_str().unwrap_or("Registered"));
        }
        Commands::Embed { image, model } => {
            let extractor = model.extractor();
            let embedding = extract(&extractor, &image)?;
            println!("{}", codec::encode(&embedding));
        }
        Commands::Compare {
            first,
            second,
            threshold,
            model,
        } => {
            let extractor = model.extractor();
            let a = extract(&extractor, &first)?;
            let b = extract(&extractor, &second)?;
            let distance = a.distance(&b)?;
            let verdict = if distance < threshold { "same person" } else { "different people" };
            println!("distance {distance:.4} (threshold {threshold}): {verdict}");
        }
    }

    Ok(())
}
