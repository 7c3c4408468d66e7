//! CLI binary for lesson-bundler.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! onto `ServiceConfig`, calls one `LessonService` operation per subcommand,
//! and runs the job worker.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lesson_bundler::pipeline::script::credential_env_var;
use lesson_bundler::{
    JobProgressCallback, JobState, JobStatus, JobWorker, LessonPipeline, LessonService,
    ProgressCallback, S3Config, ServiceConfig, Stage, StorageConfig,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner for the worker: shows the latest stage of any running job and
/// prints one line per finished job. Jobs finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Worker");
        bar.set_message("waiting for jobs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, job_id: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(job_id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let done = self.done.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} jobs completed", green("✔"), bold(&done.to_string()));
        } else {
            eprintln!(
                "{} {} jobs completed  ({} failed)",
                cyan("⚠"),
                bold(&done.to_string()),
                red(&failed.to_string())
            );
        }
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(job_id.to_string(), Instant::now());
        }
        self.bar.set_prefix("Running");
    }

    fn on_stage(&self, job_id: &str, stage: Stage) {
        self.bar.set_message(format!("{}  {}", dim(job_id), stage));
    }

    fn on_job_complete(&self, job_id: &str, bundle_key: &str) {
        let secs = self.elapsed_secs(job_id);
        self.done.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            job_id,
            dim(bundle_key),
            dim(&format!("{secs:.1}s"))
        ));
    }

    fn on_job_failed(&self, job_id: &str, error: &str) {
        let secs = self.elapsed_secs(job_id);
        self.failed.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            job_id,
            red(&msg),
            dim(&format!("{secs:.1}s"))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store a document and note its id
  lessonctl upload chapter.pdf

  # Request a lesson for pages 2-4
  lessonctl submit 3f2a9c... --from 2 --to 4

  # Run the worker until ctrl-c (or drain the queue once)
  lessonctl work
  lessonctl work --once

  # Check and fetch the result
  lessonctl status 8b1e0d...
  lessonctl download 8b1e0d... -o lesson.zip

  # Use an S3 bucket instead of ./data
  STORAGE_BACKEND=s3 S3_BUCKET=my-bucket lessonctl list

ENVIRONMENT VARIABLES:
  STORAGE_BACKEND         local (default) or s3
  LOCAL_STORAGE_DIR       Root of the local store (default ./data)
  S3_BUCKET, S3_REGION    Bucket settings for the s3 backend
  S3_PREFIX               Key prefix inside the bucket (default audio-lessons/)
  S3_ENDPOINT             Custom endpoint for S3-compatible services
  AWS_ACCESS_KEY_ID       S3 credentials
  AWS_SECRET_ACCESS_KEY
  OPENAI_API_KEY          Worker credential for --provider openai (default);
                          ANTHROPIC_API_KEY, GEMINI_API_KEY, OPENROUTER_API_KEY
                          for the other providers
  OPENAI_MODEL            Model ID (default gpt-4o-mini)
  LLM_SYSTEM_PROMPT       Override the lesson system prompt
  PDFIUM_LIB_PATH         Directory containing libpdfium for fallback extraction
"#;

/// Turn PDF page ranges into narrated lesson bundles.
#[derive(Parser, Debug)]
#[command(
    name = "lessonctl",
    version,
    about = "Turn PDF page ranges into narrated lesson bundles",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Storage backend.
    #[arg(long, global = true, env = "STORAGE_BACKEND", value_enum, default_value = "local")]
    storage: BackendArg,

    /// Root directory of the local backend.
    #[arg(long, global = true, env = "LOCAL_STORAGE_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Directory holding job records.
    #[arg(long, global = true, env = "JOB_STATE_DIR", default_value = "./data/job-state")]
    job_dir: PathBuf,

    /// S3 bucket name.
    #[arg(long, global = true, env = "S3_BUCKET")]
    s3_bucket: Option<String>,

    /// S3 region.
    #[arg(long, global = true, env = "S3_REGION")]
    s3_region: Option<String>,

    /// Key prefix inside the bucket.
    #[arg(long, global = true, env = "S3_PREFIX", default_value = "audio-lessons/")]
    s3_prefix: String,

    /// Custom S3 endpoint (MinIO, LocalStack, …).
    #[arg(long, global = true, env = "S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_access_key_id: Option<String>,

    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_access_key: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LESSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LESSON_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    Local,
    S3,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a PDF and print its document id.
    Upload {
        file: PathBuf,
    },

    /// List stored documents.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show the page count of a stored document.
    Info {
        document_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Queue a lesson job for a page range.
    Submit {
        document_id: String,
        /// First page (1-indexed, inclusive).
        #[arg(long = "from")]
        from_page: u32,
        /// Last page (inclusive).
        #[arg(long = "to")]
        to_page: u32,
    },

    /// Show the state of a job.
    Status {
        job_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Save a finished job's bundle.
    Download {
        job_id: String,
        /// Destination file. Default: lesson-<job_id>.zip
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run pending jobs.
    Work(WorkArgs),
}

#[derive(clap::Args, Debug)]
struct WorkArgs {
    /// Drain the current queue and exit instead of polling.
    #[arg(long)]
    once: bool,

    /// Jobs run concurrently.
    #[arg(short, long, env = "WORKER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Idle poll interval in milliseconds.
    #[arg(long, env = "WORKER_POLL_MS", default_value_t = 2000)]
    poll_ms: u64,

    /// Provider API key. Default: the provider's key variable
    /// (OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, OPENROUTER_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// LLM provider name.
    #[arg(long, env = "LLM_PROVIDER", default_value = "openai")]
    provider: String,

    /// Replacement system prompt text.
    #[arg(long, env = "LLM_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "LLM_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Minimum characters from the text layer before pdfium is tried.
    #[arg(long, env = "MIN_TEXT_CHARS", default_value_t = 50)]
    min_text_chars: usize,

    /// Directory containing libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Document download timeout in seconds.
    #[arg(long, env = "DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress =
        matches!(&cli.command, Command::Work(w) if !w.no_progress) && !cli.quiet && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let service = LessonService::from_config(&config).context("Failed to open storage")?;

    match &cli.command {
        Command::Upload { file } => {
            let mut reader = tokio::fs::File::open(file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let doc = service
                .upload_document(&mut reader, Some("application/pdf"))
                .await
                .context("Upload failed")?;
            println!("{}", doc.document_id);
            if !cli.quiet {
                eprintln!("{} stored as {}", green("✔"), bold(&doc.document_key));
            }
        }

        Command::List { json } => {
            let docs = service.list_documents().await.context("Listing failed")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else {
                for doc in docs {
                    println!("{}  {}", doc.document_id, dim(&doc.document_key));
                }
            }
        }

        Command::Info { document_id, json } => {
            let info = service
                .document_info(document_id)
                .await
                .context("Failed to inspect document")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Document:  {}", info.document_id);
                println!("Key:       {}", info.document_key);
                println!("Pages:     {}", info.page_count);
            }
        }

        Command::Submit {
            document_id,
            from_page,
            to_page,
        } => {
            let status = service
                .submit_job(document_id, *from_page, *to_page)
                .await
                .context("Submit failed")?;
            println!("{}", status.job_id);
        }

        Command::Status { job_id, json } => {
            let status = service.job_status(job_id).await.context("Status failed")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Command::Download { job_id, output } => {
            let location = service
                .bundle_location(job_id)
                .await
                .context("Download failed")?;
            let dest = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(location.suggested_file_name()));
            let bytes = service
                .download_bundle(job_id, &dest)
                .await
                .context("Download failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} bytes  →  {}",
                    green("✔"),
                    bytes,
                    bold(&dest.display().to_string())
                );
            }
        }

        Command::Work(args) => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut pipeline = LessonPipeline::from_config(&config, Arc::clone(service.storage()))
                .context("Cannot start worker")?;
            if let Some(cb) = &progress {
                pipeline = pipeline.with_progress(Arc::clone(cb) as ProgressCallback);
            }
            let worker = JobWorker::new(Arc::clone(service.jobs()), pipeline, &config);

            if args.once {
                let summary = worker.run_once().await.context("Worker failed")?;
                if progress.is_none() && !cli.quiet {
                    eprintln!(
                        "Processed {} jobs ({} failed)",
                        summary.processed(),
                        summary.failed
                    );
                }
            } else {
                worker
                    .run_until(async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await
                    .context("Worker failed")?;
            }
            if let Some(cb) = &progress {
                cb.finish();
            }
        }
    }

    Ok(())
}

fn print_status(status: &JobStatus) {
    let state = match status.state {
        JobState::Succeeded => green(status.state.as_str()),
        JobState::Failed => red(status.state.as_str()),
        _ => cyan(status.state.as_str()),
    };
    println!("Job:     {}", status.job_id);
    println!("State:   {}", state);
    if let Some(result) = &status.result {
        println!("Bundle:  {}", result.bundle_key);
    }
    if let Some(error) = &status.error {
        println!("Error:   {}", error);
    }
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let storage = match cli.storage {
        BackendArg::Local => StorageConfig::Local {
            root: cli.data_dir.clone(),
        },
        BackendArg::S3 => StorageConfig::S3(S3Config {
            bucket: cli.s3_bucket.clone(),
            region: cli.s3_region.clone(),
            prefix: cli.s3_prefix.clone(),
            access_key_id: cli.aws_access_key_id.clone(),
            secret_access_key: cli.aws_secret_access_key.clone(),
            endpoint: cli.s3_endpoint.clone(),
            allow_http: cli
                .s3_endpoint
                .as_deref()
                .is_some_and(|e| e.starts_with("http://")),
        }),
    };

    let mut builder = ServiceConfig::builder()
        .storage(storage)
        .job_store_dir(cli.job_dir.clone());

    if let Command::Work(args) = &cli.command {
        builder = builder
            .worker_concurrency(args.concurrency)
            .poll_interval_ms(args.poll_ms)
            .provider_name(args.provider.clone())
            .model(args.model.clone())
            .temperature(args.temperature)
            .api_timeout_secs(args.api_timeout)
            .min_text_chars(args.min_text_chars)
            .download_timeout_secs(args.download_timeout);
        let key = args.api_key.clone().or_else(|| {
            credential_env_var(&args.provider).and_then(|var| std::env::var(var).ok())
        });
        if let Some(key) = key {
            builder = builder.api_key(key);
        }
        if let Some(prompt) = &args.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        if let Some(dir) = &args.pdfium_lib_path {
            builder = builder.pdfium_library_path(dir.clone());
        }
    }

    builder.build().context("Invalid configuration")
}
