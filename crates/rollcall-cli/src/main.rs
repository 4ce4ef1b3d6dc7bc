use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::ConfirmationResponse;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

mod encode;

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn status(&self) -> zbus::Result<String>;
    fn confirm(&self, key: &str, answer: &str) -> zbus::Result<()>;
    fn ledger_path(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the known-faces store from a directory of `<id>.<ext>` photos
    Encode {
        /// Directory of labelled photos
        #[arg(short, long)]
        images: PathBuf,
        /// Known-faces JSON file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Directory containing the ONNX models (default: $ROLLCALL_MODEL_DIR or /usr/share/rollcall/models)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Show the current session status
    Status,
    /// Answer the open confirmation prompt
    Confirm {
        /// yes or no
        answer: String,
    },
    /// Follow the session, answering prompts with y/n on stdin
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Copy the attendance ledger to another location
    Export {
        #[arg(short, long)]
        dest: PathBuf,
    },
    /// List video capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            images,
            output,
            model_dir,
        } => {
            let model_dir = model_dir
                .or_else(|| std::env::var_os("ROLLCALL_MODEL_DIR").map(PathBuf::from))
                .unwrap_or_else(rollcall_core::default_model_dir);
            let mut pipeline = rollcall_core::OnnxPipeline::load(&model_dir)
                .with_context(|| format!("cannot load models from {}", model_dir.display()))?;

            let (known, report) = encode::encode_directory(&mut pipeline, &images)?;
            if known.is_empty() {
                bail!("no faces found in {}", images.display());
            }
            known.save(&output)?;

            println!("Encoded {} face(s) into {}", known.len(), output.display());
            for path in &report.skipped {
                println!("  skipped (no face): {}", path.display());
            }
        }
        Commands::Status => {
            let proxy = connect().await?;
            let status = fetch_status(&proxy).await?;
            print_status(&status);
        }
        Commands::Confirm { answer } => {
            let response: ConfirmationResponse = answer.parse()?;
            let proxy = connect().await?;
            let status = fetch_status(&proxy).await?;
            let Some(key) = prompt_key(&status) else {
                bail!("no confirmation prompt is open");
            };
            proxy.confirm(key, answer_word(response)).await?;
            println!("Answered {} for prompt {key}", answer_word(response));
        }
        Commands::Watch { interval_ms } => {
            let proxy = connect().await?;
            watch(&proxy, Duration::from_millis(interval_ms.max(50))).await?;
        }
        Commands::Export { dest } => {
            let proxy = connect().await?;
            let ledger = PathBuf::from(proxy.ledger_path().await?);
            if !ledger.exists() {
                bail!("no attendance recorded yet ({} does not exist)", ledger.display());
            }
            let bytes = std::fs::copy(&ledger, &dest)
                .with_context(|| format!("cannot copy {} to {}", ledger.display(), dest.display()))?;
            println!("Exported {} ({bytes} bytes) to {}", ledger.display(), dest.display());
        }
        Commands::Devices => {
            let devices = rollcall_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}  {}  ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<AttendanceProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not running")
}

async fn fetch_status(proxy: &AttendanceProxy<'_>) -> Result<Value> {
    let raw = proxy.status().await.context("rollcalld is not running")?;
    Ok(serde_json::from_str(&raw)?)
}

fn answer_word(response: ConfirmationResponse) -> &'static str {
    match response {
        ConfirmationResponse::Yes => "yes",
        ConfirmationResponse::No => "no",
        ConfirmationResponse::Pending => "pending",
    }
}

fn prompt_key(status: &Value) -> Option<&str> {
    status.pointer("/prompt/key").and_then(Value::as_str)
}

fn text<'a>(status: &'a Value, pointer: &str) -> Option<&'a str> {
    status.pointer(pointer).and_then(Value::as_str)
}

fn print_status(status: &Value) {
    println!("mode:    {}", text(status, "/mode").unwrap_or("unknown"));
    if let Some(question) = text(status, "/prompt/question") {
        println!("prompt:  {question} [{}]", prompt_key(status).unwrap_or("?"));
    }
    let faces = status["overlays"].as_array().map(Vec::len).unwrap_or(0);
    println!("faces:   {faces}");
    if let Some(message) = text(status, "/message") {
        println!("notice:  {message}");
    }
    if let Some(error) = text(status, "/error") {
        println!("error:   {error}");
    }
    print_summary(status);
    if let Some(ledger) = text(status, "/ledger_path") {
        println!("ledger:  {ledger}");
    }
}

fn print_summary(status: &Value) {
    if let (Some(marked), Some(total)) = (
        status.pointer("/summary/time_taken_to_mark_secs").and_then(Value::as_f64),
        status.pointer("/summary/total_time_secs").and_then(Value::as_f64),
    ) {
        println!("Time taken to mark attendance: {marked:.2} seconds");
        println!("Total time: {total:.2} seconds");
    }
}

/// Print changes as they happen and forward y/n lines from stdin to the open prompt.
async fn watch(proxy: &AttendanceProxy<'_>, interval: Duration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(interval);
    let mut last_mode = String::new();
    let mut last_prompt: Option<String> = None;
    let mut last_message: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = fetch_status(proxy).await?;

                let mode = text(&status, "/mode").unwrap_or("unknown").to_string();
                if mode != last_mode {
                    println!("[{mode}]");
                    last_mode = mode;
                }

                let prompt = prompt_key(&status).map(str::to_string);
                if prompt != last_prompt {
                    if let Some(question) = text(&status, "/prompt/question") {
                        println!("{question} (y/n)");
                    }
                    last_prompt = prompt;
                }

                let message = text(&status, "/message").map(str::to_string);
                if message != last_message {
                    if let Some(m) = &message {
                        println!("{m}");
                    }
                    last_message = message;
                }

                if let Some(error) = text(&status, "/error") {
                    bail!("session failed: {error}");
                }
                if last_mode == "terminated" {
                    print_summary(&status);
                    return Ok(());
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response: ConfirmationResponse = match line.parse() {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };
                match &last_prompt {
                    Some(key) => {
                        if let Err(e) = proxy.confirm(key, answer_word(response)).await {
                            eprintln!("answer not accepted: {e}");
                        }
                    }
                    None => eprintln!("no confirmation prompt is open"),
                }
            }
        }
    }
}
