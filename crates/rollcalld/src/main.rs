use anyhow::{anyhow, Context, Result};
use engine::SessionOutcome;
use tokio::sync::oneshot::error::RecvError;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod directory;
mod engine;
mod ledger;

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        device = %config.camera_device,
        known_faces = %config.known_faces_path.display(),
        ledger = %config.ledger_path.display(),
        directory = ?config.directory,
        tolerance = config.match_tolerance,
        min_cosine = rollcall_core::cosine_equivalent(config.match_tolerance),
        decline_policy = ?config.decline_policy,
        "configuration loaded"
    );

    let (engine, done) = engine::spawn_engine(&config).context("failed to start session engine")?;

    let service = dbus_interface::AttendanceService {
        engine,
        ledger_path: config.ledger_path.display().to_string(),
    };
    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    let conclusion = tokio::select! {
        outcome = done => conclude(outcome, config.exit_on_complete),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted");
            Conclusion { linger: false, result: Ok(()) }
        }
    };

    if conclusion.linger {
        tracing::info!("session over; serving final status until interrupted");
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("rollcalld shutting down");
    conclusion.result
}

/// What the daemon does once the session loop has ended.
#[derive(Debug)]
struct Conclusion {
    /// Stay on the bus so clients can still read the final status, error included.
    linger: bool,
    /// Process result, returned after lingering.
    result: Result<()>,
}

fn conclude(outcome: Result<SessionOutcome, RecvError>, exit_on_complete: bool) -> Conclusion {
    match outcome {
        Ok(Ok(summary)) => {
            println!(
                "Time taken to mark attendance: {:.2} seconds",
                summary.time_taken_to_mark.as_secs_f64()
            );
            println!("Total time: {:.2} seconds", summary.total_time.as_secs_f64());
            Conclusion {
                linger: !exit_on_complete,
                result: Ok(()),
            }
        }
        Ok(Err(e)) => {
            eprintln!("Attendance session failed: {e}");
            Conclusion {
                linger: !exit_on_complete,
                result: Err(anyhow::Error::new(e).context("attendance session failed")),
            }
        }
        // The engine thread is gone, so there is no status left to serve.
        Err(_) => Conclusion {
            linger: false,
            result: Err(anyhow!("session engine exited without reporting an outcome")),
        },
    }
}
