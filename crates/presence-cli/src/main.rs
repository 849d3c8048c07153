use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use presence_hw::{Camera, CaptureSource};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a face and clock in
    ClockIn {
        /// Return immediately; the outcome arrives as a notification
        #[arg(long)]
        background: bool,
    },
    /// Show today's most recent attendance
    Recent,
    /// Show dashboard counters (admin)
    Stats,
    /// Show daemon status
    Status,
    /// Start an admin session
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// End the admin session
    Logout,
    /// Enroll a new employee (admin)
    Enroll {
        #[arg(long)]
        name: String,
        /// Asked from the backend when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        position: String,
        #[arg(long)]
        department: String,
    },
    /// Step back from face capture to the identity form (admin)
    EnrollBack,
    /// Abandon or restart enrollment (admin)
    EnrollReset,
    /// Run camera diagnostics
    Test {
        /// V4L2 device to test
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Write the captured still here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.freedesktop.Presence1",
    default_service = "org.freedesktop.Presence1",
    default_path = "/org/freedesktop/Presence1"
)]
trait Presence {
    async fn clock_in(&self) -> zbus::Result<String>;
    async fn start_clock_in(&self) -> zbus::Result<bool>;
    async fn recent_attendance(&self) -> zbus::Result<String>;
    async fn dashboard_stats(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn login(&self, username: &str, password: &str) -> zbus::Result<bool>;
    async fn logout(&self) -> zbus::Result<()>;
    async fn enroll_update(
        &self,
        name: &str,
        id: &str,
        position: &str,
        department: &str,
    ) -> zbus::Result<String>;
    async fn enroll_suggest_id(&self) -> zbus::Result<String>;
    async fn enroll_next(&self) -> zbus::Result<String>;
    async fn enroll_back(&self) -> zbus::Result<String>;
    async fn enroll_train(&self) -> zbus::Result<String>;
    async fn enroll_reset(&self) -> zbus::Result<String>;
    async fn enroll_state(&self) -> zbus::Result<String>;
}

async fn connect() -> Result<PresenceProxy<'static>> {
    let conn = zbus::connection::Builder::session()?
        .method_timeout(Duration::from_secs(30))
        .build()
        .await
        .context("cannot reach the session bus")?;
    tracing::debug!(unique_name = ?conn.unique_name(), "connected to session bus");
    Ok(PresenceProxy::new(&conn).await?)
}

fn parse(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("daemon returned malformed JSON")
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("-")
}

fn print_outcome(outcome: &Value) {
    let employee = outcome.get("employee");
    let name = employee.map(|e| text(e, "name")).unwrap_or("-");
    match text(outcome, "outcome") {
        "success" => println!("✓ {}", text(outcome, "message")),
        "duplicate" => println!("• {name} already checked in: {}", text(outcome, "message")),
        "clock_in_failed" => println!("✗ {name}: {}", text(outcome, "reason")),
        "busy" => println!("A clock-in is already in progress"),
        _ => println!("✗ {}", text(outcome, "message")),
    }
}

fn print_wizard(state: &Value) {
    println!(
        "step {} ({}) frames {}/{} training {}%{}",
        state["step_index"],
        text(state, "step_label"),
        state["frames_captured"],
        state["capture_target"],
        state["training_progress"],
        if state["can_advance"] == Value::Bool(true) {
            " [ready]"
        } else {
            ""
        },
    );
}

async fn enroll(
    proxy: &PresenceProxy<'_>,
    name: &str,
    id: Option<String>,
    position: &str,
    department: &str,
) -> Result<()> {
    let id = match id {
        Some(id) => id,
        None => {
            let id = proxy.enroll_suggest_id().await?;
            println!("Using employee ID {id}");
            id
        }
    };
    proxy.enroll_update(name, &id, position, department).await?;
    let mut state = parse(&proxy.enroll_next().await?)?;
    println!("Capturing faces; look at the camera...");

    let mut last = None;
    while state["capturing"] == Value::Bool(true) {
        tokio::time::sleep(POLL).await;
        state = parse(&proxy.enroll_state().await?)?;
        if last.as_ref() != Some(&state["frames_captured"]) {
            print_wizard(&state);
            last = Some(state["frames_captured"].clone());
        }
    }
    if state["placeholder_frames"].as_u64().unwrap_or(0) > 0 {
        println!(
            "Camera unavailable: {} placeholder frames used",
            state["placeholder_frames"]
        );
    }

    proxy.enroll_next().await?;
    proxy.enroll_train().await?;
    println!("Training...");
    loop {
        tokio::time::sleep(POLL).await;
        state = parse(&proxy.enroll_state().await?)?;
        print_wizard(&state);
        if text(&state, "step") == "complete" {
            break;
        }
    }
    println!("Enrollment complete for {name} ({id})");
    Ok(())
}

fn camera_test(device: &str, output: Option<PathBuf>) -> Result<()> {
    let devices = Camera::list_devices();
    tracing::debug!(count = devices.len(), "enumerated capture devices");
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for dev in &devices {
        println!("{}  {} [{}] {}", dev.path, dev.name, dev.driver, dev.bus);
    }

    let camera = Camera::open(device).with_context(|| format!("opening {device}"))?;
    println!(
        "Opened {device}: {}x{} {:?}",
        camera.width, camera.height, camera.fourcc
    );
    camera.warm_up(4);
    let still = camera.capture_still()?;
    tracing::info!(device, bytes = still.bytes.len(), "diagnostic still captured");
    println!("Captured {} bytes ({})", still.bytes.len(), still.mime);
    if let Some(path) = output {
        std::fs::write(&path, &still.bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn read_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Diagnostics talk to the device directly, not through the daemon.
    if let Commands::Test { device, output } = &cli.command {
        println!("Running camera diagnostics...");
        return camera_test(device, output.clone());
    }

    let proxy = connect().await?;
    match cli.command {
        Commands::ClockIn { background: false } => {
            print_outcome(&parse(&proxy.clock_in().await?)?)
        }
        Commands::ClockIn { background: true } => {
            if proxy.start_clock_in().await? {
                println!("Clock-in started");
            } else {
                println!("A clock-in is already in progress");
            }
        }
        Commands::Recent => {
            let records = parse(&proxy.recent_attendance().await?)?;
            let records = records.as_array().cloned().unwrap_or_default();
            if records.is_empty() {
                println!("No attendance recorded today");
            }
            for r in &records {
                println!(
                    "{}  {:<24} {:<8} {:.1}%",
                    text(r, "clockIn"),
                    text(r, "employeeName"),
                    text(r, "status"),
                    r["confidence"].as_f64().unwrap_or(0.0),
                );
            }
        }
        Commands::Stats => {
            let stats = parse(&proxy.dashboard_stats().await?)?;
            println!("Employees: {}", stats["totalEmployees"]);
            println!("Present:   {}", stats["todayPresent"]);
            println!("Late:      {}", stats["lateArrivals"]);
            println!("Absent:    {}", stats["absentToday"]);
        }
        Commands::Status => {
            let status = parse(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            if !proxy.login(&username, &password).await? {
                bail!("invalid credentials");
            }
            println!("Logged in as {username}");
        }
        Commands::Logout => {
            proxy.logout().await?;
            println!("Logged out");
        }
        Commands::Enroll {
            name,
            id,
            position,
            department,
        } => enroll(&proxy, &name, id, &position, &department).await?,
        Commands::EnrollBack => {
            print_wizard(&parse(&proxy.enroll_back().await?)?);
        }
        Commands::EnrollReset => {
            print_wizard(&parse(&proxy.enroll_reset().await?)?);
        }
        Commands::Test { .. } => {}
    }

    Ok(())
}
