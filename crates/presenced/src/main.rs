use anyhow::{Context, Result};
use presence_core::EmployeeDirectory;
use presence_hw::{Camera, CaptureSource, FixedLocation, GeolocationSource, NoCamera, NoLocation};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod camera;
mod client;
mod config;
mod dashboard;
mod dbus_interface;
mod feed;
mod location;
mod notify;
mod pipeline;
mod schedule;
mod session;
mod wizard;

#[cfg(test)]
mod testing;

use camera::CameraHandle;
use client::ApiClient;
use config::Config;
use dbus_interface::PresenceService;
use feed::{AttendanceFeed, FeedPoller};
use location::LocationCache;
use notify::Notifier;
use pipeline::AttendanceController;
use schedule::ScheduledTask;
use session::SessionManager;
use wizard::EnrollmentWizard;

const BUS_NAME: &str = "org.freedesktop.Presence1";
const OBJECT_PATH: &str = "/org/freedesktop/Presence1";

/// Open the configured camera, or fall back to a source that always
/// reports unavailability so the rest of the daemon keeps working.
fn open_camera(config: &Config) -> Arc<dyn CaptureSource> {
    if !config.camera_enabled {
        tracing::info!("camera disabled in configuration");
        return Arc::new(NoCamera::new("disabled in configuration"));
    }
    match Camera::open(&config.camera_device) {
        Ok(camera) => {
            tracing::info!(
                device = %config.camera_device,
                width = camera.width,
                height = camera.height,
                fourcc = ?camera.fourcc,
                "camera opened"
            );
            camera.warm_up(config.warmup_frames);
            Arc::new(camera)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                device = %config.camera_device,
                "camera unavailable; running without capture"
            );
            Arc::new(NoCamera::new(err.to_string()))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        api = %config.api_url,
        poll_secs = config.poll_interval_secs,
        feed_window = config.feed_window,
        "configuration loaded"
    );

    let client = Arc::new(ApiClient::new(&config.api_url, config.request_timeout())?);
    tracing::info!(base_url = client.base_url(), "backend client ready");
    let camera = CameraHandle::new(open_camera(&config));

    let location_source: Arc<dyn GeolocationSource> = match config.location() {
        Some(coords) => Arc::new(FixedLocation(coords)),
        None => Arc::new(NoLocation),
    };
    let location = LocationCache::new(location_source);

    let notifier = Notifier::new();
    let feed = AttendanceFeed::new(config.feed_window);

    let pipeline = AttendanceController::new(
        camera.clone(),
        client.clone(),
        client.clone(),
        location.clone(),
        feed.clone(),
        notifier.clone(),
    );

    let directory = if config.register_on_complete {
        Some(client.clone() as Arc<dyn EmployeeDirectory>)
    } else {
        None
    };
    let wizard = EnrollmentWizard::new(
        camera.clone(),
        notifier.clone(),
        directory,
        config.wizard_settings(),
    );

    let mut feed_updates = feed.subscribe();
    let poller = FeedPoller::spawn(feed.clone(), client.clone(), config.poll_interval());

    let service = PresenceService {
        pipeline,
        feed,
        wizard,
        sessions: SessionManager::new(client.clone()),
        attendance: client.clone(),
        dashboard: client.clone(),
        directory: client.clone(),
        backend: Some(client),
        camera: camera.describe(),
        location,
        roster_size: config.roster_size,
    };

    let conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;
    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");

    let iface = conn
        .object_server()
        .interface::<_, PresenceService>(OBJECT_PATH)
        .await?;
    let mut notes = notifier.subscribe();
    let _signals = ScheduledTask::spawn("notify-signal", async move {
        loop {
            match notes.recv().await {
                Ok(note) => {
                    if let Err(err) = PresenceService::notification(
                        iface.signal_emitter(),
                        note.severity.as_str(),
                        &note.title,
                        &note.message,
                    )
                    .await
                    {
                        tracing::warn!(error = %err, "failed to emit notification signal");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let iface = conn
        .object_server()
        .interface::<_, PresenceService>(OBJECT_PATH)
        .await?;
    let _feed_signals = ScheduledTask::spawn("feed-signal", async move {
        while feed_updates.changed().await.is_ok() {
            let records = feed_updates.borrow_and_update().len() as u32;
            if let Err(err) =
                PresenceService::feed_changed(iface.signal_emitter(), records).await
            {
                tracing::warn!(error = %err, "failed to emit feed signal");
            }
        }
    });

    tracing::info!("presenced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenced shutting down");
    poller.cancel();

    Ok(())
}
