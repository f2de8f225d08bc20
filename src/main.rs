//! Riskwatch - Unattended Observation Monitor
//!
//! Main entry point.

use riskwatch::{
    ai_client::AiClient,
    alert_gate::AlertGate,
    clock::SystemClock,
    config::{AppConfig, SourceKind},
    notification_fanout::{
        AudioPlayer, NotificationFanout, SirenChannel, SpeechChannel, SpeechFormat,
        TelegramChannel,
    },
    observation_source::{CameraSource, EventLogSource, ObservationSource},
    scheduler::{Scheduler, Shutdown},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riskwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Riskwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;

    let source: Box<dyn ObservationSource> = match config.source {
        SourceKind::EventLog => Box::new(EventLogSource::new(config.event_log_file.clone())),
        SourceKind::Camera => Box::new(CameraSource::open(config.camera.clone()).await?),
    };

    let ai_client = AiClient::new(config.inference.clone())?;
    let gate = Arc::new(AlertGate::new(config.alert));
    let fanout = build_fanout(&config)?;

    tracing::info!(
        source = %source.id(),
        model = %config.inference.model,
        mode = ?config.inference.mode,
        threshold = config.alert.threshold,
        min_interval_sec = config.alert.min_interval.as_secs(),
        channels = ?fanout.channel_ids(),
        "Monitor online"
    );
    if fanout.is_empty() {
        tracing::warn!("No notification channels enabled, alerts will only be logged");
    }

    let mut scheduler = Scheduler::new(
        source,
        ai_client,
        gate,
        fanout,
        config.supervisor,
        Arc::new(SystemClock),
        config.schedule,
    );

    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after current cycle");
            stop.stop();
        }
    });

    match scheduler.run().await {
        Shutdown::Stopped => {
            tracing::info!("Riskwatch stopped");
            Ok(())
        }
        Shutdown::Restart(cause) => {
            tracing::warn!(cause = %cause, "Restarting process");
            restart_process()
        }
    }
}

/// Register enabled channels in dispatch order: chat, siren, speech
fn build_fanout(config: &AppConfig) -> anyhow::Result<NotificationFanout> {
    let mut fanout = NotificationFanout::new();

    if config.telegram.enabled {
        fanout.register(Box::new(TelegramChannel::new(
            config.telegram.bot_token.clone(),
            config.telegram.chat_id.clone(),
        )?));
    }

    if config.siren.enabled {
        let player = AudioPlayer::parse(&config.player_command(SpeechFormat::Mp3))?;
        fanout.register(Box::new(SirenChannel::new(
            config.siren.sound_file.clone(),
            player,
        )));
    }

    if config.speech.enabled {
        let settings = config.speech.settings.clone();
        let player = AudioPlayer::parse(&config.player_command(settings.format))?;
        fanout.register(Box::new(SpeechChannel::new(settings, player)?));
    }

    Ok(fanout)
}

/// Replace the current process with a fresh copy of itself
#[cfg(unix)]
fn restart_process() -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    let err = std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(anyhow::anyhow!("re-exec failed: {}", err))
}

#[cfg(not(unix))]
fn restart_process() -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()?;
    std::process::exit(0);
}
