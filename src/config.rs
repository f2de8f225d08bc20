//! Application configuration
//!
//! Read from the environment (after `.env` is loaded), with defaults.

use crate::ai_client::{defaults as ai_defaults, InferenceSettings, ResponseMode, RetryPolicy};
use crate::alert_gate::AlertPolicy;
use crate::error::{Error, Result};
use crate::notification_fanout::speech::SpeechSettings;
use crate::notification_fanout::SpeechFormat;
use crate::observation_source::CameraSettings;
use crate::resilience_supervisor::SupervisorPolicy;
use crate::scheduler::SchedulePolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where observations come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    EventLog,
    Camera,
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "event_log" | "events" => Ok(Self::EventLog),
            "camera" => Ok(Self::Camera),
            other => Err(Error::Config(format!("unknown source kind: {}", other))),
        }
    }
}

/// Telegram channel configuration
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Siren channel configuration
#[derive(Debug, Clone)]
pub struct SirenConfig {
    pub enabled: bool,
    pub sound_file: PathBuf,
}

/// Speech channel configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub settings: SpeechSettings,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub inference: InferenceSettings,
    pub source: SourceKind,
    pub event_log_file: PathBuf,
    pub camera: CameraSettings,
    pub schedule: SchedulePolicy,
    pub alert: AlertPolicy,
    pub supervisor: SupervisorPolicy,
    pub telegram: TelegramConfig,
    pub siren: SirenConfig,
    pub speech: SpeechConfig,
    /// Player command used by the siren and speech channels
    pub audio_player: Option<String>,
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let source: SourceKind = env.parse("SOURCE_KIND", SourceKind::EventLog)?;

        // Frames are scored with the risk-marker prompt unless told otherwise
        let default_mode = match source {
            SourceKind::EventLog => ResponseMode::Structured,
            SourceKind::Camera => ResponseMode::RiskMarker,
        };
        let mode: ResponseMode = env.parse("RESPONSE_MODE", default_mode)?;
        let default_system_prompt = match mode {
            ResponseMode::Structured => ai_defaults::SYSTEM_PROMPT,
            ResponseMode::RiskMarker => ai_defaults::VISION_SYSTEM_PROMPT,
        };

        let retry = RetryPolicy {
            max_attempts: env.parse("MAX_RETRIES", RetryPolicy::default().max_attempts)?,
            base_delay: Duration::from_millis(env.parse(
                "RETRY_BASE_DELAY_MS",
                RetryPolicy::default().base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(env.parse(
                "RETRY_MAX_DELAY_MS",
                RetryPolicy::default().max_delay.as_millis() as u64,
            )?),
        };

        let inference = InferenceSettings {
            endpoint: env.string("INFERENCE_URL", ai_defaults::ENDPOINT),
            api_key: env.opt("INFERENCE_API_KEY").or_else(|| env.opt("OPENAI_API_KEY")),
            model: env.string("INFERENCE_MODEL", ai_defaults::MODEL),
            system_prompt: env.string("SYSTEM_PROMPT", default_system_prompt),
            analysis_prompt: env.string("PROMPT_ANALYSIS", ai_defaults::ANALYSIS_PROMPT),
            mode,
            temperature: env.parse("TEMPERATURE", ai_defaults::TEMPERATURE)?,
            max_tokens: env.parse_opt("MAX_TOKENS")?,
            timeout: Duration::from_secs(env.parse("INFERENCE_TIMEOUT_SECS", ai_defaults::TIMEOUT_SECS)?),
            retry,
        };

        let camera_defaults = CameraSettings::default();
        let camera = CameraSettings {
            index: env.parse("CAMERA_INDEX", camera_defaults.index)?,
            auto_scan: env.flag("AUTO_CAMERA_SCAN", camera_defaults.auto_scan)?,
            max_width: env.parse("FRAME_MAX_WIDTH", camera_defaults.max_width)?,
            jpeg_quality: camera_defaults.jpeg_quality,
            capture_timeout: Duration::from_secs(env.parse(
                "CAPTURE_TIMEOUT_SECS",
                camera_defaults.capture_timeout.as_secs(),
            )?),
        };

        let schedule_defaults = SchedulePolicy::default();
        let schedule = SchedulePolicy {
            interval: Duration::from_secs(env.parse(
                "ANALYZE_INTERVAL",
                schedule_defaults.interval.as_secs(),
            )?),
            window_span: Duration::from_secs(
                env.parse::<u64>("WINDOW_MINUTES", schedule_defaults.window_span.as_secs() / 60)? * 60,
            ),
            burst_cycles: env.parse("BURST_CYCLES", schedule_defaults.burst_cycles)?,
            burst_window: Duration::from_secs(env.parse(
                "BURST_WINDOW_SECS",
                schedule_defaults.burst_window.as_secs(),
            )?),
            burst_settle: Duration::from_secs(env.parse(
                "BURST_SETTLE_SECS",
                schedule_defaults.burst_settle.as_secs(),
            )?),
            source_retry_delay: Duration::from_secs(env.parse(
                "SOURCE_RETRY_DELAY_SECS",
                schedule_defaults.source_retry_delay.as_secs(),
            )?),
        };

        // Frame scores run hotter than log scores, so cameras gate higher
        let default_threshold = match source {
            SourceKind::EventLog => 0.5,
            SourceKind::Camera => 0.8,
        };
        let alert = AlertPolicy {
            threshold: env.parse("ALERT_SCORE_THRESHOLD", default_threshold)?,
            min_interval: Duration::from_secs(
                env.parse("ALERT_MIN_INTERVAL", schedule.interval.as_secs())?,
            ),
        };

        let supervisor_defaults = SupervisorPolicy::default();
        let supervisor = SupervisorPolicy {
            source_failure_threshold: env.parse(
                "SOURCE_FAILURE_THRESHOLD",
                supervisor_defaults.source_failure_threshold,
            )?,
            connectivity_failure_threshold: env.parse(
                "CONNECTIVITY_FAILURE_THRESHOLD",
                supervisor_defaults.connectivity_failure_threshold,
            )?,
            uptime_ceiling: Duration::from_secs(
                env.parse::<u64>(
                    "UPTIME_CEILING_HOURS",
                    supervisor_defaults.uptime_ceiling.as_secs() / 3600,
                )? * 3600,
            ),
        };

        let telegram = TelegramConfig {
            enabled: env.flag("ENABLE_TELEGRAM", false)?,
            bot_token: env.opt("TELEGRAM_BOT_TOKEN"),
            chat_id: env.opt("TELEGRAM_CHAT_ID"),
        };

        let siren = SirenConfig {
            enabled: env.flag("ENABLE_SIREN", false)?,
            sound_file: PathBuf::from(env.string("SIREN_FILE", "siren.mp3")),
        };

        let format = match env.string("TTS_MODE", "audio").trim().to_lowercase().as_str() {
            "audio" | "mp3" => SpeechFormat::Mp3,
            "ogg" => SpeechFormat::Ogg,
            other => return Err(Error::Config(format!("unknown TTS_MODE: {}", other))),
        };
        let speech = SpeechConfig {
            enabled: env.flag("ENABLE_TTS", false)?,
            settings: SpeechSettings {
                endpoint: env.string("TTS_URL", "https://api.openai.com/v1/audio/speech"),
                api_key: env
                    .opt("TTS_API_KEY")
                    .or_else(|| inference.api_key.clone()),
                model: env.string("TTS_MODEL", "tts-1"),
                voice: env.string("TTS_VOICE", "alloy"),
                format,
                output_dir: PathBuf::from(env.string("TTS_OUTPUT_DIR", ".")),
                // 0 disables the re-announcement
                repeat_after: Some(env.parse::<u64>("TTS_REPEAT_SECS", 10)?)
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                playback_timeout: Duration::from_secs(60),
            },
        };

        let config = Self {
            inference,
            source,
            event_log_file: PathBuf::from(env.string("EVENT_LOG_FILE", "events.log")),
            camera,
            schedule,
            alert,
            supervisor,
            telegram,
            siren,
            speech,
            audio_player: env.opt("AUDIO_PLAYER"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let threshold = self.alert.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "ALERT_SCORE_THRESHOLD must be within [0,1], got {}",
                threshold
            )));
        }
        if self.inference.retry.max_attempts < 1 {
            return Err(Error::Config("MAX_RETRIES must be at least 1".to_string()));
        }
        if self.schedule.interval.is_zero() {
            return Err(Error::Config("ANALYZE_INTERVAL must be positive".to_string()));
        }
        if self.schedule.window_span.is_zero() {
            return Err(Error::Config("WINDOW_MINUTES must be positive".to_string()));
        }
        if self.schedule.burst_cycles > 2 {
            return Err(Error::Config(format!(
                "BURST_CYCLES must be 0, 1 or 2, got {}",
                self.schedule.burst_cycles
            )));
        }
        if self.supervisor.source_failure_threshold < 1
            || self.supervisor.connectivity_failure_threshold < 1
        {
            return Err(Error::Config("failure thresholds must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Player command for a speech format, honoring `AUDIO_PLAYER`
    pub fn player_command(&self, format: SpeechFormat) -> String {
        if let Some(ref command) = self.audio_player {
            return command.clone();
        }
        match format {
            SpeechFormat::Mp3 => default_mp3_player().to_string(),
            SpeechFormat::Ogg => "ffplay -nodisp -autoexit -loglevel quiet".to_string(),
        }
    }
}

fn default_mp3_player() -> &'static str {
    if cfg!(target_os = "macos") {
        "afplay"
    } else {
        "ffplay -nodisp -autoexit -loglevel quiet"
    }
}

/// Typed view over a key lookup
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value for `key`
    fn opt(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn parse_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.opt(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::Config(format!("invalid value for {}: {}", key, raw))),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.opt(key) {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::Config(format!("invalid flag for {}: {}", key, raw))),
            },
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.source, SourceKind::EventLog);
        assert_eq!(config.inference.mode, ResponseMode::Structured);
        assert_eq!(config.alert.threshold, 0.5);
        assert_eq!(config.alert.min_interval, Duration::from_secs(60));
        assert_eq!(config.schedule.window_span, Duration::from_secs(600));
        assert_eq!(config.inference.retry.max_attempts, 3);
        assert_eq!(config.supervisor.connectivity_failure_threshold, 20);
        assert!(!config.telegram.enabled);
        assert_eq!(config.event_log_file, PathBuf::from("events.log"));
    }

    #[test]
    fn test_camera_source_defaults_to_marker_mode() {
        let config = config_from(&[("SOURCE_KIND", "camera"), ("FRAME_MAX_WIDTH", "960")]).unwrap();

        assert_eq!(config.inference.mode, ResponseMode::RiskMarker);
        assert_eq!(config.inference.system_prompt, ai_defaults::VISION_SYSTEM_PROMPT);
        assert_eq!(config.camera.max_width, 960);
        assert_eq!(config.alert.threshold, 0.8);
    }

    #[test]
    fn test_min_interval_follows_schedule_interval() {
        let config = config_from(&[("ANALYZE_INTERVAL", "15")]).unwrap();
        assert_eq!(config.alert.min_interval, Duration::from_secs(15));

        let config = config_from(&[("ANALYZE_INTERVAL", "15"), ("ALERT_MIN_INTERVAL", "90")]).unwrap();
        assert_eq!(config.alert.min_interval, Duration::from_secs(90));
    }

    #[test]
    fn test_speech_repeat_default_and_disable() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.speech.settings.repeat_after, Some(Duration::from_secs(10)));

        let config = config_from(&[("TTS_REPEAT_SECS", "0")]).unwrap();
        assert_eq!(config.speech.settings.repeat_after, None);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ALERT_SCORE_THRESHOLD", "0.8"),
            ("ANALYZE_INTERVAL", "5"),
            ("ENABLE_TELEGRAM", "1"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TTS_MODE", "ogg"),
            ("TTS_REPEAT_SECS", "60"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();

        assert_eq!(config.alert.threshold, 0.8);
        assert_eq!(config.schedule.interval, Duration::from_secs(5));
        assert_eq!(config.alert.min_interval, Duration::from_secs(5));
        assert!(config.telegram.enabled);
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.speech.settings.format, SpeechFormat::Ogg);
        assert_eq!(config.speech.settings.repeat_after, Some(Duration::from_secs(60)));
        assert_eq!(config.inference.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.speech.settings.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(config_from(&[("ALERT_SCORE_THRESHOLD", "1.5")]).is_err());
        assert!(config_from(&[("MAX_RETRIES", "0")]).is_err());
        assert!(config_from(&[("ANALYZE_INTERVAL", "0")]).is_err());
        assert!(config_from(&[("BURST_CYCLES", "3")]).is_err());
        assert!(config_from(&[("MAX_TOKENS", "lots")]).is_err());
        assert!(config_from(&[("ENABLE_SIREN", "maybe")]).is_err());
        assert!(config_from(&[("SOURCE_KIND", "radar")]).is_err());
    }

    #[test]
    fn test_player_command_override() {
        let config = config_from(&[("AUDIO_PLAYER", "mpg123 -q")]).unwrap();
        assert_eq!(config.player_command(SpeechFormat::Mp3), "mpg123 -q");

        let config = config_from(&[]).unwrap();
        assert!(config.player_command(SpeechFormat::Ogg).starts_with("ffplay"));
    }
}
