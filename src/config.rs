use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Nodo de audio (Lavalink)
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_secure: bool,
    pub lavalink_reconnect_attempts: u32,
    pub lavalink_reconnect_interval: Duration,

    // Reproducción
    pub default_volume: u16, // 0-200
    pub max_queue_size: usize,
    pub enable_autoplay: bool,

    // Temporizadores de sesión
    pub inactivity_timeout: Duration,
    pub empty_channel_timeout: Duration,
    pub player_refresh_interval: Duration,

    // APIs (Opcionales)
    pub youtube_api_key: Option<String>,
    pub bug_report_channel_id: Option<u64>,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Lavalink
            lavalink_host: std::env::var("LAVALINK_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            lavalink_port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            lavalink_secure: std::env::var("LAVALINK_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            lavalink_reconnect_attempts: std::env::var("LAVALINK_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            lavalink_reconnect_interval: env_duration("LAVALINK_RECONNECT_INTERVAL", "15s")?,

            // Reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            enable_autoplay: std::env::var("ENABLE_AUTOPLAY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            // Temporizadores
            inactivity_timeout: env_duration("INACTIVITY_TIMEOUT", "3m")?,
            empty_channel_timeout: env_duration("EMPTY_CHANNEL_TIMEOUT", "1m")?,
            player_refresh_interval: env_duration("PLAYER_REFRESH_INTERVAL", "2s")?,

            // APIs
            youtube_api_key: std::env::var("YOUTUBE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            bug_report_channel_id: std::env::var("BUG_REPORT_CHANNEL_ID")
                .ok()
                .and_then(|s| s.parse().ok()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/app/data".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores antes de arrancar.
    ///
    /// - Token y Application ID presentes
    /// - Volumen entre 0 y 200
    /// - Cola y temporizadores mayores que cero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.application_id == 0 {
            anyhow::bail!("APPLICATION_ID debe ser distinto de 0");
        }

        if self.default_volume > 200 {
            anyhow::bail!("El volumen por defecto debe estar entre 0 y 200, recibido: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("El tamaño máximo de la cola debe ser mayor que 0");
        }

        for (name, value) in [
            ("INACTIVITY_TIMEOUT", self.inactivity_timeout),
            ("EMPTY_CHANNEL_TIMEOUT", self.empty_channel_timeout),
            ("PLAYER_REFRESH_INTERVAL", self.player_refresh_interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} debe ser mayor que 0", name);
            }
        }

        Ok(())
    }

    /// Resumen para logs, sin secretos
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Lavalink: {}:{} (tls={}, reintentos={} cada {})\n  \
            Audio: {}% vol, cola máx {}, autoplay={}\n  \
            Timers: inactividad {}, canal vacío {}, refresco {}\n  \
            APIs: YouTube={}, canal de reportes={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_secure,
            self.lavalink_reconnect_attempts,
            humantime::format_duration(self.lavalink_reconnect_interval),
            self.default_volume,
            self.max_queue_size,
            self.enable_autoplay,
            humantime::format_duration(self.inactivity_timeout),
            humantime::format_duration(self.empty_channel_timeout),
            humantime::format_duration(self.player_refresh_interval),
            self.youtube_api_key.is_some(),
            self.bug_report_channel_id.map_or("ninguno".to_string(), |id| id.to_string()),
        )
    }
}

fn env_duration(key: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} no es una duración válida: {}", key, raw))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,
            lavalink_reconnect_attempts: 3,
            lavalink_reconnect_interval: Duration::from_secs(15),

            default_volume: 50,
            max_queue_size: 1000,
            enable_autoplay: false,

            inactivity_timeout: Duration::from_secs(180),
            empty_channel_timeout: Duration::from_secs(60),
            player_refresh_interval: Duration::from_secs(2),

            youtube_api_key: None,
            bug_report_channel_id: None,

            data_dir: "/app/data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            application_id: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_default_values_validate() {
        assert!(valid().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_volume_out_of_range_is_rejected() {
        let config = Config {
            default_volume: 250,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timer_is_rejected() {
        let config = Config {
            empty_channel_timeout: Duration::ZERO,
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("EMPTY_CHANNEL_TIMEOUT"));
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            youtube_api_key: Some("secret-key".to_string()),
            ..valid()
        };
        let summary = config.summary();
        assert!(!summary.contains("token"));
        assert!(!summary.contains("secret-key"));
        assert!(!summary.contains("youshallnotpass"));
        assert!(summary.contains("3m"));
    }
}
