//! # Lavalink
//!
//! Cliente del nodo de audio sobre Lavalink v4.
//!
//! - Los comandos (play, pausa, volumen, voz) van por REST con `reqwest`.
//! - Los eventos llegan por websocket (`tokio-tungstenite`) y se publican como
//!   [`NodeEvent`] en un canal `flume`.
//! - Las credenciales de voz salen de songbird en modo gateway: songbird solo
//!   negocia la conexión, el audio lo envía el nodo.

pub mod protocol;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};

use self::protocol::{
    parse_guild_id, IncomingMessage, LoadResponse, UpdatePlayer, UpdateTrack, VoiceCredentials,
};
use super::{
    node::{AudioNode, LoadResult, NodeError, NodeEvent, NodeHandle},
    queue::Track,
};
use crate::config::Config;

const CLIENT_NAME: &str = concat!("guildtune/", env!("CARGO_PKG_VERSION"));

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Cierre del websocket del nodo
struct SocketClose {
    code: u16,
    reason: String,
    by_remote: bool,
}

pub struct LavalinkNode {
    http: reqwest::Client,
    rest_base: String,
    ws_url: String,
    password: String,
    user_id: UserId,
    songbird: Arc<Songbird>,
    session_id: RwLock<Option<String>>,
    events: flume::Sender<NodeEvent>,
    default_volume: u16,
    reconnect_attempts: u32,
    reconnect_interval: Duration,
}

impl LavalinkNode {
    /// Crea el cliente y el receptor de eventos. La conexión del websocket
    /// empieza con [`LavalinkNode::spawn`].
    pub fn new(
        config: &Config,
        user_id: UserId,
        songbird: Arc<Songbird>,
    ) -> Result<(Arc<Self>, flume::Receiver<NodeEvent>), NodeError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&config.lavalink_password)
            .map_err(|e| NodeError::Socket(format!("password inválido: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        let (tx, rx) = flume::unbounded();
        let node = Self {
            http,
            rest_base: rest_base(config),
            ws_url: ws_url(config),
            password: config.lavalink_password.clone(),
            user_id,
            songbird,
            session_id: RwLock::new(None),
            events: tx,
            default_volume: config.default_volume,
            reconnect_attempts: config.lavalink_reconnect_attempts,
            reconnect_interval: config.lavalink_reconnect_interval,
        };

        Ok((Arc::new(node), rx))
    }

    /// Lanza el bucle del websocket con reconexión
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move { node.run_socket().await })
    }

    /// Comprueba que el nodo responde (`GET /version`)
    pub async fn probe(config: &Config) -> anyhow::Result<String> {
        let response = reqwest::Client::new()
            .get(format!("{}/version", http_base(config)))
            .header(AUTHORIZATION, &config.lavalink_password)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.text().await?)
    }

    async fn run_socket(self: Arc<Self>) {
        let mut failures = 0u32;

        loop {
            match self.open_socket().await {
                Ok(socket) => {
                    failures = 0;
                    info!("🔗 Conectado al nodo de audio en {}", self.ws_url);

                    let close = self.read_socket(socket).await;
                    *self.session_id.write() = None;

                    warn!(
                        "🔌 Conexión con el nodo cerrada ({}): {}",
                        close.code, close.reason
                    );
                    self.publish(NodeEvent::SocketClosed {
                        code: close.code,
                        reason: close.reason,
                        by_remote: close.by_remote,
                    });
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "⚠️ No se pudo conectar al nodo (intento {}/{}): {}",
                        failures, self.reconnect_attempts, e
                    );
                    if failures > self.reconnect_attempts {
                        error!("❌ Se agotaron los reintentos de conexión con el nodo");
                        return;
                    }
                }
            }

            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    async fn open_socket(&self) -> Result<Socket, NodeError> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| NodeError::Socket(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            self.password
                .parse()
                .map_err(|_| NodeError::Socket("password inválido".to_string()))?,
        );
        headers.insert("User-Id", self.user_id.get().into());
        headers.insert("Client-Name", CLIENT_NAME.parse().map_err(|_| {
            NodeError::Socket("nombre de cliente inválido".to_string())
        })?);

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| NodeError::Socket(e.to_string()))?;
        Ok(socket)
    }

    async fn read_socket(&self, mut socket: Socket) -> SocketClose {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<IncomingMessage>(&text) {
                    Ok(message) => self.dispatch(message),
                    Err(e) => warn!("⚠️ Mensaje del nodo no reconocido: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    return match frame {
                        Some(frame) => SocketClose {
                            code: frame.code.into(),
                            reason: frame.reason.to_string(),
                            by_remote: true,
                        },
                        None => SocketClose {
                            code: 1000,
                            reason: "cerrado sin motivo".to_string(),
                            by_remote: true,
                        },
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    return SocketClose {
                        code: 1006,
                        reason: e.to_string(),
                        by_remote: false,
                    };
                }
            }
        }

        SocketClose {
            code: 1006,
            reason: "el stream terminó".to_string(),
            by_remote: true,
        }
    }

    fn dispatch(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Ready {
                resumed,
                session_id,
            } => {
                info!("✅ Nodo listo (sesión {}, resumida: {})", session_id, resumed);
                *self.session_id.write() = Some(session_id);
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                trace!(
                    "Player {} en {}ms (conectado: {}, ping: {}ms, t={})",
                    guild_id,
                    state.position,
                    state.connected,
                    state.ping,
                    state.time
                );
                if let Some(guild_id) = parse_guild_id(&guild_id) {
                    self.publish(NodeEvent::PlayerUpdated {
                        guild_id,
                        position: Duration::from_millis(state.position),
                    });
                }
            }
            IncomingMessage::Stats(stats) => {
                trace!("📊 Estadísticas del nodo: {}", stats);
            }
            IncomingMessage::Event(event) => match event.into_node_event() {
                Some(event) => self.publish(event),
                None => debug!("Evento del nodo con guild inválido"),
            },
        }
    }

    fn publish(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("Nadie escucha los eventos del nodo");
        }
    }

    fn session_id(&self) -> Result<String, NodeError> {
        self.session_id.read().clone().ok_or(NodeError::NotReady)
    }

    async fn update_player(&self, guild_id: GuildId, body: &UpdatePlayer) -> Result<(), NodeError> {
        let url = format!(
            "{}/sessions/{}/players/{}",
            self.rest_base,
            self.session_id()?,
            guild_id
        );
        let response = self
            .http
            .patch(url)
            .query(&[("noReplace", "false")])
            .json(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn join_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError> {
        let (info, _call) = self
            .songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| NodeError::Voice(e.to_string()))?;

        let body = UpdatePlayer {
            voice: Some(VoiceCredentials {
                token: info.token,
                endpoint: info.endpoint,
                session_id: info.session_id,
                channel_id: Some(channel_id.to_string()),
            }),
            ..Default::default()
        };
        self.update_player(guild_id, &body).await
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
    ) -> Result<NodeHandle, NodeError> {
        self.session_id()?;
        self.join_voice(guild_id, voice_channel).await?;
        self.update_player(
            guild_id,
            &UpdatePlayer {
                volume: Some(self.default_volume),
                ..Default::default()
            },
        )
        .await?;

        info!("🔊 Conectado al canal {} en guild {}", voice_channel, guild_id);
        Ok(NodeHandle {
            guild_id,
            channel_id: voice_channel,
        })
    }

    async fn disconnect(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        if let Err(e) = self.songbird.remove(handle.guild_id).await {
            debug!("Songbird no tenía llamada en {}: {}", handle.guild_id, e);
        }

        // Sin sesión el nodo ya descartó sus players
        let Ok(session) = self.session_id() else {
            return Ok(());
        };
        let url = format!(
            "{}/sessions/{}/players/{}",
            self.rest_base, session, handle.guild_id
        );
        let response = self.http.delete(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;

        info!("👋 Player destruido en guild {}", handle.guild_id);
        Ok(())
    }

    async fn move_channel(
        &self,
        handle: &NodeHandle,
        channel_id: ChannelId,
    ) -> Result<NodeHandle, NodeError> {
        self.join_voice(handle.guild_id, channel_id).await?;
        info!(
            "🔀 Movido de {} a {} en guild {}",
            handle.channel_id, channel_id, handle.guild_id
        );
        Ok(NodeHandle {
            guild_id: handle.guild_id,
            channel_id,
        })
    }

    async fn play(&self, handle: &NodeHandle, track: &Track) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            track: Some(UpdateTrack::play(track)),
            position: Some(0),
            paused: Some(false),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn pause(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            paused: Some(true),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn resume(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            paused: Some(false),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn stop(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            track: Some(UpdateTrack::stop()),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn seek(&self, handle: &NodeHandle, position: Duration) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            position: Some(position.as_millis() as u64),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn set_volume(&self, handle: &NodeHandle, volume: u16) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            volume: Some(volume),
            ..Default::default()
        };
        self.update_player(handle.guild_id, &body).await
    }

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        let response = self
            .http
            .get(format!("{}/loadtracks", self.rest_base))
            .query(&[("identifier", identifier)])
            .send()
            .await?;
        let response: LoadResponse = check(response).await?.json().await?;
        Ok(response.into())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NodeError::Status {
        status: status.as_u16(),
        body,
    })
}

fn http_base(config: &Config) -> String {
    let scheme = if config.lavalink_secure { "https" } else { "http" };
    format!("{}://{}:{}", scheme, config.lavalink_host, config.lavalink_port)
}

fn rest_base(config: &Config) -> String {
    format!("{}/v4", http_base(config))
}

fn ws_url(config: &Config) -> String {
    let scheme = if config.lavalink_secure { "wss" } else { "ws" };
    format!(
        "{}://{}:{}/v4/websocket",
        scheme, config.lavalink_host, config.lavalink_port
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_urls() {
        let mut config = Config::default();
        config.lavalink_host = "lavalink".to_string();
        config.lavalink_port = 2333;
        assert_eq!(rest_base(&config), "http://lavalink:2333/v4");
        assert_eq!(ws_url(&config), "ws://lavalink:2333/v4/websocket");

        config.lavalink_secure = true;
        assert_eq!(rest_base(&config), "https://lavalink:2333/v4");
        assert_eq!(ws_url(&config), "wss://lavalink:2333/v4/websocket");
    }
}
