//! Dobles en memoria del nodo de audio y de Discord para los tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::{
    builder::CreateEmbed,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    audio::{
        node::{AudioNode, LoadResult, NodeError, NodeHandle},
        queue::Track,
    },
    bot::chat::ChatPlatform,
};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeCall {
    Connect(GuildId, ChannelId),
    Disconnect(GuildId),
    Move(GuildId, ChannelId),
    Play(GuildId, String),
    Pause(GuildId),
    Resume(GuildId),
    Stop(GuildId),
    Seek(GuildId, Duration),
    Volume(GuildId, u16),
}

#[derive(Default)]
pub struct FakeNode {
    calls: Mutex<Vec<NodeCall>>,
    fail_connect: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    load_result: Mutex<Option<LoadResult>>,
    loaded: Mutex<Vec<String>>,
    /// Títulos que el nodo rechaza al reproducir
    rejected: Mutex<Vec<String>>,
    /// Tracks recibidos en `play`, con su `play_id`
    sent: Mutex<Vec<Track>>,
}

impl FakeNode {
    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    /// Títulos enviados a reproducir, en orden
    pub fn played(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                NodeCall::Play(_, title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    pub fn set_load_result(&self, result: LoadResult) {
        *self.load_result.lock() = Some(result);
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }

    pub fn reject_titles(&self, titles: &[&str]) {
        *self.rejected.lock() = titles.iter().map(|title| title.to_string()).collect();
    }

    /// Último track enviado a reproducir
    pub fn last_sent(&self) -> Option<Track> {
        self.sent.lock().last().cloned()
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
    ) -> Result<NodeHandle, NodeError> {
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(NodeCall::Connect(guild_id, voice_channel));

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(NodeError::Voice("permiso denegado".to_string()));
        }
        Ok(NodeHandle {
            guild_id,
            channel_id: voice_channel,
        })
    }

    async fn disconnect(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        self.record(NodeCall::Disconnect(handle.guild_id));
        Ok(())
    }

    async fn move_channel(
        &self,
        handle: &NodeHandle,
        channel_id: ChannelId,
    ) -> Result<NodeHandle, NodeError> {
        self.record(NodeCall::Move(handle.guild_id, channel_id));
        Ok(NodeHandle {
            guild_id: handle.guild_id,
            channel_id,
        })
    }

    async fn play(&self, handle: &NodeHandle, track: &Track) -> Result<(), NodeError> {
        self.record(NodeCall::Play(handle.guild_id, track.title.clone()));
        self.sent.lock().push(track.clone());

        if self.rejected.lock().contains(&track.title) {
            return Err(NodeError::Status {
                status: 400,
                body: format!("no se pudo cargar {}", track.title),
            });
        }
        Ok(())
    }

    async fn pause(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        self.record(NodeCall::Pause(handle.guild_id));
        Ok(())
    }

    async fn resume(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        self.record(NodeCall::Resume(handle.guild_id));
        Ok(())
    }

    async fn stop(&self, handle: &NodeHandle) -> Result<(), NodeError> {
        self.record(NodeCall::Stop(handle.guild_id));
        Ok(())
    }

    async fn seek(&self, handle: &NodeHandle, position: Duration) -> Result<(), NodeError> {
        self.record(NodeCall::Seek(handle.guild_id, position));
        Ok(())
    }

    async fn set_volume(&self, handle: &NodeHandle, volume: u16) -> Result<(), NodeError> {
        self.record(NodeCall::Volume(handle.guild_id, volume));
        Ok(())
    }

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        self.loaded.lock().push(identifier.to_string());
        Ok(self.load_result.lock().clone().unwrap_or(LoadResult::Empty))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Send(ChannelId, MessageId),
    Edit(ChannelId, MessageId),
    Delete(ChannelId, MessageId),
    React(MessageId, String),
}

pub struct FakeChat {
    calls: Mutex<Vec<ChatCall>>,
    /// Embeds enviados, serializados para poder inspeccionarlos
    embeds: Mutex<Vec<(ChannelId, serde_json::Value)>>,
    next_id: AtomicU64,
    can_react: AtomicBool,
}

impl Default for FakeChat {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            embeds: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            can_react: AtomicBool::new(true),
        }
    }
}

impl FakeChat {
    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&ChatCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    /// Títulos de los embeds enviados a `channel`
    pub fn titles_in(&self, channel: ChannelId) -> Vec<String> {
        self.embeds
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .filter_map(|(_, embed)| embed["title"].as_str().map(str::to_string))
            .collect()
    }

    pub fn set_can_react(&self, can_react: bool) {
        self.can_react.store(can_react, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn send_embed(&self, channel: ChannelId, embed: CreateEmbed) -> Result<MessageId> {
        let message = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.embeds
            .lock()
            .push((channel, serde_json::to_value(&embed)?));
        self.calls.lock().push(ChatCall::Send(channel, message));
        Ok(message)
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        _embed: CreateEmbed,
    ) -> Result<()> {
        self.calls.lock().push(ChatCall::Edit(channel, message));
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        self.calls.lock().push(ChatCall::Delete(channel, message));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        glyph: &str,
    ) -> Result<()> {
        self.calls
            .lock()
            .push(ChatCall::React(message, glyph.to_string()));
        Ok(())
    }

    fn can_send(&self, _channel: ChannelId) -> bool {
        true
    }

    fn can_add_reactions(&self, _channel: ChannelId) -> bool {
        self.can_react.load(Ordering::SeqCst)
    }
}
