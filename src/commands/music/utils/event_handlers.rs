//! Songbird event handlers that forward voice events to the orchestrator.

use serenity::all::GuildId;
use serenity::async_trait;
use songbird::events::context_data::DisconnectReason;
use songbird::tracks::PlayMode;
use songbird::{Event, EventContext, EventHandler};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::voice_transport::TransportEvent;

/// Reports the end or failure of one track.
pub struct TrackEventNotifier {
    pub guild_id: GuildId,
    pub connection_id: u64,
    pub track_id: u64,
    pub events: UnboundedSender<TransportEvent>,
}

#[async_trait]
impl EventHandler for TrackEventNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        let failure = tracks.iter().find_map(|(state, _)| match &state.playing {
            PlayMode::Errored(e) => Some(format!("{:?}", e)),
            _ => None,
        });

        let event = match failure {
            Some(reason) => TransportEvent::PlayerError {
                guild_id: self.guild_id,
                connection_id: self.connection_id,
                track_id: self.track_id,
                reason,
            },
            None => TransportEvent::Idle {
                guild_id: self.guild_id,
                connection_id: self.connection_id,
                track_id: self.track_id,
            },
        };

        if self.events.send(event).is_err() {
            debug!("Orchestrator gone, dropping track event for guild {}", self.guild_id);
        }
        None
    }
}

/// Reports driver disconnects that were not requested by us.
pub struct DriverDisconnectNotifier {
    pub guild_id: GuildId,
    pub connection_id: u64,
    pub events: UnboundedSender<TransportEvent>,
}

#[async_trait]
impl EventHandler for DriverDisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::DriverDisconnect(data) = ctx else {
            return None;
        };

        // No reason means the disconnect was requested.
        let Some(reason) = &data.reason else {
            return None;
        };

        let event = match reason {
            DisconnectReason::Internal
            | DisconnectReason::Io
            | DisconnectReason::TimedOut
            | DisconnectReason::WsClosed(_) => TransportEvent::Disconnected {
                guild_id: self.guild_id,
                connection_id: self.connection_id,
            },
            other => TransportEvent::ConnectionError {
                guild_id: self.guild_id,
                connection_id: self.connection_id,
                reason: format!("{:?}", other),
            },
        };

        warn!("Voice driver disconnected in guild {}: {:?}", self.guild_id, reason);
        if self.events.send(event).is_err() {
            debug!("Orchestrator gone, dropping disconnect for guild {}", self.guild_id);
        }
        None
    }
}
