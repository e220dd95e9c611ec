use std::time::Duration;

pub mod audio_acquirer;
pub mod embedded_messages;
pub mod event_handlers;
pub mod extractor_process;
pub mod guild_queue;
pub mod music_manager;
pub mod notifier;
pub mod stream_resolvers;
pub mod voice_transport;
pub mod ytdlp_binary;

/// Format a duration as "3:45" or "1:23:45". A zero duration means a live
/// stream or an unknown length.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    if total_seconds == 0 {
        return "Live".to_string();
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
