//! Sample data used across the integration tests.

use std::time::Duration;

use fake::Fake;
use fake::faker::lorem::en::Words;
use groove::commands::music::utils::guild_queue::Track;
use serenity::all::{ChannelId, GuildId, UserId};

pub const GUILD: GuildId = GuildId::new(1_000);
pub const VOICE_CHANNEL: ChannelId = ChannelId::new(2_000);
pub const TEXT_CHANNEL: ChannelId = ChannelId::new(3_000);
pub const REQUESTER: UserId = UserId::new(4_000);

/// A YouTube track with a made-up title and the given 11-character id.
pub fn youtube_track(video_id: &str) -> Track {
    let words: Vec<String> = Words(2..5).fake();
    Track::new(
        words.join(" "),
        format!("https://www.youtube.com/watch?v={}", video_id),
        REQUESTER,
    )
    .with_duration(Duration::from_secs((90u64..600).fake::<u64>()))
    .with_author("Test Artist")
}

/// Tracks `aaaaaaaaaa0`, `aaaaaaaaaa1`... in order.
pub fn youtube_tracks(count: usize) -> Vec<Track> {
    (0..count)
        .map(|i| youtube_track(&format!("aaaaaaaaaa{}", i)))
        .collect()
}
