use serenity::all::{ActivityData, Message, OnlineStatus, Ready};
use serenity::async_trait;
use serenity::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

use crate::utils::database::{DataStore, STAT_BOT_STARTS, STAT_DMS_RECEIVED};

const STATUS_ROTATION: Duration = Duration::from_secs(15);

/// Presence entries cycled while the bot is online.
fn statuses(prefix: &str) -> Vec<ActivityData> {
    vec![
        ActivityData::listening("/play"),
        ActivityData::playing(format!("{}help", prefix)),
        ActivityData::watching("the queue"),
    ]
}

pub struct Handler {
    store: Arc<DataStore>,
    prefix: String,
    rotating: AtomicBool,
}

impl Handler {
    pub fn new(store: Arc<DataStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            rotating: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
        info!("Serving {} servers", ready.guilds.len());

        if let Err(e) = self.store.update_stat(STAT_BOT_STARTS, 1) {
            error!("Failed to record bot start: {}", e);
        }

        // Ready fires again after a resume; keep a single rotation task.
        if self.rotating.swap(true, Ordering::SeqCst) {
            return;
        }

        let statuses = statuses(&self.prefix);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATUS_ROTATION);
            for activity in statuses.iter().cycle() {
                interval.tick().await;
                ctx.set_presence(Some(activity.clone()), OnlineStatus::Online);
            }
        });
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id.is_some() {
            return;
        }

        let attachments: Vec<String> = msg.attachments.iter().map(|a| a.url.clone()).collect();
        info!("DM from {}: {}", msg.author.name, msg.content);

        if let Err(e) = self
            .store
            .save_dm(msg.author.id, &msg.author.name, &msg.content, &attachments)
            .and_then(|_| self.store.update_stat(STAT_DMS_RECEIVED, 1))
        {
            error!("Failed to store DM from {}: {}", msg.author.id, e);
        }
    }
}
