//! Discord Gateway shim.
//!
//! Converts serenity events into [`ChatEvent`]s for the router. Handling
//! errors are logged here and never reach serenity.

use std::sync::Arc;

use serenity::all::{
    Context, EventHandler, GatewayIntents, GuildChannel, Message, MessageType, MessageUpdateEvent,
    Ready,
};
use serenity::async_trait;
use serenity::Client;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatEvent, ChatMessage};
use crate::router::{EventRouter, RouteOutcome};

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

pub struct SyncEventHandler {
    router: Arc<EventRouter>,
}

impl SyncEventHandler {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    async fn dispatch(&self, event: ChatEvent) {
        match self.router.handle(event).await {
            Ok(RouteOutcome::Ignored(_)) => {}
            Ok(outcome) => debug!("chat event handled: {:?}", outcome),
            Err(err) => error!("failed to handle chat event: {}", err),
        }
    }
}

fn is_user_message(message: &Message) -> bool {
    !message.author.bot && matches!(message.kind, MessageType::Regular | MessageType::InlineReply)
}

/// Unknown previous names count as a rename.
fn is_rename(old_name: Option<&str>, new_name: &str) -> bool {
    old_name != Some(new_name)
}

#[async_trait]
impl EventHandler for SyncEventHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if !is_user_message(&msg) {
            return;
        }
        self.dispatch(ChatEvent::MessageCreated(ChatMessage::from_discord(&msg)))
            .await;
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if event.author.as_ref().is_some_and(|author| author.bot) {
            return;
        }
        // The update payload is partial; edits need the full message.
        let msg = match ctx.http.get_message(event.channel_id, event.id).await {
            Ok(msg) => msg,
            Err(err) => {
                warn!("failed to fetch edited message {}: {}", event.id, err);
                return;
            }
        };
        if !is_user_message(&msg) {
            return;
        }
        self.dispatch(ChatEvent::MessageEdited(ChatMessage::from_discord(&msg)))
            .await;
    }

    async fn thread_update(&self, _ctx: Context, old: Option<GuildChannel>, new: GuildChannel) {
        if !is_rename(old.as_ref().map(|old| old.name.as_str()), &new.name) {
            return;
        }
        self.dispatch(ChatEvent::ThreadRenamed {
            thread_id: new.id.to_string(),
            name: new.name,
        })
        .await;
    }
}

/// Build the gateway client with the sync handler attached.
pub async fn build_client(token: &str, router: Arc<EventRouter>) -> Result<Client, serenity::Error> {
    Client::builder(token, intents())
        .event_handler(SyncEventHandler::new(router))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_message(kind: MessageType) -> Message {
        let mut msg = Message::default();
        msg.kind = kind;
        msg.author.name = "ada".to_string();
        msg.content = "hello".to_string();
        msg
    }

    #[test]
    fn routes_plain_messages_and_inline_replies() {
        assert!(is_user_message(&user_message(MessageType::Regular)));
        assert!(is_user_message(&user_message(MessageType::InlineReply)));
    }

    #[test]
    fn skips_bot_authors() {
        let mut msg = user_message(MessageType::Regular);
        msg.author.bot = true;
        assert!(!is_user_message(&msg));
    }

    #[test]
    fn skips_system_messages() {
        for kind in [
            MessageType::ThreadStarterMessage,
            MessageType::ThreadCreated,
            MessageType::GroupNameUpdate,
            MessageType::MemberJoin,
        ] {
            assert!(!is_user_message(&user_message(kind)), "{:?}", kind);
        }
    }

    #[test]
    fn unchanged_thread_name_is_not_a_rename() {
        assert!(!is_rename(Some("Login broken"), "Login broken"));
        assert!(is_rename(Some("Login broken"), "Login broken on Safari"));
        assert!(is_rename(None, "Login broken"));
    }
}
