//! Bot service: runs transitions and applies their writes before committing.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::dispatcher::Dispatcher;
use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::clock::Clock;
use crate::dialog::{DialogEngine, PersistAction, Transition, texts};
use crate::error::{DialogError, Error};
use crate::reminders::ReminderScheduler;
use crate::session::SessionManager;
use crate::store::{RecordStore, UserId};

/// Shared handles the service is built from.
pub struct BotDeps {
    pub store: Arc<dyn RecordStore>,
    pub channel: Arc<dyn Channel>,
    pub scheduler: Arc<ReminderScheduler>,
}

/// The explicitly constructed bot context.
pub struct BotService {
    engine: DialogEngine,
    sessions: SessionManager,
    deps: BotDeps,
    reply_delay: Duration,
}

impl BotService {
    pub fn new(deps: BotDeps, reply_delay: Duration) -> Self {
        Self {
            engine: DialogEngine::new(Arc::clone(&deps.store)),
            sessions: SessionManager::new(),
            deps,
            reply_delay,
        }
    }

    /// Use a different time source for captured timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.engine = DialogEngine::new(Arc::clone(&self.deps.store)).with_clock(clock);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.deps.scheduler
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C or the channel stream ends.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let channel = Arc::clone(&self.deps.channel);
        let mut message_stream = channel.start().await?;

        if let Err(e) = channel.register_commands(&texts::COMMANDS).await {
            tracing::warn!("Failed to register command menu: {e}");
        }
        self.deps.scheduler.restore().await?;

        let mut dispatcher = Dispatcher::new(Arc::clone(&self));
        tracing::info!(channel = channel.name(), "Bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };
            dispatcher.dispatch(message);
        }

        // Cleanup
        dispatcher.close().await;
        self.deps.scheduler.shutdown().await;
        channel.shutdown().await?;
        Ok(())
    }

    // ── Message handling ────────────────────────────────────────────

    /// Handle one inbound message end to end. Failures are logged and
    /// answered with a generic notice; the session is left as it was.
    pub async fn handle_message(&self, msg: &IncomingMessage) {
        tracing::debug!(
            user_id = msg.user_id,
            channel = %msg.channel,
            chars = msg.content.len(),
            "Received message"
        );

        match self.process(msg).await {
            Ok(transition) => self.deliver(msg.user_id, transition).await,
            Err(e) => {
                tracing::error!(user_id = msg.user_id, "Error handling message: {e}");
                self.send(msg.user_id, OutgoingResponse::text(texts::FAILURE))
                    .await;
            }
        }
    }

    /// Transition, apply writes, then commit, all under the user's slot lock.
    async fn process(&self, msg: &IncomingMessage) -> Result<Transition, Error> {
        let slot = self.sessions.slot(msg.user_id).await;
        let mut current = slot.lock().await;

        let transition = self.engine.transition(msg, current.clone()).await?;
        for action in &transition.actions {
            self.apply(msg.user_id, action).await?;
        }

        match &transition.session {
            Some(session) => {
                tracing::debug!(user_id = msg.user_id, step = %session.step, "Session committed");
            }
            None => tracing::trace!(user_id = msg.user_id, "Session cleared"),
        }
        *current = transition.session.clone();
        drop(current);
        drop(slot);

        if transition.session.is_none() {
            self.sessions.release(msg.user_id).await;
        }
        Ok(transition)
    }

    async fn apply(&self, user_id: UserId, action: &PersistAction) -> Result<(), Error> {
        let store = &self.deps.store;
        match action {
            PersistAction::SetUsername { username } => {
                match store.set_username(user_id, username).await {
                    Err(e) if e.is_conflict() => {
                        tracing::debug!(user_id, "Username already set, keeping existing");
                    }
                    other => other.map_err(DialogError::from)?,
                }
            }
            PersistAction::AppendInteraction { category, text } => store
                .append_interaction(user_id, category, text)
                .await
                .map_err(DialogError::from)?,
            PersistAction::AppendQuestionnaire(submission) => store
                .append_questionnaire(submission)
                .await
                .map_err(DialogError::from)?,
            PersistAction::AppendDiary { text, written_at } => store
                .append_diary(user_id, text, *written_at)
                .await
                .map_err(DialogError::from)?,
            PersistAction::ScheduleReminder {
                message,
                time_label,
                repeat_count,
            } => {
                self.deps
                    .scheduler
                    .schedule(user_id, message, time_label, *repeat_count)
                    .await?;
            }
        }
        Ok(())
    }

    async fn deliver(&self, user_id: UserId, transition: Transition) {
        if transition.replies.is_empty() {
            return;
        }
        if transition.paced && !self.reply_delay.is_zero() {
            if let Err(e) = self.deps.channel.send_typing(user_id).await {
                tracing::debug!(user_id, "Typing indicator failed: {e}");
            }
            tokio::time::sleep(self.reply_delay).await;
        }
        for reply in transition.replies {
            self.send(user_id, reply).await;
        }
    }

    async fn send(&self, user_id: UserId, response: OutgoingResponse) {
        if let Err(e) = self.deps.channel.send(user_id, response).await {
            tracing::warn!(user_id, "Failed to send reply: {e}");
        }
    }
}
