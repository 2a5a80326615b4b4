//! Dialog engine: the per-user state machine.
//!
//! `transition` is a pure decision over (session, input): it reads from the
//! record store but never writes. Writes come back as `PersistAction`s so
//! the caller can apply them before committing the new session.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;

use super::command::{Intent, IntentParser};
use super::texts;
use crate::channels::{IncomingMessage, OutgoingResponse};
use crate::clock::{Clock, system_clock};
use crate::error::DialogError;
use crate::reminders::model::parse_time_of_day;
use crate::session::{
    DialogStep, DiaryStep, QuestionnaireStep, RegistrationStep, ReminderStep, Session, Step,
};
use crate::store::{QuestionnaireSubmission, RecordStore, UserId};

/// Answer keys used by the reminder flow.
const FIELD_REMINDER_MESSAGE: &str = "reminder_message";
const FIELD_REMINDER_TIME: &str = "reminder_time";
const FIELD_REPEAT_COUNT: &str = "repeat_count";

/// Interaction category recorded once per registered user.
const NEW_USER_CATEGORY: &str = "new user";

/// A write the caller must perform before committing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistAction {
    SetUsername {
        username: String,
    },
    AppendInteraction {
        category: String,
        text: String,
    },
    AppendQuestionnaire(QuestionnaireSubmission),
    AppendDiary {
        text: String,
        written_at: NaiveDateTime,
    },
    ScheduleReminder {
        message: String,
        time_label: String,
        repeat_count: u32,
    },
}

/// Outcome of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The session to commit. `None` destroys it.
    pub session: Option<Session>,
    pub replies: Vec<OutgoingResponse>,
    pub actions: Vec<PersistAction>,
    /// Flow replies are paced with a typing pause; command replies are not.
    pub paced: bool,
}

impl Transition {
    fn to(session: Option<Session>) -> Self {
        Self {
            session,
            replies: Vec::new(),
            actions: Vec::new(),
            paced: true,
        }
    }

    fn immediate(session: Option<Session>) -> Self {
        Self {
            paced: false,
            ..Self::to(session)
        }
    }

    fn reply(mut self, response: OutgoingResponse) -> Self {
        self.replies.push(response);
        self
    }

    fn action(mut self, action: PersistAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// The menu prompt with the four feature buttons.
fn menu() -> OutgoingResponse {
    OutgoingResponse::with_options(texts::MENU_PROMPT, texts::MENU_OPTIONS)
}

fn features() -> Option<Session> {
    Some(Session::start(Step::Dialog(DialogStep::Features)))
}

fn is_choice(input: &str, label: &str) -> bool {
    input.trim().to_lowercase() == label.to_lowercase()
}

fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

/// The state machine driving every flow.
pub struct DialogEngine {
    store: Arc<dyn RecordStore>,
    clock: Clock,
}

impl DialogEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            clock: system_clock(),
        }
    }

    /// Use a different time source for captured timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Decide the next session, replies, and writes for one input.
    ///
    /// Validation failures never surface as errors: they become a re-prompt
    /// with the session left as it was.
    pub async fn transition(
        &self,
        msg: &IncomingMessage,
        session: Option<Session>,
    ) -> Result<Transition, DialogError> {
        if let Some(intent) = IntentParser::parse(&msg.content) {
            return self.handle_intent(intent, msg, session).await;
        }

        let Some(session) = session else {
            return self.start(msg).await;
        };

        let current = session.clone();
        match self.handle_step(msg, session).await {
            Err(DialogError::Validation { field, reason }) => {
                tracing::debug!(
                    user_id = msg.user_id,
                    step = %current.step,
                    field = %field,
                    reason = %reason,
                    "Rejected input, re-prompting"
                );
                Ok(reprompt(current, &field))
            }
            other => other,
        }
    }

    // ── Global intents ──────────────────────────────────────────────

    async fn handle_intent(
        &self,
        intent: Intent,
        msg: &IncomingMessage,
        session: Option<Session>,
    ) -> Result<Transition, DialogError> {
        match intent {
            Intent::Start => self.start(msg).await,
            Intent::Cancel => {
                let Some(session) = session else {
                    return Ok(Transition::immediate(None));
                };
                tracing::info!(user_id = msg.user_id, step = %session.step, "Session cancelled");
                Ok(Transition::immediate(None).reply(OutgoingResponse::text(texts::CANCELLED)))
            }
            Intent::Help => {
                let text = match self.store.get_username(msg.user_id).await? {
                    Some(_) => help_text(),
                    None => texts::NOT_REGISTERED.to_string(),
                };
                Ok(Transition::immediate(session).reply(OutgoingResponse::text(text)))
            }
            Intent::About => {
                Ok(Transition::immediate(session).reply(OutgoingResponse::text(texts::ABOUT)))
            }
            Intent::Question(Some(text)) => {
                tracing::info!(user_id = msg.user_id, question = %text, "Question received");
                Ok(Transition::immediate(session)
                    .action(PersistAction::AppendInteraction {
                        category: "question".into(),
                        text,
                    })
                    .reply(OutgoingResponse::text(texts::QUESTION_RECEIVED)))
            }
            Intent::Question(None) => Ok(Transition::immediate(session)
                .reply(OutgoingResponse::text(texts::QUESTION_USAGE))),
        }
    }

    /// Fresh session: registration for strangers, dialog for known users.
    async fn start(&self, msg: &IncomingMessage) -> Result<Transition, DialogError> {
        match self.store.get_username(msg.user_id).await? {
            None => Ok(Transition::to(Some(Session::start(Step::Registration(
                RegistrationStep::Start,
            ))))
            .reply(OutgoingResponse::with_options(
                texts::WELCOME_NEW,
                [texts::OPTION_YES, texts::OPTION_CANCEL],
            ))),
            Some(username) => Ok(Transition::to(Some(Session::start(Step::Dialog(
                DialogStep::Start,
            ))))
            .reply(OutgoingResponse::text(texts::welcome_back(&username)))),
        }
    }

    // ── Step table ──────────────────────────────────────────────────

    async fn handle_step(
        &self,
        msg: &IncomingMessage,
        session: Session,
    ) -> Result<Transition, DialogError> {
        let step = session.step;
        match step {
            Step::Registration(step) => self.registration(step, msg, session).await,
            Step::Dialog(DialogStep::Start) => Ok(Transition::to(features())
                .reply(OutgoingResponse::text(pick(texts::GREETINGS)))
                .reply(menu())),
            Step::Dialog(DialogStep::Features) => Ok(self.features(msg, session)),
            Step::Questionnaire(step) => Ok(self.questionnaire(step, msg, session)),
            Step::Reminder(step) => reminder(step, msg, session),
            Step::Diary(step) => self.diary(step, msg, session).await,
        }
    }

    async fn registration(
        &self,
        step: RegistrationStep,
        msg: &IncomingMessage,
        session: Session,
    ) -> Result<Transition, DialogError> {
        match step {
            RegistrationStep::Start => Ok(Transition::to(Some(
                session.advance(Step::Registration(RegistrationStep::Username)),
            ))
            .reply(OutgoingResponse::with_options(
                texts::ask_name(display_name(msg)),
                [texts::OPTION_YES],
            ))),
            RegistrationStep::Username => {
                let next = Some(Session::start(Step::Dialog(DialogStep::Start)));

                if let Some(existing) = self.store.get_username(msg.user_id).await? {
                    let mut transition = Transition::to(next)
                        .reply(OutgoingResponse::text(texts::welcome_back(&existing)));
                    // A name without its audit record means an earlier attempt
                    // stopped between the two writes.
                    if !self.has_new_user_record(msg.user_id).await? {
                        tracing::info!(user_id = msg.user_id, "Completing interrupted registration");
                        transition = transition.action(new_user_record(msg.user_id));
                    }
                    return Ok(transition);
                }

                let username = if is_choice(&msg.content, texts::OPTION_YES) {
                    display_name(msg).to_string()
                } else {
                    msg.content.clone()
                };
                tracing::info!(user_id = msg.user_id, username = %username, "New user registered");

                Ok(Transition::to(next)
                    .action(PersistAction::SetUsername {
                        username: username.clone(),
                    })
                    .action(new_user_record(msg.user_id))
                    .reply(OutgoingResponse::text(texts::welcome_back(&username))))
            }
        }
    }

    async fn has_new_user_record(&self, user_id: UserId) -> Result<bool, DialogError> {
        let records = self.store.list_interactions(user_id).await?;
        Ok(records.iter().any(|r| r.category == NEW_USER_CATEGORY))
    }

    fn features(&self, msg: &IncomingMessage, session: Session) -> Transition {
        let input = msg.content.as_str();

        if is_choice(input, texts::MENU_FACT) {
            Transition::to(Some(session))
                .reply(OutgoingResponse::text(texts::FACT_LEAD_IN))
                .reply(OutgoingResponse::text(pick(texts::FACTS)))
                .reply(OutgoingResponse::text(texts::FACT_LEAD_OUT))
                .reply(menu())
        } else if is_choice(input, texts::MENU_QUESTIONNAIRE) {
            Transition::to(Some(Session::start(Step::Questionnaire(
                QuestionnaireStep::Mood,
            ))))
            .reply(OutgoingResponse::text(texts::ASK_MOOD))
        } else if is_choice(input, texts::MENU_REMINDERS) {
            Transition::to(Some(Session::start(Step::Reminder(
                ReminderStep::TimeChoose,
            ))))
            .reply(OutgoingResponse::text(texts::ASK_REMINDER_TEXT))
        } else if is_choice(input, texts::MENU_DIARY) {
            Transition::to(Some(Session::start(Step::Diary(DiaryStep::Start))))
                .reply(diary_options())
        } else {
            Transition::to(Some(session)).reply(menu())
        }
    }

    fn questionnaire(
        &self,
        step: QuestionnaireStep,
        msg: &IncomingMessage,
        session: Session,
    ) -> Transition {
        if let Some(next) = step.next() {
            let prompt = match next {
                QuestionnaireStep::Mood => texts::ASK_MOOD,
                QuestionnaireStep::Pressure => texts::ASK_PRESSURE,
                QuestionnaireStep::Temperature => texts::ASK_TEMPERATURE,
                QuestionnaireStep::BloodSugar => texts::ASK_BLOOD_SUGAR,
            };
            let session = session.capture(step.field(), &msg.content, Step::Questionnaire(next));
            return Transition::to(Some(session)).reply(OutgoingResponse::text(prompt));
        }

        let answer = |field: &str| session.answer(field).unwrap_or_default().to_string();
        let submission = QuestionnaireSubmission {
            user_id: msg.user_id,
            submitted_at: (self.clock)(),
            mood: answer(QuestionnaireStep::Mood.field()),
            pressure: answer(QuestionnaireStep::Pressure.field()),
            temperature: answer(QuestionnaireStep::Temperature.field()),
            blood_sugar: msg.content.clone(),
        };

        Transition::to(features())
            .action(PersistAction::AppendQuestionnaire(submission))
            .reply(OutgoingResponse::text(texts::QUESTIONNAIRE_DONE))
            .reply(menu())
    }

    async fn diary(
        &self,
        step: DiaryStep,
        msg: &IncomingMessage,
        session: Session,
    ) -> Result<Transition, DialogError> {
        match step {
            DiaryStep::Start if is_choice(&msg.content, texts::DIARY_WRITE) => Ok(Transition::to(
                Some(session.advance(Step::Diary(DiaryStep::Write))),
            )
            .reply(OutgoingResponse::text(texts::DIARY_ASK_ENTRY))),
            DiaryStep::Start if is_choice(&msg.content, texts::DIARY_READ) => {
                let entries = self.store.list_diary(msg.user_id).await?;
                let mut transition =
                    Transition::to(features()).reply(OutgoingResponse::text(texts::DIARY_HEADER));
                if entries.is_empty() {
                    transition = transition.reply(OutgoingResponse::text(texts::DIARY_EMPTY));
                }
                for entry in entries {
                    transition = transition.reply(OutgoingResponse::text(format!(
                        "Entry from {} {}:\n\t{}",
                        entry.written_at.format("%Y-%m-%d"),
                        entry.written_at.format("%H:%M:%S"),
                        entry.text
                    )));
                }
                Ok(transition.reply(menu()))
            }
            DiaryStep::Start => Ok(Transition::to(Some(session)).reply(diary_options())),
            DiaryStep::Write => Ok(Transition::to(features())
                .action(PersistAction::AppendDiary {
                    text: msg.content.clone(),
                    written_at: (self.clock)(),
                })
                .reply(OutgoingResponse::text(texts::DIARY_SAVED))
                .reply(menu())),
        }
    }
}

fn reminder(
    step: ReminderStep,
    msg: &IncomingMessage,
    session: Session,
) -> Result<Transition, DialogError> {
    let input = msg.content.trim();
    match step {
        ReminderStep::TimeChoose => Ok(Transition::to(Some(session.capture(
            FIELD_REMINDER_MESSAGE,
            &msg.content,
            Step::Reminder(ReminderStep::DateChoose),
        )))
        .reply(time_options(texts::ASK_REMINDER_TIME))),
        ReminderStep::DateChoose => {
            parse_time_of_day(input)
                .map_err(|e| DialogError::validation(FIELD_REMINDER_TIME, e.to_string()))?;
            Ok(Transition::to(Some(session.capture(
                FIELD_REMINDER_TIME,
                input,
                Step::Reminder(ReminderStep::Finish),
            )))
            .reply(count_options(texts::ASK_REMINDER_COUNT)))
        }
        ReminderStep::Finish => {
            let repeat_count: u32 = input
                .parse()
                .map_err(|_| DialogError::validation(FIELD_REPEAT_COUNT, "not a whole number"))?;
            if repeat_count == 0 {
                return Err(DialogError::validation(FIELD_REPEAT_COUNT, "must be at least 1"));
            }
            let message = session
                .answer(FIELD_REMINDER_MESSAGE)
                .unwrap_or_default()
                .to_string();
            let time_label = session
                .answer(FIELD_REMINDER_TIME)
                .unwrap_or_default()
                .to_string();

            Ok(Transition::to(features())
                .reply(OutgoingResponse::text(texts::reminder_confirmed(&time_label)))
                .reply(menu())
                .action(PersistAction::ScheduleReminder {
                    message,
                    time_label,
                    repeat_count,
                }))
        }
    }
}

/// The re-prompt for a rejected answer, keeping the session as it was.
fn reprompt(session: Session, field: &str) -> Transition {
    let response = match field {
        FIELD_REMINDER_TIME => time_options(texts::INVALID_REMINDER_TIME),
        FIELD_REPEAT_COUNT => count_options(texts::INVALID_REMINDER_COUNT),
        _ => OutgoingResponse::text(texts::FAILURE),
    };
    Transition::to(Some(session)).reply(response)
}

fn time_options(prompt: &str) -> OutgoingResponse {
    OutgoingResponse::with_options(prompt, texts::REMINDER_TIME_OPTIONS)
}

fn count_options(prompt: &str) -> OutgoingResponse {
    OutgoingResponse::with_options(prompt, texts::REMINDER_COUNT_OPTIONS)
}

fn diary_options() -> OutgoingResponse {
    OutgoingResponse::with_options(texts::DIARY_PROMPT, [texts::DIARY_WRITE, texts::DIARY_READ])
}

fn new_user_record(user_id: UserId) -> PersistAction {
    PersistAction::AppendInteraction {
        category: NEW_USER_CATEGORY.into(),
        text: user_id.to_string(),
    }
}

fn display_name(msg: &IncomingMessage) -> &str {
    let name = msg.user_name.trim();
    if name.is_empty() { "friend" } else { name }
}

fn help_text() -> String {
    let commands: Vec<String> = texts::COMMANDS
        .iter()
        .map(|c| format!("/{} - {}", c.command, c.description))
        .collect();
    format!("{}\n{}", texts::HELP, commands.join("\n"))
}
