//! Dialog state: which step of which flow a user is in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The flow a session belongs to. A user with no session has no flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Registration,
    Dialog,
    Questionnaire,
    Reminder,
    Diary,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registration => "registration",
            Self::Dialog => "dialog",
            Self::Questionnaire => "questionnaire",
            Self::Reminder => "reminder",
            Self::Diary => "diary",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Start,
    Username,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStep {
    Start,
    Features,
}

/// Questionnaire steps, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionnaireStep {
    Mood,
    Pressure,
    Temperature,
    BloodSugar,
}

impl QuestionnaireStep {
    /// Answer key under which this step's input is stored.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Mood => "mood",
            Self::Pressure => "pressure",
            Self::Temperature => "temperature",
            Self::BloodSugar => "blood_sugar",
        }
    }

    /// The step that follows, or `None` after the last capture.
    pub fn next(&self) -> Option<QuestionnaireStep> {
        match self {
            Self::Mood => Some(Self::Pressure),
            Self::Pressure => Some(Self::Temperature),
            Self::Temperature => Some(Self::BloodSugar),
            Self::BloodSugar => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStep {
    /// Waiting for the reminder text.
    TimeChoose,
    /// Waiting for the time-of-day label.
    DateChoose,
    /// Waiting for the repeat count.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiaryStep {
    Start,
    Write,
}

/// Flow × step as one closed union. Adding a step means adding a variant,
/// and every `match` over `Step` must then handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", content = "step", rename_all = "snake_case")]
pub enum Step {
    Registration(RegistrationStep),
    Dialog(DialogStep),
    Questionnaire(QuestionnaireStep),
    Reminder(ReminderStep),
    Diary(DiaryStep),
}

impl Step {
    pub fn flow(&self) -> Flow {
        match self {
            Self::Registration(_) => Flow::Registration,
            Self::Dialog(_) => Flow::Dialog,
            Self::Questionnaire(_) => Flow::Questionnaire,
            Self::Reminder(_) => Flow::Reminder,
            Self::Diary(_) => Flow::Diary,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            Self::Registration(RegistrationStep::Start) => "start",
            Self::Registration(RegistrationStep::Username) => "username",
            Self::Dialog(DialogStep::Start) => "start",
            Self::Dialog(DialogStep::Features) => "features",
            Self::Questionnaire(s) => s.field(),
            Self::Reminder(ReminderStep::TimeChoose) => "time_choose",
            Self::Reminder(ReminderStep::DateChoose) => "date_choose",
            Self::Reminder(ReminderStep::Finish) => "finish",
            Self::Diary(DiaryStep::Start) => "start",
            Self::Diary(DiaryStep::Write) => "write",
        };
        write!(f, "{}/{step}", self.flow())
    }
}

/// A user's in-progress dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub step: Step,
    /// Captured answers for the current flow, keyed by field name.
    pub answers: HashMap<String, String>,
}

impl Session {
    /// Start a flow at the given step with no answers. Starting a new flow
    /// always replaces the previous session wholesale.
    pub fn start(step: Step) -> Self {
        Self {
            step,
            answers: HashMap::new(),
        }
    }

    pub fn flow(&self) -> Flow {
        self.step.flow()
    }

    /// Move to another step of the same flow, keeping answers.
    pub fn advance(mut self, step: Step) -> Self {
        debug_assert_eq!(self.step.flow(), step.flow(), "advance stays within a flow");
        self.step = step;
        self
    }

    /// Store a captured answer and move on.
    pub fn capture(mut self, field: &str, value: &str, next: Step) -> Self {
        self.answers.insert(field.to_string(), value.to_string());
        self.advance(next)
    }

    pub fn answer(&self, field: &str) -> Option<&str> {
        self.answers.get(field).map(String::as_str)
    }
}
