//! Fixed prompts, option labels, and the random pools.

use crate::channels::BotCommand;

// ── Menu and option labels ──────────────────────────────────────────

pub const OPTION_YES: &str = "Yes";
pub const OPTION_CANCEL: &str = "Cancel";

pub const MENU_FACT: &str = "Interesting fact";
pub const MENU_REMINDERS: &str = "Reminders";
pub const MENU_QUESTIONNAIRE: &str = "Questionnaire";
pub const MENU_DIARY: &str = "Diary";

pub const MENU_OPTIONS: [&str; 4] = [MENU_FACT, MENU_REMINDERS, MENU_QUESTIONNAIRE, MENU_DIARY];

pub const DIARY_WRITE: &str = "Write";
pub const DIARY_READ: &str = "Read";

pub const REMINDER_TIME_OPTIONS: [&str; 4] = ["At 12:00", "At 16:00", "At 18:00", "At 20:00"];
pub const REMINDER_COUNT_OPTIONS: [&str; 4] = ["1", "3", "7", "30"];

// ── Commands ────────────────────────────────────────────────────────

/// The transport command menu.
pub const COMMANDS: [BotCommand; 5] = [
    BotCommand {
        command: "start",
        description: "Start a conversation",
    },
    BotCommand {
        command: "help",
        description: "What I can do",
    },
    BotCommand {
        command: "about",
        description: "About this bot",
    },
    BotCommand {
        command: "question",
        description: "Ask the developers a question",
    },
    BotCommand {
        command: "cancel",
        description: "Stop the current step",
    },
];

// ── Global replies ──────────────────────────────────────────────────

pub const CANCELLED: &str = "Okay, I've stopped. Send /start whenever you want to continue.";

pub const HELP: &str = "I'm your care companion. I can share an interesting fact, keep \
your diary, take a short health questionnaire, and remind you about things.\n\nCommands:";

pub const NOT_REGISTERED: &str = "We haven't met yet. Send /start so we can get acquainted.";

pub const ABOUT: &str = "Care bot: a small companion that keeps a diary, records how you \
feel, and sends you reminders at the time you choose.";

pub const QUESTION_RECEIVED: &str = "Thank you! Your question has been passed on.";

pub const QUESTION_USAGE: &str = "Write your question right after the command, for example:\n\
/question How do I delete a reminder?";

pub const FAILURE: &str = "Sorry, something went wrong on my side. Please try again a bit later.";

// ── Registration ────────────────────────────────────────────────────

pub const WELCOME_NEW: &str = "Hello! I'm a bot that helps you look after yourself. \
Shall we get acquainted?";

pub fn welcome_back(username: &str) -> String {
    format!("Nice to see you, {username}!")
}

pub fn ask_name(display_name: &str) -> String {
    format!("May I call you {display_name}? Press \"Yes\" or type how I should call you.")
}

// ── Dialog ──────────────────────────────────────────────────────────

pub const MENU_PROMPT: &str = "What would you like to do?";

pub const FACT_LEAD_IN: &str = "Here's something interesting:";
pub const FACT_LEAD_OUT: &str = "Hope that was new to you!";

pub const GREETINGS: &[&str] = &[
    "Glad you're here!",
    "Hi there! How is your day going?",
    "Good to hear from you again.",
    "Hello! Let's take care of you today.",
    "Welcome back! I'm all yours.",
];

pub const FACTS: &[&str] = &[
    "Laughing for fifteen minutes a day can noticeably lift your mood.",
    "Your heart beats roughly one hundred thousand times a day.",
    "A short walk after a meal helps keep blood sugar steady.",
    "Drinking a glass of water before a meal helps digestion.",
    "Humans share about sixty percent of their genes with bananas.",
    "The brain uses around twenty percent of the body's energy.",
    "Sunlight helps your body produce vitamin D.",
    "Regular sleep at the same hour makes it easier to fall asleep.",
];

// ── Questionnaire ───────────────────────────────────────────────────

pub const ASK_MOOD: &str = "How are you feeling today?";
pub const ASK_PRESSURE: &str = "What is your blood pressure?";
pub const ASK_TEMPERATURE: &str = "What is your body temperature?";
pub const ASK_BLOOD_SUGAR: &str = "What is your blood sugar level?";
pub const QUESTIONNAIRE_DONE: &str = "Thank you! I've saved your answers.";

// ── Reminders ───────────────────────────────────────────────────────

pub const ASK_REMINDER_TEXT: &str = "What should I remind you about?";
pub const ASK_REMINDER_TIME: &str = "At what time should I remind you?";
pub const ASK_REMINDER_COUNT: &str = "For how many days should I repeat it?";
pub const INVALID_REMINDER_TIME: &str =
    "I didn't recognise that time. Pick one of the options or type it as HH:MM.";
pub const INVALID_REMINDER_COUNT: &str = "Please send a whole number of days, at least 1.";

/// Heading of every delivered reminder.
pub const REMINDER_HEADER: &str = "Reminder!";

pub fn reminder_confirmed(time_label: &str) -> String {
    format!("Done! I'll remind you {}.", time_label.to_lowercase())
}

// ── Diary ───────────────────────────────────────────────────────────

pub const DIARY_PROMPT: &str = "Do you want to write in your diary or read it?";
pub const DIARY_ASK_ENTRY: &str = "Go ahead, I'm listening.";
pub const DIARY_SAVED: &str = "Saved to your diary.";
pub const DIARY_HEADER: &str = "Your diary:";
pub const DIARY_EMPTY: &str = "Your diary is empty for now.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_not_empty() {
        assert!(!GREETINGS.is_empty());
        assert!(!FACTS.is_empty());
    }

    #[test]
    fn confirmation_lowercases_label() {
        assert_eq!(reminder_confirmed("At 18:00"), "Done! I'll remind you at 18:00.");
    }

    #[test]
    fn command_names_are_telegram_safe() {
        for cmd in COMMANDS {
            assert!(cmd.command.chars().all(|c| c.is_ascii_lowercase()));
        }
    }
}
