//! Global intents: commands recognised in any state.

/// A global intent, checked before the step table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Cancel,
    Help,
    About,
    /// `/question <text>`; `None` for a bare `/question`.
    Question(Option<String>),
}

/// Parses input into global intents.
pub struct IntentParser;

impl IntentParser {
    /// `None` means the input belongs to the current step.
    pub fn parse(content: &str) -> Option<Intent> {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "/start" => Some(Intent::Start),
            "/cancel" | "cancel" => Some(Intent::Cancel),
            "/help" => Some(Intent::Help),
            "/about" => Some(Intent::About),
            _ => parse_question(trimmed),
        }
    }
}

/// `/question [text...]`, keeping the text's original case and line breaks.
fn parse_question(trimmed: &str) -> Option<Intent> {
    const PREFIX: &str = "/question";
    let head = trimmed.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let rest = &trimmed[PREFIX.len()..];
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        Some(Intent::Question(None))
    } else {
        Some(Intent::Question(Some(text.to_string())))
    }
}
