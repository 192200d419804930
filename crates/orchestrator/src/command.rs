//! Slash-command parsing.
//!
//! Commands are handled locally and never reach the backend or the
//! conversation history. Anything else starting with `/` is reported as
//! unknown rather than passed through.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Save,
    Bookmark(Option<String>),
    Session,
    Context,
    Models,
    Profiles,
    Monitor,
    Editor,
    /// `/council <question>`
    Council(String),
    /// `/seat [model]` — bare form shows the current seat.
    Seat(Option<String>),
    ConfirmYes,
    ConfirmNo,
    CouncilYes,
    CouncilNo,
    LoadYes,
    LoadNo,
    Unknown(String),
}

impl Command {
    /// Parse a raw input line. Returns `None` when the line is not a
    /// slash command.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if !trimmed.starts_with('/') {
            return None;
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };

        Some(match head.to_lowercase().as_str() {
            "/help" => Self::Help,
            "/clear" => Self::Clear,
            "/save" => Self::Save,
            "/bookmark" => Self::Bookmark(if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            }),
            "/session" => Self::Session,
            "/context" => Self::Context,
            "/models" => Self::Models,
            "/profiles" => Self::Profiles,
            "/monitor" => Self::Monitor,
            "/editor" => Self::Editor,
            "/council" => Self::Council(rest.to_string()),
            "/seat" => Self::Seat(if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            }),
            "/confirm-yes" => Self::ConfirmYes,
            "/confirm-no" => Self::ConfirmNo,
            "/council-yes" => Self::CouncilYes,
            "/council-no" => Self::CouncilNo,
            "/load-yes" => Self::LoadYes,
            "/load-no" => Self::LoadNo,
            other => Self::Unknown(other.to_string()),
        })
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /help              Show this help
  /clear             Clear conversation history
  /save              Persist current session preferences
  /bookmark [name]   Weave a bookmark from the recent exchange
  /session           Show session info
  /context           Show context load and sources
  /models            List available models
  /profiles          List persona profiles
  /monitor           Show generation stats and gate states
  /editor            Show the active file
  /council <q>       Prepare a council brief for <q>
  /seat [model]      Show or change the council model
  /confirm-yes|no    Answer a pending git/delete confirmation
  /council-yes|no    Answer a pending council dispatch
  /load-yes|no       Answer a pending @ref file load
Prefixes:
  remember: / store: / save:   Store a memory directly
  @<path> + a load verb        Reference a file for this turn";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_slash_input_is_not_a_command() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("  what about /help mid-text"), None);
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("  /clear  "), Some(Command::Clear));
        assert_eq!(Command::parse("/CONFIRM-YES"), Some(Command::ConfirmYes));
    }

    #[test]
    fn bookmark_takes_an_optional_name() {
        assert_eq!(Command::parse("/bookmark"), Some(Command::Bookmark(None)));
        assert_eq!(
            Command::parse("/bookmark retriever notes"),
            Some(Command::Bookmark(Some("retriever notes".into())))
        );
    }

    #[test]
    fn council_carries_the_question() {
        assert_eq!(
            Command::parse("/council is this design sound?"),
            Some(Command::Council("is this design sound?".into()))
        );
        assert_eq!(Command::parse("/council"), Some(Command::Council(String::new())));
    }

    #[test]
    fn seat_with_and_without_model() {
        assert_eq!(Command::parse("/seat"), Some(Command::Seat(None)));
        assert_eq!(
            Command::parse("/seat deepseek-r1"),
            Some(Command::Seat(Some("deepseek-r1".into())))
        );
    }

    #[test]
    fn unknown_slash_is_reported() {
        assert_eq!(
            Command::parse("/frobnicate now"),
            Some(Command::Unknown("/frobnicate".into()))
        );
    }
}
