//! Extraction of `[CMD]...[/CMD]` directives from model output
//!
//! Grammar: the first non-greedy match of `[CMD](.*?)[/CMD]` (case-sensitive,
//! spanning newlines). Only the first line of the block is kept. A candidate
//! that looks like a placeholder is dropped, so dropping a real command is the
//! failure mode rather than running garbage.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub const OPEN_MARKER: &str = "[CMD]";
pub const CLOSE_MARKER: &str = "[/CMD]";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[CMD\](.*?)\[/CMD\]").expect("directive pattern is valid")
});

/// Case-insensitive exact matches that are never treated as commands
const PLACEHOLDERS: &[&str] = &["...", "echo", "command", "your command here", "placeholder"];

const MIN_COMMAND_CHARS: usize = 3;
const MAX_DOTS: usize = 2;

/// Why a directive block was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Placeholder,
    TooShort,
    TooManyDots,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty"),
            Rejection::Placeholder => write!(f, "placeholder"),
            Rejection::TooShort => write!(f, "too short"),
            Rejection::TooManyDots => write!(f, "too many dots"),
        }
    }
}

/// Result of scanning one model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandCandidate {
    /// Text between the first marker pair, untouched
    pub raw_block: Option<String>,
    /// Accepted command (first line, trimmed)
    pub command: Option<String>,
    /// Set when a block was found but failed validation
    pub rejection: Option<Rejection>,
}

impl CommandCandidate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.command.is_some()
    }

    /// Fixed note reported when nothing is executed
    pub fn note(&self) -> &'static str {
        match (&self.raw_block, self.rejection) {
            (None, _) => "No command found in the output.",
            (Some(_), Some(Rejection::TooShort | Rejection::TooManyDots)) => {
                "Command appears to be a placeholder."
            }
            (Some(_), _) => "No valid command found.",
        }
    }
}

/// Scan `response` for the first directive block
pub fn extract(response: &str) -> CommandCandidate {
    let Some(captures) = DIRECTIVE.captures(response) else {
        return CommandCandidate::none();
    };

    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let command = raw.trim().lines().next().unwrap_or_default().trim();

    match validate(command) {
        Ok(()) => CommandCandidate {
            raw_block: Some(raw.to_string()),
            command: Some(command.to_string()),
            rejection: None,
        },
        Err(rejection) => CommandCandidate {
            raw_block: Some(raw.to_string()),
            command: None,
            rejection: Some(rejection),
        },
    }
}

/// Wrap a command in directive markers
pub fn wrap(command: &str) -> String {
    format!("{}{}{}", OPEN_MARKER, command, CLOSE_MARKER)
}

fn validate(command: &str) -> Result<(), Rejection> {
    if command.is_empty() {
        return Err(Rejection::Empty);
    }

    let lowered = command.to_lowercase();
    if PLACEHOLDERS.contains(&lowered.as_str()) {
        return Err(Rejection::Placeholder);
    }

    if command.chars().count() < MIN_COMMAND_CHARS {
        return Err(Rejection::TooShort);
    }

    if command.matches('.').count() > MAX_DOTS {
        return Err(Rejection::TooManyDots);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_directive() {
        let candidate = extract("plain text, no command");
        assert!(!candidate.is_present());
        assert_eq!(candidate, CommandCandidate::none());
        assert_eq!(candidate.note(), "No command found in the output.");
    }

    #[test]
    fn test_extracts_embedded_command() {
        let candidate = extract("do X [CMD]rm -rf /[/CMD] done");
        assert_eq!(candidate.command.as_deref(), Some("rm -rf /"));
        assert_eq!(candidate.raw_block.as_deref(), Some("rm -rf /"));
        assert!(candidate.rejection.is_none());
    }

    #[test]
    fn test_first_match_only() {
        let candidate = extract("[CMD]ls -la[/CMD] then [CMD]pwd -P[/CMD]");
        assert_eq!(candidate.command.as_deref(), Some("ls -la"));
    }

    #[test]
    fn test_first_line_of_multiline_block() {
        let candidate = extract("Sure:\n[CMD]\n  df -h\nrm -rf ~\n[/CMD]");
        assert_eq!(candidate.command.as_deref(), Some("df -h"));
        assert_eq!(candidate.raw_block.as_deref(), Some("\n  df -h\nrm -rf ~\n"));
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert!(!extract("[cmd]ls -la[/cmd]").is_present());
        assert!(extract("[cmd]ls -la[/cmd]").raw_block.is_none());
    }

    #[test]
    fn test_unterminated_block() {
        let candidate = extract("[CMD]ls -la and then the model ran out of tok");
        assert!(candidate.raw_block.is_none());
    }

    #[test]
    fn test_placeholders_rejected() {
        for text in ["placeholder", "ECHO", "...", "Command", "Your Command Here"] {
            let candidate = extract(&wrap(text));
            assert!(!candidate.is_present(), "{text} should be rejected");
            assert_eq!(candidate.rejection, Some(Rejection::Placeholder));
            assert_eq!(candidate.note(), "No valid command found.");
        }
    }

    #[test]
    fn test_placeholder_match_is_exact() {
        assert_eq!(
            extract(&wrap("echo hello")).command.as_deref(),
            Some("echo hello")
        );
    }

    #[test]
    fn test_short_and_empty_rejected() {
        assert_eq!(extract(&wrap("ls")).rejection, Some(Rejection::TooShort));
        assert_eq!(extract(&wrap("   ")).rejection, Some(Rejection::Empty));
        assert_eq!(extract(&wrap("")).rejection, Some(Rejection::Empty));
        assert_eq!(
            extract(&wrap("ls")).note(),
            "Command appears to be a placeholder."
        );
    }

    #[test]
    fn test_dot_heuristic() {
        assert!(extract(&wrap("cat a.b.txt")).is_present());
        assert_eq!(
            extract(&wrap("cat a.b.c.txt")).rejection,
            Some(Rejection::TooManyDots)
        );
    }

    #[test]
    fn test_wrap_recovers_valid_commands() {
        for command in ["ls -la", "uname -a", "grep -rn \"TODO\" src/", "du -sh ./target"] {
            assert_eq!(extract(&wrap(command)).command.as_deref(), Some(command));
        }
    }
}
