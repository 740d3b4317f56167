#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Cancel,
    Token { value: String, expires_at_ms: u64 },
    Board(Option<String>),
    BoardOption { key: String, value: String },
    Port(Option<String>),
    Threads,
    Versions,
    Restore(String),
    Quit,
    Invalid { command: String, usage: &'static str },
    Unknown(String),
}

pub const HELP: &str = "/cancel | /token <value> <expires_at_unix_ms> | /board [fqbn] | \
/board-option <key> <value> | /port [path] | /threads | /versions | /restore <snapshot> | /quit";

/// Parses a slash command. Lines not starting with `/` are user turns.
pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_string();
    let args: Vec<&str> = parts.collect();

    let parsed = match (command.as_str(), args.as_slice()) {
        ("/help", _) => SlashCommand::Help,
        ("/cancel", _) => SlashCommand::Cancel,
        ("/token", [value, expires_at]) => match expires_at.parse::<u64>() {
            Ok(expires_at_ms) => SlashCommand::Token {
                value: (*value).to_string(),
                expires_at_ms,
            },
            Err(_) => invalid(command, "/token <value> <expires_at_unix_ms>"),
        },
        ("/token", _) => invalid(command, "/token <value> <expires_at_unix_ms>"),
        ("/board", []) => SlashCommand::Board(None),
        ("/board", [fqbn]) => SlashCommand::Board(Some((*fqbn).to_string())),
        ("/board", _) => invalid(command, "/board [fqbn]"),
        ("/board-option", [key, value]) => SlashCommand::BoardOption {
            key: (*key).to_string(),
            value: (*value).to_string(),
        },
        ("/board-option", _) => invalid(command, "/board-option <key> <value>"),
        ("/port", []) => SlashCommand::Port(None),
        ("/port", [path]) => SlashCommand::Port(Some((*path).to_string())),
        ("/port", _) => invalid(command, "/port [path]"),
        ("/threads", _) => SlashCommand::Threads,
        ("/versions", _) => SlashCommand::Versions,
        ("/restore", [snapshot]) => SlashCommand::Restore((*snapshot).to_string()),
        ("/restore", _) => invalid(command, "/restore <snapshot>"),
        ("/quit", _) => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

fn invalid(command: String, usage: &'static str) -> SlashCommand {
    SlashCommand::Invalid { command, usage }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("compile my sketch"), None);
        assert_eq!(parse_slash_command("  "), None);
    }

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(parse_slash_command(" /cancel "), Some(SlashCommand::Cancel));
        assert_eq!(
            parse_slash_command("/token abc 1700000000000"),
            Some(SlashCommand::Token {
                value: "abc".to_string(),
                expires_at_ms: 1_700_000_000_000
            })
        );
        assert_eq!(
            parse_slash_command("/board arduino:avr:uno"),
            Some(SlashCommand::Board(Some("arduino:avr:uno".to_string())))
        );
        assert_eq!(parse_slash_command("/port"), Some(SlashCommand::Port(None)));
        assert_eq!(
            parse_slash_command("/board-option cpu atmega328"),
            Some(SlashCommand::BoardOption {
                key: "cpu".to_string(),
                value: "atmega328".to_string()
            })
        );
    }

    #[test]
    fn malformed_and_unknown_commands_are_reported() {
        assert!(matches!(
            parse_slash_command("/token abc soon"),
            Some(SlashCommand::Invalid { .. })
        ));
        assert!(matches!(
            parse_slash_command("/board-option cpu"),
            Some(SlashCommand::Invalid { .. })
        ));
        assert_eq!(
            parse_slash_command("/flash now"),
            Some(SlashCommand::Unknown("/flash".to_string()))
        );
    }
}
