use anyhow::{Result, anyhow, bail};

/// One line typed into a running `watch` session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Hide,
    Summary,
    Close,
    Ack(i64),
    AckAgency(String),
    Start,
    Stop,
    Run,
    Progress,
    Help,
    Quit,
}

pub const HELP: &str = "commands: show | hide | summary | close | ack <alert_id> | ack-agency <code> | start | stop | run | progress | help | quit";

pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else { return Ok(None) };
    let arg = parts.next();
    if parts.next().is_some() {
        bail!("too many arguments: {line}");
    }
    let cmd = match (head.to_ascii_lowercase().as_str(), arg) {
        ("show" | "fg", None) => Command::Show,
        ("hide" | "bg", None) => Command::Hide,
        ("summary", None) => Command::Summary,
        ("close", None) => Command::Close,
        ("ack", Some(id)) => Command::Ack(id.parse().map_err(|_| anyhow!("invalid alert id: {id}"))?),
        ("ack-agency", Some(code)) => Command::AckAgency(code.to_string()),
        ("start", None) => Command::Start,
        ("stop", None) => Command::Stop,
        ("run", None) => Command::Run,
        ("progress", None) => Command::Progress,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit" | "q", None) => Command::Quit,
        (other, _) => bail!("unknown command: {other} ({HELP})"),
    };
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse("ack 42").unwrap(), Some(Command::Ack(42)));
        assert_eq!(parse("  ack-agency  A-17 ").unwrap(), Some(Command::AckAgency("A-17".into())));
        assert_eq!(parse("QUIT").unwrap(), Some(Command::Quit));
        assert_eq!(parse("").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("ack").is_err());
        assert!(parse("ack x").is_err());
        assert!(parse("show now").is_err());
        assert!(parse("dance").is_err());
    }
}
