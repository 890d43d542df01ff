use crate::allocator::parse_timestamp;
use crate::model::*;

/// Parsed command from one protocol line.
///
/// ```text
/// ALLOCATE <token> [COUNT <n> EVERY <w>] [AT <timestamp>]
/// RELEASE <class> <timestamp>
/// TAKEN <class>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Allocate(ScheduleRequest),
    Release { class: PriorityClass, at: Ts },
    Taken { class: PriorityClass },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError(pub String);

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CommandError {}

fn err<T>(msg: impl Into<String>) -> Result<T, CommandError> {
    Err(CommandError(msg.into()))
}

fn parse_class(token: Option<&str>) -> Result<PriorityClass, CommandError> {
    let Some(token) = token else {
        return err("missing priority class");
    };
    token.parse().map_err(|e: UnknownClass| CommandError(e.to_string()))
}

fn parse_ts(token: Option<&str>) -> Result<Ts, CommandError> {
    let Some(token) = token else {
        return err("missing timestamp");
    };
    parse_timestamp(token).ok_or_else(|| CommandError(format!("invalid timestamp: {token}")))
}

fn parse_number(keyword: &str, token: Option<&str>) -> Result<u32, CommandError> {
    match token.map(str::parse::<u32>) {
        Some(Ok(n)) => Ok(n),
        Some(Err(_)) | None => err(format!("{keyword} expects a non-negative integer")),
    }
}

/// Parse one line. `now` is the base time when the line has no `AT`.
pub fn parse_line(line: &str, now: Ts) -> Result<Command, CommandError> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return err("empty command");
    };

    let cmd = if verb.eq_ignore_ascii_case("ALLOCATE") {
        let Some(target) = tokens.next() else {
            return err("ALLOCATE expects a priority token or timestamp");
        };
        let mut count = None;
        let mut every = None;
        let mut base = None;
        while let Some(keyword) = tokens.next() {
            if keyword.eq_ignore_ascii_case("COUNT") {
                count = Some(parse_number("COUNT", tokens.next())?);
            } else if keyword.eq_ignore_ascii_case("EVERY") {
                every = Some(parse_number("EVERY", tokens.next())?);
            } else if keyword.eq_ignore_ascii_case("AT") {
                base = Some(parse_ts(tokens.next())?);
            } else {
                return err(format!("unexpected keyword: {keyword}"));
            }
        }
        let request = ScheduleRequest::parse(target, base.unwrap_or(now), count, every)
            .map_err(|e| CommandError(e.to_string()))?;
        Command::Allocate(request)
    } else if verb.eq_ignore_ascii_case("RELEASE") {
        let class = parse_class(tokens.next())?;
        let at = parse_ts(tokens.next())?;
        Command::Release { class, at }
    } else if verb.eq_ignore_ascii_case("TAKEN") {
        Command::Taken {
            class: parse_class(tokens.next())?,
        }
    } else {
        return err(format!("unknown command: {verb}"));
    };

    if let Some(extra) = tokens.next() {
        return err(format!("unexpected trailing input: {extra}"));
    }
    Ok(cmd)
}
