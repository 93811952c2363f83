use tokio::io::{AsyncBufRead, Lines};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Retry,
    Dismiss,
    History,
    State,
    Schema,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub const HELP: &str = "\
Type a request to change the grid, e.g. \"group by sector and sum the total value\".

  /retry    resend the last message after an error
  /dismiss  hide the error without retrying
  /history  print the conversation so far
  /state    print the current grid state
  /schema   print the updateGridState tool schema
  /help     show this help
  /quit     exit

Ctrl-C stops a running response, or exits at the prompt.";

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(name) = line.strip_prefix('/') else {
        return Command::Send(line.to_owned());
    };
    match name.trim().to_ascii_lowercase().as_str() {
        "retry" => Command::Retry,
        "dismiss" => Command::Dismiss,
        "history" => Command::History,
        "state" => Command::State,
        "schema" => Command::Schema,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_owned()),
    }
}

/// Next line of input; `None` at end of input or once `interrupt` fires.
pub async fn read_line<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn plain_text_is_sent_trimmed() {
        assert_eq!(parse("  pivot by sector \n"), Command::Send("pivot by sector".into()));
    }

    #[test]
    fn slash_commands_are_case_insensitive() {
        assert_eq!(parse("/RETRY"), Command::Retry);
        assert_eq!(parse("/state"), Command::State);
        assert_eq!(parse("/Dismiss"), Command::Dismiss);
        assert_eq!(parse("/history "), Command::History);
        assert_eq!(parse("/exit"), Command::Quit);
        assert_eq!(parse("/nope"), Command::Unknown("/nope".into()));
    }

    #[test]
    fn blank_lines_do_nothing() {
        assert_eq!(parse("   "), Command::Empty);
    }

    #[tokio::test]
    async fn read_line_returns_typed_input() {
        let mut lines = BufReader::new(&b"/state\n"[..]).lines();
        let line = read_line(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert_eq!(line.as_deref(), Some("/state"));
    }

    #[tokio::test]
    async fn interrupt_at_an_idle_prompt_ends_input() {
        // The writer stays open, so the reader would wait forever.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let line = read_line(&mut lines, std::future::ready(())).await.unwrap();
        assert_eq!(line, None);
    }
}
