use anyhow::{anyhow, bail, Result};

pub const HELP: &str = "\
Commands:
  buy <unit> [count]   buy one or more levels of a business
  start <unit>         start a manual cycle
  hire <overseer>      hire an overseer to automate a business
  status               show balance, businesses and income
  help                 show this message
  quit                 save and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Buy { unit: String, count: u32 },
    Start(String),
    Hire(String),
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("buy" | "b", [unit]) => Command::Buy {
            unit: unit.to_string(),
            count: 1,
        },
        ("buy" | "b", [unit, count]) => {
            let count: u32 = count
                .parse()
                .map_err(|_| anyhow!("count must be a positive whole number, got '{count}'"))?;
            if count == 0 {
                bail!("count must be at least 1");
            }
            Command::Buy {
                unit: unit.to_string(),
                count,
            }
        }
        ("start" | "s", [unit]) => Command::Start(unit.to_string()),
        ("hire" | "h", [overseer]) => Command::Hire(overseer.to_string()),
        ("status" | "st", []) => Command::Status,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        ("buy" | "b" | "start" | "s" | "hire" | "h" | "status" | "st" | "help" | "?" | "quit"
        | "exit" | "q", _) => bail!("wrong number of arguments for '{verb}'; try 'help'"),
        _ => bail!("unknown command '{verb}'; try 'help'"),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() -> Result<()> {
        assert_eq!(
            parse("buy chai")?,
            Some(Command::Buy {
                unit: "chai".into(),
                count: 1
            })
        );
        assert_eq!(
            parse("  B kirana 10 ")?,
            Some(Command::Buy {
                unit: "kirana".into(),
                count: 10
            })
        );
        assert_eq!(parse("start chai")?, Some(Command::Start("chai".into())));
        assert_eq!(parse("hire zolly")?, Some(Command::Hire("zolly".into())));
        assert_eq!(parse("status")?, Some(Command::Status));
        assert_eq!(parse("?")?, Some(Command::Help));
        assert_eq!(parse("exit")?, Some(Command::Quit));
        Ok(())
    }

    #[test]
    fn blank_lines_are_ignored() -> Result<()> {
        assert_eq!(parse("")?, None);
        assert_eq!(parse("   \t")?, None);
        Ok(())
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("buy chai zero").is_err());
        assert!(parse("buy chai 0").is_err());
        assert!(parse("buy").is_err());
        assert!(parse("status now").is_err());
        assert!(parse("sell chai").is_err());
    }
}
