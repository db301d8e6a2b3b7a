//! Line-oriented input for the interactive shell.

use client_core::Command;
use shared::domain::PlanKind;

pub const HELP: &str = "\
commands:
  plans              list subscription plans
  start              leave plan selection (assistant or sign-in)
  phone <number>     request a one-time code
  code <digits>      verify the code for the pending phone
  ask <question>     ask the assistant
  buy <plan>         purchase starter, pro or unlimited
  profile            fetch the account profile
  back               return to the previous view
  logout             forget the stored identity
  status             show the current view
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Session(Command),
    /// Verification needs the phone the controller has locked.
    Verify { code: String },
    Plans,
    Status,
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Input::Help,
        "plans" => Input::Plans,
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        "start" => Input::Session(Command::Proceed),
        "back" => Input::Session(Command::Back),
        "profile" => Input::Session(Command::OpenProfile),
        "logout" => Input::Session(Command::Logout),
        "phone" => Input::Session(Command::RequestCode {
            phone: required(rest, "phone <number>")?,
        }),
        "code" => Input::Verify {
            code: required(rest, "code <digits>")?,
        },
        "ask" => Input::Session(Command::AskQuestion {
            question: required(rest, "ask <question>")?,
        }),
        "buy" => {
            let plan = required(rest, "buy <plan>")?
                .parse::<PlanKind>()
                .map_err(|err| err.to_string())?;
            Input::Session(Command::PurchasePlan { plan })
        }
        other => return Err(format!("unknown command '{other}'; type help")),
    };
    Ok(Some(input))
}

fn required(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn questions_keep_inner_whitespace() {
        assert_eq!(
            parse_line("ask  what is  2+2?"),
            Ok(Some(Input::Session(Command::AskQuestion {
                question: "what is  2+2?".into()
            })))
        );
    }

    #[test]
    fn plans_parse_from_wire_names() {
        assert_eq!(
            parse_line("buy Pro"),
            Ok(Some(Input::Session(Command::PurchasePlan {
                plan: PlanKind::Pro
            })))
        );
        assert!(parse_line("buy platinum").is_err());
    }

    #[test]
    fn arguments_are_required() {
        assert_eq!(parse_line("phone"), Err("usage: phone <number>".to_string()));
        assert_eq!(
            parse_line("code 1234"),
            Ok(Some(Input::Verify {
                code: "1234".into()
            }))
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert!(parse_line("dance").is_err());
    }
}
