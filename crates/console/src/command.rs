/// One line typed at the console prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Open,
    Close,
    Escape,
    Scroll { offset: f64, viewport_height: f64 },
    Reindex { confirmed: bool },
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  /open                         open the panel (same as clicking the bubble)
  /close                        close the panel
  /esc                          press Escape
  /scroll <offset> <viewport>   report a page scroll position
  /reindex [--yes]              rebuild the knowledge base (admin only)
  /help                         show this help
  /quit                         exit
anything else is sent as a question";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let arguments = words.collect::<Vec<_>>();

        match (name, arguments.as_slice()) {
            ("open", []) => Self::Open,
            ("close", []) => Self::Close,
            ("esc" | "escape", []) => Self::Escape,
            ("scroll", [offset, viewport_height]) => {
                match (offset.parse::<f64>(), viewport_height.parse::<f64>()) {
                    (Ok(offset), Ok(viewport_height)) => Self::Scroll {
                        offset,
                        viewport_height,
                    },
                    _ => Self::Invalid("scroll positions must be numbers".to_string()),
                }
            }
            ("scroll", _) => Self::Invalid("usage: /scroll <offset> <viewport>".to_string()),
            ("reindex", []) => Self::Reindex { confirmed: false },
            ("reindex", ["--yes" | "-y"]) => Self::Reindex { confirmed: true },
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit" | "q", []) => Self::Quit,
            _ => Self::Invalid(format!("unknown command '/{rest}'")),
        }
    }
}
