//! Line commands read from stdin.

use connectify_presence::{ActivitySignal, Visibility};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Feed an activity or visibility signal to the host.
    Signal(ActivitySignal),
    /// Print one user's resolved status.
    Status(String),
    /// Print every online user.
    Who,
    Login(String),
    Logout,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err("empty command".into());
        };
        let arg = parts.next();

        let command = match (name, arg) {
            ("move", None) => Command::Signal(ActivitySignal::PointerMove),
            ("key", None) => Command::Signal(ActivitySignal::KeyDown),
            ("scroll", None) => Command::Signal(ActivitySignal::Scroll),
            ("touch", None) => Command::Signal(ActivitySignal::Touch),
            ("hide", None) => Command::Signal(ActivitySignal::VisibilityChanged(Visibility::Hidden)),
            ("show", None) => {
                Command::Signal(ActivitySignal::VisibilityChanged(Visibility::Visible))
            }
            ("status", Some(user_id)) => Command::Status(user_id.to_string()),
            ("who", None) => Command::Who,
            ("login", Some(token)) => Command::Login(token.to_string()),
            ("logout", None) => Command::Logout,
            ("quit" | "exit", None) => Command::Quit,
            ("status", None) => return Err("usage: status <user_id>".into()),
            ("login", None) => return Err("usage: login <token>".into()),
            _ => return Err(format!("unknown command: {}", line.trim())),
        };

        if parts.next().is_some() {
            return Err(format!("too many arguments: {}", line.trim()));
        }
        Ok(command)
    }
}

pub const HELP: &str =
    "commands: move | key | scroll | touch | hide | show | status <user_id> | who | login <token> | logout | quit";
