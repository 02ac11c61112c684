//! Command-line parsing for the interactive shell.

use branches_types::ColumnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Register { email: String, password: String },
    Logout,
    Whoami,
    Boards,
    Select(i64),
    NewBoard(String),
    NewColumn(String),
    RenameColumn { column: ColumnId, name: String },
    DeleteColumn(ColumnId),
    Health,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  login <email> <password>      sign in
  register <email> <password>   create an account and sign in
  logout                        sign out and forget the saved session
  whoami                        re-check the signed-in user
  boards                        reload the board list
  select <board-id>             show a board's columns
  new-board <name>              create a board and select it
  new-column <name>             add a column to the selected board
  rename-column <id> <name>     rename a column on the selected board
  delete-column <id>            delete a column on the selected board
  health                        probe the backend
  show                          print the current state
  help                          this text
  quit                          exit";

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

    let command = match verb.to_ascii_lowercase().as_str() {
        "login" => {
            let (email, password) = credentials(rest, "login")?;
            Command::Login { email, password }
        }
        "register" => {
            let (email, password) = credentials(rest, "register")?;
            Command::Register { email, password }
        }
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "boards" => Command::Boards,
        "select" => Command::Select(number(rest, "select <board-id>")?),
        "new-board" => Command::NewBoard(rest.to_string()),
        "new-column" => Command::NewColumn(rest.to_string()),
        "rename-column" => {
            let (id, name) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| usage("rename-column <id> <name>"))?;
            Command::RenameColumn {
                column: ColumnId(number(id, "rename-column <id> <name>")?),
                name: name.trim().to_string(),
            }
        }
        "delete-column" => Command::DeleteColumn(ColumnId(number(rest, "delete-column <id>")?)),
        "health" => Command::Health,
        "show" | "ls" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command: {other} (try `help`)")),
    };
    Ok(Some(command))
}

fn credentials(rest: &str, verb: &str) -> Result<(String, String), String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
        _ => Err(usage(&format!("{verb} <email> <password>"))),
    }
}

fn number(raw: &str, form: &str) -> Result<i64, String> {
    raw.trim().parse().map_err(|_| usage(form))
}

fn usage(form: &str) -> String {
    format!("Usage: {form}")
}
