//! Text command input standing in for keyboard controls

use shared::Direction;

/// A single user action read from the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Join,
    Leave,
    Connect(String),
    Roster,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  w/a/s/d or up/left/down/right   move the local player
  join                            enter the arena
  leave                           leave the arena
  connect <A.B.C.D:PORT>          switch to another server
  roster                          list remote players
  status                          show the connection state
  quit                            leave and exit";

/// Parses one input line; blank or unknown lines yield `None`
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();

    let command = match verb.as_str() {
        "w" | "up" => Command::Move(Direction::Up),
        "a" | "left" => Command::Move(Direction::Left),
        "s" | "down" => Command::Move(Direction::Down),
        "d" | "right" => Command::Move(Direction::Right),
        "join" | "start" => Command::Join,
        "leave" => Command::Leave,
        "connect" => Command::Connect(words.next()?.to_string()),
        "roster" | "players" => Command::Roster,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return None,
    };

    if words.next().is_some() {
        return None;
    }
    Some(command)
}
