//! Command definitions
//!
//! Requests accepted by the engine, plus a line-oriented text form used by
//! the server binary:
//!
//! ```text
//! PUT <key> <value...>
//! GET <key>
//! DELETE <key>        (DEL also accepted)
//! ```

use crate::error::{Result, TxLogError};

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Get,
    Put,
    Delete,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Put a key-value pair
    Put { key: String, value: String },

    /// Delete a key
    Delete { key: String },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Put { .. } => CommandType::Put,
            Command::Delete { .. } => CommandType::Delete,
        }
    }

    /// Parse one text line. The verb is case-insensitive; a put's value is
    /// everything after the key, internal whitespace preserved.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = split_word(line);
        let (key, rest) = split_word(rest);

        if verb.is_empty() {
            return Err(TxLogError::InvalidEvent("empty command".to_string()));
        }
        if key.is_empty() {
            return Err(TxLogError::InvalidEvent(format!("{} requires a key", verb)));
        }

        let key = key.to_string();
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Ok(Command::Get { key }),
            "PUT" | "SET" => Ok(Command::Put {
                key,
                value: rest.to_string(),
            }),
            "DELETE" | "DEL" => Ok(Command::Delete { key }),
            other => Err(TxLogError::InvalidEvent(format!("unknown command: {}", other))),
        }
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}
