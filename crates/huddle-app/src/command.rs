//! Input line parsing.
//!
//! A command is `name:argument`: exactly one `:` and a known name. Anything
//! else, including a line with two colons or an unknown name, is chat text
//! and is published verbatim.

/// Separator between command name and argument.
pub const DELIMITER: char = ':';

/// One-line command summary shown at startup.
pub const HELP: &str = "Commands: friends: | friends:<channel> | addfriend:<name> | \
                        onchan:<channel> | schan:<channel> | pschan:<pattern> | \
                        uchan:<channel> | wchan:<channel> | cls: | exit:";

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `friends:` (every channel) or `friends:<channel>`.
    Friends {
        /// Channel to restrict to. `None` for all channels.
        channel: Option<&'a str>,
    },
    /// `addfriend:<name>`.
    AddFriend {
        /// Friend to declare.
        name: &'a str,
    },
    /// `onchan:<channel>`: list users present.
    OnChannel {
        /// Channel name.
        channel: &'a str,
    },
    /// `schan:<channel>`: join.
    Join {
        /// Channel name.
        channel: &'a str,
    },
    /// `pschan:<pattern>`: join every channel containing the pattern.
    JoinMatching {
        /// Substring to look for.
        pattern: &'a str,
    },
    /// `uchan:<channel>`: leave.
    Leave {
        /// Channel name.
        channel: &'a str,
    },
    /// `wchan:<channel>`: select the write target.
    Write {
        /// Channel name.
        channel: &'a str,
    },
    /// `cls:`: clear the screen.
    Clear,
    /// `exit:`: leave everything and end the session.
    Exit,
    /// Plain chat text.
    Chat {
        /// The whole input line.
        text: &'a str,
    },
}

/// Parse one input line.
pub fn parse(line: &str) -> Command<'_> {
    let mut parts = line.split(DELIMITER);
    let (Some(name), Some(arg), None) = (parts.next(), parts.next(), parts.next()) else {
        return Command::Chat { text: line };
    };

    match name {
        "friends" => Command::Friends { channel: (!arg.is_empty()).then_some(arg) },
        "addfriend" => Command::AddFriend { name: arg },
        "onchan" => Command::OnChannel { channel: arg },
        "schan" => Command::Join { channel: arg },
        "pschan" => Command::JoinMatching { pattern: arg },
        "uchan" => Command::Leave { channel: arg },
        "wchan" => Command::Write { channel: arg },
        "cls" => Command::Clear,
        "exit" => Command::Exit,
        _ => Command::Chat { text: line },
    }
}
