//! Line protocol
//!
//! Requests are single `\n`-terminated lines (a trailing `\r` is ignored):
//! ```text
//! PING
//! LOOKUP 10.1.2.3
//! ULOOKUP 2001:db8::1
//! STATS
//! QUIT
//! ```
//! Replies are `+<payload>\r\n` on success and `-ERR <message>\r\n` on failure.

use std::net::IpAddr;

use bytes::BytesMut;
use nom::{
    bytes::complete::is_not,
    character::complete::{alpha1, space0, space1},
    combinator::{all_consuming, opt},
    sequence::{pair, preceded, terminated},
    IResult,
};

/// Longest accepted request line, terminator excluded
pub const MAX_LINE_LEN: usize = 4096;

/// Parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness check
    Ping,
    /// Cached lookup
    Lookup(IpAddr),
    /// Lookup straight against the table, bypassing the cache
    UncachedLookup(IpAddr),
    /// Cache statistics as JSON
    Stats,
    /// Close the connection
    Quit,
}

/// Response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+payload`
    Ok(String),
    /// `-ERR message`
    Error(String),
}

impl Reply {
    /// Serialize with the line terminator
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Reply::Ok(payload) => format!("+{}\r\n", payload).into_bytes(),
            Reply::Error(msg) => format!("-ERR {}\r\n", msg).into_bytes(),
        }
    }
}

/// Split the next complete line off `buf`
///
/// Returns `Ok(None)` when more data is needed. A bad line is consumed before
/// its error is returned, so the lines behind it can still be read. An
/// unterminated line over [`MAX_LINE_LEN`] discards the whole buffer.
pub fn next_line(buf: &mut BytesMut) -> Result<Option<String>, String> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_LINE_LEN {
            buf.clear();
            return Err(format!("line exceeds {} bytes", MAX_LINE_LEN));
        }
        return Ok(None);
    };

    let frame = buf.split_to(pos + 1);
    let mut line = &frame[..pos];
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }
    if line.len() > MAX_LINE_LEN {
        return Err(format!("line exceeds {} bytes", MAX_LINE_LEN));
    }

    String::from_utf8(line.to_vec())
        .map(Some)
        .map_err(|_| "line is not valid UTF-8".to_string())
}

/// `VERB [ARG]` with optional surrounding blanks
fn request(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming(preceded(
        space0,
        terminated(pair(alpha1, opt(preceded(space1, is_not(" \t")))), space0),
    ))(input)
}

fn parse_addr(arg: Option<&str>, verb: &str) -> Result<IpAddr, String> {
    let arg = arg.ok_or_else(|| format!("wrong number of arguments for '{}' command", verb))?;
    arg.parse()
        .map_err(|_| format!("invalid address '{}'", arg))
}

/// Parse a request line
pub fn parse_command(line: &str) -> Result<Command, String> {
    let (_, (verb, arg)) = request(line).map_err(|_| "invalid command format".to_string())?;
    let verb = verb.to_ascii_lowercase();

    let no_arg = |cmd: Command| match arg {
        None => Ok(cmd),
        Some(_) => Err(format!("wrong number of arguments for '{}' command", verb)),
    };

    match verb.as_str() {
        "ping" => no_arg(Command::Ping),
        "stats" => no_arg(Command::Stats),
        "quit" => no_arg(Command::Quit),
        "lookup" => parse_addr(arg, &verb).map(Command::Lookup),
        "ulookup" => parse_addr(arg, &verb).map(Command::UncachedLookup),
        _ => Err(format!("unknown command '{}'", verb)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("PING"), Ok(Command::Ping));
        assert_eq!(parse_command("  stats "), Ok(Command::Stats));
        assert_eq!(parse_command("Quit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("LOOKUP 10.0.0.1"),
            Ok(Command::Lookup("10.0.0.1".parse().unwrap()))
        );
        assert_eq!(
            parse_command("ulookup\t2001:db8::1"),
            Ok(Command::UncachedLookup("2001:db8::1".parse().unwrap()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("LOOKUP").unwrap_err().contains("wrong number"));
        assert!(parse_command("LOOKUP 10.0.0.1 extra").is_err());
        assert!(parse_command("LOOKUP banana").unwrap_err().contains("invalid address"));
        assert!(parse_command("PING now").is_err());
        assert!(parse_command("FLUSHALL").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn test_next_line() {
        let mut buf = BytesMut::from(&b"PING\r\nLOOKUP 10.0.0.1\nSTA"[..]);

        assert_eq!(next_line(&mut buf), Ok(Some("PING".to_string())));
        assert_eq!(next_line(&mut buf), Ok(Some("LOOKUP 10.0.0.1".to_string())));
        assert_eq!(next_line(&mut buf), Ok(None));

        buf.extend_from_slice(b"TS\n");
        assert_eq!(next_line(&mut buf), Ok(Some("STATS".to_string())));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_next_line_too_long() {
        let mut buf = BytesMut::from(&vec![b'a'; MAX_LINE_LEN + 1][..]);
        assert!(next_line(&mut buf).is_err());
        assert!(buf.is_empty());

        let mut long = vec![b'a'; MAX_LINE_LEN + 1];
        long.extend_from_slice(b"\nPING\n");
        let mut buf = BytesMut::from(&long[..]);
        assert!(next_line(&mut buf).is_err());
        assert_eq!(next_line(&mut buf), Ok(Some("PING".to_string())));
    }

    #[test]
    fn test_bad_line_keeps_framing() {
        let mut buf = BytesMut::from(&b"\xff\nPING\n"[..]);
        assert_eq!(next_line(&mut buf), Err("line is not valid UTF-8".to_string()));
        assert_eq!(next_line(&mut buf), Ok(Some("PING".to_string())));
        assert_eq!(next_line(&mut buf), Ok(None));
    }

    #[test]
    fn test_serialize() {
        assert_eq!(Reply::Ok("PONG".to_string()).serialize(), b"+PONG\r\n");
        assert_eq!(
            Reply::Error("unknown command 'x'".to_string()).serialize(),
            b"-ERR unknown command 'x'\r\n"
        );
    }
}
