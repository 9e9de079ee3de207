//! Quartz reply lines
//!
//! Every reply starts with a two character tag (`.E` error, `.B` locked,
//! otherwise a data tag such as `.RAD` or `.AV`). Data replies carry their
//! payload after the first comma.

use crate::error::{Error, Result};

/// A classified reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<'a> {
    /// `.E...`
    Error(&'a str),
    /// `.B...` (output locked)
    Locked(&'a str),
    /// Any other tag; `payload` is the text after the first comma
    Data { head: &'a str, payload: Option<&'a str> },
}

impl<'a> Reply<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.starts_with(".E") {
            Reply::Error(line)
        } else if line.starts_with(".B") {
            Reply::Locked(line)
        } else {
            match line.split_once(',') {
                Some((head, payload)) => Reply::Data {
                    head,
                    payload: Some(payload),
                },
                None => Reply::Data {
                    head: line,
                    payload: None,
                },
            }
        }
    }
}

/// Name lookup: payload text, empty when the reply has no comma
pub fn parse_name(line: &str, what: &str) -> Result<String> {
    match Reply::parse(line) {
        Reply::Error(raw) | Reply::Locked(raw) => {
            Err(Error::Protocol(format!("Error reading {}: {}", what, raw)))
        }
        Reply::Data { payload, .. } => Ok(payload.unwrap_or_default().to_string()),
    }
}

/// Routing lookup: `None` when the router reports no assignment
pub fn parse_routing(line: &str, output: u32) -> Result<Option<u32>> {
    match Reply::parse(line) {
        Reply::Error(raw) | Reply::Locked(raw) => Err(Error::Protocol(format!(
            "Error reading routing for output {}: {}",
            output, raw
        ))),
        Reply::Data { payload: None, .. } => Ok(None),
        Reply::Data {
            payload: Some(payload),
            ..
        } => {
            let input: i64 = payload.trim().parse().map_err(|_| {
                Error::Protocol(format!(
                    "Malformed routing reply for output {}: {:?}",
                    output, line
                ))
            })?;
            Ok(u32::try_from(input).ok().filter(|i| *i > 0))
        }
    }
}

/// Switch acknowledgement
pub fn parse_switch(line: &str, output: u32, input: u32) -> Result<()> {
    match Reply::parse(line) {
        Reply::Error(raw) => Err(Error::Protocol(format!(
            "Switch failed: output={}, input={} ({})",
            output, input, raw
        ))),
        Reply::Locked(_) => Err(Error::OutputLocked { output }),
        Reply::Data { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_classification() {
        assert_eq!(Reply::parse(".E"), Reply::Error(".E"));
        assert_eq!(Reply::parse(".BV12\r\n"), Reply::Locked(".BV12"));
        assert_eq!(
            Reply::parse(".RAD3,CAM 3, left"),
            Reply::Data {
                head: ".RAD3",
                payload: Some("CAM 3, left")
            }
        );
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!(parse_name(".RAS5,VT 1", "source 5").unwrap(), "VT 1");
        assert_eq!(parse_name(".RAS5", "source 5").unwrap(), "");
        assert!(matches!(parse_name(".E", "source 5"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_routing_parsing() {
        assert_eq!(parse_routing(".AV12,45", 12).unwrap(), Some(45));
        assert_eq!(parse_routing(".AV12", 12).unwrap(), None);
        assert_eq!(parse_routing(".AV12,-1", 12).unwrap(), None);
        assert!(parse_routing(".AV12,xx", 12).is_err());
        assert!(parse_routing(".E", 12).is_err());
    }

    #[test]
    fn test_switch_locked_is_distinct() {
        assert!(parse_switch(".UV12,3", 12, 3).is_ok());
        assert!(matches!(
            parse_switch(".B", 12, 3),
            Err(Error::OutputLocked { output: 12 })
        ));
        let err = parse_switch(".E", 12, 3).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_ne!(err.kind(), Error::OutputLocked { output: 12 }.kind());
    }
}
