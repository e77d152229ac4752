//! Inbound-line classification for the GRBL/FluidNC dialect
//!
//! [`parse`] is a pure, stateless function: one text line in, one
//! [`Response`] out. It never fails on well-formed UTF-8 text; malformed or
//! unrecognized shapes fall through to [`Response::Other`].

use super::error_decoder;
use super::status::{self, StatusReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A classified inbound response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// `ok`
    Ok,
    /// `error:<code-or-text>`
    Error {
        /// Numeric error code, when the controller reported one.
        code: Option<u32>,
        /// Human-readable text: the controller's own text, or a decoded
        /// description of a numeric code.
        text: String,
    },
    /// `ALARM:<code-or-text>`
    Alarm {
        /// Numeric alarm code, when the controller reported one.
        code: Option<u32>,
        /// Human-readable text.
        text: String,
    },
    /// `<...>` status frame.
    Status(StatusReport),
    /// `Grbl <ver> [...]` / `FluidNC <ver> [...]` startup banner.
    Welcome {
        /// The raw banner text.
        text: String,
    },
    /// Anything else: `[MSG:...]`, `[GC:...]`, `$n=value` echoes, etc.
    Other(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error { code: Some(c), text } => write!(f, "error:{c} ({text})"),
            Self::Error { code: None, text } => write!(f, "error:{text}"),
            Self::Alarm { code: Some(c), text } => write!(f, "ALARM:{c} ({text})"),
            Self::Alarm { code: None, text } => write!(f, "ALARM:{text}"),
            Self::Status(_) => write!(f, "status"),
            Self::Welcome { text } => write!(f, "{text}"),
            Self::Other(text) => write!(f, "{text}"),
        }
    }
}

/// Classify one inbound line.
pub fn parse(line: &str) -> Response {
    let line = line.trim();

    if line.eq_ignore_ascii_case("ok") {
        return Response::Ok;
    }

    if let Some(rest) = strip_prefix_ci(line, "error:") {
        return classify_code(rest, true);
    }

    if let Some(rest) = strip_prefix_ci(line, "ALARM:") {
        return classify_code(rest, false);
    }

    if line.starts_with('<') {
        if let Some(report) = status::parse(line) {
            return Response::Status(report);
        }
        return Response::Other(line.to_string());
    }

    if line.starts_with("Grbl ") || line.starts_with("FluidNC ") {
        return Response::Welcome { text: line.to_string() };
    }

    Response::Other(line.to_string())
}

fn classify_code(rest: &str, is_error: bool) -> Response {
    let rest = rest.trim();
    match rest.parse::<u32>() {
        Ok(code) => {
            let decoded = if is_error {
                u8::try_from(code)
                    .map(error_decoder::decode_error)
                    .unwrap_or("unrecognized error code")
            } else {
                u8::try_from(code)
                    .map(error_decoder::decode_alarm)
                    .unwrap_or("unrecognized alarm code")
            };
            if is_error {
                Response::Error { code: Some(code), text: decoded.to_string() }
            } else {
                Response::Alarm { code: Some(code), text: decoded.to_string() }
            }
        }
        Err(_) => {
            if is_error {
                Response::Error { code: None, text: rest.to_string() }
            } else {
                Response::Alarm { code: None, text: rest.to_string() }
            }
        }
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_case_insensitively() {
        assert_eq!(parse("ok"), Response::Ok);
        assert_eq!(parse("OK"), Response::Ok);
        assert_eq!(parse("  ok  "), Response::Ok);
    }

    #[test]
    fn parses_numeric_error_with_decoded_text() {
        match parse("error:9") {
            Response::Error { code: Some(9), text } => {
                assert!(text.contains("locked out"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_textual_error() {
        match parse("error:Invalid gcode") {
            Response::Error { code: None, text } => assert_eq!(text, "Invalid gcode"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_alarm_case_insensitively() {
        match parse("alarm:1") {
            Response::Alarm { code: Some(1), text } => assert!(text.contains("Hard limit")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_status_frame() {
        assert!(matches!(parse("<Idle|MPos:0,0,0>"), Response::Status(_)));
    }

    #[test]
    fn parses_welcome_banners() {
        assert!(matches!(parse("Grbl 1.1h ['$' for help]"), Response::Welcome { .. }));
        assert!(matches!(parse("FluidNC v3.7.0"), Response::Welcome { .. }));
    }

    #[test]
    fn falls_back_to_other() {
        assert_eq!(parse("[MSG:Check Door]"), Response::Other("[MSG:Check Door]".to_string()));
    }

    #[test]
    fn malformed_status_frame_degrades_to_other() {
        assert!(matches!(parse("<>"), Response::Other(_)));
    }
}
