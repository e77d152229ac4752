//! GRBL/FluidNC status report parsing
//!
//! A status frame looks like `<Idle|MPos:0.0,0.0,0.0|FS:0,0>`. The first
//! token is the machine state; everything after is a `|`-separated list of
//! `Key:Value` fields. Recognized keys degrade gracefully: an unrecognized
//! key, or a recognized key with a malformed value, is simply absent from
//! the parsed report rather than failing the whole parse.

use serde::{Deserialize, Serialize};

/// A three-axis position as reported by the controller (X, Y, Z only; the
/// engine has no use for additional rotary axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    /// X axis, in the controller's configured units.
    pub x: f64,
    /// Y axis.
    pub y: f64,
    /// Z axis.
    pub z: f64,
}

impl Position3 {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',').filter_map(|v| v.trim().parse::<f64>().ok());
        Some(Self {
            x: parts.next()?,
            y: parts.next()?,
            z: parts.next()?,
        })
    }

    fn sub(self, rhs: Position3) -> Position3 {
        Position3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }

    fn add(self, rhs: Position3) -> Position3 {
        Position3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

/// Planner/RX buffer occupancy (`Bf:planner,rx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    /// Available planner blocks.
    pub planner: u8,
    /// Available serial RX bytes.
    pub rx: u8,
}

/// Feed/rapid/spindle override percentages (`Ov:feed,rapid,spindle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideState {
    /// Feed override, percent.
    pub feed: u16,
    /// Rapid override, percent.
    pub rapid: u16,
    /// Spindle override, percent.
    pub spindle: u16,
}

/// A parsed `<...>` status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state, e.g. `Idle`, `Run`, `Hold`, `Alarm`, `Check`, `Door`, `Home`.
    pub state: String,
    /// Machine position (`MPos`), derived from `WPos`+`WCO` if not reported directly.
    pub machine_position: Option<Position3>,
    /// Work position (`WPos`), derived from `MPos`-`WCO` if not reported directly.
    pub work_position: Option<Position3>,
    /// Work coordinate offset (`WCO`).
    pub work_coord_offset: Option<Position3>,
    /// Feed rate, from `F` or the first field of `FS`.
    pub feed_rate: Option<f64>,
    /// Spindle speed, from `S` or the second field of `FS`.
    pub spindle_speed: Option<f64>,
    /// Last executed line number (`Ln`), used to advance the executed cursor.
    pub executed_line: Option<u64>,
    /// Planner/RX buffer occupancy (`Bf`).
    pub buffer: Option<BufferState>,
    /// Override percentages (`Ov`).
    pub overrides: Option<OverrideState>,
    /// The raw, unparsed status line, kept for diagnostics.
    pub raw: String,
}

fn extract_field<'a>(body: &'a str, prefix: &str) -> Option<&'a str> {
    body.split('|')
        .find_map(|field| field.strip_prefix(prefix))
}

/// Parse a status report. Accepts either the bracketed wire form
/// (`<Idle|...>`) or the bare body (`Idle|...`).
pub fn parse(status_line: &str) -> Option<StatusReport> {
    let trimmed = status_line.trim();
    let inner = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let body = inner.strip_suffix('>').unwrap_or(inner);

    let state = body.split('|').next()?.trim().to_string();
    if state.is_empty() {
        return None;
    }

    let mpos = extract_field(body, "MPos:").and_then(Position3::parse);
    let wpos = extract_field(body, "WPos:").and_then(Position3::parse);
    let wco = extract_field(body, "WCO:").and_then(Position3::parse);

    let (machine_position, work_position) = match (mpos, wpos, wco) {
        (Some(m), Some(w), _) => (Some(m), Some(w)),
        (Some(m), None, Some(o)) => (Some(m), Some(m.sub(o))),
        (None, Some(w), Some(o)) => (Some(w.add(o)), Some(w)),
        (Some(m), None, None) => (Some(m), None),
        (None, Some(w), None) => (None, Some(w)),
        (None, None, _) => (None, None),
    };

    let (mut feed_rate, mut spindle_speed) = (None, None);
    if let Some(fs) = extract_field(body, "FS:") {
        let mut parts = fs.split(',');
        feed_rate = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
        spindle_speed = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
    }
    if let Some(f) = extract_field(body, "F:") {
        feed_rate = f.trim().parse::<f64>().ok();
    }
    if let Some(s) = extract_field(body, "S:") {
        spindle_speed = s.trim().parse::<f64>().ok();
    }

    let executed_line = extract_field(body, "Ln:").and_then(|v| v.trim().parse::<u64>().ok());

    let buffer = extract_field(body, "Bf:").and_then(|v| {
        let mut parts = v.split(',').filter_map(|p| p.trim().parse::<u8>().ok());
        Some(BufferState {
            planner: parts.next()?,
            rx: parts.next()?,
        })
    });

    let overrides = extract_field(body, "Ov:").and_then(|v| {
        let mut parts = v.split(',').filter_map(|p| p.trim().parse::<u16>().ok());
        Some(OverrideState {
            feed: parts.next()?,
            rapid: parts.next()?,
            spindle: parts.next()?,
        })
    });

    Some(StatusReport {
        state,
        machine_position,
        work_position,
        work_coord_offset: wco,
        feed_rate,
        spindle_speed,
        executed_line,
        buffer,
        overrides,
        raw: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_status() {
        let r = parse("<Idle|MPos:0.000,0.000,0.000|FS:0,0>").unwrap();
        assert_eq!(r.state, "Idle");
        assert_eq!(r.machine_position, Some(Position3 { x: 0.0, y: 0.0, z: 0.0 }));
        assert_eq!(r.feed_rate, Some(0.0));
        assert_eq!(r.spindle_speed, Some(0.0));
    }

    #[test]
    fn derives_work_position_from_offset() {
        let r = parse("<Run|MPos:10.0,5.0,-2.0|WCO:1.0,1.0,1.0>").unwrap();
        assert_eq!(r.work_position, Some(Position3 { x: 9.0, y: 4.0, z: -3.0 }));
    }

    #[test]
    fn derives_machine_position_from_work_and_offset() {
        let r = parse("<Run|WPos:9.0,4.0,-3.0|WCO:1.0,1.0,1.0>").unwrap();
        assert_eq!(r.machine_position, Some(Position3 { x: 10.0, y: 5.0, z: -2.0 }));
    }

    #[test]
    fn parses_buffer_executed_line_and_overrides() {
        let r = parse("<Run|MPos:0,0,0|Bf:15,128|Ln:42|Ov:100,100,100>").unwrap();
        assert_eq!(r.buffer, Some(BufferState { planner: 15, rx: 128 }));
        assert_eq!(r.executed_line, Some(42));
        assert_eq!(
            r.overrides,
            Some(OverrideState { feed: 100, rapid: 100, spindle: 100 })
        );
    }

    #[test]
    fn unknown_fields_are_ignored_not_fatal() {
        let r = parse("<Idle|MPos:0,0,0|Pn:XYZ|Unknown:1,2,3>").unwrap();
        assert_eq!(r.state, "Idle");
        assert!(r.machine_position.is_some());
    }

    #[test]
    fn missing_state_returns_none() {
        assert!(parse("<|MPos:0,0,0>").is_none());
    }
}
