//! Raw input frames as delivered by a transport.
//!
//! Three wire formats feed the tracker. Each arrives as one line of text
//! (binary Beast is converted to its `@` text form first, see
//! [`crate::beast`]) plus the time the adapter received it.

use crate::beast::BeastRecord;

/// One line of input, tagged with its format.
#[derive(Debug, Clone, PartialEq)]
pub enum InputFrame {
    /// `*HEX;` or bare hex.
    Avr { line: String, received_at: f64 },
    /// `@TTTTTTTTTTTTHEX;`, optionally with the receiver's signal level.
    Beast {
        line: String,
        signal: Option<u8>,
        received_at: f64,
    },
    /// BaseStation CSV.
    Sbs1 { line: String, received_at: f64 },
}

impl InputFrame {
    /// Classify a text line by its shape.
    pub fn from_line(line: &str, received_at: f64) -> Self {
        let line = line.trim().to_string();
        if line.starts_with('@') {
            InputFrame::Beast {
                line,
                signal: None,
                received_at,
            }
        } else if line.contains(',') {
            InputFrame::Sbs1 { line, received_at }
        } else {
            InputFrame::Avr { line, received_at }
        }
    }

    /// Mode S Beast records become `Beast` frames. Mode A/C and status
    /// records carry nothing we track.
    pub fn from_beast(record: &BeastRecord, received_at: f64) -> Option<Self> {
        record.to_avr_line().map(|line| InputFrame::Beast {
            line,
            signal: Some(record.signal),
            received_at,
        })
    }

    pub fn line(&self) -> &str {
        match self {
            InputFrame::Avr { line, .. }
            | InputFrame::Beast { line, .. }
            | InputFrame::Sbs1 { line, .. } => line,
        }
    }

    pub fn received_at(&self) -> f64 {
        match self {
            InputFrame::Avr { received_at, .. }
            | InputFrame::Beast { received_at, .. }
            | InputFrame::Sbs1 { received_at, .. } => *received_at,
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            InputFrame::Avr { .. } => "avr",
            InputFrame::Beast { .. } => "beast",
            InputFrame::Sbs1 { .. } => "sbs1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beast::parse_record;

    #[test]
    fn test_classify_lines() {
        let avr = InputFrame::from_line("*8D4840D6202CC371C32CE0576098;\n", 1.0);
        assert!(matches!(avr, InputFrame::Avr { .. }));
        assert_eq!(avr.line(), "*8D4840D6202CC371C32CE0576098;");

        let beast = InputFrame::from_line("@0014191B25325d7c2f75b6b2cb;", 2.0);
        assert!(matches!(beast, InputFrame::Beast { signal: None, .. }));
        assert_eq!(beast.received_at(), 2.0);

        let sbs = InputFrame::from_line("MSG,8,1,1,7C4516,1,,,,,,,,,,,,,,,,0", 3.0);
        assert_eq!(sbs.format_name(), "sbs1");

        let bare = InputFrame::from_line("8D4840D6202CC371C32CE0576098", 4.0);
        assert_eq!(bare.format_name(), "avr");
    }

    #[test]
    fn test_from_beast_record() {
        let short = [
            0x1a, 0x32, 0x22, 0x1b, 0x54, 0xf0, 0x81, 0x2b, 0x26, 0x5d, 0x7c, 0x49, 0xf8, 0x28,
            0xe9, 0x43,
        ];
        let record = parse_record(&short).unwrap();
        let frame = InputFrame::from_beast(&record, 5.0).expect("Mode S record");
        assert_eq!(
            frame,
            InputFrame::Beast {
                line: "@221B54F0812B5D7C49F828E943;".into(),
                signal: Some(38),
                received_at: 5.0,
            }
        );

        let mode_ac = [0x1A, 0x31, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let record = parse_record(&mode_ac).unwrap();
        assert!(InputFrame::from_beast(&record, 5.0).is_none());
    }
}
