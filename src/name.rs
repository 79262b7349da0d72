// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Dotted variable name parsing
//!
//! CMC III variables are named `Level.Level.Leaf`, e.g.
//! `System.Enclosure.Sockets.01.Temperature`. There is no escaping: a `.`
//! always separates two segments.

use crate::error::NameError;

/// Segment separator
pub const SEPARATOR: char = '.';

/// Split a dotted name into its non-empty segments.
///
/// Segments are kept verbatim, spaces included.
pub fn parse(name: &str) -> Result<Vec<&str>, NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }

    name.split(SEPARATOR)
        .enumerate()
        .map(|(position, segment)| {
            if segment.is_empty() {
                Err(NameError::EmptySegment {
                    name: name.to_string(),
                    position,
                })
            } else {
                Ok(segment)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let segments = parse("A.B.Sockets.01.Temperature").unwrap();
        assert_eq!(segments, vec!["A", "B", "Sockets", "01", "Temperature"]);
    }

    #[test]
    fn test_parse_single_segment() {
        assert_eq!(parse("Sockets").unwrap(), vec!["Sockets"]);
    }

    #[test]
    fn test_parse_keeps_spaces() {
        let segments = parse("Unit.PDU.Sockets.Socket 01.Active Power").unwrap();
        assert_eq!(segments[3], "Socket 01");
        assert_eq!(segments[4], "Active Power");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse(""), Err(NameError::Empty));
        assert_eq!(parse("   "), Err(NameError::Empty));
    }

    #[test]
    fn test_parse_empty_segments() {
        assert!(matches!(
            parse("A..B"),
            Err(NameError::EmptySegment { position: 1, .. })
        ));
        assert!(matches!(
            parse(".A"),
            Err(NameError::EmptySegment { position: 0, .. })
        ));
        assert!(matches!(
            parse("A.B."),
            Err(NameError::EmptySegment { position: 2, .. })
        ));
    }
}
