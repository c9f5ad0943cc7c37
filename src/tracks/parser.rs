use super::{TrackIdentifier, TrackList};
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Header labels that mark the identifier column (compared lowercased + trimmed)
const IDENTIFIER_LABELS: [&str; 5] = ["uri", "track uri", "track_uri", "spotify uri", "spotify_uri"];

/// Turns uploaded delimited text into an ordered review list.
/// Rows it can't make sense of are dropped without complaint.
pub struct IdentifierParser {
    link_patterns: Vec<Regex>,
}

impl IdentifierParser {
    pub fn new() -> Self {
        let mut link_patterns = Vec::new();

        // Share links, optionally localised and with tracking query strings
        // Example: "https://open.spotify.com/intl-de/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"
        if let Ok(regex) = Regex::new(r"^https?://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?track/([A-Za-z0-9]+)") {
            link_patterns.push(regex);
        }

        // Legacy web player links
        // Example: "https://play.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"
        if let Ok(regex) = Regex::new(r"^https?://play\.spotify\.com/track/([A-Za-z0-9]+)") {
            link_patterns.push(regex);
        }

        Self { link_patterns }
    }

    /// Read a file from disk in whatever encoding it was saved with
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<TrackList> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read track list {}", path.display()))?;
        Ok(self.parse_bytes(&bytes))
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> TrackList {
        self.parse_str(&decode_text(bytes))
    }

    pub fn parse_str(&self, text: &str) -> TrackList {
        let records = split_records(text.trim());
        let Some(first) = records.first() else {
            return TrackList::default();
        };

        let header_column = first.iter().position(|field| {
            let label = field.trim().to_lowercase();
            IDENTIFIER_LABELS.contains(&label.as_str())
        });
        let (column, data_start) = match header_column {
            Some(column) => (column, 1),
            None => (0, 0),
        };

        let mut skipped = 0usize;
        let tracks: TrackList = records[data_start..]
            .iter()
            .filter_map(|record| {
                let raw = record.get(column).map(|f| f.trim()).unwrap_or("");
                let parsed = self.normalize(raw);
                if parsed.is_none() {
                    skipped += 1;
                    if !raw.is_empty() {
                        debug!("Skipping unrecognised identifier: {:?}", raw);
                    }
                }
                parsed
            })
            .collect();

        info!(
            "Parsed {} track identifiers ({} rows skipped, header: {})",
            tracks.len(),
            skipped,
            header_column.is_some()
        );
        tracks
    }

    /// Normalize one raw field into canonical form, or `None` if it isn't a track
    pub fn normalize(&self, raw: &str) -> Option<TrackIdentifier> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return self
                .link_patterns
                .iter()
                .find_map(|pattern| pattern.captures(raw))
                .and_then(|captures| captures.get(1))
                .and_then(|token| TrackIdentifier::from_token(token.as_str()));
        }

        // a bare token can never contain ':', so the two forms don't overlap
        TrackIdentifier::parse_canonical(raw).or_else(|| TrackIdentifier::from_token(raw))
    }
}

impl Default for IdentifierParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode uploaded bytes. BOMs pick UTF-8 / UTF-16; otherwise UTF-8 with a
/// Latin-1 fallback for spreadsheet exports.
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                debug!("Input is not UTF-8, decoding as Latin-1");
                bytes.iter().map(|&b| b as char).collect()
            }
        },
    }
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Split comma-delimited text into records. Quoted fields may hold commas,
/// newlines and doubled quotes, which is what the exporter writes.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &TrackList) -> Vec<&str> {
        list.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_mixed_forms_with_header() {
        let parser = IdentifierParser::new();
        let list = parser.parse_str(
            "uri\nspotify:track:abc123\nhttps://open.spotify.com/track/xyz789\nnotanid!!",
        );
        assert_eq!(ids(&list), vec!["spotify:track:abc123", "spotify:track:xyz789"]);
    }

    #[test]
    fn test_header_picks_identifier_column() {
        let parser = IdentifierParser::new();
        let list = parser.parse_str("Title,Artist,URI\nSong A,Band,spotify:track:aaa\r\nSong B,Band,bbb\r\n");
        assert_eq!(ids(&list), vec!["spotify:track:aaa", "spotify:track:bbb"]);

        let list = parser.parse_str("Track Name,Track URI\nx,spotify:track:ccc");
        assert_eq!(ids(&list), vec!["spotify:track:ccc"]);
    }

    #[test]
    fn test_without_header_uses_first_field() {
        let parser = IdentifierParser::new();
        let list = parser.parse_str("abc,ignored\n\nspotify:track:def,also ignored\n,missing");
        assert_eq!(ids(&list), vec!["spotify:track:abc", "spotify:track:def"]);
    }

    #[test]
    fn test_link_variants() {
        let parser = IdentifierParser::new();
        let normalized = |raw: &str| parser.normalize(raw).map(|id| id.as_str().to_string());

        assert_eq!(
            normalized("https://open.spotify.com/intl-de/track/4uLU6hMCjMI75M1A2tKUQC?si=1f2e"),
            Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            normalized("http://play.spotify.com/track/abc"),
            Some("spotify:track:abc".to_string())
        );
        assert_eq!(normalized("https://open.spotify.com/album/abc"), None);
        assert_eq!(normalized("https://example.com/track/abc"), None);
        assert_eq!(normalized("spotify:episode:abc"), None);
        assert_eq!(normalized("   "), None);
    }

    #[test]
    fn test_bare_tokens_that_look_like_prefixes() {
        let parser = IdentifierParser::new();
        let list = parser.parse_str("uri\nspotifyA1\nhttp9Zx\nplainTok\nhttps\nspotify:track:");
        assert_eq!(
            ids(&list),
            vec!["spotify:track:spotifyA1", "spotify:track:http9Zx", "spotify:track:plainTok", "spotify:track:https"]
        );
    }

    #[test]
    fn test_empty_input() {
        let parser = IdentifierParser::new();
        assert!(parser.parse_str("").is_empty());
        assert!(parser.parse_str("uri\n").is_empty());
        assert!(parser.parse_bytes(&[]).is_empty());
    }

    #[test]
    fn test_reparsing_output_is_stable() {
        let parser = IdentifierParser::new();
        let first = parser.parse_str("uri\nabc\nhttps://open.spotify.com/track/def\nspotify:track:abc\n???");
        let canonical = first.iter().map(|id| id.as_str()).collect::<Vec<_>>().join("\n");
        let second = parser.parse_str(&canonical);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rows_never_exceed_input() {
        let parser = IdentifierParser::new();
        let input = "uri\na\nb!\nc\n\nhttps://nowhere\nd";
        let data_rows = input.lines().count() - 1;
        let list = parser.parse_str(input);
        assert!(list.len() <= data_rows);
        assert!(list.iter().all(|id| TrackIdentifier::parse_canonical(id.as_str()).is_some()));
    }

    #[test]
    fn test_quoted_fields_from_export() {
        let parser = IdentifierParser::new();
        let exported = "uri,comment\n\"spotify:track:aaa\",\"loud, \"\"punchy\"\"\nsecond line\"\n\"spotify:track:bbb\",\"\"";
        let list = parser.parse_str(exported);
        assert_eq!(ids(&list), vec!["spotify:track:aaa", "spotify:track:bbb"]);
    }

    #[test]
    fn test_decodes_byte_order_marks() {
        let parser = IdentifierParser::new();

        let mut utf8 = vec![0xEF, 0xBB, 0xBF];
        utf8.extend_from_slice(b"uri\nabc");
        assert_eq!(ids(&parser.parse_bytes(&utf8)), vec!["spotify:track:abc"]);

        let mut utf16le = vec![0xFF, 0xFE];
        for unit in "uri\r\nabc\r\n".encode_utf16() {
            utf16le.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(ids(&parser.parse_bytes(&utf16le)), vec!["spotify:track:abc"]);

        let mut utf16be = vec![0xFE, 0xFF];
        for unit in "def".encode_utf16() {
            utf16be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(ids(&parser.parse_bytes(&utf16be)), vec!["spotify:track:def"]);
    }

    #[test]
    fn test_latin1_fallback() {
        // "Café" in Latin-1 next to a valid id
        let bytes = b"Caf\xE9,x\nabc,y";
        assert_eq!(decode_text(bytes), "Caf\u{e9},x\nabc,y");

        let parser = IdentifierParser::new();
        assert_eq!(ids(&parser.parse_bytes(bytes)), vec!["spotify:track:abc"]);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        std::fs::write(&path, "uri\nabc\n").unwrap();

        let parser = IdentifierParser::new();
        assert_eq!(ids(&parser.parse_file(&path).unwrap()), vec!["spotify:track:abc"]);
        assert!(parser.parse_file(dir.path().join("missing.csv")).is_err());
    }
}
