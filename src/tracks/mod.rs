// Track identifiers - the opaque tokens a review session walks through
// Parsed once from user input, never mutated afterwards

pub mod parser; // raw delimited text -> ordered identifiers

pub use parser::{decode_text, IdentifierParser};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme used for canonical identifiers (`spotify:track:<token>`)
pub const SCHEME: &str = "spotify";

const TRACK_SEGMENT: &str = ":track:";

/// A single playable track in canonical `<scheme>:track:<token>` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackIdentifier(String);

impl TrackIdentifier {
    /// Wrap a bare alphanumeric token into canonical form
    pub fn from_token(token: &str) -> Option<Self> {
        if is_valid_token(token) {
            Some(Self(format!("{}{}{}", SCHEME, TRACK_SEGMENT, token)))
        } else {
            None
        }
    }

    /// Accept text that is already canonical, rejecting anything else
    pub fn parse_canonical(text: &str) -> Option<Self> {
        let token = text.strip_prefix(SCHEME)?.strip_prefix(TRACK_SEGMENT)?;
        if is_valid_token(token) {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare token after the track segment, as the metadata endpoint wants it
    pub fn token(&self) -> &str {
        let prefix_len = SCHEME.len() + TRACK_SEGMENT.len();
        &self.0[prefix_len..]
    }
}

impl fmt::Display for TrackIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Ordered review list. Insertion order is review order, duplicates allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackList {
    tracks: Vec<TrackIdentifier>,
}

impl TrackList {
    pub fn new(tracks: Vec<TrackIdentifier>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackIdentifier> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackIdentifier> {
        self.tracks.iter()
    }

    pub fn as_slice(&self) -> &[TrackIdentifier] {
        &self.tracks
    }
}

impl From<Vec<TrackIdentifier>> for TrackList {
    fn from(tracks: Vec<TrackIdentifier>) -> Self {
        Self::new(tracks)
    }
}

impl FromIterator<TrackIdentifier> for TrackList {
    fn from_iter<I: IntoIterator<Item = TrackIdentifier>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TrackList {
    type Item = &'a TrackIdentifier;
    type IntoIter = std::slice::Iter<'a, TrackIdentifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wrapping() {
        let id = TrackIdentifier::from_token("abc123").unwrap();
        assert_eq!(id.as_str(), "spotify:track:abc123");
        assert_eq!(id.token(), "abc123");

        assert!(TrackIdentifier::from_token("").is_none());
        assert!(TrackIdentifier::from_token("abc-123").is_none());
    }

    #[test]
    fn test_canonical_acceptance() {
        let id = TrackIdentifier::parse_canonical("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(id.token(), "4uLU6hMCjMI75M1A2tKUQC");

        assert!(TrackIdentifier::parse_canonical("spotify:album:4uLU6hMCjMI75M1A2tKUQC").is_none());
        assert!(TrackIdentifier::parse_canonical("spotify:track:").is_none());
        assert!(TrackIdentifier::parse_canonical("spotify:track:bad id").is_none());
    }

    #[test]
    fn test_list_keeps_duplicates_in_order() {
        let a = TrackIdentifier::from_token("a").unwrap();
        let b = TrackIdentifier::from_token("b").unwrap();
        let list: TrackList = vec![a.clone(), b.clone(), a.clone()].into_iter().collect();

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), Some(&a));
        assert_eq!(list.get(2), Some(&a));
        assert_eq!(list.get(3), None);
    }
}
