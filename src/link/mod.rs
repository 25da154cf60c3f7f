//! Canonical Telegram channel links (`https://t.me/c/<channel>/[<thread>/]<message>`).

use std::fmt;

/// Prefix Telegram uses to address supergroups and broadcast channels.
const CHANNEL_PREFIX: &str = "-100";

/// Errors produced while parsing a message link
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("link must contain a '/c/' segment (e.g. https://t.me/c/<channel>/<message>): {0}")]
    NotCanonicalLink(String),

    #[error("link is missing the channel id after '/c/': {0}")]
    MissingChannelId(String),

    #[error("link is missing the message id after the channel id: {0}")]
    MissingMessageId(String),

    #[error("'{segment}' is not a valid numeric id")]
    InvalidNumericId { segment: String },
}

/// Supergroup/broadcast channel id in its `-100`-prefixed form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelReference {
    base_id: i64,
    reference: i64,
}

impl ChannelReference {
    fn from_base(segment: &str) -> Result<Self, ParseError> {
        let base_id = parse_numeric(segment)?;
        if base_id < 0 {
            return Err(ParseError::InvalidNumericId {
                segment: segment.to_string(),
            });
        }

        let reference = format!("{}{}", CHANNEL_PREFIX, base_id)
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidNumericId {
                segment: segment.to_string(),
            })?;

        Ok(Self { base_id, reference })
    }

    /// The id as it appears in the link
    pub fn base_id(&self) -> i64 {
        self.base_id
    }

    /// The `-100<base_id>` reference
    pub fn reference(&self) -> i64 {
        self.reference
    }
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

/// A single message inside a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageReference {
    pub channel: ChannelReference,
    pub message_id: i64,
}

impl fmt::Display for MessageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.message_id)
    }
}

/// Parse a canonical channel link into a message reference.
///
/// The segment right after `c` is the channel id and the last segment is the
/// message id. Anything in between (a forum thread id) is ignored.
pub fn parse_link(link: &str) -> Result<MessageReference, ParseError> {
    let parts: Vec<&str> = link
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    let c_index = parts
        .iter()
        .position(|segment| *segment == "c")
        .ok_or_else(|| ParseError::NotCanonicalLink(link.to_string()))?;

    let channel_segment = parts
        .get(c_index + 1)
        .ok_or_else(|| ParseError::MissingChannelId(link.to_string()))?;

    // A lone segment after `c` could be either id, so refuse to guess.
    if parts.len() < c_index + 3 {
        return Err(ParseError::MissingMessageId(link.to_string()));
    }

    let channel = ChannelReference::from_base(channel_segment)?;
    let message_id = parse_numeric(parts[parts.len() - 1])?;

    Ok(MessageReference {
        channel,
        message_id,
    })
}

fn parse_numeric(segment: &str) -> Result<i64, ParseError> {
    // Tolerate query strings such as `?single` on the message segment.
    let digits = segment.split(['?', '#']).next().unwrap_or(segment);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidNumericId {
            segment: segment.to_string(),
        });
    }

    digits.parse::<i64>().map_err(|_| ParseError::InvalidNumericId {
        segment: segment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_link() {
        let parsed = parse_link("https://t.me/c/1234567890/555").unwrap();
        assert_eq!(parsed.channel.reference(), -1001234567890);
        assert_eq!(parsed.channel.base_id(), 1234567890);
        assert_eq!(parsed.message_id, 555);
    }

    #[test]
    fn test_thread_id_is_ignored() {
        let with_thread = parse_link("https://t.me/c/1234567890/999/555").unwrap();
        let without_thread = parse_link("https://t.me/c/1234567890/555").unwrap();
        assert_eq!(with_thread, without_thread);
    }

    #[test]
    fn test_thread_id_property_over_many_links() {
        for channel in [1u64, 42, 1234567890, 2_000_000_000_000] {
            for message in [1u64, 7, 555, 99_999] {
                for thread in [1u64, 3, 999] {
                    let plain = format!("https://t.me/c/{}/{}", channel, message);
                    let threaded = format!("https://t.me/c/{}/{}/{}", channel, thread, message);
                    assert_eq!(parse_link(&plain), parse_link(&threaded), "{}", threaded);
                }
            }
        }
    }

    #[test]
    fn test_username_link_is_not_canonical() {
        assert!(matches!(
            parse_link("https://t.me/1234567890/555"),
            Err(ParseError::NotCanonicalLink(_))
        ));
        assert!(matches!(
            parse_link("https://t.me/somechannel/555"),
            Err(ParseError::NotCanonicalLink(_))
        ));
    }

    #[test]
    fn test_missing_channel_id() {
        assert!(matches!(
            parse_link("https://t.me/c/"),
            Err(ParseError::MissingChannelId(_))
        ));
    }

    #[test]
    fn test_single_segment_after_c_is_rejected() {
        assert!(matches!(
            parse_link("https://t.me/c/1234567890"),
            Err(ParseError::MissingMessageId(_))
        ));
    }

    #[test]
    fn test_non_numeric_ids() {
        assert!(matches!(
            parse_link("https://t.me/c/abc/555"),
            Err(ParseError::InvalidNumericId { .. })
        ));
        assert!(matches!(
            parse_link("https://t.me/c/1234567890/xyz"),
            Err(ParseError::InvalidNumericId { .. })
        ));
        assert!(matches!(
            parse_link("https://t.me/c/-5/10"),
            Err(ParseError::InvalidNumericId { .. })
        ));
    }

    #[test]
    fn test_slashes_and_schemes_are_tolerated() {
        let expected = parse_link("https://t.me/c/1234567890/555").unwrap();
        assert_eq!(parse_link("t.me/c/1234567890/555/").unwrap(), expected);
        assert_eq!(parse_link("  /c/1234567890/555  ").unwrap(), expected);
        assert_eq!(parse_link("https://t.me/c/1234567890/555?single").unwrap(), expected);
    }

    #[test]
    fn test_display() {
        let parsed = parse_link("https://t.me/c/1234567890/555").unwrap();
        assert_eq!(parsed.to_string(), "-1001234567890/555");
    }
}
