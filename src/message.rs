//! Parser for inbound Twitch-flavored IRC lines

use fnv::FnvHashMap;

/// Normalized value of a single IRCv3 tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    /// Any value that is neither empty nor an integer
    Str(String),
    /// A value consisting only of digits
    Int(i64),
    /// A tag present with an empty or whitespace-only value
    Empty,
}

impl TagValue {
    /// String content, for string values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, for numeric values
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the tag carried no value
    pub fn is_empty(&self) -> bool {
        matches!(self, TagValue::Empty)
    }
}

/// One inbound message, parsed as far as the line allowed.
///
/// Construction never fails. A line that does not follow the expected shape
/// comes back with [`valid`](Message::valid) unset and the whole raw line
/// preserved in [`left`](Message::left), so a consumer can skip or inspect it
/// without tearing down the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    raw: String,
    tags: FnvHashMap<String, TagValue>,
    net: Option<String>,
    command: Option<String>,
    left: Option<String>,
    valid: bool,
}

impl Message {
    /// Parse a raw line. The terminator and surrounding whitespace are
    /// stripped before parsing.
    pub fn parse(line: impl AsRef<str>) -> Message {
        let raw = line.as_ref().trim().to_string();
        match parse_parts(&raw) {
            Some(parts) => Message {
                raw,
                tags: parts.tags,
                net: Some(parts.net),
                command: Some(parts.command),
                left: parts.left,
                valid: true,
            },
            None => Message {
                left: Some(raw.clone()),
                raw,
                tags: FnvHashMap::default(),
                net: None,
                command: None,
                valid: false,
            },
        }
    }

    /// The exact line this message was parsed from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All tags carried by the message
    pub fn tags(&self) -> &FnvHashMap<String, TagValue> {
        &self.tags
    }

    /// A single tag value by key
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// The network/source token, e.g. `:tmi.twitch.tv`
    pub fn net(&self) -> Option<&str> {
        self.net.as_deref()
    }

    /// The command token, e.g. `PRIVMSG #channel :text`
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Unparsed remainder: a pipelined follow-up line, or the entire raw line
    /// when parsing failed
    pub fn left(&self) -> Option<&str> {
        self.left.as_deref()
    }

    /// Whether the line parsed cleanly
    pub fn valid(&self) -> bool {
        self.valid
    }
}

struct Parts {
    tags: FnvHashMap<String, TagValue>,
    net: String,
    command: String,
    left: Option<String>,
}

fn parse_parts(raw: &str) -> Option<Parts> {
    let mut tags = FnvHashMap::default();
    let mut working = raw;

    if let Some(tag_line) = working.strip_prefix('@') {
        let (tag_block, rest) = tag_line.split_once(" :")?;
        parse_tags(tag_block, &mut tags)?;
        working = rest;
    }

    let (net, rest) = working.split_once(' ')?;

    // A pipelined read can hold more than one logical line; anything after an
    // embedded terminator is carried forward, not discarded.
    let (command, left) = match rest.split_once("\r\n") {
        Some((command, left)) => (command, Some(left.to_string())),
        None => (rest, None),
    };

    Some(Parts {
        tags,
        net: net.to_string(),
        command: command.trim_start().to_string(),
        left,
    })
}

fn parse_tags(block: &str, tags: &mut FnvHashMap<String, TagValue>) -> Option<()> {
    for entry in block.split(';') {
        let (key, value) = entry.split_once('=')?;
        // duplicate keys: last occurrence wins
        tags.insert(key.to_string(), normalize_value(value));
    }
    Some(())
}

fn normalize_value(value: &str) -> TagValue {
    if value.chars().all(char::is_whitespace) {
        // covers the empty string as well
        TagValue::Empty
    } else if value.chars().all(|c| c.is_ascii_digit()) {
        // a digit run too long for i64 stays a string
        value
            .parse()
            .map(TagValue::Int)
            .unwrap_or_else(|_| TagValue::Str(value.to_string()))
    } else {
        TagValue::Str(value.to_string())
    }
}
