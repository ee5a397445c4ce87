//! Streams, channels and view schemas

use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalog-assigned stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Int,
    Float,
    Text,
}

impl ChannelType {
    /// Parses a declared type name, accepting the common SQL spellings
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" => Some(ChannelType::Int),
            "float" | "double" | "real" => Some(ChannelType::Float),
            "text" | "varchar" | "string" => Some(ChannelType::Text),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ChannelType::Int | ChannelType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Int => "int",
            ChannelType::Float => "float",
            ChannelType::Text => "text",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, typed column of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

impl Channel {
    pub fn new(name: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            name: name.into(),
            channel_type,
        }
    }
}

/// A sensor stream as registered in the metadata catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub owner: String,
    pub name: String,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Stream {
    /// Ordinal of a channel, matched case-insensitively
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn channel(&self, ordinal: usize) -> Option<&Channel> {
        self.channels.get(ordinal)
    }

    pub fn width(&self) -> usize {
        self.channels.len()
    }

    /// Schema of the stream's own rows
    pub fn schema(&self) -> ViewSchema {
        ViewSchema::new(self.channels.clone())
    }
}

/// Column layout of a stream or temporary view
///
/// Every row carries a timestamp in addition to these columns; the timestamp
/// is addressed as `timestamp` in predicates and is never listed here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewSchema {
    pub columns: Vec<Channel>,
}

impl ViewSchema {
    pub fn new(columns: Vec<Channel>) -> Self {
        Self { columns }
    }

    /// Schema whose columns are named `channel1..channelN` after the given types
    pub fn synthetic(types: &[ChannelType]) -> Self {
        Self {
            columns: types
                .iter()
                .enumerate()
                .map(|(i, t)| Channel::new(synthetic_name(i), *t))
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The first `width` columns
    pub fn prefix(&self, width: usize) -> Self {
        Self {
            columns: self.columns.iter().take(width).cloned().collect(),
        }
    }
}

/// Positional column name used inside correlated views (1-based)
pub(crate) fn synthetic_name(ordinal: usize) -> String {
    format!("channel{}", ordinal + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream {
            id: StreamId::new(7),
            owner: "alice".into(),
            name: "accel".into(),
            channels: vec![
                Channel::new("x", ChannelType::Float),
                Channel::new("Label", ChannelType::Text),
            ],
            tags: vec![],
        }
    }

    #[test]
    fn test_channel_lookup_is_case_insensitive() {
        let s = stream();
        assert_eq!(s.channel_index("X"), Some(0));
        assert_eq!(s.channel_index("label"), Some(1));
        assert_eq!(s.channel_index("y"), None);
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!(ChannelType::parse("INTEGER"), Some(ChannelType::Int));
        assert_eq!(ChannelType::parse("double"), Some(ChannelType::Float));
        assert_eq!(ChannelType::parse("varchar"), Some(ChannelType::Text));
        assert_eq!(ChannelType::parse("blob"), None);
    }

    #[test]
    fn test_synthetic_schema_names() {
        let schema = ViewSchema::synthetic(&[ChannelType::Float, ChannelType::Text]);
        assert_eq!(schema.names(), vec!["channel1", "channel2"]);
        assert_eq!(schema.prefix(1).width(), 1);
    }

    #[test]
    fn test_channel_serde_uses_type_key() {
        let json = serde_json::to_value(Channel::new("x", ChannelType::Int)).unwrap();
        assert_eq!(json["type"], "int");
    }
}
