//! Entries and the line-oriented parser that produces them.
//!
//! A model turn is plain text where each entry starts on a line of the form
//! `Tag: rest`. Lines that do not start a new entry belong to the entry in
//! progress. For `Action:` the rest of the first line is the tool name, and
//! the body is everything that follows.

use agentry_core::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Thought,
    Action,
    Observation,
    Question,
    Assumption,
    Answer,
    FinalAnswer,
    Unrecognized,
}

impl Tag {
    /// Order in which line prefixes are tried.
    const MATCH_ORDER: [Tag; 7] = [
        Tag::Thought,
        Tag::Action,
        Tag::Assumption,
        Tag::Observation,
        Tag::Question,
        Tag::Answer,
        Tag::FinalAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Thought => "Thought",
            Tag::Action => "Action",
            Tag::Observation => "Observation",
            Tag::Question => "Question",
            Tag::Assumption => "Assumption",
            Tag::Answer => "Answer",
            Tag::FinalAnswer => "Final Answer",
            Tag::Unrecognized => "",
        }
    }

    /// The tag a line starts, or `Unrecognized`.
    pub fn of_line(line: &str) -> Tag {
        Self::MATCH_ORDER
            .into_iter()
            .find(|tag| {
                line.strip_prefix(tag.as_str())
                    .is_some_and(|rest| rest.starts_with(": "))
            })
            .unwrap_or(Tag::Unrecognized)
    }

    pub fn is_recognized(&self) -> bool {
        *self != Tag::Unrecognized
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed step of a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub tag: Tag,
    pub content: String,
    /// Tool name; only set for `Action` entries.
    pub argument: String,
}

impl Entry {
    pub fn new(tag: Tag, content: impl Into<String>) -> Self {
        Self {
            tag,
            content: content.into(),
            argument: String::new(),
        }
    }

    pub fn action(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tag: Tag::Action,
            content: content.into(),
            argument: tool.into(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag == Tag::Action {
            write!(f, "{}: {}\n{}", self.tag, self.argument, self.content)
        } else {
            write!(f, "{}: {}", self.tag, self.content)
        }
    }
}

/// Parse a model turn into entries.
///
/// Every non-blank line must either start an entry or continue one; anything
/// else is an error. Entry contents are trimmed at both ends, interior lines
/// (blank ones included) are kept verbatim.
pub fn parse(text: &str) -> Result<Vec<Entry>, ParseError> {
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;

    for (index, raw) in text.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let tag = Tag::of_line(line);

        if tag.is_recognized() {
            entries.extend(current.take());
            // Recognized tags always contain ": "
            let rest = line.split_once(": ").map(|(_, rest)| rest).unwrap_or_default();
            current = Some(if tag == Tag::Action {
                Entry::action(rest.trim(), "")
            } else {
                Entry::new(tag, rest.trim())
            });
        } else if let Some(entry) = current.as_mut() {
            entry.content.push('\n');
            entry.content.push_str(line);
        } else if !line.trim().is_empty() {
            return Err(ParseError::UnrecognizedLine {
                line_number: index + 1,
                line: line.to_string(),
            });
        }
    }
    entries.extend(current);

    for entry in &mut entries {
        entry.content = entry.content.trim().to_string();
    }

    Ok(entries)
}
