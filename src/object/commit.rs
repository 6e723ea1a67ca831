use crate::error::{Error, Result};
use crate::hash::ObjectId;

/// an author or committer identity attached to a [`Commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPerson {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    /// signed UTC offset in seconds; formatted as `±HHMM` on serialization
    pub tz_offset_seconds: i32,
}

impl CommitPerson {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        tz_offset_seconds: i32,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation {
                field: "person.name",
                reason: "name must not be empty".into(),
            });
        }
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Validation {
                field: "person.email",
                reason: format!("email must contain '@': {email}"),
            });
        }
        Ok(Self {
            name,
            email,
            timestamp,
            tz_offset_seconds,
        })
    }

    fn format_offset(&self) -> String {
        let sign = if self.tz_offset_seconds < 0 { '-' } else { '+' };
        let total_minutes = self.tz_offset_seconds.abs() / 60;
        format!("{sign}{:02}{:02}", total_minutes / 60, total_minutes % 60)
    }

    fn parse_offset(s: &str) -> Result<i32> {
        if s.len() != 5 || !(s.starts_with('+') || s.starts_with('-')) {
            return Err(Error::MalformedObject(format!("malformed timezone offset: {s}")));
        }
        let hours: i32 = s[1..3]
            .parse()
            .map_err(|_| Error::MalformedObject(format!("malformed timezone offset: {s}")))?;
        let minutes: i32 = s[3..5]
            .parse()
            .map_err(|_| Error::MalformedObject(format!("malformed timezone offset: {s}")))?;
        let total = hours * 3600 + minutes * 60;
        Ok(if s.starts_with('-') { -total } else { total })
    }

    /// `"<name> <<email>> <seconds> <±HHMM>"`
    fn serialize(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp,
            self.format_offset()
        )
    }

    fn parse(line: &str) -> Result<Self> {
        let open = line
            .find('<')
            .ok_or_else(|| Error::MalformedObject(format!("person line missing email: {line}")))?;
        let close = line
            .find('>')
            .ok_or_else(|| Error::MalformedObject(format!("person line missing email: {line}")))?;
        if close < open {
            return Err(Error::MalformedObject(format!("malformed person line: {line}")));
        }
        let name = line[..open].trim();
        let email = &line[open + 1..close];
        let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();
        if rest.len() != 2 {
            return Err(Error::MalformedObject(format!(
                "person line missing timestamp/offset: {line}"
            )));
        }
        let timestamp: i64 = rest[0]
            .parse()
            .map_err(|_| Error::MalformedObject(format!("malformed timestamp: {}", rest[0])))?;
        let tz_offset_seconds = Self::parse_offset(rest[1])?;
        CommitPerson::new(name, email, timestamp, tz_offset_seconds)
    }
}

/// a snapshot commit: a tree plus zero or more parents, author/committer, and a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: CommitPerson,
    pub committer: CommitPerson,
    pub message: String,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: CommitPerson,
        committer: CommitPerson,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            message: message.into(),
        }
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// `tree <hex>\n` + `parent <hex>\n` per parent + `author ...\n` + `committer ...\n`
    /// + blank line + message bytes, verbatim
    pub fn serialize(&self) -> Vec<u8> {
        let mut text = format!("tree {}\n", self.tree.to_hex());
        for parent in &self.parents {
            text.push_str(&format!("parent {}\n", parent.to_hex()));
        }
        text.push_str(&format!("author {}\n", self.author.serialize()));
        text.push_str(&format!("committer {}\n", self.committer.serialize()));
        text.push('\n');
        let mut bytes = text.into_bytes();
        bytes.extend_from_slice(self.message.as_bytes());
        bytes
    }

    pub fn parse(content: &[u8]) -> Result<Commit> {
        let text = std::str::from_utf8(content)
            .map_err(|_| Error::MalformedObject("commit is not valid utf8".into()))?;

        let header_end = text
            .find("\n\n")
            .ok_or_else(|| Error::MalformedObject("commit missing blank line before message".into()))?;
        let header = &text[..header_end];
        let message = &text[header_end + 2..];

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in header.lines() {
            if let Some(hex) = line.strip_prefix("tree ") {
                if tree.is_some() {
                    return Err(Error::MalformedObject("commit has multiple tree headers".into()));
                }
                tree = Some(ObjectId::from_hex(hex)?);
            } else if let Some(hex) = line.strip_prefix("parent ") {
                parents.push(ObjectId::from_hex(hex)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                if author.is_some() {
                    return Err(Error::MalformedObject("commit has multiple author headers".into()));
                }
                author = Some(CommitPerson::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                if committer.is_some() {
                    return Err(Error::MalformedObject(
                        "commit has multiple committer headers".into(),
                    ));
                }
                committer = Some(CommitPerson::parse(rest)?);
            } else if !line.is_empty() {
                return Err(Error::MalformedObject(format!("unrecognized commit header: {line}")));
            }
        }

        let tree = tree.ok_or_else(|| Error::MalformedObject("commit missing tree header".into()))?;
        let author = author.ok_or_else(|| Error::MalformedObject("commit missing author header".into()))?;
        let committer =
            committer.ok_or_else(|| Error::MalformedObject("commit missing committer header".into()))?;

        Ok(Commit::new(tree, parents, author, committer, message))
    }
}
