//! Tags of the intermediate statistics stream.

use std::fmt;
use std::str::FromStr;

/// Semantic rule selected by the first field of a stream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Free form text.
    Freeform,
    /// Key/value pair; consecutive pairs are aligned without borders.
    KvPair,
    TableRow,
    TableHeader,
    /// First row of a table section.
    TableSection,
    /// Set of records.
    DataSet,
    /// One record of data.
    Record,
    TreeHeader,
    TreeBranch,
    TreeLeaf,
}

impl Tag {
    pub const ALL: [Tag; 10] = [
        Tag::Freeform,
        Tag::KvPair,
        Tag::TableRow,
        Tag::TableHeader,
        Tag::TableSection,
        Tag::DataSet,
        Tag::Record,
        Tag::TreeHeader,
        Tag::TreeBranch,
        Tag::TreeLeaf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tag::Freeform => "FREEFORM",
            Tag::KvPair => "KV_PAIR",
            Tag::TableRow => "TABLE_ROW",
            Tag::TableHeader => "TABLE_HEADER",
            Tag::TableSection => "TABLE_SECTION",
            Tag::DataSet => "DATA_SET",
            Tag::Record => "RECORD",
            Tag::TreeHeader => "TREE_HEADER",
            Tag::TreeBranch => "TREE_BRANCH",
            Tag::TreeLeaf => "TREE_LEAF",
        }
    }

    /// Structural tags carry no data of their own.
    pub fn is_structural(self) -> bool {
        matches!(self, Tag::DataSet | Tag::Record)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.name() == s)
            .ok_or_else(|| format!("Unrecognized tag: {s}"))
    }
}
