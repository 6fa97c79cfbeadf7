use std::{fmt, str::FromStr};

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Newest first
    #[default]
    Recency,

    /// Highest `votes - downvotes` first
    Votes,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortMode::Recency => "recency",
            SortMode::Votes => "votes",
        })
    }
}

impl FromStr for SortMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<SortMode> {
        match s {
            "recency" | "recent" | "new" => Ok(SortMode::Recency),
            "votes" | "top" => Ok(SortMode::Votes),
            _ => Err(anyhow::anyhow!("unknown sort mode {s:?}")),
        }
    }
}
