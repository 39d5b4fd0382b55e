use std::fmt::Display;

/// How a subscription topic should be matched against published topics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStyle {
    /// The topic must be equal to the pattern.
    #[default]
    Exact,
    /// The topic must start with all components of the pattern.
    Prefix,
    /// Each non-empty pattern component must equal the corresponding topic component.
    Wildcard,
}

impl TryFrom<&str> for MatchStyle {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "wildcard" => Ok(Self::Wildcard),
            _ => Err(Self::Error::msg(format!("invalid match style: {value}"))),
        }
    }
}

impl From<MatchStyle> for &'static str {
    fn from(value: MatchStyle) -> Self {
        match value {
            MatchStyle::Exact => "exact",
            MatchStyle::Prefix => "prefix",
            MatchStyle::Wildcard => "wildcard",
        }
    }
}

impl Display for MatchStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}
