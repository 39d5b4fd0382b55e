use std::fmt::Display;

/// How a callee should be selected for invocations of a shared registration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPolicy {
    /// Only one callee may register the procedure.
    #[default]
    Single,
    /// Invocation is sent to callees in order of registration, one after another.
    RoundRobin,
    /// Invocation is sent to a random callee.
    Random,
    /// Invocation is sent to the first callee.
    First,
    /// Invocation is sent to the last callee.
    Last,
}

impl InvocationPolicy {
    /// Checks if the policy allows multiple callees on one registration.
    pub fn shared(&self) -> bool {
        *self != Self::Single
    }
}

impl TryFrom<&str> for InvocationPolicy {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "single" => Ok(Self::Single),
            "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            _ => Err(Self::Error::msg(format!(
                "invalid invocation policy: {value}"
            ))),
        }
    }
}

impl From<InvocationPolicy> for &'static str {
    fn from(value: InvocationPolicy) -> Self {
        match value {
            InvocationPolicy::Single => "single",
            InvocationPolicy::RoundRobin => "roundrobin",
            InvocationPolicy::Random => "random",
            InvocationPolicy::First => "first",
            InvocationPolicy::Last => "last",
        }
    }
}

impl Display for InvocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}
