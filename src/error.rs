use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Why a tool-backed fetch produced nothing. `RaceLost` is only used
/// once the target pid is confirmed gone.
#[derive(Clone, Debug, PartialEq)]
pub enum Failure {
    Unavailable(String),
    Timeout(String, Duration),
    Exit(String, Option<i32>),
    Parse(String),
    RaceLost(i32),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(tool)  => write!(f, "{} unavailable", tool),
            Self::Timeout(tool, dur) => write!(f, "{} timed out after {:?}", tool, dur),
            Self::Exit(tool, code)   => match code {
                Some(code) => write!(f, "{} exited with {}", tool, code),
                None       => write!(f, "{} killed by signal", tool),
            },
            Self::Parse(text)        => write!(f, "unparseable output: {:?}", text),
            Self::RaceLost(pid)      => write!(f, "process {} no longer exists", pid),
        }
    }
}

impl Error for Failure {}

/// Outcome of a best-effort sub-fetch. Distinguishes a source that has
/// nothing to report from one that could not be asked.
#[derive(Clone, Debug, PartialEq)]
pub enum Fetch<T> {
    Found(T),
    NotApplicable,
    Failed(Failure),
}

impl<T> Fetch<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _                  => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Fetch<U> {
        match self {
            Self::Found(value)  => Fetch::Found(f(value)),
            Self::NotApplicable => Fetch::NotApplicable,
            Self::Failed(e)     => Fetch::Failed(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl<T> From<Option<T>> for Fetch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None        => Self::NotApplicable,
        }
    }
}

impl<T> Default for Fetch<T> {
    fn default() -> Self {
        Self::NotApplicable
    }
}
