use std::{fmt::Display, str::FromStr};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A compilation target descriptor, like `cuda -arch=sm_80 -max_threads_per_block=1024`.
///
/// Extraction never interprets the target, it is attached as-is to every task.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Target {
    kind: ArcStr,
    /// `-key=value` options map to `Some(value)`, bare `-flag`s to `None`
    options: IndexMap<ArcStr, Option<ArcStr>>,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum TargetError {
    #[error("empty target")]
    Empty,
    #[error("target kind `{0}` must not start with `-`")]
    InvalidKind(String),
    #[error("target option `{0}` must have the form `-key` or `-key=value`")]
    InvalidOption(String),
}

impl Target {
    pub fn new(kind: impl Into<ArcStr>) -> Self {
        Self {
            kind: kind.into(),
            options: IndexMap::default(),
        }
    }

    pub fn with_option(mut self, key: impl Into<ArcStr>, value: impl Into<ArcStr>) -> Self {
        self.options.insert(key.into(), Some(value.into()));
        self
    }

    pub fn with_flag(mut self, key: impl Into<ArcStr>) -> Self {
        self.options.insert(key.into(), None);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The value of a `-key=value` option
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)?.as_deref()
    }

    pub fn has(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let kind = words.next().ok_or(TargetError::Empty)?;
        if kind.starts_with('-') {
            return Err(TargetError::InvalidKind(kind.to_string()));
        }

        let mut target = Target::new(kind);
        for word in words {
            let option = word
                .strip_prefix('-')
                .ok_or_else(|| TargetError::InvalidOption(word.to_string()))?;

            target = match option.split_once('=') {
                Some((key, value)) if !key.is_empty() => target.with_option(key, value),
                None if !option.is_empty() => target.with_flag(option),
                _ => return Err(TargetError::InvalidOption(word.to_string())),
            };
        }

        Ok(target)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for (key, value) in &self.options {
            match value {
                Some(value) => write!(f, " -{key}={value}")?,
                None => write!(f, " -{key}")?,
            }
        }
        Ok(())
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
