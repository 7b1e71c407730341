use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Moving-average algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    Sma,
    Ema,
    Wma,
}

impl MaKind {
    pub const ALL: [Self; 3] = [Self::Sma, Self::Ema, Self::Wma];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Wma => "wma",
        }
    }
}

impl Display for MaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithm plus span, stored as the label `sma5`, `ema25`, `wma75`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaType {
    kind: MaKind,
    span: usize,
}

impl MaType {
    pub fn new(kind: MaKind, span: usize) -> Result<Self, ValidationError> {
        if span < 2 {
            return Err(ValidationError::InvalidSpan { span });
        }
        Ok(Self { kind, span })
    }

    pub const fn kind(self) -> MaKind {
        self.kind
    }

    pub const fn span(self) -> usize {
        self.span
    }

    pub fn label(self) -> String {
        self.to_string()
    }
}

impl Display for MaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.span)
    }
}

impl FromStr for MaType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let invalid = || ValidationError::InvalidIndicatorLabel {
            value: value.to_owned(),
        };

        let kind = MaKind::ALL
            .into_iter()
            .find(|kind| normalized.starts_with(kind.as_str()))
            .ok_or_else(invalid)?;
        let span = normalized[kind.as_str().len()..]
            .parse::<usize>()
            .map_err(|_| invalid())?;

        Self::new(kind, span)
    }
}
