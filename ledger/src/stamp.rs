use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

const UNSET: &str = "0";
const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const READ_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A ledger timestamp column: either `0` (never happened) or a local date and time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stamp {
    #[default]
    Unset,
    At(NaiveDateTime),
}

impl Stamp {
    pub fn now() -> Self {
        Self::At(chrono::Local::now().naive_local())
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::At(_))
    }
}

impl From<NaiveDateTime> for Stamp {
    fn from(t: NaiveDateTime) -> Self {
        Self::At(t)
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str(UNSET),
            Self::At(t) => write!(f, "{}", t.format(WRITE_FORMAT)),
        }
    }
}

impl FromStr for Stamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == UNSET {
            return Ok(Self::Unset);
        }
        for format in READ_FORMATS {
            if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::At(t));
            }
        }
        // a bare date means midnight:
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Self::At)
            .ok_or_else(|| Error::InvalidTimestamp(s.to_owned()))
    }
}

impl Serialize for Stamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    #[test]
    fn test_parse() -> Result<()> {
        assert_eq!(Stamp::Unset, "0".parse()?);
        assert_eq!(Stamp::Unset, "".parse()?);
        let t: Stamp = "2024-04-15T10:20:30".parse()?;
        assert_eq!("2024-04-15T10:20:30", t.to_string());
        // as written by older tooling:
        let t: Stamp = "2024-04-15 10:20:30.123456".parse()?;
        assert_eq!("2024-04-15T10:20:30", t.to_string());
        let t: Stamp = "2024-04-15".parse()?;
        assert_eq!("2024-04-15T00:00:00", t.to_string());
        assert!("yesterday".parse::<Stamp>().is_err());
        Ok(())
    }
}
