//! Write admission policy.
//!
//! Decides when the publisher may enter the guarded write region of a channel.

use serde::{Deserialize, Serialize};

/// How the single writer is admitted into the guarded frame copy.
///
/// Readers always register in the reader count and back off while a write is
/// flagged; the policy only changes what the writer waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Writer raises the write flag first, then waits until every reader
    /// that is mid-copy has left. Readers never observe a half-written frame.
    #[default]
    Exclusive,

    /// Writer waits only while readers are present *and* the write flag is
    /// already raised, then raises it. With a single writer the flag is never
    /// raised at that point, so the writer does not wait for readers at all.
    Legacy,
}

impl AdmissionPolicy {
    /// Lowercase name as used in configuration files and on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!(
                "unknown admission policy '{other}' (expected 'exclusive' or 'legacy')"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_exclusive() {
        assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::Exclusive);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("exclusive".parse(), Ok(AdmissionPolicy::Exclusive));
        assert_eq!("LEGACY".parse(), Ok(AdmissionPolicy::Legacy));
        assert!("mutex".parse::<AdmissionPolicy>().is_err());
    }

    #[test]
    fn test_display_matches_serde_name() {
        #[derive(Serialize)]
        struct Wrapper {
            admission: AdmissionPolicy,
        }
        let text = toml::to_string(&Wrapper {
            admission: AdmissionPolicy::Legacy,
        })
        .unwrap();
        assert!(text.contains(&AdmissionPolicy::Legacy.to_string()));
    }
}
