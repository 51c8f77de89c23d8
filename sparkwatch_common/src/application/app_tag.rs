use ::core::fmt::Display;
use ::std::{borrow::Cow, fmt};

use ::anyhow::anyhow;
use ::serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::{Result, SparkwatchError};

/// Client-chosen identifier injected as a pod label to correlate submissions
/// with driver pods. The tag is the only join key between client intent and
/// cluster reality, so it must be a valid label value.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Clone, Serialize)]
pub struct ApplicationTag {
    tag: Cow<'static, str>,
}

impl ApplicationTag {
    pub fn new(tag: Cow<'static, str>) -> Result<Self> {
        if Self::is_label_safe(&tag) {
            Ok(Self { tag })
        } else {
            Err(SparkwatchError::not_allowed(anyhow!(
                "Application tag {:?} is not a valid label value.",
                tag
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Kubernetes label value rules: at most 63 characters, alphanumerics
    /// plus `-`, `_` and `.`, starting and ending with an alphanumeric.
    fn is_label_safe(tag: &str) -> bool {
        !tag.is_empty()
            && tag.len() <= 63
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && tag.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && tag.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
    }
}

impl<'de> Deserialize<'de> for ApplicationTag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_string(ApplicationTagVisitor)
    }
}

struct ApplicationTagVisitor;

impl Visitor<'_> for ApplicationTagVisitor {
    type Value = ApplicationTag;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a label-safe string representing an ApplicationTag")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        ApplicationTag::try_from(value.to_owned()).map_err(de::Error::custom)
    }
}

impl Display for ApplicationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag)
    }
}

impl TryFrom<String> for ApplicationTag {
    type Error = SparkwatchError;
    fn try_from(tag: String) -> Result<Self> {
        Self::new(Cow::Owned(tag))
    }
}

impl TryFrom<&'static str> for ApplicationTag {
    type Error = SparkwatchError;
    fn try_from(tag: &'static str) -> Result<Self> {
        Self::new(Cow::Borrowed(tag))
    }
}

#[cfg(test)]
mod tests {
    use ::serde_json::json;

    use super::*;

    #[test]
    fn application_tag_cannot_be_empty() {
        let result = ApplicationTag::try_from("");
        assert!(result.is_err_and(|e| e.to_string().starts_with("Not allowed:")));
    }

    #[test]
    fn application_tag_rejects_unsafe_characters() {
        for tag in ["has space", "slash/y", "-leading", "trailing-", "ünïcode"] {
            assert!(ApplicationTag::try_from(tag).is_err(), "{} accepted", tag);
        }
    }

    #[test]
    fn application_tag_rejects_over_long_values() {
        let tag = "a".repeat(64);
        assert!(ApplicationTag::try_from(tag).is_err());
    }

    #[test]
    fn application_tag_accepts_label_safe_values() -> anyhow::Result<()> {
        for tag in ["t1", "livy-batch-17-abc", "a.b_c-d", "0starts-with-digit"] {
            assert_eq!(ApplicationTag::try_from(tag)?.as_str(), tag);
        }
        Ok(())
    }

    #[test]
    fn deserialize_application_tag() -> anyhow::Result<()> {
        let result: ApplicationTag = serde_json::from_value(json!("abc"))?;
        assert_eq!(result, ApplicationTag::try_from("abc")?);
        Ok(())
    }

    #[test]
    fn cannot_deserialize_unsafe_str_to_application_tag() {
        let result: std::result::Result<ApplicationTag, _> = serde_json::from_value(json!("a b"));
        assert!(result.is_err_and(|e| e.to_string().starts_with("Not allowed:")));
    }
}
