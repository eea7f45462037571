use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// YAML metadata block prepended to every exported document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontMatter {
    pub source_url: String,
    pub canonical_url: String,
    pub title: String,
    pub description: Option<String>,
    pub fetched_at: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl FrontMatter {
    pub fn format_timestamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Serializes the block including its `---` delimiters
    pub fn to_block(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("---\n{}---\n", yaml))
    }

    /// Same block with the fetch timestamp blanked, for change detection
    pub fn to_stable_block(&self) -> Result<String, serde_yaml::Error> {
        let stable = Self {
            fetched_at: String::new(),
            ..self.clone()
        };
        stable.to_block()
    }
}

/// Merges configured tags with page keywords, keeping first occurrences
pub fn merge_tags(configured: &[String], keywords: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in configured.iter().chain(keywords) {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> FrontMatter {
        FrontMatter {
            source_url: "https://docs.example.com/guide/intro".into(),
            canonical_url: "https://docs.example.com/guide/intro".into(),
            title: "Intro: the basics".into(),
            description: None,
            fetched_at: FrontMatter::format_timestamp(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            ),
            tags: vec!["docs".into()],
            locale: Some("en".into()),
        }
    }

    #[test]
    fn test_block_shape() {
        let block = sample().to_block().unwrap();
        assert!(block.starts_with("---\nsource_url: "));
        assert!(block.ends_with("---\n"));
        assert!(block.contains("2024-05-01T12:00:00Z"));
        assert!(block.contains("\ndescription: null\n"));

        let yaml = block
            .strip_prefix("---\n")
            .and_then(|b| b.strip_suffix("---\n"))
            .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            parsed["source_url"].as_str(),
            Some("https://docs.example.com/guide/intro")
        );
        assert_eq!(parsed["title"].as_str(), Some("Intro: the basics"));
        assert_eq!(parsed["locale"].as_str(), Some("en"));
        assert!(parsed["description"].is_null());
    }

    #[test]
    fn test_description_always_present() {
        let mut page = sample();
        page.description = Some("How to get started".into());
        let with = page.to_block().unwrap();
        assert!(with.contains("\ndescription: How to get started\n"));

        let keys = |block: &str| -> Vec<String> {
            let yaml = block
                .strip_prefix("---\n")
                .and_then(|b| b.strip_suffix("---\n"))
                .unwrap();
            let parsed: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
            parsed
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        };
        assert_eq!(keys(&with), keys(&sample().to_block().unwrap()));
    }

    #[test]
    fn test_stable_block_ignores_timestamp() {
        let a = sample();
        let mut b = sample();
        b.fetched_at = "2030-01-01T00:00:00Z".into();
        assert_eq!(a.to_stable_block().unwrap(), b.to_stable_block().unwrap());
        assert_ne!(a.to_block().unwrap(), b.to_block().unwrap());
    }

    #[test]
    fn test_merge_tags() {
        let tags = merge_tags(
            &["docs".to_string(), "Guide".to_string()],
            &["guide".to_string(), " setup ".to_string(), "".to_string()],
        );
        assert_eq!(tags, vec!["docs", "Guide", "setup"]);
    }
}
