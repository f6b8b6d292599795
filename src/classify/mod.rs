//! Classifier gateway: wraps the LLM oracle behind a strict output contract.
//!
//! The oracle is asked for one JSON object with `sentiment`, `topics`, `impact`
//! and `summary`. Answers often arrive fenced (```json ... ```) or wrapped in
//! prose; the gateway strips fences, then falls back to the first balanced
//! `{...}` before giving up with [`ClassifyError::Parse`].

pub mod gemini;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Topic tags the prompt allows.
pub const TOPIC_TAGS: [&str; 6] = ["Defi", "DAOs", "ETH2.0", "Layer2", "Hackathons", "Jobs"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub impact: Impact,
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Transport/auth/quota failure talking to the oracle.
    #[error("classifier oracle failed: {0:#}")]
    Oracle(anyhow::Error),
    /// The oracle answered, but nothing in the answer fits the contract.
    #[error("classification parse error: {reason}")]
    Parse { reason: String },
}

/// Low-level oracle: one prompt in, one text blob out. Separated so the same
/// gateway runs against the real provider and test doubles.
pub trait ClassifierOracle: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn ClassifierOracle>;

/// Fixed instruction template around the candidate text.
pub fn build_prompt(text: &str) -> String {
    let tags = TOPIC_TAGS
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an AI that professionally analyzes tweets, specifically focusing on their relevance \
to the Ethereum/cryptocurrency community. For the tweet provided, analyze whether it pertains to the \
Ethereum/cryptocurrency community, determine its sentiment, identify which topics it closely aligns \
with from the list [{tags}], assess its impact, and provide a brief summary. Format your response as \
pure JSON (not Markdown JSON) with the following structure:\n\n\
{{\n  \"sentiment\": \"positive|negative|neutral\",\n  \"topics\": [],\n  \"impact\": \"high|medium|low\",\n  \"summary\": \"brief summary here\"\n}}\n\n\
Tweet to analyze: '{text}'"
    )
}

fn fence_open_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("fence open regex"))
}

fn fence_close_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\r?\n?```$").expect("fence close regex"))
}

/// Remove one leading and one trailing code-fence marker, trimming around them.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let s = match fence_open_re().find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = s.trim();
    let s = match fence_close_re().find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

/// First balanced `{...}` in `raw`, ignoring braces inside JSON strings.
pub fn extract_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// Loose mirror of the contract; enum values are matched case-insensitively.
#[derive(Deserialize)]
struct LooseClassification {
    sentiment: String,
    #[serde(default)]
    topics: Option<LooseTopics>,
    impact: String,
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseTopics {
    Many(Vec<String>),
    One(String),
}

impl LooseClassification {
    fn into_result(self) -> Result<ClassificationResult, ClassifyError> {
        let sentiment = match self.sentiment.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "neutral" => Sentiment::Neutral,
            other => {
                return Err(ClassifyError::Parse {
                    reason: format!("unknown sentiment '{other}'"),
                })
            }
        };
        let impact = match self.impact.trim().to_ascii_lowercase().as_str() {
            "high" => Impact::High,
            "medium" => Impact::Medium,
            "low" => Impact::Low,
            other => {
                return Err(ClassifyError::Parse {
                    reason: format!("unknown impact '{other}'"),
                })
            }
        };
        let topics = match self.topics {
            Some(LooseTopics::Many(v)) => v,
            Some(LooseTopics::One(s)) => vec![s],
            None => Vec::new(),
        }
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

        Ok(ClassificationResult {
            sentiment,
            topics,
            impact,
            summary: self.summary.trim().to_string(),
        })
    }
}

fn parse_object(s: &str) -> Result<ClassificationResult, ClassifyError> {
    let loose: LooseClassification = serde_json::from_str(s).map_err(|e| ClassifyError::Parse {
        reason: e.to_string(),
    })?;
    loose.into_result()
}

/// Fence-strip + parse, then retry on the first balanced object.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, ClassifyError> {
    let first = match parse_object(strip_code_fence(raw)) {
        Ok(res) => return Ok(res),
        Err(e) => e,
    };
    match extract_balanced_object(raw) {
        Some(obj) => parse_object(obj),
        None => Err(first),
    }
}

/// Short anonymized id for log lines; candidate text itself is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stateless: no caching, every candidate goes to the oracle.
#[derive(Clone)]
pub struct ClassifierGateway {
    oracle: DynOracle,
}

impl ClassifierGateway {
    pub fn new(oracle: DynOracle) -> Self {
        Self { oracle }
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    pub async fn classify(&self, text: &str) -> Result<ClassificationResult, ClassifyError> {
        let prompt = build_prompt(text);
        let raw = self
            .oracle
            .complete(&prompt)
            .await
            .map_err(ClassifyError::Oracle)?;
        parse_classification(&raw).inspect_err(|e| {
            tracing::debug!(
                target: "classify",
                id = %anon_hash(text),
                oracle = self.oracle.name(),
                error = %e,
                "classification rejected"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str =
        r#"{"sentiment":"positive","topics":["Defi"],"impact":"high","summary":"new pool"}"#;

    #[test]
    fn fenced_and_plain_parse_the_same() {
        let fenced = format!("  \n```json\n{PLAIN}\n```  \n");
        assert_eq!(
            parse_classification(&fenced).unwrap(),
            parse_classification(PLAIN).unwrap()
        );
        let bare_fence = format!("```\n{PLAIN}```");
        assert_eq!(
            parse_classification(&bare_fence).unwrap().topics,
            vec!["Defi".to_string()]
        );
    }

    #[test]
    fn prose_wrapped_object_is_recovered() {
        let raw = format!("Sure! Here is the analysis: {PLAIN} Hope that helps {{:}}");
        let res = parse_classification(&raw).unwrap();
        assert_eq!(res.impact, Impact::High);
        assert_eq!(res.summary, "new pool");
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let raw =
            r#"note {"sentiment":"neutral","topics":[],"impact":"low","summary":"a } b {"} trailing"#;
        let obj = extract_balanced_object(raw).unwrap();
        assert!(obj.ends_with(r#""a } b {"}"#));
        assert_eq!(
            parse_classification(raw).unwrap().sentiment,
            Sentiment::Neutral
        );
    }

    #[test]
    fn near_miss_values_are_repaired() {
        let raw = r#"{"sentiment":" Positive ","topics":"Layer2","impact":"MEDIUM"}"#;
        let res = parse_classification(raw).unwrap();
        assert_eq!(res.sentiment, Sentiment::Positive);
        assert_eq!(res.impact, Impact::Medium);
        assert_eq!(res.topics, vec!["Layer2".to_string()]);
        assert_eq!(res.summary, "");
    }

    #[test]
    fn null_or_missing_topics_parse_as_empty() {
        for raw in [
            r#"{"sentiment":"positive","topics":null,"impact":"high","summary":"x"}"#,
            r#"{"sentiment":"positive","impact":"high"}"#,
        ] {
            let res = parse_classification(raw).unwrap();
            assert!(res.topics.is_empty(), "{raw}");
            assert_eq!(crate::relevance::rejection_reason(&res), Some("no_topics"));
        }
    }

    #[test]
    fn garbage_is_a_parse_error() {
        for raw in [
            "",
            "no json here",
            "{not json}",
            "```json\n```",
            r#"{"sentiment":"angry","impact":"high"}"#,
        ] {
            assert!(
                matches!(parse_classification(raw), Err(ClassifyError::Parse { .. })),
                "expected parse error for {raw:?}"
            );
        }
    }

    #[test]
    fn prompt_names_all_tags_and_text() {
        let p = build_prompt("gm ethereum");
        for tag in TOPIC_TAGS {
            assert!(p.contains(tag));
        }
        assert!(p.contains("Tweet to analyze: 'gm ethereum'"));
    }
}
