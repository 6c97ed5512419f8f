// Moderation result model: one verdict for one content item.
//
// These are the types that flow from the moderation model through the
// decision policy and into the action executor, queue and statistics.
// They serialize as camelCase JSON so recorded verdicts can be replayed.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::ModerationError;

/// What kind of user-generated content is being moderated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Review,
    Post,
    Comment,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Review => "review",
            ContentType::Post => "post",
            ContentType::Comment => "comment",
            ContentType::Image => "image",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal violation seriousness. Ordering is low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Minimum model confidence at which a verdict of this severity may be
    /// acted on without a human looking at it.
    pub fn auto_action_threshold(&self) -> f64 {
        match self {
            Severity::Low => 0.6,
            Severity::Medium => 0.7,
            Severity::High => 0.8,
            Severity::Critical => 0.9,
        }
    }

    pub fn is_severe(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category of content violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationFlag {
    Spam,
    Misinformation,
    InappropriateContent,
    Harassment,
    PersonalInformation,
    Violence,
    HateSpeech,
}

impl ModerationFlag {
    /// Intrinsic severity of the category.
    pub fn severity(&self) -> Severity {
        match self {
            ModerationFlag::Spam => Severity::Low,
            ModerationFlag::Misinformation => Severity::Medium,
            ModerationFlag::InappropriateContent => Severity::Medium,
            ModerationFlag::Harassment => Severity::High,
            ModerationFlag::PersonalInformation => Severity::High,
            ModerationFlag::Violence => Severity::Critical,
            ModerationFlag::HateSpeech => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationFlag::Spam => "spam",
            ModerationFlag::Misinformation => "misinformation",
            ModerationFlag::InappropriateContent => "inappropriateContent",
            ModerationFlag::Harassment => "harassment",
            ModerationFlag::PersonalInformation => "personalInformation",
            ModerationFlag::Violence => "violence",
            ModerationFlag::HateSpeech => "hateSpeech",
        }
    }
}

impl std::fmt::Display for ModerationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of personally identifiable information found in the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiType {
    Name,
    Email,
    Phone,
    Address,
    GovernmentId,
    Financial,
    Other,
}

/// A single PII hit reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiDetection {
    pub pii_type: PiiType,
    /// Where in the content the hit was found ("text:42", "image:0", ...)
    pub location_hint: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// A submission handed to the moderation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub content_id: String,
    pub content_type: ContentType,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// One verdict for one content item, as produced by the moderation model.
///
/// Created once per model call and never mutated afterwards; the pipeline
/// passes it around by reference and clones it into audit records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    pub content_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub flags: BTreeSet<ModerationFlag>,
    /// Model certainty in the assigned flags, 0.0 to 1.0
    pub confidence: f64,
    #[serde(default, rename = "detectedPII")]
    pub detected_pii: Vec<PiiDetection>,
}

impl ModerationResult {
    pub fn new(
        content_id: impl Into<String>,
        content_type: ContentType,
        flags: impl IntoIterator<Item = ModerationFlag>,
        confidence: f64,
        detected_pii: Vec<PiiDetection>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            flags: flags.into_iter().collect(),
            confidence,
            detected_pii,
        }
    }

    /// Maximum severity across all flags, or `Low` when nothing was flagged.
    pub fn severity(&self) -> Severity {
        self.flags
            .iter()
            .map(ModerationFlag::severity)
            .max()
            .unwrap_or(Severity::Low)
    }

    pub fn has_flag(&self, flag: ModerationFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn has_pii(&self) -> bool {
        !self.detected_pii.is_empty()
    }

    /// True when the model is not confident enough for the verdict's severity,
    /// or when any flag is severe enough that a human must always look.
    pub fn requires_human_review(&self) -> bool {
        self.confidence < self.severity().auto_action_threshold()
            || self.flags.iter().any(|f| f.severity().is_severe())
    }

    /// Reject verdicts the policy can't reason about.
    pub fn validate(&self) -> Result<(), ModerationError> {
        if self.content_id.trim().is_empty() {
            return Err(ModerationError::MalformedPayload(
                "verdict has an empty content id".to_string(),
            ));
        }
        // NaN fails the range check too
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ModerationError::MalformedPayload(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// In-process hash of the verdict's content, used with the content id as
    /// an idempotency key so the same verdict is never executed twice.
    ///
    /// `DefaultHasher` output may differ between builds, so the value must
    /// never be persisted or compared across processes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.content_id.hash(&mut hasher);
        self.content_type.hash(&mut hasher);
        self.flags.hash(&mut hasher);
        self.confidence.to_bits().hash(&mut hasher);
        for pii in &self.detected_pii {
            pii.pii_type.hash(&mut hasher);
            pii.location_hint.hash(&mut hasher);
            pii.confidence.to_bits().hash(&mut hasher);
            pii.extracted_text.hash(&mut hasher);
        }
        hasher.finish()
    }
}
