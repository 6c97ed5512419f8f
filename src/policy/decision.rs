// Decision policy: maps one verdict plus author context to an action.
//
// Rules are evaluated in a fixed priority order and the first match wins:
//   1. PII (when enabled) rejects regardless of confidence
//   2. High-confidence harassment / hate speech rejects
//   3. Mid-confidence spam / inappropriate content flags
//   4. New users get a stricter flagging cutoff
//   5. Low-reputation authors get a looser flagging cutoff
//   6. Nothing flagged approves
//   7. Anything left over goes to a human
//
// A verdict that clears a threshold but whose flags have no rule at that
// tier falls through to the later steps. The function is pure: no I/O, no
// hidden state, same inputs give the same action.

use serde::{Deserialize, Serialize};

use super::rules::FlaggingRules;
use crate::moderation::models::{ModerationFlag, ModerationResult};

/// Confidence at which any flag on a new user's content is auto-flagged.
pub const NEW_USER_FLAG_CONFIDENCE: f64 = 0.6;

/// Confidence at which a low-reputation author's content is auto-flagged.
pub const LOW_REPUTATION_FLAG_CONFIDENCE: f64 = 0.5;

/// Authors below this reputation count as low reputation.
pub const LOW_REPUTATION_CUTOFF: i64 = 50;

pub const REASON_PII: &str = "Personal information detected";
pub const REASON_HARASSMENT: &str = "Harassment detected";
pub const REASON_HATE_SPEECH: &str = "Hate speech detected";
pub const REASON_SPAM: &str = "Potential spam detected";
pub const REASON_INAPPROPRIATE: &str = "Inappropriate content detected";
pub const REASON_NEW_USER: &str = "New user content requires review";
pub const REASON_LOW_REPUTATION: &str = "Low reputation user content flagged";

/// What we know about the author at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorContext {
    pub reputation: i64,
    pub is_new_user: bool,
}

/// The outcome of the decision policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AutomaticAction {
    AutoApprove,
    AutoReject { reason: String },
    AutoFlag { reason: String },
    RequireHumanReview,
}

impl AutomaticAction {
    fn reject(reason: &str) -> Self {
        AutomaticAction::AutoReject {
            reason: reason.to_string(),
        }
    }

    fn flag(reason: &str) -> Self {
        AutomaticAction::AutoFlag {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AutomaticAction::AutoReject { reason } | AutomaticAction::AutoFlag { reason } => {
                Some(reason)
            }
            AutomaticAction::AutoApprove | AutomaticAction::RequireHumanReview => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AutomaticAction::AutoApprove => "approve",
            AutomaticAction::AutoReject { .. } => "reject",
            AutomaticAction::AutoFlag { .. } => "flag",
            AutomaticAction::RequireHumanReview => "human review",
        }
    }
}

impl std::fmt::Display for AutomaticAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({})", self.label(), reason),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Decide what to do with one moderated content item.
pub fn decide(
    result: &ModerationResult,
    author: &AuthorContext,
    rules: &FlaggingRules,
) -> AutomaticAction {
    let confidence = result.confidence;

    // 1. PII dominates everything, whatever the confidence
    if rules.pii_auto_reject && result.has_pii() {
        return AutomaticAction::reject(REASON_PII);
    }

    // 2. Confident severe abuse
    if confidence >= rules.auto_reject_threshold {
        if rules.harassment_auto_reject && result.has_flag(ModerationFlag::Harassment) {
            return AutomaticAction::reject(REASON_HARASSMENT);
        }
        if rules.hate_speech_auto_reject && result.has_flag(ModerationFlag::HateSpeech) {
            return AutomaticAction::reject(REASON_HATE_SPEECH);
        }
    }

    // 3. Confident low-grade violations stay visible but get flagged
    if confidence >= rules.auto_flag_threshold {
        if rules.spam_auto_flag && result.has_flag(ModerationFlag::Spam) {
            return AutomaticAction::flag(REASON_SPAM);
        }
        if result.has_flag(ModerationFlag::InappropriateContent) {
            return AutomaticAction::flag(REASON_INAPPROPRIATE);
        }
    }

    // 4. New users get less benefit of the doubt
    if rules.new_user_stricter_rules
        && author.is_new_user
        && confidence >= NEW_USER_FLAG_CONFIDENCE
        && !result.flags.is_empty()
    {
        return AutomaticAction::flag(REASON_NEW_USER);
    }

    // 5. Low-reputation authors
    if author.reputation < LOW_REPUTATION_CUTOFF && confidence >= LOW_REPUTATION_FLAG_CONFIDENCE {
        return AutomaticAction::flag(REASON_LOW_REPUTATION);
    }

    // 6. Clean
    if result.flags.is_empty() {
        return AutomaticAction::AutoApprove;
    }

    // 7. Unresolved: a human decides, never a silent approve
    AutomaticAction::RequireHumanReview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::models::{ContentType, PiiDetection, PiiType};

    fn trusted() -> AuthorContext {
        AuthorContext {
            reputation: 80,
            is_new_user: false,
        }
    }

    fn result(flags: &[ModerationFlag], confidence: f64) -> ModerationResult {
        ModerationResult::new("c1", ContentType::Post, flags.iter().copied(), confidence, vec![])
    }

    fn with_pii(mut r: ModerationResult) -> ModerationResult {
        r.detected_pii.push(PiiDetection {
            pii_type: PiiType::Name,
            location_hint: "text:0".to_string(),
            confidence: 0.9,
            extracted_text: None,
        });
        r
    }

    #[test]
    fn test_spam_example_is_flagged() {
        let rules = FlaggingRules::default();
        let action = decide(&result(&[ModerationFlag::Spam], 0.75), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::flag(REASON_SPAM));
    }

    #[test]
    fn test_clean_content_is_approved() {
        let rules = FlaggingRules::default();
        let action = decide(&result(&[], 0.95), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::AutoApprove);
    }

    #[test]
    fn test_pii_dominates_low_confidence() {
        let rules = FlaggingRules::default();
        let action = decide(&with_pii(result(&[], 0.1)), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::reject(REASON_PII));
    }

    #[test]
    fn test_pii_ignored_when_toggle_off() {
        let rules = FlaggingRules {
            pii_auto_reject: false,
            ..Default::default()
        };
        let action = decide(&with_pii(result(&[], 0.95)), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::AutoApprove);
    }

    #[test]
    fn test_harassment_at_exact_threshold_rejects() {
        let rules = FlaggingRules::default();
        let action = decide(
            &result(&[ModerationFlag::Harassment], rules.auto_reject_threshold),
            &trusted(),
            &rules,
        );
        assert_eq!(action, AutomaticAction::reject(REASON_HARASSMENT));
    }

    #[test]
    fn test_harassment_checked_before_hate_speech() {
        let rules = FlaggingRules::default();
        let action = decide(
            &result(&[ModerationFlag::HateSpeech, ModerationFlag::Harassment], 0.95),
            &trusted(),
            &rules,
        );
        assert_eq!(action, AutomaticAction::reject(REASON_HARASSMENT));
    }

    #[test]
    fn test_high_confidence_spam_falls_through_to_flag() {
        // Spam has no reject rule, so a 0.95 verdict lands in the flag tier
        let rules = FlaggingRules::default();
        let action = decide(&result(&[ModerationFlag::Spam], 0.95), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::flag(REASON_SPAM));
    }

    #[test]
    fn test_unhandled_flag_goes_to_human() {
        let rules = FlaggingRules::default();
        let action = decide(&result(&[ModerationFlag::Violence], 0.99), &trusted(), &rules);
        assert_eq!(action, AutomaticAction::RequireHumanReview);
    }

    #[test]
    fn test_new_user_rule_uses_fixed_cutoff() {
        let rules = FlaggingRules::default();
        let new_user = AuthorContext {
            reputation: 80,
            is_new_user: true,
        };
        let flagged = decide(&result(&[ModerationFlag::Misinformation], 0.6), &new_user, &rules);
        assert_eq!(flagged, AutomaticAction::flag(REASON_NEW_USER));

        let below = decide(&result(&[ModerationFlag::Misinformation], 0.59), &new_user, &rules);
        assert_eq!(below, AutomaticAction::RequireHumanReview);
    }

    #[test]
    fn test_low_reputation_flags_even_without_flags() {
        let rules = FlaggingRules::default();
        let author = AuthorContext {
            reputation: 49,
            is_new_user: false,
        };
        let action = decide(&result(&[], 0.5), &author, &rules);
        assert_eq!(action, AutomaticAction::flag(REASON_LOW_REPUTATION));
    }

    #[test]
    fn test_decide_is_deterministic() {
        let rules = FlaggingRules::default();
        let r = result(&[ModerationFlag::Spam, ModerationFlag::Misinformation], 0.65);
        let first = decide(&r, &trusted(), &rules);
        for _ in 0..100 {
            assert_eq!(decide(&r, &trusted(), &rules), first);
        }
    }
}
