// Colored terminal output for decisions, batch outcomes, the review queue
// and flagging statistics.
//
// This module handles all terminal-specific formatting. The main.rs command
// handlers delegate here.

use colored::Colorize;

use super::{percent, truncate_chars};
use crate::moderation::models::{ModerationResult, Severity};
use crate::pipeline::batch::{ContentProcessingResult, ProcessingOutcome};
use crate::policy::decision::{AuthorContext, AutomaticAction};
use crate::policy::rules::FlaggingRules;
use crate::queue::{ModerationQueueItem, QueuePriority};
use crate::stats::FlaggingStatistics;
use crate::store::traits::UserPenalty;

/// Display one verdict and what the policy made of it.
pub fn display_decision(result: &ModerationResult, author: &AuthorContext, action: &AutomaticAction) {
    println!(
        "\n{}",
        format!("=== Decision for {} ===", result.content_id).bold()
    );
    println!("  Content type: {}", result.content_type);
    println!("  Flags: {}", flag_list(result));
    println!(
        "  Confidence: {:.2}  Severity: {}",
        result.confidence,
        colorize_severity(result.severity())
    );
    if result.has_pii() {
        println!("  PII detections: {}", result.detected_pii.len().to_string().red());
    }
    println!(
        "  Author: reputation {}{}",
        author.reputation,
        if author.is_new_user { ", new user" } else { "" }
    );
    println!("\n  Action: {}", colorize_action(action));
    if let Some(reason) = action.reason() {
        println!("  Reason: {}", reason.dimmed());
    }
    println!();
}

/// Display the per-item results of a batch, in input order.
pub fn display_results(results: &[ContentProcessingResult]) {
    if results.is_empty() {
        println!("No content items in the batch.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Moderation Results ({} items) ===", results.len()).bold()
    );
    println!();

    println!(
        "  {:<20} {:<16} {:<14} {:>5}  {}",
        "Content".dimmed(),
        "Author".dimmed(),
        "Action".dimmed(),
        "Conf".dimmed(),
        "Details".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for result in results {
        let confidence = result
            .moderation_result
            .as_ref()
            .map(|r| format!("{:.2}", r.confidence))
            .unwrap_or_else(|| "-".to_string());

        let (action, details) = match &result.outcome {
            ProcessingOutcome::Executed(outcome) => {
                let mut details = outcome.action.reason().unwrap_or("").to_string();
                if outcome.penalty != UserPenalty::None {
                    details = format!("{details} [{}]", outcome.penalty);
                }
                if outcome.queued {
                    details = format!("{details} [queued]");
                }
                if !outcome.is_clean() {
                    details = format!("{details} [partial]");
                }
                (colorize_action(&outcome.action), details)
            }
            ProcessingOutcome::Duplicate(action) => {
                (colorize_action(action), "already executed".to_string())
            }
            ProcessingOutcome::Failed(e) => ("failed".red().bold(), e.to_string()),
        };

        println!(
            "  {:<20} {:<16} {:<14} {:>5}  {}",
            truncate_chars(&result.content_id, 17),
            truncate_chars(&result.author_id, 13),
            action,
            confidence,
            truncate_chars(details.trim(), 60).dimmed(),
        );
    }
    println!();

    let failed = results.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        println!("  {} {} items failed before a decision", "!".bright_red(), failed);
    }
}

/// Display the human review queue, most urgent first.
pub fn display_queue(items: &[ModerationQueueItem]) {
    if items.is_empty() {
        println!("Review queue is empty.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Review Queue ({} items) ===", items.len()).bold()
    );
    println!();

    for (i, item) in items.iter().enumerate() {
        println!(
            "  {:>3}. {:<20} {:<10} reports: {:<3} flags: {}",
            i + 1,
            truncate_chars(&item.content_id, 17),
            colorize_priority(item.priority),
            item.report_count,
            flag_list(&item.moderation_result),
        );
    }
    println!();

    let high = items.iter().filter(|i| i.is_high_priority()).count();
    if high > 0 {
        println!("  {} {} high-priority items", "!!".red().bold(), high);
    }
}

/// Display the running flagging statistics.
pub fn display_statistics(stats: &FlaggingStatistics) {
    println!("\n{}", "=== Flagging Statistics ===".bold());
    println!("  Processed:      {}", stats.total_processed);
    println!(
        "  Auto-approved:  {:<6} ({})",
        stats.auto_approved,
        percent(stats.auto_approval_rate())
    );
    println!(
        "  Auto-rejected:  {:<6} ({})",
        stats.auto_rejected,
        percent(stats.auto_rejection_rate())
    );
    println!(
        "  Auto-flagged:   {:<6} ({})",
        stats.auto_flagged,
        percent(stats.auto_flag_rate())
    );
    println!(
        "  Human review:   {:<6} ({})",
        stats.sent_to_human_review,
        percent(stats.human_review_rate())
    );
    println!("  PII detected:   {}", stats.pii_detected);
    if stats.pre_decision_failures > 0 {
        println!(
            "  Failures:       {}",
            stats.pre_decision_failures.to_string().red()
        );
    }
    if stats.duplicates_skipped > 0 {
        println!("  Duplicates:     {}", stats.duplicates_skipped);
    }
    if stats.execution_failures > 0 {
        println!(
            "  Aborted:        {}",
            stats.execution_failures.to_string().red()
        );
    }
    println!();
}

/// Display the active flagging rules.
pub fn display_rules(rules: &FlaggingRules) {
    println!(
        "\n{}",
        format!("=== Flagging Rules (version {}) ===", rules.version).bold()
    );
    println!("  Auto-reject threshold:  {:.2}", rules.auto_reject_threshold);
    println!("  Auto-flag threshold:    {:.2}", rules.auto_flag_threshold);
    println!("  PII auto-reject:        {}", on_off(rules.pii_auto_reject));
    println!("  Harassment auto-reject: {}", on_off(rules.harassment_auto_reject));
    println!("  Hate speech auto-reject: {}", on_off(rules.hate_speech_auto_reject));
    println!("  Spam auto-flag:         {}", on_off(rules.spam_auto_flag));
    println!("  Reports threshold:      {}", rules.multiple_reports_threshold);
    println!("  New user stricter:      {}", on_off(rules.new_user_stricter_rules));
    println!();
}

fn flag_list(result: &ModerationResult) -> String {
    if result.flags.is_empty() {
        return "none".to_string();
    }
    result
        .flags
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".dimmed()
    }
}

/// Colorize an action label.
fn colorize_action(action: &AutomaticAction) -> colored::ColoredString {
    let label = action.label();
    match action {
        AutomaticAction::AutoReject { .. } => label.red().bold(),
        AutomaticAction::AutoFlag { .. } => label.yellow(),
        AutomaticAction::RequireHumanReview => label.bright_red(),
        AutomaticAction::AutoApprove => label.green(),
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.bright_red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.green(),
    }
}

fn colorize_priority(priority: QueuePriority) -> colored::ColoredString {
    let label = priority.as_str();
    match priority {
        QueuePriority::Critical => label.red().bold(),
        QueuePriority::High => label.bright_red(),
        QueuePriority::Medium => label.yellow(),
        QueuePriority::Low => label.dimmed(),
    }
}
