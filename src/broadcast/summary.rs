use std::fmt::Write;

use crate::broadcast::delivery::{DeliveryResult, DispatchReport};

/// One-line progress update after `position` of `total` recipients.
pub fn progress(position: usize, total: usize, latest: &DeliveryResult) -> String {
    let status = match &latest.outcome {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("failed ({})", e),
    };
    format!(
        "⏳ Progress: {}/{} processed — latest: {} {}",
        position, total, latest.recipient, status
    )
}

/// Completion report: counts, elapsed time and every failed recipient with its reason.
pub fn summarize(report: &DispatchReport) -> String {
    let mut text = String::from("✅ All messages processed!\n\n📊 Summary:\n");
    let _ = writeln!(text, "• Total recipients: {}", report.total());
    let _ = writeln!(text, "• Successful: {}", report.successful());
    let _ = write!(text, "• Failed: {}", report.failed());
    let elapsed = report.elapsed().num_seconds().max(0);
    let _ = write!(text, "\n• Elapsed: {}s", elapsed);

    if report.failed() > 0 {
        text.push_str("\n\n❌ Failed to send to:\n");
        for (i, result) in report.failures().enumerate() {
            if let Some(error) = result.error() {
                let _ = writeln!(text, "{}. {} — {}", i + 1, result.recipient, error);
            }
        }
        text.push_str(
            "\nNote: recipients may have privacy settings that prevent receiving \
             messages from bots, or the username may not exist.",
        );
    }

    text
}
