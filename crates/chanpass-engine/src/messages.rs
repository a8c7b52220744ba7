//! Subscriber-facing message texts. Plain text, no markup.

use chanpass_core::{access::InviteLink, subscription::RenewalKind};
use chrono::{DateTime, TimeDelta, Utc};

const EXPIRY_FORMAT: &str = "%d %b %Y %H:%M UTC";

fn format_expiry(at: DateTime<Utc>) -> String {
  at.format(EXPIRY_FORMAT).to_string()
}

/// Sent after a purchase whose access grant went through (or was not
/// needed).
pub fn purchase_confirmed(
  subject: &str,
  kind: RenewalKind,
  expires_at: DateTime<Utc>,
  invite: Option<&InviteLink>,
) -> String {
  let headline = match kind {
    RenewalKind::Created => format!("✅ Payment successful! You now have access to {subject}."),
    RenewalKind::Extended | RenewalKind::Restarted => {
      format!("✅ Payment successful! Your access to {subject} has been renewed.")
    }
    RenewalKind::Duplicate | RenewalKind::Conflict => {
      format!("✅ This payment for {subject} was already applied.")
    }
  };

  let mut text = format!("{headline}\nValid until {}.", format_expiry(expires_at));
  if let Some(link) = invite {
    text.push_str(&format!(
      "\nJoin here (single use, valid until {}): {}",
      format_expiry(link.expires_at),
      link.url
    ));
  }
  text
}

/// Sent when payment was recorded but neither grant path worked.
pub fn grant_failed(subject: &str, expires_at: DateTime<Utc>, support: &str) -> String {
  format!(
    "✅ Payment received for {subject}, valid until {}.\n⚠️ We could not add you \
     to the channel automatically. Please contact support: {support}",
    format_expiry(expires_at)
  )
}

/// Sent when a redelivered payment's period is already over.
pub fn duplicate_after_expiry(subject: &str, expired_at: DateTime<Utc>) -> String {
  format!(
    "This payment for {subject} was already applied. That access period \
     ended on {}. Purchase again any time to rejoin.",
    format_expiry(expired_at)
  )
}

/// Sent when a payment cannot be matched to a subscription it may renew.
pub fn unmatched_payment(subject: &str, support: &str) -> String {
  format!(
    "⚠️ Sorry, we could not match your payment to {subject}. Please contact \
     support with your payment details: {support}"
  )
}

pub fn reminder(subject: &str, expires_at: DateTime<Utc>, remaining: TimeDelta) -> String {
  format!(
    "⏰ Your access to {subject} ends in {} ({}). Renew now to keep your \
     remaining time.",
    describe_remaining(remaining),
    format_expiry(expires_at)
  )
}

pub fn access_ended(subject: &str) -> String {
  format!(
    "Your access to {subject} has ended. Purchase again any time to rejoin."
  )
}

/// Whole days, else whole hours, else whole minutes; always rounded down.
pub fn describe_remaining(remaining: TimeDelta) -> String {
  fn plural(n: i64, unit: &str) -> String {
    if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") }
  }

  if remaining.num_days() >= 1 {
    plural(remaining.num_days(), "day")
  } else if remaining.num_hours() >= 1 {
    plural(remaining.num_hours(), "hour")
  } else {
    plural(remaining.num_minutes().max(0), "minute")
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn remaining_time_rounds_down_to_largest_unit() {
    assert_eq!(describe_remaining(TimeDelta::hours(47)), "1 day");
    assert_eq!(describe_remaining(TimeDelta::days(2)), "2 days");
    assert_eq!(describe_remaining(TimeDelta::minutes(90)), "1 hour");
    assert_eq!(describe_remaining(TimeDelta::minutes(59)), "59 minutes");
    assert_eq!(describe_remaining(TimeDelta::seconds(30)), "0 minutes");
  }

  #[test]
  fn confirmation_mentions_expiry_and_invite() {
    let at = Utc.with_ymd_and_hms(2025, 3, 31, 9, 5, 0).unwrap();
    let link = InviteLink { url: "https://t.me/+abc".into(), expires_at: at };
    let text = purchase_confirmed("Module 10", RenewalKind::Created, at, Some(&link));
    assert!(text.contains("Module 10"));
    assert!(text.contains("31 Mar 2025 09:05 UTC"));
    assert!(text.contains("https://t.me/+abc"));
  }

  #[test]
  fn late_duplicate_says_access_ended() {
    let at = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
    let text = duplicate_after_expiry("Module 10", at);
    assert!(text.contains("ended on 31 Jan 2025 12:00 UTC"));
    assert!(!text.contains("Valid until"));
  }

  #[test]
  fn grant_failure_names_support_contact() {
    let at = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
    let text = grant_failed("Module 10", at, "support@example.com");
    assert!(text.contains("support@example.com"));
    assert!(text.contains("31 Mar 2025"));
  }
}
