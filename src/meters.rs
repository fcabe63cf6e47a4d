use crate::types::{CreditsStatus, UsageStatus};

/// Share of the quota consumed at which a meter switches to its warning state.
pub const WARN_RATIO: f64 = 0.8;

/// Remaining free uses. A server-supplied `remaining` wins verbatim.
pub fn effective_remaining(u: &UsageStatus) -> u64 {
    u.remaining.unwrap_or_else(|| u.limit.saturating_sub(u.count))
}

pub fn usage_warning(u: &UsageStatus) -> bool {
    if u.limit == 0 {
        return false;
    }
    u.count as f64 / u.limit as f64 >= WARN_RATIO
}

pub fn credits_warning(c: &CreditsStatus) -> bool {
    if c.max_balance == 0 {
        return false;
    }
    let spent = c.max_balance.saturating_sub(c.balance);
    spent as f64 / c.max_balance as f64 >= WARN_RATIO
}

pub fn usage_badge(u: &UsageStatus) -> String {
    format!(
        "Free uses: {}/{} ({} left)",
        u.count,
        u.limit,
        effective_remaining(u)
    )
}

// `paid_tag` mirrors the host page's paid-mode flag.
pub fn credits_badge(c: &CreditsStatus, paid_tag: bool) -> String {
    let mut text = format!("Credits: {}/{}", c.balance, c.max_balance);
    if paid_tag {
        text.push_str(" (for paid)");
    }
    text
}
