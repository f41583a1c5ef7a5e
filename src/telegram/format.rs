//! HTML rendering for reports and alerts.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::{AssetSpread, FundingQuote};

/// Escape the characters Telegram's HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Floor-rounded minutes until `at` for display; countdown text carries
/// a `~` marker when the settlement time is estimated.
fn countdown(at: Option<DateTime<Utc>>, estimated: bool, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "n/a".to_string();
    };
    let minutes = (at - now).num_minutes();
    let marker = if estimated { "~" } else { "" };
    if minutes < 0 {
        return format!("{marker}settled");
    }
    format!("{marker}{}h{:02}m", minutes / 60, minutes % 60)
}

fn side_line(label: &str, quote: &FundingQuote, now: DateTime<Utc>) -> String {
    let price = quote
        .price
        .map(|p| format!("{p:.4}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "  {label} {} <code>{}</code> {:.4}% @ {} (in {})\n",
        escape_html(quote.exchange),
        escape_html(&quote.symbol),
        quote.rate * 100.0,
        price,
        countdown(quote.next_settlement, quote.settlement_estimated, now),
    )
}

/// On-demand report of the ranked spreads.
pub fn render_report(spreads: &[AssetSpread], now: DateTime<Utc>) -> String {
    if spreads.is_empty() {
        return "📭 No funding spreads matched — no asset is currently quoted on two or more exchanges.".to_string();
    }
    let mut out = String::from("📊 <b>Top funding-rate spreads</b>\n\n");
    for (rank, spread) in spreads.iter().enumerate() {
        out.push_str(&format!(
            "{}. <b>{}</b> — {:.4}%\n",
            rank + 1,
            escape_html(&spread.base_asset),
            spread.spread_pct,
        ));
        out.push_str(&side_line("▲", &spread.high, now));
        out.push_str(&side_line("▼", &spread.low, now));
        out.push('\n');
    }
    out
}

/// Alert payload for one qualifying spread.
pub fn render_alert(spread: &AssetSpread, eta_minutes: i64, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "🔔 <b>{}</b> funding spread {:.4}% — settles in ≤{} min\n\n",
        escape_html(&spread.base_asset),
        spread.spread_pct,
        eta_minutes,
    );
    out.push_str(&side_line("▲", &spread.high, now));
    out.push_str(&side_line("▼", &spread.low, now));
    out
}

/// Inline keyboard with a single refresh button carrying the top-N
/// parameter, so the callback can rebuild the same report.
pub fn refresh_keyboard(top_n: usize) -> Value {
    json!({
        "inline_keyboard": [[
            {"text": "🔄 Refresh", "callback_data": format!("top:{top_n}")}
        ]]
    })
}
