//! HTML message text for chat delivery

use rust_decimal::Decimal;

use crate::density::DensityAlert;
use crate::orderbook::Side;

/// Human label for an exchange id
pub fn exchange_label(exchange: &str) -> String {
    match exchange {
        "binance" => "Binance".to_string(),
        "hyperliquid" => "Hyperliquid".to_string(),
        other => escape_html(other),
    }
}

/// Render an alert as an HTML chat message.
///
/// ```text
/// 🟢 <b>BID wall</b> | Binance
/// <b>BTCUSDT</b>
/// Price: <code>50000</code>
/// Amount: <code>10</code>
/// Volume: <b>$500,000</b> (x1.04 of $480,000)
/// <i>12:00:05 UTC</i>
/// ```
pub fn format_alert(alert: &DensityAlert) -> String {
    let (marker, side) = match alert.side {
        Side::Bid => ("🟢", "BID"),
        Side::Ask => ("🔴", "ASK"),
    };

    let ratio = alert
        .threshold_ratio()
        .map(|r| format!("x{} of ", r.round_dp(2).normalize()))
        .unwrap_or_default();

    format!(
        "{marker} <b>{side} wall</b> | {exchange}\n\
         <b>{symbol}</b>\n\
         Price: <code>{price}</code>\n\
         Amount: <code>{amount}</code>\n\
         Volume: <b>${volume}</b> ({ratio}${threshold})\n\
         <i>{time}</i>",
        exchange = exchange_label(&alert.exchange),
        symbol = escape_html(&alert.symbol),
        price = alert.price.normalize(),
        amount = alert.amount.normalize(),
        volume = group_thousands(alert.volume),
        threshold = group_thousands(alert.threshold_used),
        time = alert.timestamp.format("%H:%M:%S UTC"),
    )
}

/// Whole-unit amount with comma thousands separators.
fn group_thousands(value: Decimal) -> String {
    let rounded = value.round_dp(0);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
