//! Display formatting for prices, magnitudes, addresses and board timestamps

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

const COMPACT_SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

/// Format a USD amount.
///
/// Dust prices below one millionth use exponential notation, sub-cent prices
/// get six fixed decimals, everything else is grouped currency with two to six
/// fraction digits.
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return format!("${}", value);
    }
    if value < 0.000_001 {
        return format!("${}", to_exponential(value, 2));
    }
    if value < 0.01 {
        return format!("${:.6}", value);
    }

    let fixed = format!("{:.6}", value);
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < 2 {
        frac.push('0');
    }
    format!("${}.{}", group_thousands(int_part), frac)
}

/// Exponential notation with an explicit exponent sign (`3.00e-7`, `1.50e+3`)
pub fn to_exponential(value: f64, digits: usize) -> String {
    let formatted = format!("{:.*e}", digits, value);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

/// Short magnitude notation: `1.5M`, `12.35K`, `999`.
pub fn format_compact_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    let mut tier = 0usize;
    while tier + 1 < COMPACT_SUFFIXES.len() && abs >= 1000f64.powi(tier as i32 + 1) {
        tier += 1;
    }

    let mut scaled = round_to(abs / 1000f64.powi(tier as i32), 2);
    // 999_999 rounds up into the next suffix
    if scaled >= 1000.0 && tier + 1 < COMPACT_SUFFIXES.len() {
        tier += 1;
        scaled = round_to(abs / 1000f64.powi(tier as i32), 2);
    }

    format!("{}{}{}", sign, trim_decimal(scaled), COMPACT_SUFFIXES[tier])
}

/// Signed 24h change, e.g. `+3.20%`
pub fn format_change(pct: f64) -> String {
    if pct > 0.0 {
        format!("+{:.2}%", pct)
    } else {
        format!("{:.2}%", pct)
    }
}

/// Shorten an address or hash for display: `5q8RRQ...3SV2`
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Relative age label used by the whale feed
pub fn format_age(secs: u64) -> String {
    if secs == 0 {
        "Just now".to_string()
    } else {
        format!("{}s ago", secs)
    }
}

/// Imageboard post timestamp: `MM/DD/YY(Day)HH:MM:SS`
pub fn board_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%m/%d/%y(%a)%H:%M:%S").to_string()
}

/// One line of a post body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLine<'a> {
    pub text: &'a str,
    pub greentext: bool,
}

/// Split a post body into lines, marking `>` quotes as greentext
pub fn message_lines(text: &str) -> Vec<MessageLine<'_>> {
    text.split('\n')
        .map(|line| MessageLine {
            text: line,
            greentext: line.starts_with('>'),
        })
        .collect()
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn trim_decimal(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 + 1);
    out.push_str(sign);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
