//! Server-rendered board page
//!
//! The whole page is rendered from one [`SessionSnapshot`], so a single
//! request never mixes values from different updates.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Write};

use crate::config::Config;
use crate::modules::holder_fetcher::HolderSource;
use crate::modules::market_poller::TokenMetrics;
use crate::modules::whale_simulator::TxType;
use crate::state::SessionSnapshot;
use crate::utils::format::{
    board_timestamp, format_change, format_compact_number, format_currency, message_lines,
    truncate_address,
};
use crate::utils::links::{community_links, explorer_tx_url};

const BOARDS: [&str; 23] = [
    "a", "b", "c", "d", "e", "f", "g", "gif", "h", "hr", "k", "m", "o", "p", "r", "s", "t", "u",
    "v", "vg", "vr", "w", "wg",
];

const DISCLAIMER: &str = "This is a tribute site. $4CHAN is a memecoin with no intrinsic value. \
                          Do not risk money you cannot afford to lose.";

/// The board's single static post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub id: u64,
    pub no: u64,
    pub time: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub is_op: bool,
    pub replies: Vec<u64>,
}

/// Build the opening post, stamped with `now`
pub fn opening_post<Tz: TimeZone>(now: &DateTime<Tz>) -> PostData
where
    Tz::Offset: Display,
{
    PostData {
        id: 1,
        no: 88_888_888,
        time: board_timestamp(now),
        name: "Anonymous".to_string(),
        subject: Some("V4: $4CHAN ON SOLANA".to_string()),
        message: String::new(),
        is_op: true,
        replies: Vec::new(),
    }
}

/// Analytics panel tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Holders,
    Whales,
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the full page
pub fn render_page(config: &Config, snapshot: &SessionSnapshot, post: &PostData, tab: Tab) -> String {
    let mut html = String::with_capacity(16 * 1024);

    html.push_str(concat!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n",
        "<meta charset=\"utf-8\">\n",
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
        "<title>4chan on Solana</title>\n",
        "<style>",
        "body{margin:0;padding-bottom:80px;background:#f0e0d6;font-family:arial,helvetica,sans-serif;font-size:13px;color:#800000}",
        "a{color:#0000ee}.navbar{border-bottom:1px solid #b7c5d9;padding:4px 8px;font-size:12px;display:flex;flex-wrap:wrap;gap:8px}",
        ".ticker{margin-left:auto;font-family:monospace}.up{color:#16a34a}.down{color:#dc2626}",
        ".board-title{text-align:center;font-size:24px;font-weight:bold;margin:24px 0 8px}",
        ".post,.analytics{max-width:960px;margin:0 auto 16px;padding:0 8px}.subject{color:#0f0c5d;font-weight:bold}",
        ".name{color:#117743;font-weight:bold}.greentext{color:#789922;display:block}.line{display:block}",
        ".ca-box{border:2px dashed #991b1b;padding:24px;text-align:center}.ca{font-family:monospace;font-size:24px;word-break:break-all;background:#fff;padding:12px}",
        ".analytics{border:1px solid #b7c5d9}.panel-head{background:#ca6e4a;color:#fff;font-weight:bold;padding:4px 8px}",
        ".stats{background:#d6daf0;display:flex;flex-wrap:wrap;gap:16px;padding:8px;font-size:11px}",
        "table{width:100%;font-family:monospace;font-size:11px;background:#fff;border-collapse:collapse}",
        "th{background:#eeaa88;text-align:left;padding:2px}td{padding:2px}.note{font-size:10px;color:#6b7280;font-style:italic}",
        ".refreshing{color:#dc2626;font-weight:bold}.buy{background:#f0fff4}.sell{background:#fff5f5}",
        ".disclaimer{position:fixed;bottom:0;left:0;width:100%;background:#d6daf0;border-top:1px solid #b7c5d9;padding:8px;text-align:center;font-size:11px}",
        "</style>\n</head>\n<body>\n"
    ));

    render_navbar(&mut html, snapshot.metrics.as_ref());

    html.push_str("<div class=\"board-title\">4chan on Solana</div>\n<hr>\n");

    render_post(&mut html, config, post);

    if let Some(metrics) = snapshot.metrics.as_ref() {
        render_analytics(&mut html, config, metrics, snapshot, tab);
    }

    let _ = write!(
        html,
        "<div class=\"disclaimer\"><b>Disclaimer:</b> {}</div>\n</body>\n</html>\n",
        escape_html(DISCLAIMER)
    );

    html
}

fn render_navbar(html: &mut String, metrics: Option<&TokenMetrics>) {
    html.push_str("<nav class=\"navbar\">[");
    let boards: Vec<String> = BOARDS
        .iter()
        .map(|b| format!("<a href=\"#\">{}</a>", b))
        .collect();
    html.push_str(&boards.join(" / "));
    html.push_str("]<div class=\"ticker\"><b>SOLANA</b> ");

    match metrics {
        Some(m) => {
            let direction = if m.change_24h >= 0.0 { "up" } else { "down" };
            let _ = write!(
                html,
                "MC: {} Px: {} Sup: {} <span class=\"{}\">{}</span>",
                format_compact_number(m.market_cap),
                format_currency(m.price),
                format_compact_number(m.supply),
                direction,
                format_change(m.change_24h)
            );
        }
        None => html.push_str("<i>Loading...</i>"),
    }

    html.push_str("</div></nav>\n");
}

fn render_post(html: &mut String, config: &Config, post: &PostData) {
    html.push_str("<div class=\"post\"><div class=\"post-head\">");
    if let Some(subject) = &post.subject {
        let _ = write!(html, "<span class=\"subject\">{}</span> ", escape_html(subject));
    }
    let _ = write!(
        html,
        "<span class=\"name\">{}</span> {} No.{}",
        escape_html(&post.name),
        escape_html(&post.time),
        post.no
    );
    if post.is_op {
        html.push_str(" 📌 [<a href=\"#\">Reply</a>]");
    }
    html.push_str("</div>\n");

    if post.is_op {
        let _ = write!(
            html,
            "<div class=\"ca-box\"><div><b>CONTRACT ADDRESS</b></div><div class=\"ca\">{}</div><div>",
            escape_html(&config.token_address)
        );
        for (label, url) in community_links(config) {
            let _ = write!(
                html,
                " <a href=\"{}\" target=\"_blank\" rel=\"noreferrer\">[{}]</a>",
                escape_html(&url),
                label
            );
        }
        html.push_str("</div></div>\n");
    }

    html.push_str("<div class=\"post-message\">");
    if !post.message.is_empty() {
        for line in message_lines(&post.message) {
            let class = if line.greentext { "greentext" } else { "line" };
            let _ = write!(html, "<span class=\"{}\">{}</span>", class, escape_html(line.text));
        }
    }
    if !post.replies.is_empty() {
        let replies: Vec<String> = post.replies.iter().map(|r| format!("&gt;&gt;{}", r)).collect();
        let _ = write!(html, "<div class=\"replies\">{}</div>", replies.join(" "));
    }
    html.push_str("</div></div>\n");
}

fn render_analytics(
    html: &mut String,
    config: &Config,
    metrics: &TokenMetrics,
    snapshot: &SessionSnapshot,
    tab: Tab,
) {
    html.push_str("<div class=\"analytics\"><div class=\"panel-head\">BLOCKCHAIN ANALYTICS SUITE V4.0 (SOLANA)</div>\n");
    let _ = write!(
        html,
        concat!(
            "<div class=\"stats\">",
            "<div><b>LIVE PRICE</b><br>{}</div>",
            "<div><b>MARKET CAP</b><br>{}</div>",
            "<div><b>24H VOL (EST.)</b><br>{}</div>",
            "<div><b>ADDRESS</b><br>{}</div>",
            "</div>\n"
        ),
        format_currency(metrics.price),
        format_compact_number(metrics.market_cap),
        format_compact_number(metrics.estimated_volume_24h()),
        escape_html(&truncate_address(&config.token_address))
    );

    let tab_link = |target: Tab, key: &str, label: &str| {
        if target == tab {
            format!("[<a href=\"/?tab={}\"><b>{}</b></a>]", key, label)
        } else {
            format!("[<a href=\"/?tab={}\">{}</a>]", key, label)
        }
    };
    let _ = writeln!(
        html,
        "<div class=\"tabs\">{} {}</div>",
        tab_link(Tab::Holders, "holders", "Top Holders"),
        tab_link(Tab::Whales, "whales", "Whale Watch")
    );

    match tab {
        Tab::Holders => render_holders(html, snapshot),
        Tab::Whales => render_whales(html, snapshot),
    }

    html.push_str("</div>\n");
}

fn render_holders(html: &mut String, snapshot: &SessionSnapshot) {
    let note = match snapshot.holder_source {
        Some(HolderSource::Rpc) => "* Top token accounts fetched via Solana RPC. Tags are guesses.",
        Some(HolderSource::Synthetic) => {
            "* SYNTHETIC DATA: the RPC returned nothing, these rows are placeholders."
        }
        None => "* Waiting for the first holder snapshot.",
    };
    let _ = write!(html, "<div class=\"note\">{}", note);
    if snapshot.holders_loading {
        html.push_str(" <span class=\"refreshing\">REFRESHING...</span>");
    }
    html.push_str("</div>\n");

    html.push_str("<table><thead><tr><th>#</th><th>Account</th><th>Balance</th><th>Value ($)</th><th>%</th><th>Tag</th></tr></thead><tbody>\n");
    for holder in &snapshot.holders {
        let _ = write!(
            html,
            "<tr><td>{}</td><td title=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}%</td><td><i>{}</i></td></tr>\n",
            holder.rank,
            escape_html(&holder.address),
            escape_html(&truncate_address(&holder.address)),
            format_compact_number(holder.amount),
            format_compact_number(holder.value),
            holder.percentage,
            escape_html(holder.tag.as_deref().unwrap_or("-"))
        );
    }
    html.push_str("</tbody></table>\n");
}

fn render_whales(html: &mut String, snapshot: &SessionSnapshot) {
    html.push_str("<div class=\"note\">* Simulated feed. These trades are generated from the live price and are not on-chain activity.</div>\n");
    html.push_str("<table><thead><tr><th>Time</th><th>Type</th><th>Amount</th><th>Value (USD)</th><th>Maker</th><th>Tx Hash</th></tr></thead><tbody>\n");
    for tx in &snapshot.whales {
        let class = match tx.tx_type {
            TxType::Buy => "buy",
            TxType::Sell => "sell",
        };
        let icon = tx
            .tier()
            .icon()
            .map(|icon| format!("<span title=\"{}\">{}</span> ", tx.tier().label(), icon))
            .unwrap_or_default();
        let _ = write!(
            html,
            "<tr class=\"{}\"><td>{}</td><td><b>{}</b></td><td>{}</td><td>{}</td><td>{}{}</td><td><a href=\"{}\" target=\"_blank\" rel=\"noreferrer\">{}</a></td></tr>\n",
            class,
            escape_html(&tx.time),
            tx.tx_type.as_str().to_uppercase(),
            format_compact_number(tx.amount),
            format_currency(tx.value),
            icon,
            escape_html(&tx.maker),
            escape_html(&explorer_tx_url(&tx.hash)),
            escape_html(&truncate_address(&tx.hash))
        );
    }
    html.push_str("</tbody></table>\n");
}
