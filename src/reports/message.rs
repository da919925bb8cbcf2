//! Report message rendering.

use url::Url;

use crate::collector::{CollectionReport, CollectionStats};
use crate::config::ReportLinks;
use crate::utils::{UNNAMED, html_escape};

/// Links on this domain are replaced by the public collection link.
const STOREFRONT_DOMAIN: &str = "tsum.ru";

/// Output markup of a rendered report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportStyle {
    /// Bold name and clickable link, for `ParseMode::Html`.
    Html,
    Plain,
}

/// Render the report text.
pub fn render_report(name: &str, url: &str, stats: &CollectionStats, style: ReportStyle) -> String {
    let name = match name.trim() {
        "" => UNNAMED,
        trimmed => trimmed,
    };

    let mut text = String::from("Добрый вечер!\n\n");
    match style {
        ReportStyle::Html => {
            text.push_str(&format!("Направляем пак <b>{}</b>\n", html_escape(name)));
            text.push_str(&format!("<a href=\"{url}\">{url}</a>\n\n"));
        }
        ReportStyle::Plain => {
            text.push_str(&format!("Направляем пак {name}\n"));
            text.push_str(&format!("{url}\n\n"));
        }
    }

    let total_done = stats.total_done.unwrap_or(0);
    let combo_items = stats.combo_items.unwrap_or(0);

    if total_done > 0 {
        text.push_str(&format!("Общее количество уникальных done-айтемов - {total_done}\n"));
    }
    if combo_items > 0 {
        text.push_str(&format!("Из них combo-айтемов – {combo_items}\n"));
    }
    if let Some(grand_total) = stats.total_done_items.filter(|n| *n > 0) {
        text.push_str(&format!("Итого total done - {grand_total} айтемов"));
    }

    text
}

/// HTML report sent to the staff member who asked for it.
pub fn on_demand_message(name: &str, report: &CollectionReport, links: &ReportLinks) -> String {
    let url = format!("{}/{}", links.admin_base, report.collection_id);
    render_report(name, &url, &report.stats, ReportStyle::Html)
}

/// Plain report broadcast to registered chats.
pub fn broadcast_message(name: &str, report: &CollectionReport, links: &ReportLinks) -> String {
    render_report(name, &broadcast_url(report, links), &report.stats, ReportStyle::Plain)
}

/// The public link, unless the collector supplied one off the storefront domain.
fn broadcast_url(report: &CollectionReport, links: &ReportLinks) -> String {
    let own = report.collection_url.trim();
    let usable = Url::parse(own)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .is_some_and(|host| host != STOREFRONT_DOMAIN && !host.ends_with(&format!(".{STOREFRONT_DOMAIN}")));
    if usable {
        own.to_string()
    } else {
        format!("{}/{}", links.public_base, report.collection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total_done: Option<u64>, combo_items: Option<u64>) -> CollectionStats {
        CollectionStats::from_counts(total_done, combo_items)
    }

    fn report(url: &str) -> CollectionReport {
        CollectionReport {
            collection_id: "c1".into(),
            collection_url: url.into(),
            stats: stats(Some(423), Some(316)),
        }
    }

    #[test]
    fn test_plain_report_layout() {
        let text = render_report(
            "TSUM Collection Panel 10.12.2025",
            "https://catalog.example/collection/c1",
            &stats(Some(423), Some(316)),
            ReportStyle::Plain,
        );
        assert_eq!(
            text,
            "Добрый вечер!\n\n\
             Направляем пак TSUM Collection Panel 10.12.2025\n\
             https://catalog.example/collection/c1\n\n\
             Общее количество уникальных done-айтемов - 423\n\
             Из них combo-айтемов – 316\n\
             Итого total done - 739 айтемов"
        );
    }

    #[test]
    fn test_zero_lines_are_omitted() {
        let text = render_report("A", "u", &stats(Some(10), None), ReportStyle::Plain);
        assert!(text.contains("done-айтемов - 10\n"));
        assert!(!text.contains("combo"));
        assert!(text.ends_with("Итого total done - 10 айтемов"));

        let empty = render_report("A", "u", &CollectionStats::default(), ReportStyle::Plain);
        assert!(empty.ends_with("u\n\n"));
    }

    #[test]
    fn test_html_escapes_name_and_links_url() {
        let text = render_report("<Spring & Co>", "https://x/c1", &CollectionStats::default(), ReportStyle::Html);
        assert!(text.contains("Направляем пак <b>&lt;Spring &amp; Co&gt;</b>\n"));
        assert!(text.contains("<a href=\"https://x/c1\">https://x/c1</a>\n"));
    }

    #[test]
    fn test_missing_name_placeholder() {
        let text = render_report(" ", "u", &CollectionStats::default(), ReportStyle::Plain);
        assert!(text.contains(&format!("Направляем пак {UNNAMED}\n")));
    }

    #[test]
    fn test_link_selection() {
        let links = ReportLinks {
            admin_base: "https://admin.example/collection".into(),
            public_base: "https://catalog.example/collection".into(),
        };

        assert!(on_demand_message("A", &report(""), &links).contains("https://admin.example/collection/c1"));

        let own = report("https://admin.example/collection/c1");
        assert_eq!(broadcast_url(&own, &links), "https://admin.example/collection/c1");

        let storefront = report("https://www.TSUM.ru/collection/c1");
        assert_eq!(broadcast_url(&storefront, &links), "https://catalog.example/collection/c1");
        assert_eq!(broadcast_url(&report(""), &links), "https://catalog.example/collection/c1");

        // Only the host decides, not the path or query
        let mentions = report("https://admin.example/collection/c1?from=tsum.ru");
        assert_eq!(broadcast_url(&mentions, &links), "https://admin.example/collection/c1?from=tsum.ru");
        let lookalike = report("https://nottsum.ru/c1");
        assert_eq!(broadcast_url(&lookalike, &links), "https://nottsum.ru/c1");
        let unparsable = report("admin.example/collection/c1");
        assert_eq!(broadcast_url(&unparsable, &links), "https://catalog.example/collection/c1");
    }

    #[test]
    fn test_grand_total_line() {
        // Panel text that only carries the grand total
        let text = render_report("A", "u", &CollectionStats::parse("Итого total done - 90 айтемов"), ReportStyle::Plain);
        assert!(text.ends_with("u\n\nИтого total done - 90 айтемов"));

        let overflow = render_report("A", "u", &stats(Some(u64::MAX), Some(1)), ReportStyle::Plain);
        assert!(overflow.contains(&format!("done-айтемов - {}\n", u64::MAX)));
        assert!(!overflow.contains("Итого"));
    }
}
