//! Parsing of the admin panel's free-text collection statistics.

use std::sync::LazyLock;

use regex::Regex;

static TOTAL_DONE_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+total\s+done\s+items?").expect("valid stats pattern"));

/// `N total done`, skipping matches that continue with `items`.
static TOTAL_DONE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+total\s+done(\s+items)?").expect("valid stats pattern"));

static TOTAL_DONE_RU: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Общее\s+количество\s+уникальных\s+done-айтемов\s*[–-]\s*(\d+)").expect("valid stats pattern")
});

static COMBINATIONS_DONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+combinations?\s+done").expect("valid stats pattern"));

static COMBO_RU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Из\s+них\s+combo-айтемов\s*[–-]\s*(\d+)").expect("valid stats pattern"));

static GRAND_TOTAL_RU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Итого\s+total\s+done\s*[-–]\s*(\d+)").expect("valid stats pattern"));

/// Markers of the CSV header the panel prepends to the stats field.
const HEADER_MARKERS: [&str; 4] = ["_;", "Name;", "Brand;", "Article;"];

/// Numbers extracted from a stats text. A zero counts as not found.
///
/// `total_done_items` is the sum of the two counters when either was found,
/// otherwise the panel's own "Итого" line. A sum past `u64::MAX` is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub total_done: Option<u64>,
    pub combo_items: Option<u64>,
    pub total_done_items: Option<u64>,
}

impl CollectionStats {
    pub fn from_counts(total_done: Option<u64>, combo_items: Option<u64>) -> Self {
        let total_done_items = match (total_done, combo_items) {
            (None, None) => None,
            (done, combo) => done.unwrap_or(0).checked_add(combo.unwrap_or(0)),
        };
        Self {
            total_done,
            combo_items,
            total_done_items,
        }
    }

    pub fn parse(text: &str) -> Self {
        let total_done = first_number(&TOTAL_DONE_ITEMS, text)
            .or_else(|| bare_total_done(text))
            .or_else(|| first_number(&TOTAL_DONE_RU, text));

        let combo_items =
            first_number(&COMBINATIONS_DONE, text).or_else(|| first_number(&COMBO_RU, text));

        let stats = Self::from_counts(total_done, combo_items);
        if total_done.is_none() && combo_items.is_none() {
            return Self {
                total_done_items: first_number(&GRAND_TOTAL_RU, text),
                ..stats
            };
        }
        stats
    }
}

fn first_number(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

fn bare_total_done(text: &str) -> Option<u64> {
    TOTAL_DONE_BARE
        .captures_iter(text)
        .find(|c| c.get(2).is_none())
        .and_then(|c| c[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Drop the CSV header line and Yandex Disk links.
pub fn clean_stats_text(raw: &str) -> String {
    raw.split('\n')
        .enumerate()
        .filter(|(i, line)| !(*i == 0 && HEADER_MARKERS.iter().any(|m| line.contains(m))))
        .filter(|(_, line)| !line.contains("disk.yandex.ru"))
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
