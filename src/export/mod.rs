use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::extract::Item;

/// Spreadsheet tools cap a cell at this many characters; longer values are
/// cut rather than corrupting the row.
const MAX_CELL_CHARS: usize = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(anyhow::anyhow!(
                "unknown export format '{}', expected csv or json",
                other
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// One exportable item field. CSV output carries exactly the selected
/// columns, in the selected order; JSON always serializes full items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Column {
    Kind,
    Title,
    Url,
    Price,
    Date,
    Description,
    Page,
    ExtractedAt,
}

pub const DEFAULT_COLUMNS: &[Column] = &[
    Column::Kind,
    Column::Title,
    Column::Url,
    Column::Price,
    Column::Date,
    Column::Description,
    Column::Page,
    Column::ExtractedAt,
];

impl Column {
    fn header(self) -> &'static str {
        match self {
            Column::Kind => "kind",
            Column::Title => "title",
            Column::Url => "url",
            Column::Price => "price",
            Column::Date => "date",
            Column::Description => "description",
            Column::Page => "page",
            Column::ExtractedAt => "extracted_at",
        }
    }

    fn value(self, item: &Item) -> String {
        match self {
            Column::Kind => item.kind().to_string(),
            Column::Title => item.title().to_string(),
            Column::Url => item.url().to_string(),
            Column::Price => item.price().map(|p| p.to_string()).unwrap_or_default(),
            Column::Date => item.date().unwrap_or_default().to_string(),
            Column::Description => item.description().unwrap_or_default().to_string(),
            Column::Page => item.source_page().to_string(),
            Column::ExtractedAt => item.extracted_at().to_rfc3339(),
        }
    }
}

/// Writes the collected items to `path` in the requested format.
pub fn export_items(
    items: &[Item],
    format: ExportFormat,
    columns: &[Column],
    path: &Path,
) -> Result<()> {
    let contents = match format {
        ExportFormat::Csv => to_csv(items, columns),
        ExportFormat::Json => {
            serde_json::to_string_pretty(items).context("Failed to serialize items")?
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, contents)
        .context(format!("Failed to write export file: {}", path.display()))?;

    info!("Exported {} items to {}", items.len(), path.display());
    Ok(())
}

/// Hand-rolled CSV: header row, then one row per item with RFC 4180 quoting.
pub fn to_csv(items: &[Item], columns: &[Column]) -> String {
    let mut out = columns
        .iter()
        .map(|c| c.header())
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');

    for item in items {
        let encoded: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&c.value(item)))
            .collect();
        out.push_str(&encoded.join(","));
        out.push('\n');
    }

    out
}

fn csv_field(value: &str) -> String {
    let mut value = value;
    if value.chars().count() > MAX_CELL_CHARS {
        let end = value
            .char_indices()
            .nth(MAX_CELL_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(value.len());
        value = &value[..end];
    }

    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{LinkItem, ProductItem};
    use chrono::Utc;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn link(title: &str, url: &str) -> Item {
        Item::Link(LinkItem {
            title: title.to_string(),
            url: url.to_string(),
            page: 1,
            extracted_at: Utc::now(),
        })
    }

    fn product(title: &str, price: Option<i64>) -> Item {
        Item::Product(ProductItem {
            title: title.to_string(),
            url: "https://x.test/p".to_string(),
            price,
            description: None,
            date: None,
            tags: BTreeSet::new(),
            page: 2,
            extracted_at: Utc::now(),
        })
    }

    #[test]
    fn test_csv_starts_with_the_header_row() {
        let csv = to_csv(&[link("a", "https://x.test/a")], DEFAULT_COLUMNS);
        assert!(csv.starts_with("kind,title,url,price,date,description,page,extracted_at\n"));
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_csv_quotes_commas_quotes_and_newlines() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_csv_row_carries_price_and_page() {
        let csv = to_csv(&[product("Keyboard", Some(89000))], DEFAULT_COLUMNS);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("product,Keyboard,https://x.test/p,89000,"));
        assert!(row.contains(",2,"));
    }

    #[test]
    fn test_missing_price_is_an_empty_cell() {
        let csv = to_csv(&[product("Mystery", None)], DEFAULT_COLUMNS);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("product,Mystery,https://x.test/p,,"));
    }

    #[test]
    fn test_column_selection_controls_layout() {
        let columns = [Column::Title, Column::Price];
        let csv = to_csv(&[product("Keyboard", Some(89000))], &columns);
        assert_eq!(csv, "title,price\nKeyboard,89000\n");
    }

    #[test]
    fn test_oversized_cell_is_truncated() {
        let long = "x".repeat(MAX_CELL_CHARS + 100);
        assert_eq!(csv_field(&long).chars().count(), MAX_CELL_CHARS);
    }

    #[test]
    fn test_json_export_preserves_the_kind_tag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        export_items(
            &[link("a", "https://x.test/a")],
            ExportFormat::Json,
            DEFAULT_COLUMNS,
            &path,
        )
        .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Vec<Item> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind(), "link");
    }

    #[test]
    fn test_format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
