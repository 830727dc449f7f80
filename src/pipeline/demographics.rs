//! Demographic summarizer: tabular data → short natural-language digest.
//!
//! ## Why a digest instead of the raw table?
//!
//! A census extract can run to thousands of rows; the model needs a handful
//! of indicators (population, rural share, income, literacy, vulnerability)
//! to reason about impact. Columns are matched against a keyword taxonomy by
//! case-insensitive substring, and each matching category contributes at
//! most one line.
//!
//! ```text
//! .csv ──(csv)────┐
//!                 ├──▶ Table ──▶ summarize ──▶ "Demographic Context:\n…"
//! .xlsx/.xls ─────┘
//!    (calamine)
//! ```
//!
//! Loading never fails: an unreadable file yields a digest starting with
//! `Error loading file:`, which the prompt composer recognises and skips.

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info};

/// Substring marking a digest that came from a failed load.
pub const ERROR_LOADING_MARKER: &str = "Error loading";
/// Substring marking a placeholder digest.
pub const NO_DEMOGRAPHIC_MARKER: &str = "No demographic";

pub const NO_DATA_PROVIDED: &str = "No demographic data provided";
pub const NO_DATA_EXTRACTED: &str = "No demographic data could be extracted";
pub const NO_INDICATORS: &str = "Demographic data loaded but no key indicators identified.";

/// `true` when a digest carries real data rather than an error or placeholder.
pub fn is_usable_digest(digest: &str) -> bool {
    !digest.trim().is_empty()
        && !digest.contains(ERROR_LOADING_MARKER)
        && !digest.contains(NO_DEMOGRAPHIC_MARKER)
}

// ── Table model ──────────────────────────────────────────────────────────────

/// One named column; cells are kept as trimmed text.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<String>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty())
    }

    /// Numeric values when the column is numeric, `None` otherwise.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        let mut values = Vec::new();
        for cell in self.non_empty() {
            values.push(cell.parse::<f64>().ok().filter(|v| v.is_finite())?);
        }
        (!values.is_empty()).then_some(values)
    }

    /// Distinct non-empty values with counts, most frequent first; ties keep
    /// first-appearance order.
    pub fn value_counts(&self) -> Vec<(String, usize)> {
        // value -> (count, index of first appearance)
        let mut seen: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, cell) in self.non_empty().enumerate() {
            seen.entry(cell).or_insert((0, idx)).0 += 1;
        }
        let mut counts: Vec<(&str, usize, usize)> = seen
            .into_iter()
            .map(|(v, (n, first))| (v, n, first))
            .collect();
        counts.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        counts
            .into_iter()
            .map(|(v, n, _)| (v.to_string(), n))
            .collect()
    }

    fn top_values(&self, n: usize) -> Vec<String> {
        self.value_counts()
            .into_iter()
            .take(n)
            .map(|(v, _)| v)
            .collect()
    }
}

/// A loaded dataset: named columns plus the number of data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub records: usize,
}

impl Table {
    /// Build a table from a header row and data rows. Short rows are padded.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let records = rows.len();
        let columns = header
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if name.trim().is_empty() {
                    format!("Unnamed: {}", i)
                } else {
                    name.trim().to_string()
                };
                let cells = rows
                    .iter()
                    .map(|r| r.get(i).map(|c| c.trim().to_string()).unwrap_or_default())
                    .collect();
                Column::new(name, cells)
            })
            .collect();
        Self { columns, records }
    }

    /// First column whose lower-cased name contains any of `keywords`.
    fn find(&self, keywords: &[&str]) -> Option<&Column> {
        self.columns.iter().find(|c| {
            let lower = c.name.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

fn read_csv(path: &Path) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    if header.is_empty() {
        return Err("No columns to parse from file".into());
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table::from_rows(header, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn read_workbook(path: &Path) -> Result<Table, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "Workbook has no worksheets".to_string())?
        .map_err(|e| e.to_string())?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| "Worksheet is empty".to_string())?
        .iter()
        .map(cell_text)
        .collect();
    let body = rows.map(|r| r.iter().map(cell_text).collect()).collect();
    Ok(Table::from_rows(header, body))
}

/// Read a `.csv`, `.xlsx` or `.xls` file into a [`Table`].
pub fn read_table(path: &Path) -> Result<Table, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" => read_workbook(path),
        _ => Err("Unsupported file format".into()),
    }
}

/// Load a demographic file and build its digest.
///
/// Never fails: errors come back as `Error loading file: <reason>`.
pub async fn load_demographics(path: &Path) -> String {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || load_demographics_blocking(&path)).await {
        Ok(digest) => digest,
        Err(e) => {
            error!("Demographic loading task failed: {}", e);
            format!("Error loading file: {}", e)
        }
    }
}

fn load_demographics_blocking(path: &Path) -> String {
    match read_table(path) {
        Ok(table) => {
            info!(
                "Loaded demographic data: {} rows, {} columns",
                table.records,
                table.columns.len()
            );
            digest(&table)
        }
        Err(e) => {
            error!("Error loading demographics from {}: {}", path.display(), e);
            format!("Error loading file: {}", e)
        }
    }
}

/// Full digest: indicator lines plus the column listing.
pub fn digest(table: &Table) -> String {
    format!(
        "Demographic Context:\n{}\n\nAvailable data columns: {}",
        summarize(table).join("\n"),
        table.column_names().join(", ")
    )
}

// ── Summarizer ───────────────────────────────────────────────────────────────

const POPULATION: &[&str] = &["population", "pop"];
const INCOME: &[&str] = &["income", "wage", "salary"];
const EDUCATION: &[&str] = &["education", "literacy", "literate"];
const REGION: &[&str] = &["region", "state", "district", "area", "location"];
const VULNERABILITY: &[&str] = &[
    "unemployment",
    "poverty",
    "vulnerable",
    "disability",
    "elderly",
    "children",
];
const CONNECTIVITY: &[&str] = &["internet", "digital", "technology", "mobile", "smartphone"];
const EMPLOYMENT: &[&str] = &["employment", "employed", "job"];

/// Ordered indicator lines, always starting with `Total records: N`.
pub fn summarize(table: &Table) -> Vec<String> {
    let mut lines = vec![format!("Total records: {}", table.records)];

    if let Some(nums) = table.find(POPULATION).and_then(Column::numbers) {
        let total: f64 = nums.iter().sum();
        if total != 0.0 {
            lines.push(format!("Total population: {}", group_thousands(total.trunc())));
        }
    }

    if let (Some(rural), Some(urban)) = (table.find(&["rural"]), table.find(&["urban"])) {
        let rural: f64 = rural.numbers().map(|v| v.iter().sum()).unwrap_or(0.0);
        let urban: f64 = urban.numbers().map(|v| v.iter().sum()).unwrap_or(0.0);
        let total = rural + urban;
        if total > 0.0 {
            lines.push(format!(
                "Rural population: {:.1}%, Urban population: {:.1}%",
                rural / total * 100.0,
                urban / total * 100.0
            ));
        }
    }

    if let Some(nums) = table.find(INCOME).and_then(Column::numbers) {
        lines.push(format!(
            "Average income: ₹{}, median income: ₹{}",
            group_thousands(mean(&nums).round()),
            group_thousands(median(&nums).round())
        ));
    }

    if let Some(col) = table.find(EDUCATION) {
        match col.numbers() {
            Some(nums) => lines.push(format!(
                "Average literacy/education level: {:.1}%",
                mean(&nums)
            )),
            None => push_top(&mut lines, "Top education levels", col, 3),
        }
    }

    if let Some(col) = table.find(REGION) {
        push_top(&mut lines, "Top regions by data points", col, 5);
    }

    for &keyword in VULNERABILITY {
        if let Some(col) = table.find(&[keyword]) {
            match col.numbers() {
                Some(nums) => {
                    lines.push(format!("Average {} rate: {:.1}%", keyword, mean(&nums)))
                }
                None => push_top(&mut lines, &format!("Top {} categories", keyword), col, 3),
            }
        }
    }

    for &keyword in CONNECTIVITY {
        if let Some(nums) = table.find(&[keyword]).and_then(Column::numbers) {
            lines.push(format!(
                "Average {} penetration: {:.1}%",
                keyword,
                mean(&nums)
            ));
        }
    }

    if let Some(col) = table.find(EMPLOYMENT) {
        match col.numbers() {
            Some(nums) => lines.push(format!("Average employment rate: {:.1}%", mean(&nums))),
            None => {
                let counts = col.value_counts();
                let total: usize = counts.iter().map(|(_, n)| n).sum();
                if total > 0 {
                    let parts: Vec<String> = counts
                        .iter()
                        .take(3)
                        .map(|(v, n)| format!("{} ({:.1}%)", v, *n as f64 / total as f64 * 100.0))
                        .collect();
                    lines.push(format!("Employment distribution: {}", parts.join(", ")));
                }
            }
        }
    }

    if lines.len() == 1 {
        lines.push(NO_INDICATORS.to_string());
    }
    lines
}

fn push_top(lines: &mut Vec<String>, label: &str, col: &Column, n: usize) {
    let top = col.top_values(n);
    if !top.is_empty() {
        lines.push(format!("{}: {}", label, top.join(", ")));
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Format a whole number with `,` thousands separators.
fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}
