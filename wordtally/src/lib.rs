//! Word-count importer: tallies dated sections of writer documents and fills the
//! matching empty cells of a tracking sheet.
//! The core (dates, words, aggregate, sheet, planner) is pure over value types;
//! anything that touches files sits behind the traits in `storage`.

pub mod core {
    use chrono::{Datelike, NaiveDate};
    use serde::{Deserialize, Serialize};
    use serde_with::{DeserializeFromStr, SerializeDisplay};
    use std::{collections::BTreeMap, fmt, str::FromStr};

    /* ------------------------------ Date keys ------------------------------ */

    /// Canonical `MM/DD/YYYY` join key between document sections and sheet columns.
    ///
    /// Ordering is chronological. The string form is fixed-width and zero-padded.
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
    )]
    pub struct DateKey(NaiveDate);

    impl DateKey {
        pub fn new(date: NaiveDate) -> Self {
            Self(date)
        }

        pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
            NaiveDate::from_ymd_opt(year, month, day).map(Self)
        }

    }

    impl fmt::Display for DateKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{:02}/{:02}/{:04}",
                self.0.month(),
                self.0.day(),
                self.0.year()
            )
        }
    }

    impl FromStr for DateKey {
        type Err = DomainError;

        /// Strict inverse of `Display`; free-form text goes through `dates::normalize`.
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let invalid = || DomainError::InvalidDateKey(s.to_string());
            let mut parts = s.split('/');
            let (Some(mm), Some(dd), Some(yyyy), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid());
            };
            let fixed = |part: &str, width: usize| {
                part.len() == width && part.bytes().all(|b| b.is_ascii_digit())
            };
            if !(fixed(mm, 2) && fixed(dd, 2) && fixed(yyyy, 4)) {
                return Err(invalid());
            }
            let month = mm.parse().map_err(|_| invalid())?;
            let day = dd.parse().map_err(|_| invalid())?;
            let year = yyyy.parse().map_err(|_| invalid())?;
            Self::from_ymd(year, month, day).ok_or_else(invalid)
        }
    }

    /// Word totals per date for one document scan.
    pub type DateWordMap = BTreeMap<DateKey, u64>;

    /* ------------------------------ Sheet cells ------------------------------ */

    /// A scalar read from (or written to) one spreadsheet cell.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub enum CellValue {
        #[default]
        Empty,
        Text(String),
        Number(f64),
        Date(NaiveDate),
    }

    impl CellValue {
        /// Empty means no value or the empty string. `0` is a value.
        pub fn is_empty(&self) -> bool {
            match self {
                CellValue::Empty => true,
                CellValue::Text(t) => t.is_empty(),
                CellValue::Number(_) | CellValue::Date(_) => false,
            }
        }

        pub fn as_text(&self) -> Option<&str> {
            match self {
                CellValue::Text(t) => Some(t),
                _ => None,
            }
        }
    }

    impl From<&str> for CellValue {
        fn from(value: &str) -> Self {
            CellValue::Text(value.to_string())
        }
    }

    impl From<u64> for CellValue {
        fn from(value: u64) -> Self {
            CellValue::Number(value as f64)
        }
    }

    /* ------------------------------ Documents ------------------------------ */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ParagraphStyle {
        /// Top-level title style; marks a section header.
        Title,
        /// Sub-headings (1 = first level below the title).
        Heading(u8),
        Normal,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Paragraph {
        pub text: String,
        pub style: ParagraphStyle,
    }

    impl Paragraph {
        pub fn new(text: impl Into<String>, style: ParagraphStyle) -> Self {
            Self {
                text: text.into(),
                style,
            }
        }

        pub fn title(text: impl Into<String>) -> Self {
            Self::new(text, ParagraphStyle::Title)
        }

        pub fn body(text: impl Into<String>) -> Self {
            Self::new(text, ParagraphStyle::Normal)
        }
    }

    /// Opaque handle the document store resolves (a path for file-backed stores).
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DocumentRef(pub String);

    impl DocumentRef {
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for DocumentRef {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for DocumentRef {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WriterSpec {
        pub name: String,
        pub document_ref: DocumentRef,
    }

    impl WriterSpec {
        pub fn new(name: impl Into<String>, document_ref: impl Into<DocumentRef>) -> Self {
            Self {
                name: name.into(),
                document_ref: document_ref.into(),
            }
        }
    }

    /* ------------------------------ Planning ------------------------------ */

    /// One cell write. Rows and columns are 1-based sheet coordinates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CellUpdate {
        pub row: u32,
        pub column: u32,
        pub value: u64,
    }

    /// Cell writes accumulated across all writers of a run, flushed once.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    #[serde(transparent)]
    pub struct UpdatePlan {
        updates: Vec<CellUpdate>,
    }

    impl UpdatePlan {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&mut self, update: CellUpdate) {
            self.updates.push(update);
        }

        pub fn targets(&self, row: u32, column: u32) -> bool {
            self.updates
                .iter()
                .any(|u| u.row == row && u.column == column)
        }

        pub fn len(&self) -> usize {
            self.updates.len()
        }

        pub fn is_empty(&self) -> bool {
            self.updates.is_empty()
        }

        pub fn iter(&self) -> impl Iterator<Item = &CellUpdate> {
            self.updates.iter()
        }
    }

    /* ------------------------------ Reporting ------------------------------ */

    /// What happened to one configured writer during a run.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    #[serde(tag = "outcome", rename_all = "snake_case")]
    pub enum WriterOutcome {
        /// Name absent from the sheet's name column.
        NotFound,
        /// No empty cell left in the writer's row.
        AlreadyFilled { row: u32 },
        /// The header at the resume column is not a date.
        InvalidStartDate { row: u32, column: u32 },
        /// The writer's row or document could not be read.
        Unreadable { reason: String },
        Processed {
            row: u32,
            start_date: DateKey,
            planned: usize,
        },
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct WriterReport {
        pub writer: String,
        #[serde(flatten)]
        pub outcome: WriterOutcome,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ImportSummary {
        /// Configured writers, not the ones that were actually updated.
        pub writers_in_scope: usize,
        pub cells_written: usize,
        pub dry_run: bool,
        pub updates: UpdatePlan,
        pub reports: Vec<WriterReport>,
    }

    impl ImportSummary {
        pub fn notice(&self) -> String {
            format!(
                "Word counts imported for {} writers.",
                self.writers_in_scope
            )
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum DomainError {
        #[error("invalid date key {0:?} (expected MM/DD/YYYY)")]
        InvalidDateKey(String),
        #[error("invalid cell address {0:?} (expected A1-style, e.g. C2)")]
        InvalidAddress(String),
        #[error("invalid column {0:?} (expected letters, e.g. A)")]
        InvalidColumn(String),
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn date_key_display_is_zero_padded() {
            let key = DateKey::from_ymd(2024, 3, 4).unwrap();
            assert_eq!(key.to_string(), "03/04/2024");
        }

        #[test]
        fn date_key_parses_only_canonical_form() {
            let key: DateKey = "01/02/2024".parse().unwrap();
            assert_eq!(key, DateKey::from_ymd(2024, 1, 2).unwrap());
            assert!("1/2/2024".parse::<DateKey>().is_err());
            assert!("02/30/2024".parse::<DateKey>().is_err());
            assert!("01/02/2024/1".parse::<DateKey>().is_err());
        }

        #[test]
        fn date_keys_order_chronologically_across_years() {
            let dec = DateKey::from_ymd(2023, 12, 31).unwrap();
            let jan = DateKey::from_ymd(2024, 1, 1).unwrap();
            assert!(dec < jan);
            assert!(dec.to_string() > jan.to_string());
        }

        #[test]
        fn zero_is_not_an_empty_cell() {
            assert!(CellValue::Empty.is_empty());
            assert!(CellValue::from("").is_empty());
            assert!(!CellValue::Number(0.0).is_empty());
            assert!(!CellValue::from(" ").is_empty());
        }
    }
}

pub mod dates {
    //! Free-form date headings to canonical `DateKey`s.
    //!
    //! Input is cleaned (lowercase, ordinal suffixes dropped, whitespace collapsed), then
    //! tried against an ordered list of grammars; the first one that yields a real calendar
    //! date wins:
    //! 1. day-month-year: `3 march 24`
    //! 2. month-day-year: `march 3, 2024` / `march 3 2024`
    //! 3. numeric, day first: `3/4/24`, `3-4-2024`
    //! 4. generic fallback: weekday prefixes, ISO and month-first numeric forms.
    //!
    //! Two-digit years are read as `20YY`. Dates never roll over (`31 february` fails).

    use crate::core::{CellValue, DateKey};
    use chrono::{Days, NaiveDate};
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag, take_while_m_n},
        character::complete::{alpha1, char, one_of},
        combinator::{all_consuming, map, map_opt, map_res},
        sequence::tuple,
    };
    use regex::Regex;
    use std::sync::LazyLock;
    use tracing::debug;

    type PResult<'a, T> = IResult<&'a str, T>;

    static ORDINAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b([0-9]{1,2})(?:st|nd|rd|th)\b").expect("ordinal suffix pattern")
    });

    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];

    const WEEKDAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a heading into a `DateKey`, or `None` when no grammar yields a valid date.
    pub fn normalize(raw: &str) -> Option<DateKey> {
        let cleaned = clean(raw);
        if cleaned.is_empty() {
            return None;
        }
        STRUCTURED
            .iter()
            .find_map(|grammar| attempt(grammar, &cleaned))
            .or_else(|| parse_generic(&cleaned))
            .map(DateKey::new)
    }

    /// Lowercase, drop ordinal suffixes (`3rd` -> `3`), collapse whitespace.
    pub fn clean(raw: &str) -> String {
        let lowered = raw.to_lowercase();
        let stripped = ORDINAL_SUFFIX.replace_all(&lowered, "$1");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Generic parse of already-cleaned text.
    ///
    /// Unlike the structured grammars, numeric forms here are month first (`1/2/2024` is
    /// January 2nd), which is how sheets render date headers as text.
    pub fn parse_generic(cleaned: &str) -> Option<NaiveDate> {
        let input = strip_weekday(cleaned).unwrap_or(cleaned);
        NAMED
            .iter()
            .chain(FALLBACK.iter())
            .find_map(|grammar| attempt(grammar, input))
    }

    /// Permissive sheet value to date conversion used for header cells.
    pub fn coerce_cell(value: &CellValue) -> Option<DateKey> {
        match value {
            CellValue::Date(date) => Some(DateKey::new(*date)),
            CellValue::Number(serial) => from_serial(*serial),
            CellValue::Text(text) => {
                let cleaned = clean(text);
                if cleaned.is_empty() {
                    return None;
                }
                parse_generic(&cleaned).map(DateKey::new)
            }
            CellValue::Empty => None,
        }
    }

    /// Spreadsheet serial day number (1900 date system, epoch 1899-12-30).
    pub fn from_serial(serial: f64) -> Option<DateKey> {
        if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL {
            return None;
        }
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        epoch
            .checked_add_days(Days::new(serial.trunc() as u64))
            .map(DateKey::new)
    }

    // 9999-12-31
    const MAX_SERIAL: f64 = 2_958_465.0;

    /* ------------------------------ Grammars ------------------------------ */

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Ymd {
        year: i32,
        month: u32,
        day: u32,
    }

    impl Ymd {
        fn to_date(self) -> Option<NaiveDate> {
            NaiveDate::from_ymd_opt(self.year, self.month, self.day)
        }
    }

    struct Grammar {
        name: &'static str,
        parse: for<'a> fn(&'a str) -> PResult<'a, Ymd>,
    }

    const DAY_MONTH_YEAR: Grammar = Grammar {
        name: "day-month-year",
        parse: day_month_year,
    };
    const MONTH_DAY_YEAR: Grammar = Grammar {
        name: "month-day-year",
        parse: month_day_year,
    };
    const NUMERIC_DAY_FIRST: Grammar = Grammar {
        name: "numeric-day-first",
        parse: numeric_day_first,
    };

    const STRUCTURED: [Grammar; 3] = [DAY_MONTH_YEAR, MONTH_DAY_YEAR, NUMERIC_DAY_FIRST];
    const NAMED: [Grammar; 2] = [DAY_MONTH_YEAR, MONTH_DAY_YEAR];

    // Year-first forms take a four-digit year only, so `31/4/24` never reads as year 31.
    const FALLBACK: [Grammar; 4] = [
        Grammar {
            name: "iso",
            parse: year_month_day,
        },
        Grammar {
            name: "year-monthname-day",
            parse: year_month_name_day,
        },
        Grammar {
            name: "numeric-month-first",
            parse: numeric_month_first,
        },
        Grammar {
            name: "day-month-comma-year",
            parse: day_month_comma_year,
        },
    ];

    fn attempt(grammar: &Grammar, input: &str) -> Option<NaiveDate> {
        let (_, ymd) = all_consuming(grammar.parse)(input).ok()?;
        let date = ymd.to_date();
        if date.is_none() {
            debug!(
                grammar = grammar.name,
                input,
                year = ymd.year,
                month = ymd.month,
                day = ymd.day,
                "rejected invalid calendar date"
            );
        }
        date
    }

    fn day_month_year(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((day_number, char(' '), month_name, char(' '), year)),
            |(day, _, month, _, year)| Ymd { year, month, day },
        )(i)
    }

    fn month_day_year(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((
                month_name,
                char(' '),
                day_number,
                alt((tag(", "), tag(","), tag(" "))),
                year,
            )),
            |(month, _, day, _, year)| Ymd { year, month, day },
        )(i)
    }

    fn numeric_day_first(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((day_number, one_of("/-"), day_number, one_of("/-"), year)),
            |(day, _, month, _, year)| Ymd { year, month, day },
        )(i)
    }

    fn year_month_day(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((full_year, one_of("/-"), day_number, one_of("/-"), day_number)),
            |(year, _, month, _, day)| Ymd { year, month, day },
        )(i)
    }

    fn year_month_name_day(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((full_year, char(' '), month_name, char(' '), day_number)),
            |(year, _, month, _, day)| Ymd { year, month, day },
        )(i)
    }

    fn numeric_month_first(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((day_number, one_of("/-"), day_number, one_of("/-"), year)),
            |(month, _, day, _, year)| Ymd { year, month, day },
        )(i)
    }

    fn day_month_comma_year(i: &str) -> PResult<'_, Ymd> {
        map(
            tuple((
                day_number,
                char(' '),
                month_name,
                alt((tag(", "), tag(","))),
                year,
            )),
            |(day, _, month, _, year)| Ymd { year, month, day },
        )(i)
    }

    fn day_number(i: &str) -> PResult<'_, u32> {
        map_res(take_while_m_n(1, 2, char_is_digit), |s: &str| {
            s.parse::<u32>()
        })(i)
    }

    fn full_year(i: &str) -> PResult<'_, i32> {
        map_res(take_while_m_n(4, 4, char_is_digit), |s: &str| {
            s.parse::<i32>()
        })(i)
    }

    /// Four digits, or two digits read as `20YY`.
    fn year(i: &str) -> PResult<'_, i32> {
        alt((
            full_year,
            map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                s.parse::<i32>().map(|yy| 2000 + yy)
            }),
        ))(i)
    }

    fn month_name(i: &str) -> PResult<'_, u32> {
        map_opt(alpha1, month_from_name)(i)
    }

    fn char_is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    /// Full English month name or a prefix of at least three letters (`sep`, `sept`).
    fn month_from_name(word: &str) -> Option<u32> {
        if word.len() < 3 {
            return None;
        }
        MONTHS
            .iter()
            .position(|m| m.starts_with(word))
            .map(|idx| idx as u32 + 1)
    }

    fn strip_weekday(cleaned: &str) -> Option<&str> {
        let (first, rest) = cleaned.split_once(' ')?;
        let word = first.trim_end_matches([',', '.']);
        let is_weekday = word.len() >= 3 && WEEKDAYS.iter().any(|d| d.starts_with(word));
        is_weekday.then(|| rest.trim_start_matches(',').trim())
    }

}

pub mod words {
    use regex::Regex;
    use std::sync::LazyLock;

    // Letter/digit runs, optionally joined by single hyphens or apostrophes.
    static WORD: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[\p{L}\p{N}]+(?:[-'][\p{L}\p{N}]+)*").expect("word pattern")
    });

    pub fn count_words(text: &str) -> u64 {
        WORD.find_iter(text).count() as u64
    }

}

pub mod aggregate {
    //! Section scan over a document's paragraphs.
    //!
    //! A `Title` paragraph opens a section keyed by its normalized date; the header's own
    //! words count toward it. Sections sum into the map when the next header arrives or at
    //! the end. Text before the first header, and sections whose header is not a date, are
    //! dropped.

    use crate::core::{DateKey, DateWordMap, DocumentRef, Paragraph, ParagraphStyle};
    use crate::dates::normalize;
    use crate::storage::DocumentStore;
    use crate::words::count_words;
    use anyhow::{Context, Result};

    #[derive(Debug, Default)]
    struct SectionFold {
        current: Option<DateKey>,
        count: u64,
        totals: DateWordMap,
    }

    impl SectionFold {
        fn step(mut self, paragraph: &Paragraph) -> Self {
            let text = paragraph.text.trim();
            if text.is_empty() {
                return self;
            }
            if paragraph.style == ParagraphStyle::Title {
                self.flush();
                self.current = normalize(text);
                self.count = count_words(text);
            } else {
                self.count += count_words(text);
            }
            self
        }

        fn flush(&mut self) {
            if let Some(date) = self.current {
                if self.count > 0 {
                    *self.totals.entry(date).or_insert(0) += self.count;
                }
            }
        }

        fn finish(mut self) -> DateWordMap {
            self.flush();
            self.totals
        }
    }

    pub fn aggregate<'a>(paragraphs: impl IntoIterator<Item = &'a Paragraph>) -> DateWordMap {
        paragraphs
            .into_iter()
            .fold(SectionFold::default(), SectionFold::step)
            .finish()
    }

    pub fn aggregate_document(store: &dyn DocumentStore, doc: &DocumentRef) -> Result<DateWordMap> {
        let paragraphs = store
            .paragraphs(doc)
            .with_context(|| format!("reading document {doc}"))?;
        Ok(aggregate(&paragraphs))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn words(n: usize) -> String {
            vec!["word"; n].join(" ")
        }

        fn date(y: i32, m: u32, d: u32) -> DateKey {
            DateKey::from_ymd(y, m, d).unwrap()
        }

        #[test]
        fn header_words_count_toward_their_section() {
            let doc = vec![
                Paragraph::title("Jan 2, 2024"),
                Paragraph::body(words(80)),
                Paragraph::title("Jan 3, 2024"),
                Paragraph::body(words(50)),
                Paragraph::body(words(45)),
            ];
            let map = aggregate(&doc);
            assert_eq!(map.get(&date(2024, 1, 2)), Some(&83));
            assert_eq!(map.get(&date(2024, 1, 3)), Some(&98));
            assert_eq!(map.len(), 2);
        }

        #[test]
        fn repeated_dates_are_summed() {
            let doc = vec![
                Paragraph::title("2 jan 2024"),
                Paragraph::body(words(10)),
                Paragraph::title("Jan 2, 2024"),
                Paragraph::body(words(5)),
            ];
            assert_eq!(aggregate(&doc).get(&date(2024, 1, 2)), Some(&(13 + 8)));
        }

        #[test]
        fn preamble_and_undated_sections_are_dropped() {
            let doc = vec![
                Paragraph::body(words(30)),
                Paragraph::title("Ideas"),
                Paragraph::body(words(12)),
                Paragraph::title("4/1/2024"),
                Paragraph::body(words(7)),
            ];
            let map = aggregate(&doc);
            assert_eq!(map.len(), 1);
            assert_eq!(map.get(&date(2024, 1, 4)), Some(&(7 + 3)));
        }

        #[test]
        fn month_label_titles_are_not_sections() {
            let doc = vec![
                Paragraph::title("March 2024"),
                Paragraph::body("monthly goals and notes"),
                Paragraph::title("2 March 2024"),
                Paragraph::body(words(5)),
            ];
            let map = aggregate(&doc);
            assert_eq!(map.len(), 1);
            assert_eq!(map.get(&date(2024, 3, 2)), Some(&(3 + 5)));
        }

        #[test]
        fn blank_titles_and_subheadings_do_not_open_sections() {
            let doc = vec![
                Paragraph::title("March 3, 2024"),
                Paragraph::title("   "),
                Paragraph::new("Scene two", ParagraphStyle::Heading(1)),
                Paragraph::body(""),
                Paragraph::body(words(4)),
            ];
            assert_eq!(aggregate(&doc).get(&date(2024, 3, 3)), Some(&(3 + 2 + 4)));
        }

        #[test]
        fn empty_document_yields_empty_map() {
            assert!(aggregate(&Vec::<Paragraph>::new()).is_empty());
        }
    }
}

pub mod sheet {
    //! Snapshot of the tracking sheet: the date axis across the header row and the writer
    //! names down the name column.

    use crate::core::{CellValue, DateKey};
    use crate::dates::coerce_cell;
    use crate::storage::SheetStore;
    use anyhow::{Context, Result};

    /// Where things live on the sheet. All coordinates are 1-based.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SheetLayout {
        pub header_row: u32,
        pub name_column: u32,
        /// First writer row.
        pub first_row: u32,
        /// First date column.
        pub first_column: u32,
    }

    /// Header row as `(column, date)` pairs; `None` columns never receive writes.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SheetAxis {
        first_column: u32,
        keys: Vec<Option<DateKey>>,
    }

    impl SheetAxis {
        pub fn from_header(first_column: u32, header: &[CellValue]) -> Self {
            Self {
                first_column,
                keys: header.iter().map(coerce_cell).collect(),
            }
        }

        pub fn width(&self) -> usize {
            self.keys.len()
        }

        pub fn date_key_for_column(&self, index: usize) -> Option<DateKey> {
            self.keys.get(index).copied().flatten()
        }

        pub fn column_for_date(&self, date: &DateKey) -> Option<usize> {
            self.keys.iter().position(|k| k.as_ref() == Some(date))
        }

        /// Absolute sheet column of an axis index.
        pub fn sheet_column(&self, index: usize) -> u32 {
            self.first_column + index as u32
        }
    }

    /// A writer row's cells aligned to the axis. Cells past the end are absent.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct RowState {
        pub cells: Vec<CellValue>,
    }

    impl RowState {
        pub fn new(cells: Vec<CellValue>) -> Self {
            Self { cells }
        }

        pub fn is_empty_at(&self, index: usize) -> bool {
            self.cells.get(index).is_none_or(CellValue::is_empty)
        }
    }

    #[derive(Debug, Clone)]
    pub struct SheetIndex {
        axis: SheetAxis,
        first_row: u32,
        names: Vec<CellValue>,
    }

    impl SheetIndex {
        pub fn new(axis: SheetAxis, first_row: u32, names: Vec<CellValue>) -> Self {
            Self {
                axis,
                first_row,
                names,
            }
        }

        /// Read the header row and the name column once.
        pub fn load(sheet: &dyn SheetStore, layout: &SheetLayout) -> Result<Self> {
            let last_column = sheet.last_column();
            let header = if last_column >= layout.first_column {
                let width = last_column - layout.first_column + 1;
                sheet
                    .read_range(layout.header_row, layout.first_column, 1, width)
                    .context("reading header row")?
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            let last_row = sheet.last_row();
            let names = if last_row >= layout.first_row {
                let height = last_row - layout.first_row + 1;
                sheet
                    .read_range(layout.first_row, layout.name_column, height, 1)
                    .context("reading name column")?
                    .into_iter()
                    .flatten()
                    .collect()
            } else {
                Vec::new()
            };

            Ok(Self::new(
                SheetAxis::from_header(layout.first_column, &header),
                layout.first_row,
                names,
            ))
        }

        pub fn axis(&self) -> &SheetAxis {
            &self.axis
        }

        /// Case- and surrounding-whitespace-insensitive exact match; first match wins.
        pub fn resolve_writer_row(&self, name: &str) -> Option<u32> {
            let wanted = name.trim().to_lowercase();
            self.names
                .iter()
                .position(|cell| {
                    cell.as_text()
                        .is_some_and(|n| n.trim().to_lowercase() == wanted)
                })
                .map(|idx| self.first_row + idx as u32)
        }

        pub fn date_key_for_column(&self, index: usize) -> Option<DateKey> {
            self.axis.date_key_for_column(index)
        }

        /// First empty or absent cell, left to right across the axis.
        pub fn first_empty_column(&self, row: &RowState) -> Option<usize> {
            (0..self.axis.width()).find(|&idx| row.is_empty_at(idx))
        }

        pub fn read_row(&self, sheet: &dyn SheetStore, row: u32) -> Result<RowState> {
            if self.axis.width() == 0 {
                return Ok(RowState::default());
            }
            let cells = sheet
                .read_range(row, self.axis.first_column, 1, self.axis.width() as u32)
                .with_context(|| format!("reading row {row}"))?
                .into_iter()
                .next()
                .unwrap_or_default();
            Ok(RowState::new(cells))
        }
    }

}

pub mod planner {
    //! Per-writer planning: resume point, cutoff, and empty-cell targeting.
    //!
    //! Each writer is isolated: a missing name, a full row, an undated resume column or an
    //! unreadable document ends that writer's turn with a report and nothing else.

    use crate::aggregate::aggregate_document;
    use crate::core::{
        CellUpdate, DateKey, DateWordMap, UpdatePlan, WriterOutcome, WriterReport, WriterSpec,
    };
    use crate::sheet::{RowState, SheetAxis, SheetIndex};
    use crate::storage::{DocumentStore, SheetStore};
    use tracing::{debug, info, warn};

    pub struct ImportPlanner<'a> {
        index: &'a SheetIndex,
        sheet: &'a dyn SheetStore,
        documents: &'a dyn DocumentStore,
    }

    impl<'a> ImportPlanner<'a> {
        pub fn new(
            index: &'a SheetIndex,
            sheet: &'a dyn SheetStore,
            documents: &'a dyn DocumentStore,
        ) -> Self {
            Self {
                index,
                sheet,
                documents,
            }
        }

        /// Plan every writer in order. Returns one report per writer.
        pub fn plan(&self, writers: &[WriterSpec]) -> (UpdatePlan, Vec<WriterReport>) {
            let mut plan = UpdatePlan::new();
            let reports = writers
                .iter()
                .map(|writer| WriterReport {
                    writer: writer.name.clone(),
                    outcome: self.plan_writer(writer, &mut plan),
                })
                .collect();
            (plan, reports)
        }

        pub fn plan_writer(&self, writer: &WriterSpec, plan: &mut UpdatePlan) -> WriterOutcome {
            let name = writer.name.as_str();

            let Some(row) = self.index.resolve_writer_row(name) else {
                warn!(writer = name, "writer not found in sheet; skipping");
                return WriterOutcome::NotFound;
            };

            let row_state = match self.index.read_row(self.sheet, row) {
                Ok(state) => state,
                Err(err) => {
                    warn!(writer = name, row, error = %format!("{err:#}"), "cannot read writer row; skipping");
                    return WriterOutcome::Unreadable {
                        reason: format!("{err:#}"),
                    };
                }
            };

            let Some(resume) = self.index.first_empty_column(&row_state) else {
                info!(writer = name, row, "already fully filled; skipping");
                return WriterOutcome::AlreadyFilled { row };
            };

            let column = self.index.axis().sheet_column(resume);
            let Some(start_date) = self.index.date_key_for_column(resume) else {
                warn!(
                    writer = name,
                    row, column, "header at resume column is not a date; skipping"
                );
                return WriterOutcome::InvalidStartDate { row, column };
            };

            info!(writer = name, document = %writer.document_ref, "opening document");
            let counts = match aggregate_document(self.documents, &writer.document_ref) {
                Ok(counts) => counts,
                Err(err) => {
                    warn!(writer = name, error = %format!("{err:#}"), "cannot read document; skipping");
                    return WriterOutcome::Unreadable {
                        reason: format!("{err:#}"),
                    };
                }
            };

            let mut planned = 0;
            for update in plan_row(self.index.axis(), row, &row_state, &start_date, &counts) {
                if plan.targets(update.row, update.column) {
                    debug!(
                        writer = name,
                        row = update.row,
                        column = update.column,
                        "cell already planned by an earlier writer"
                    );
                    continue;
                }
                plan.push(update);
                planned += 1;
            }

            info!(writer = name, row, start_date = %start_date, planned, "processed");
            WriterOutcome::Processed {
                row,
                start_date,
                planned,
            }
        }
    }

    /// Updates for one row: dates on/after `start_date` whose column exists and is empty.
    pub fn plan_row(
        axis: &SheetAxis,
        row: u32,
        state: &RowState,
        start_date: &DateKey,
        counts: &DateWordMap,
    ) -> Vec<CellUpdate> {
        counts
            .range(*start_date..)
            .filter_map(|(date, &count)| {
                let Some(index) = axis.column_for_date(date) else {
                    debug!(row, date = %date, "no column for date");
                    return None;
                };
                if !state.is_empty_at(index) {
                    debug!(row, date = %date, "target cell already filled");
                    return None;
                }
                (count > 0).then(|| CellUpdate {
                    row,
                    column: axis.sheet_column(index),
                    value: count,
                })
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::{CellValue, Paragraph};
        use crate::storage::memory::{MemoryDocuments, MemorySheet};

        fn date(y: i32, m: u32, d: u32) -> DateKey {
            DateKey::from_ymd(y, m, d).unwrap()
        }

        fn axis() -> SheetAxis {
            SheetAxis::from_header(
                3,
                &[
                    CellValue::from("01/01/2024"),
                    CellValue::from("01/02/2024"),
                    CellValue::from("01/03/2024"),
                ],
            )
        }

        #[test]
        fn cutoff_excludes_dates_before_resume_point() {
            let state = RowState::new(vec![CellValue::Empty, CellValue::Empty]);
            let counts = DateWordMap::from([(date(2024, 1, 1), 10), (date(2024, 1, 2), 20)]);
            let updates = plan_row(&axis(), 2, &state, &date(2024, 1, 2), &counts);
            assert_eq!(
                updates,
                vec![CellUpdate {
                    row: 2,
                    column: 4,
                    value: 20
                }]
            );
        }

        #[test]
        fn never_targets_filled_cells_or_missing_columns() {
            let state = RowState::new(vec![
                CellValue::Empty,
                CellValue::Number(5.0),
                CellValue::Empty,
            ]);
            let counts = DateWordMap::from([
                (date(2024, 1, 1), 1),
                (date(2024, 1, 2), 2),
                (date(2024, 1, 3), 3),
                (date(2024, 1, 4), 4),
            ]);
            let updates = plan_row(&axis(), 7, &state, &date(2024, 1, 1), &counts);
            let columns: Vec<u32> = updates.iter().map(|u| u.column).collect();
            assert_eq!(columns, vec![3, 5]);
        }

        #[test]
        fn cutoff_is_chronological_across_year_boundary() {
            let axis = SheetAxis::from_header(
                3,
                &[
                    CellValue::from("12/30/2023"),
                    CellValue::from("12/31/2023"),
                    CellValue::from("01/01/2024"),
                    CellValue::from("01/02/2024"),
                ],
            );
            let state = RowState::new(vec![CellValue::Number(4.0)]);
            let counts = DateWordMap::from([
                (date(2023, 12, 30), 1),
                (date(2023, 12, 31), 2),
                (date(2024, 1, 1), 3),
                (date(2024, 1, 2), 4),
            ]);
            let updates = plan_row(&axis, 2, &state, &date(2023, 12, 31), &counts);
            let planned: Vec<(u32, u64)> = updates.iter().map(|u| (u.column, u.value)).collect();
            assert_eq!(planned, vec![(4, 2), (5, 3), (6, 4)]);
        }

        #[test]
        fn missing_writer_does_not_block_others() {
            let sheet = MemorySheet::from_rows(vec![
                vec![
                    CellValue::from("Writer"),
                    CellValue::Empty,
                    CellValue::from("01/01/2024"),
                ],
                vec![CellValue::from("present")],
            ]);
            let mut docs = MemoryDocuments::new();
            docs.insert(
                "doc-present",
                vec![Paragraph::title("1 jan 2024"), Paragraph::body("hello there")],
            );
            let index = SheetIndex::load(
                &sheet,
                &crate::sheet::SheetLayout {
                    header_row: 1,
                    name_column: 1,
                    first_row: 2,
                    first_column: 3,
                },
            )
            .unwrap();
            let writers = vec![
                WriterSpec::new("ghost", "doc-ghost"),
                WriterSpec::new("present", "doc-present"),
            ];

            let (plan, reports) = ImportPlanner::new(&index, &sheet, &docs).plan(&writers);

            assert_eq!(reports[0].outcome, WriterOutcome::NotFound);
            assert!(matches!(
                reports[1].outcome,
                WriterOutcome::Processed { planned: 1, .. }
            ));
            assert!(plan.targets(2, 3));
        }

        #[test]
        fn duplicate_writer_entries_plan_each_cell_once() {
            let sheet = MemorySheet::from_rows(vec![
                vec![CellValue::Empty, CellValue::from("01/01/2024")],
                vec![CellValue::from("dup")],
            ]);
            let mut docs = MemoryDocuments::new();
            docs.insert("a", vec![Paragraph::title("1 jan 2024")]);
            let index = SheetIndex::new(
                SheetAxis::from_header(2, &[CellValue::from("01/01/2024")]),
                2,
                vec![CellValue::from("dup")],
            );
            let writers = vec![WriterSpec::new("dup", "a"), WriterSpec::new("DUP", "a")];

            let (plan, reports) = ImportPlanner::new(&index, &sheet, &docs).plan(&writers);

            assert_eq!(plan.len(), 1);
            assert!(matches!(
                reports[1].outcome,
                WriterOutcome::Processed { planned: 0, .. }
            ));
        }
    }
}

pub mod apply {
    use crate::core::{CellValue, ImportSummary, UpdatePlan, WriterReport};
    use crate::storage::SheetStore;
    use anyhow::{Context, Result};
    use tracing::info;

    /// Write every planned cell, then flush the store once. An empty plan touches nothing.
    pub fn apply(
        sheet: &mut dyn SheetStore,
        plan: UpdatePlan,
        reports: Vec<WriterReport>,
    ) -> Result<ImportSummary> {
        if !plan.is_empty() {
            for update in plan.iter() {
                sheet
                    .write_cell(update.row, update.column, CellValue::from(update.value))
                    .with_context(|| {
                        format!("writing row {} column {}", update.row, update.column)
                    })?;
            }
            sheet.flush().context("flushing sheet writes")?;
        }
        info!(cells = plan.len(), "applied updates");
        Ok(ImportSummary {
            writers_in_scope: reports.len(),
            cells_written: plan.len(),
            dry_run: false,
            updates: plan,
            reports,
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::CellUpdate;
        use crate::storage::memory::MemorySheet;

        #[test]
        fn writes_each_update_as_a_number() {
            let mut sheet = MemorySheet::default();
            let mut plan = UpdatePlan::new();
            plan.push(CellUpdate {
                row: 2,
                column: 4,
                value: 83,
            });
            let summary = apply(&mut sheet, plan, Vec::new()).unwrap();
            assert_eq!(summary.cells_written, 1);
            assert_eq!(sheet.get(2, 4), &CellValue::Number(83.0));
        }

        #[test]
        fn empty_plan_is_a_no_op() {
            let mut sheet = MemorySheet::default();
            let summary = apply(&mut sheet, UpdatePlan::new(), Vec::new()).unwrap();
            assert_eq!(summary.cells_written, 0);
            assert_eq!(sheet.last_row(), 0);
            assert_eq!(summary.notice(), "Word counts imported for 0 writers.");
        }
    }
}

pub mod config {
    //! Operator configuration and A1-style addresses.

    use crate::core::{DomainError, WriterSpec};
    use crate::sheet::SheetLayout;
    use anyhow::{Context, Result};
    use nom::{
        IResult,
        bytes::complete::take_while1,
        character::complete::{char, digit1},
        combinator::{all_consuming, map_opt, map_res, opt},
        sequence::tuple,
    };
    use serde::{Deserialize, Serialize};
    use serde_with::{DeserializeFromStr, SerializeDisplay};
    use std::{fmt, fs, path::Path, str::FromStr};

    #[derive(Debug, thiserror::Error)]
    pub enum ConfigError {
        #[error("malformed configuration: {0}")]
        Json(#[from] serde_json::Error),
        #[error("sheetName must not be empty")]
        EmptySheetName,
        #[error("headerRow must be at least 1")]
        ZeroHeaderRow,
        #[error("startCell row {start_row} must be below headerRow {header_row}")]
        HeaderOverlapsData { header_row: u32, start_row: u32 },
        #[error("writer #{0} has a blank name")]
        BlankWriterName(usize),
    }

    /* ------------------------------ Addresses ------------------------------ */

    /// A1-style cell address (`C2`, `$AA$10`), 1-based.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
    pub struct CellAddress {
        pub row: u32,
        pub column: u32,
    }

    impl FromStr for CellAddress {
        type Err = DomainError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let (_, (_, column, _, row)) = all_consuming(tuple((
                opt(char('$')),
                column_letters,
                opt(char('$')),
                row_number,
            )))(s.trim())
            .map_err(|_| DomainError::InvalidAddress(s.to_string()))?;
            if row == 0 {
                return Err(DomainError::InvalidAddress(s.to_string()));
            }
            Ok(Self { row, column })
        }
    }

    impl fmt::Display for CellAddress {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}{}", column_name(self.column), self.row)
        }
    }

    /// Column given by letters alone (`A`, `AB`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
    pub struct ColumnRef(pub u32);

    impl Default for ColumnRef {
        fn default() -> Self {
            Self(1)
        }
    }

    impl FromStr for ColumnRef {
        type Err = DomainError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            all_consuming(column_letters)(s.trim())
                .map(|(_, column)| Self(column))
                .map_err(|_| DomainError::InvalidColumn(s.to_string()))
        }
    }

    impl fmt::Display for ColumnRef {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&column_name(self.0))
        }
    }

    fn column_letters(i: &str) -> IResult<&str, u32> {
        map_opt(take_while1(|c: char| c.is_ascii_alphabetic()), letters_to_column)(i)
    }

    fn row_number(i: &str) -> IResult<&str, u32> {
        map_res(digit1, |s: &str| s.parse::<u32>())(i)
    }

    /// Bijective base-26: `A` = 1, `Z` = 26, `AA` = 27.
    fn letters_to_column(letters: &str) -> Option<u32> {
        letters.bytes().try_fold(0u32, |acc, b| {
            let digit = u32::from(b.to_ascii_uppercase() - b'A') + 1;
            acc.checked_mul(26)?.checked_add(digit)
        })
    }

    pub fn column_name(mut column: u32) -> String {
        let mut out = Vec::new();
        while column > 0 {
            let rem = (column - 1) % 26;
            out.push(b'A' + rem as u8);
            column = (column - 1) / 26;
        }
        out.reverse();
        String::from_utf8_lossy(&out).into_owned()
    }

    /* ---------------------------- Configuration ---------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    pub struct ImportConfig {
        pub sheet_name: String,
        /// Row = first writer row, column = first date column.
        pub start_cell: CellAddress,
        #[serde(default = "default_header_row")]
        pub header_row: u32,
        #[serde(default)]
        pub name_column: ColumnRef,
        #[serde(default)]
        pub writers: Vec<WriterSpec>,
    }

    fn default_header_row() -> u32 {
        1
    }

    impl ImportConfig {
        pub fn load(path: &Path) -> Result<Self> {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            Self::from_json_str(&text).with_context(|| format!("loading config {:?}", path))
        }

        pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
            let config: Self = serde_json::from_str(text)?;
            config.validate()?;
            Ok(config)
        }

        pub fn validate(&self) -> Result<(), ConfigError> {
            if self.sheet_name.trim().is_empty() {
                return Err(ConfigError::EmptySheetName);
            }
            if self.header_row == 0 {
                return Err(ConfigError::ZeroHeaderRow);
            }
            if self.start_cell.row <= self.header_row {
                return Err(ConfigError::HeaderOverlapsData {
                    header_row: self.header_row,
                    start_row: self.start_cell.row,
                });
            }
            if let Some(idx) = self.writers.iter().position(|w| w.name.trim().is_empty()) {
                return Err(ConfigError::BlankWriterName(idx + 1));
            }
            Ok(())
        }

        pub fn layout(&self) -> SheetLayout {
            SheetLayout {
                header_row: self.header_row,
                name_column: self.name_column.0,
                first_row: self.start_cell.row,
                first_column: self.start_cell.column,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_a1_addresses() {
            let c2: CellAddress = "C2".parse().unwrap();
            assert_eq!((c2.row, c2.column), (2, 3));
            let aa10: CellAddress = "aa10".parse().unwrap();
            assert_eq!(aa10.column, 27);
            let anchored: CellAddress = "$B$3".parse().unwrap();
            assert_eq!((anchored.row, anchored.column), (3, 2));
            assert_eq!(aa10.to_string(), "AA10");
        }

        #[test]
        fn rejects_malformed_addresses() {
            for bad in ["2C", "C0", "C", "", "C2:D4", "C-2"] {
                assert!(bad.parse::<CellAddress>().is_err(), "{bad} should fail");
            }
        }

        #[test]
        fn column_names_round_trip_at_boundaries() {
            assert_eq!(column_name(1), "A");
            assert_eq!(column_name(26), "Z");
            assert_eq!(column_name(27), "AA");
            assert_eq!(column_name(702), "ZZ");
            assert_eq!(column_name(703), "AAA");
        }

        #[test]
        fn loads_config_with_defaults() {
            let config = ImportConfig::from_json_str(
                r#"{
                    "sheetName": "Tracker",
                    "startCell": "C2",
                    "writers": [
                        { "name": "writer_1", "documentRef": "writer_1.txt" }
                    ]
                }"#,
            )
            .unwrap();
            let layout = config.layout();
            assert_eq!(layout.header_row, 1);
            assert_eq!(layout.name_column, 1);
            assert_eq!((layout.first_row, layout.first_column), (2, 3));
            assert_eq!(config.writers[0].document_ref.as_str(), "writer_1.txt");
        }

        #[test]
        fn rejects_start_row_on_header_row() {
            let err = ImportConfig::from_json_str(
                r#"{ "sheetName": "S", "startCell": "C1", "writers": [] }"#,
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::HeaderOverlapsData { .. }));
        }

        #[test]
        fn rejects_blank_writer_names_and_bad_cells() {
            let blank = ImportConfig::from_json_str(
                r#"{ "sheetName": "S", "startCell": "C2",
                     "writers": [{ "name": "  ", "documentRef": "x" }] }"#,
            )
            .unwrap_err();
            assert!(matches!(blank, ConfigError::BlankWriterName(1)));
            let bad_cell = ImportConfig::from_json_str(
                r#"{ "sheetName": "S", "startCell": "2C", "writers": [] }"#,
            )
            .unwrap_err();
            assert!(matches!(bad_cell, ConfigError::Json(_)));
        }
    }
}

pub mod storage {
    //! Collaborator seams: where sheet cells and document paragraphs come from.

    use crate::core::{CellValue, DocumentRef, Paragraph};
    use anyhow::Result;

    /// Rectangular cell access. Rows and columns are 1-based; reads beyond the populated
    /// area yield `CellValue::Empty`.
    pub trait SheetStore {
        /// Last row holding any value (0 for an empty sheet).
        fn last_row(&self) -> u32;

        /// Last column holding any value (0 for an empty sheet).
        fn last_column(&self) -> u32;

        fn read_range(
            &self,
            row: u32,
            column: u32,
            rows: u32,
            columns: u32,
        ) -> Result<Vec<Vec<CellValue>>>;

        fn write_cell(&mut self, row: u32, column: u32, value: CellValue) -> Result<()>;

        /// Persist pending writes (optional).
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    pub trait DocumentStore {
        fn paragraphs(&self, doc: &DocumentRef) -> Result<Vec<Paragraph>>;
    }

    pub mod memory {
        use super::{DocumentStore, SheetStore};
        use crate::core::{CellValue, DocumentRef, Paragraph};
        use anyhow::{Result, anyhow, bail};
        use std::collections::HashMap;

        static EMPTY: CellValue = CellValue::Empty;

        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct MemorySheet {
            rows: Vec<Vec<CellValue>>,
        }

        impl MemorySheet {
            pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
                Self { rows }
            }

            pub fn rows(&self) -> &[Vec<CellValue>] {
                &self.rows
            }

            pub fn get(&self, row: u32, column: u32) -> &CellValue {
                if row == 0 || column == 0 {
                    return &EMPTY;
                }
                self.rows
                    .get(row as usize - 1)
                    .and_then(|r| r.get(column as usize - 1))
                    .unwrap_or(&EMPTY)
            }
        }

        fn ensure_one_based(row: u32, column: u32) -> Result<()> {
            if row == 0 || column == 0 {
                bail!("rows and columns are 1-based (got row {row}, column {column})");
            }
            Ok(())
        }

        impl SheetStore for MemorySheet {
            fn last_row(&self) -> u32 {
                self.rows
                    .iter()
                    .rposition(|r| r.iter().any(|c| !c.is_empty()))
                    .map_or(0, |idx| idx as u32 + 1)
            }

            fn last_column(&self) -> u32 {
                self.rows
                    .iter()
                    .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
                    .max()
                    .map_or(0, |idx| idx as u32 + 1)
            }

            fn read_range(
                &self,
                row: u32,
                column: u32,
                rows: u32,
                columns: u32,
            ) -> Result<Vec<Vec<CellValue>>> {
                ensure_one_based(row, column)?;
                Ok((row..row + rows)
                    .map(|r| {
                        (column..column + columns)
                            .map(|c| self.get(r, c).clone())
                            .collect()
                    })
                    .collect())
            }

            fn write_cell(&mut self, row: u32, column: u32, value: CellValue) -> Result<()> {
                ensure_one_based(row, column)?;
                let (r, c) = (row as usize - 1, column as usize - 1);
                if self.rows.len() <= r {
                    self.rows.resize_with(r + 1, Vec::new);
                }
                let cells = &mut self.rows[r];
                if cells.len() <= c {
                    cells.resize(c + 1, CellValue::Empty);
                }
                cells[c] = value;
                Ok(())
            }
        }

        #[derive(Debug, Clone, Default)]
        pub struct MemoryDocuments {
            docs: HashMap<DocumentRef, Vec<Paragraph>>,
        }

        impl MemoryDocuments {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn insert(&mut self, doc: impl Into<DocumentRef>, paragraphs: Vec<Paragraph>) {
                self.docs.insert(doc.into(), paragraphs);
            }
        }

        impl DocumentStore for MemoryDocuments {
            fn paragraphs(&self, doc: &DocumentRef) -> Result<Vec<Paragraph>> {
                self.docs
                    .get(doc)
                    .cloned()
                    .ok_or_else(|| anyhow!("no document {doc}"))
            }
        }

        #[cfg(test)]
        mod tests {
            use super::*;

            #[test]
            fn reads_pad_with_empty_and_writes_grow_the_grid() {
                let mut sheet = MemorySheet::from_rows(vec![vec![CellValue::from("a")]]);
                sheet.write_cell(3, 2, CellValue::Number(4.0)).unwrap();
                assert_eq!((sheet.last_row(), sheet.last_column()), (3, 2));
                let grid = sheet.read_range(1, 1, 3, 3).unwrap();
                assert_eq!(grid[0][0], CellValue::from("a"));
                assert_eq!(grid[2][1], CellValue::Number(4.0));
                assert_eq!(grid[1][2], CellValue::Empty);
                assert!(sheet.read_range(0, 1, 1, 1).is_err());
            }

            #[test]
            fn trailing_blank_cells_do_not_extend_bounds() {
                let sheet = MemorySheet::from_rows(vec![
                    vec![CellValue::from("x"), CellValue::from("")],
                    vec![CellValue::Empty],
                ]);
                assert_eq!((sheet.last_row(), sheet.last_column()), (1, 1));
            }
        }
    }

    pub mod json {
        //! Workbook kept as a JSON file of named sheets:
        //!
        //! ```json
        //! { "sheets": { "Tracker": [["Writer", null, {"date": "2024-01-01"}], ["writer_1", null, 120]] } }
        //! ```
        //!
        //! `null` is an empty cell, strings are text, numbers are numbers, `{"date": ...}` is a date.

        use super::{SheetStore, memory::MemorySheet};
        use crate::core::CellValue;
        use anyhow::{Context, Result};
        use chrono::NaiveDate;
        use indexmap::IndexMap;
        use serde::{Deserialize, Serialize};
        use std::{
            fs,
            path::{Path, PathBuf},
        };

        #[derive(Debug, thiserror::Error)]
        pub enum WorkbookError {
            #[error("sheet {name:?} not found (available: {available})")]
            SheetNotFound { name: String, available: String },
        }

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(untagged)]
        enum JsonCell {
            Date { date: NaiveDate },
            Number(f64),
            Text(String),
            Empty,
        }

        impl From<JsonCell> for CellValue {
            fn from(cell: JsonCell) -> Self {
                match cell {
                    JsonCell::Date { date } => CellValue::Date(date),
                    JsonCell::Number(n) => CellValue::Number(n),
                    JsonCell::Text(t) => CellValue::Text(t),
                    JsonCell::Empty => CellValue::Empty,
                }
            }
        }

        impl From<&CellValue> for JsonCell {
            fn from(cell: &CellValue) -> Self {
                match cell {
                    CellValue::Date(date) => JsonCell::Date { date: *date },
                    CellValue::Number(n) => JsonCell::Number(*n),
                    CellValue::Text(t) => JsonCell::Text(t.clone()),
                    CellValue::Empty => JsonCell::Empty,
                }
            }
        }

        #[derive(Debug, Default, Serialize, Deserialize)]
        struct WorkbookFile {
            #[serde(default)]
            sheets: IndexMap<String, Vec<Vec<JsonCell>>>,
        }

        /// JSON workbook bound to one active sheet; `flush` rewrites the whole file.
        #[derive(Debug)]
        pub struct JsonWorkbook {
            path: PathBuf,
            active: String,
            sheets: IndexMap<String, MemorySheet>,
        }

        impl JsonWorkbook {
            pub fn open(path: &Path, sheet_name: &str) -> Result<Self> {
                let text =
                    fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
                let file: WorkbookFile = serde_json::from_str(&text)
                    .with_context(|| format!("parsing workbook {:?}", path))?;
                let sheets: IndexMap<String, MemorySheet> = file
                    .sheets
                    .into_iter()
                    .map(|(name, rows)| {
                        let rows = rows
                            .into_iter()
                            .map(|r| r.into_iter().map(CellValue::from).collect())
                            .collect();
                        (name, MemorySheet::from_rows(rows))
                    })
                    .collect();
                if !sheets.contains_key(sheet_name) {
                    let available = sheets.keys().cloned().collect::<Vec<_>>().join(", ");
                    return Err(WorkbookError::SheetNotFound {
                        name: sheet_name.to_string(),
                        available,
                    }
                    .into());
                }
                Ok(Self {
                    path: path.to_path_buf(),
                    active: sheet_name.to_string(),
                    sheets,
                })
            }

            pub fn sheet(&self) -> &MemorySheet {
                &self.sheets[&self.active]
            }

            fn sheet_mut(&mut self) -> &mut MemorySheet {
                let active = &self.active;
                &mut self.sheets[active]
            }
        }

        impl SheetStore for JsonWorkbook {
            fn last_row(&self) -> u32 {
                self.sheet().last_row()
            }

            fn last_column(&self) -> u32 {
                self.sheet().last_column()
            }

            fn read_range(
                &self,
                row: u32,
                column: u32,
                rows: u32,
                columns: u32,
            ) -> Result<Vec<Vec<CellValue>>> {
                self.sheet().read_range(row, column, rows, columns)
            }

            fn write_cell(&mut self, row: u32, column: u32, value: CellValue) -> Result<()> {
                self.sheet_mut().write_cell(row, column, value)
            }

            fn flush(&mut self) -> Result<()> {
                let file = WorkbookFile {
                    sheets: self
                        .sheets
                        .iter()
                        .map(|(name, sheet)| {
                            let rows = sheet
                                .rows()
                                .iter()
                                .map(|r| r.iter().map(JsonCell::from).collect())
                                .collect();
                            (name.clone(), rows)
                        })
                        .collect(),
                };
                let json = serde_json::to_string_pretty(&file)?;
                fs::write(&self.path, json.as_bytes())
                    .with_context(|| format!("writing {:?}", self.path))
            }
        }

    }

    pub mod text {
        //! Plain-text documents: one paragraph per line. `# ` opens a title line,
        //! `## `, `### `, ... are sub-headings, anything else is body text.

        use super::DocumentStore;
        use crate::core::{DocumentRef, Paragraph, ParagraphStyle};
        use anyhow::{Context, Result};
        use nom::{
            IResult,
            bytes::complete::take_while1,
            character::complete::space1,
            sequence::terminated,
        };
        use std::{fs, path::PathBuf};

        /// Resolves document refs as paths relative to `root`.
        #[derive(Debug, Clone)]
        pub struct TextDocumentStore {
            root: PathBuf,
        }

        impl TextDocumentStore {
            pub fn new(root: impl Into<PathBuf>) -> Self {
                Self { root: root.into() }
            }
        }

        impl DocumentStore for TextDocumentStore {
            fn paragraphs(&self, doc: &DocumentRef) -> Result<Vec<Paragraph>> {
                let path = self.root.join(doc.as_str());
                let text =
                    fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
                Ok(parse_paragraphs(&text))
            }
        }

        pub fn parse_paragraphs(input: &str) -> Vec<Paragraph> {
            input.lines().map(parse_line).collect()
        }

        fn parse_line(line: &str) -> Paragraph {
            match heading_marker(line) {
                Ok((rest, level)) => {
                    let style = match level {
                        1 => ParagraphStyle::Title,
                        n => ParagraphStyle::Heading(u8::try_from(n - 1).unwrap_or(u8::MAX)),
                    };
                    Paragraph::new(rest.trim(), style)
                }
                Err(_) => Paragraph::body(line.trim()),
            }
        }

        fn heading_marker(i: &str) -> IResult<&str, usize> {
            let (rest, hashes) = terminated(take_while1(|c: char| c == '#'), space1)(i)?;
            Ok((rest, hashes.len()))
        }

    }
}

pub mod import {
    //! One full run: snapshot the sheet, plan every writer, write once.

    use crate::apply::apply;
    use crate::config::ImportConfig;
    use crate::core::ImportSummary;
    use crate::planner::ImportPlanner;
    use crate::sheet::SheetIndex;
    use crate::storage::{DocumentStore, SheetStore};
    use anyhow::{Context, Result};
    use tracing::info;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct ImportOptions {
        /// Plan and report without writing.
        pub dry_run: bool,
    }

    pub fn run_import(
        config: &ImportConfig,
        sheet: &mut dyn SheetStore,
        documents: &dyn DocumentStore,
        options: ImportOptions,
    ) -> Result<ImportSummary> {
        let index = SheetIndex::load(sheet, &config.layout())
            .with_context(|| format!("reading sheet {:?}", config.sheet_name))?;
        info!(
            sheet = %config.sheet_name,
            date_columns = index.axis().width(),
            writers = config.writers.len(),
            "starting import"
        );

        let (plan, reports) = ImportPlanner::new(&index, sheet, documents).plan(&config.writers);

        if options.dry_run {
            info!(cells = plan.len(), "dry run; nothing written");
            return Ok(ImportSummary {
                writers_in_scope: reports.len(),
                cells_written: 0,
                dry_run: true,
                updates: plan,
                reports,
            });
        }
        apply(sheet, plan, reports)
    }

}

pub use aggregate::aggregate;
pub use config::ImportConfig;
pub use dates::normalize;
pub use import::{ImportOptions, run_import};
pub use words::count_words;
