use std::iter::Enumerate;
use std::str::{FromStr, Lines};

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;

use super::date::parse_date;
use super::{ParseOptions, QifError, QifSplit, QifTransaction};

/// Parses QIF text into transactions.
///
/// Parsing is lazy: nothing is read until the iterator returned by [`QifParser::records`] is
/// advanced, and `records` can be called again to restart from the top.
#[derive(Debug, Clone)]
pub struct QifParser<'a> {
    text: &'a str,
    options: ParseOptions,
}

impl<'a> QifParser<'a> {
    pub fn new(text: &'a str, options: ParseOptions) -> QifParser<'a> {
        QifParser {
            text: text.strip_prefix('\u{feff}').unwrap_or(text),
            options,
        }
    }

    pub fn records(&self) -> Records<'a> {
        Records {
            lines: self.text.lines().enumerate(),
            options: self.options,
            section: Section::Transactions { investment: false },
            account: None,
            pending_account: None,
            autoswitch: false,
            record: RecordBuilder::default(),
            done: false,
        }
    }

    /// Parses the whole text, stopping at the first error.
    pub fn parse_all(&self) -> Result<Vec<QifTransaction>, QifError> {
        self.records().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Transactions { investment: bool },
    AccountList,
    Ignored,
}

/// Iterator over the transactions of a QIF text. Fused after the first error.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    lines: Enumerate<Lines<'a>>,
    options: ParseOptions,
    section: Section,
    account: Option<String>,
    pending_account: Option<String>,
    autoswitch: bool,
    record: RecordBuilder,
    done: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<QifTransaction, QifError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.next_record();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

impl<'a> Records<'a> {
    fn next_record(&mut self) -> Option<Result<QifTransaction, QifError>> {
        while let Some((index, raw)) = self.lines.next() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('!') {
                if let Some(start) = self.record.start_line {
                    return Some(Err(QifError::IncompleteRecord { line: start }));
                }
                self.switch_section(header);
                continue;
            }

            match self.section {
                Section::Transactions { investment } => {
                    match self.record.feed(line_no, line, investment, &self.options) {
                        Ok(false) => {},
                        Ok(true) => {
                            let record = std::mem::take(&mut self.record);
                            return Some(record.finish(line_no, self.account.clone(), &self.options));
                        },
                        Err(err) => return Some(Err(err)),
                    }
                },
                Section::AccountList => self.feed_account_list(line),
                Section::Ignored => {},
            }
        }

        self.record
            .start_line
            .map(|line| Err(QifError::IncompleteRecord { line }))
    }

    fn switch_section(&mut self, header: &str) {
        if self.section == Section::AccountList {
            self.adopt_pending_account();
        }

        let header = header.trim().to_ascii_lowercase();
        let header = header.as_str();
        self.section = match header {
            "type:bank" | "type:cash" | "type:ccard" | "type:oth a" | "type:oth l" => {
                Section::Transactions { investment: false }
            },
            "type:invst" => Section::Transactions { investment: true },
            "account" => Section::AccountList,
            "option:autoswitch" => {
                self.autoswitch = true;
                self.section
            },
            "clear:autoswitch" => {
                self.autoswitch = false;
                self.section
            },
            _ if header.starts_with("type:") => {
                debug!("skipping records in section !{}", header);
                Section::Ignored
            },
            _ => {
                debug!("ignoring header line !{}", header);
                self.section
            },
        };
    }

    fn feed_account_list(&mut self, line: &str) {
        let mut chars = line.chars();
        match chars.next() {
            Some('N') => self.pending_account = Some(chars.as_str().trim().to_string()),
            Some('^') => self.adopt_pending_account(),
            _ => {},
        }
    }

    // With AutoSwitch on, the account block is a list of every account rather than the one the
    // following transactions belong to.
    fn adopt_pending_account(&mut self) {
        if let Some(name) = self.pending_account.take() {
            if !self.autoswitch && !name.is_empty() {
                self.account = Some(name);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PendingSplit {
    category: Option<String>,
    memo: Option<String>,
    amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
struct RecordBuilder {
    start_line: Option<usize>,
    date: Option<NaiveDate>,
    amount: Option<Decimal>,
    payee: Option<String>,
    memo: Option<String>,
    category: Option<String>,
    number: Option<String>,
    cleared: Option<String>,
    splits: Vec<PendingSplit>,
}

impl RecordBuilder {
    /// Returns `Ok(true)` once the record terminator has been read.
    fn feed(&mut self, line_no: usize, line: &str, investment: bool, options: &ParseOptions) -> Result<bool, QifError> {
        let mut chars = line.chars();
        let tag = chars.next().unwrap_or_default();
        let value = chars.as_str().trim();

        if tag == '^' {
            if self.start_line.is_none() {
                return Err(QifError::malformed(line_no, "record terminator before any transaction field"));
            }
            return Ok(true);
        }

        match tag {
            'D' => self.date = Some(parse_date(value, options.date_order)?),
            'T' => self.amount = Some(amount_field(line_no, value)?),
            'U' => {
                let amount = amount_field(line_no, value)?;
                self.amount.get_or_insert(amount);
            },
            'P' => self.payee = text(value),
            'M' => self.memo = text(value),
            'L' => self.category = text(value),
            'N' => self.number = text(value),
            'C' => self.cleared = text(value),
            'A' | '%' => {},
            'Y' | 'I' | 'Q' | 'O' if investment => {},
            'S' => self.splits.push(PendingSplit {
                category: text(value),
                ..PendingSplit::default()
            }),
            'E' => self.open_split(|split| split.memo.is_none()).memo = text(value),
            '$' => {
                let amount = amount_field(line_no, value)?;
                self.open_split(|split| split.amount.is_none()).amount = Some(amount);
            },
            other => return Err(QifError::malformed(line_no, format!("unrecognized tag {other:?}"))),
        }

        self.start_line.get_or_insert(line_no);
        Ok(false)
    }

    /// The split the next `E`/`$` line belongs to; starts a new one if the last split already has
    /// that field.
    fn open_split(&mut self, accepts: impl Fn(&PendingSplit) -> bool) -> &mut PendingSplit {
        if !self.splits.last().is_some_and(accepts) {
            self.splits.push(PendingSplit::default());
        }
        let last = self.splits.len() - 1;
        &mut self.splits[last]
    }

    fn finish(self, line_no: usize, account: Option<String>, options: &ParseOptions) -> Result<QifTransaction, QifError> {
        let start = self.start_line.unwrap_or(line_no);
        let date = self
            .date
            .ok_or_else(|| QifError::malformed(start, "transaction has no date"))?;

        let splits = self
            .splits
            .into_iter()
            .map(|split| match split.amount {
                Some(amount) => Ok(QifSplit {
                    category: split.category,
                    memo: split.memo,
                    amount,
                }),
                None => Err(QifError::malformed(start, "split has no amount")),
            })
            .collect::<Result<Vec<QifSplit>, QifError>>()?;

        let split_total: Decimal = splits.iter().map(|split| split.amount).sum();
        let amount = match self.amount {
            Some(amount) => amount,
            None if !splits.is_empty() => split_total,
            None => return Err(QifError::malformed(start, "transaction has no amount")),
        };

        if !splits.is_empty() && (split_total - amount).abs() > options.split_tolerance {
            return Err(QifError::malformed(
                start,
                format!("split amounts sum to {split_total}, transaction total is {amount}"),
            ));
        }

        Ok(QifTransaction {
            date,
            amount,
            payee: self.payee,
            memo: self.memo,
            category: self.category,
            number: self.number,
            cleared: self.cleared,
            splits,
            account,
        })
    }
}

fn text(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn amount_field(line_no: usize, value: &str) -> Result<Decimal, QifError> {
    parse_amount(value).ok_or_else(|| QifError::malformed(line_no, format!("invalid amount {value:?}")))
}

/// Reads a QIF amount. Thousands separators are dropped, and a comma is taken as the decimal
/// separator when it is the last separator and not followed by exactly three digits
/// (`1.234,56`, `12,5`).
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = raw.strip_prefix('+').unwrap_or(&raw);

    let normalized = match (raw.rfind('.'), raw.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => raw.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => raw.replace(',', ""),
        (None, Some(comma)) if raw.len() - comma - 1 != 3 => raw.replace(',', "."),
        (None, Some(_)) => raw.replace(',', ""),
        _ => raw.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}
