//! The client operations file parser — an external collaborator per
//! `spec.md` §1 ("the text-file parser that yields an ordered list of
//! operations... only its interface matters"), implemented the way the
//! teacher crate parses its own line-oriented input: a `pest` grammar
//! (`ops.pest`) plus a small driver that turns each matched line into a
//! typed value, skipping blanks and `#` comments before the parser ever
//! sees them (mirroring `parse_csv_line` in `lib.rs` of the teacher crate).

use std::fmt;
use std::path::Path;

use pest::Parser;

use crate::account::AccountId;

#[derive(Parser)]
#[grammar = "ops.pest"]
struct OperationLineParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

/// One parsed line of a client's operations file (`spec.md` §3 "Operation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationLine {
    pub kind: OperationKind,
    /// `None` means "open a new account" (`id-or-N = "N"`); only legal
    /// paired with `Deposit` (`spec.md` §3, §4.7 step 3).
    pub target: Option<AccountId>,
    pub amount: u64,
}

#[derive(Debug)]
pub struct ParseError {
    pub line_number: usize,
    pub line: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: malformed operation {:?}", self.line_number, self.line)
    }
}

impl std::error::Error for ParseError {}

/// Reads `path` and returns the ordered list of operations it names.
/// Blank lines and lines starting with `#` are ignored; everything else
/// must parse as one operation or the whole file is rejected, since a
/// batch's positions (`spec.md` §3 "operation index") must match what the
/// caller intended line-for-line.
pub fn parse_operations_file(path: &Path) -> Result<Vec<OperationLine>, ParseError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ParseError {
        line_number: 0,
        line: path.display().to_string(),
    })?;
    parse_operations(&contents)
}

pub fn parse_operations(contents: &str) -> Result<Vec<OperationLine>, ParseError> {
    let mut operations = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        operations.push(parse_line(line).ok_or_else(|| ParseError {
            line_number: idx + 1,
            line: raw_line.to_string(),
        })?);
    }
    Ok(operations)
}

fn parse_line(line: &str) -> Option<OperationLine> {
    let mut pairs = OperationLineParser::parse(Rule::line_input, line).ok()?;
    let line_input = pairs.next()?;

    let mut target = None;
    let mut kind = None;
    let mut amount = None;

    for pair in line_input.into_inner() {
        match pair.as_rule() {
            Rule::target => {
                let inner = pair.into_inner().next()?;
                target = match inner.as_rule() {
                    Rule::bank_id => Some(inner.as_str().parse::<AccountId>().ok()?),
                    Rule::new_account => None,
                    _ => return None,
                };
            }
            Rule::operation_kind => {
                let inner = pair.into_inner().next()?;
                kind = match inner.as_rule() {
                    Rule::op_deposit => Some(OperationKind::Deposit),
                    Rule::op_withdraw => Some(OperationKind::Withdraw),
                    _ => return None,
                };
            }
            // The amount's `number` is a direct child of `line_input`;
            // the one nested inside `target`'s `bank_id` is consumed
            // above and never reaches this arm.
            Rule::number => amount = pair.as_str().parse::<u64>().ok(),
            _ => {}
        }
    }

    let kind = kind?;
    let amount = amount?;
    if amount == 0 {
        return None;
    }

    // A Withdraw with target=New is structurally well-formed but illegal
    // per spec.md §3; it still parses here so the teller layer rejects it
    // with a typed `InvalidOperation`, not a silent parse failure.
    Some(OperationLine { kind, target, amount })
}
