use std::fmt::Write as _;

use super::{DateOrder, QifTransaction};

/// Serializes transactions as a QIF document of type `header` (`Bank`, `CCard`, `Cash`, ...). An
/// `!Account` block is written whenever the source account changes between consecutive transactions.
pub fn write_qif(transactions: &[QifTransaction], header: &str, order: DateOrder) -> String {
    let mut out = String::new();
    let mut current_account: Option<&str> = None;
    let mut header_written = false;

    for transaction in transactions {
        let account = transaction.account.as_deref();
        if account.is_some() && account != current_account {
            let _ = write!(out, "!Account\nN{}\nT{header}\n^\n", account.unwrap_or_default());
            current_account = account;
            header_written = false;
        }
        if !header_written {
            let _ = writeln!(out, "!Type:{header}");
            header_written = true;
        }
        write_transaction(&mut out, transaction, order);
    }

    out
}

fn write_transaction(out: &mut String, transaction: &QifTransaction, order: DateOrder) {
    let _ = writeln!(out, "D{}", transaction.date.format(order.format()));
    let _ = writeln!(out, "T{}", transaction.amount);
    write_optional(out, 'C', &transaction.cleared);
    write_optional(out, 'N', &transaction.number);
    write_optional(out, 'P', &transaction.payee);
    write_optional(out, 'M', &transaction.memo);
    write_optional(out, 'L', &transaction.category);
    for split in &transaction.splits {
        let _ = writeln!(out, "S{}", split.category.as_deref().unwrap_or_default());
        write_optional(out, 'E', &split.memo);
        let _ = writeln!(out, "${}", split.amount);
    }
    out.push_str("^\n");
}

fn write_optional(out: &mut String, tag: char, value: &Option<String>) {
    if let Some(value) = value {
        let _ = writeln!(out, "{tag}{value}");
    }
}
