use common::Signal;
use std::fmt::Write;

/// Plain-text body shared by every channel
pub fn format_message(signal: &Signal) -> String {
    let mut msg = String::new();
    // writing to a String cannot fail
    let _ = writeln!(msg, "SIGNAL {} {}", signal.direction(), signal.symbol());
    let _ = writeln!(msg, "Category: {}", signal.category());
    let _ = writeln!(msg, "Entry: {}", signal.entry_price());
    let _ = writeln!(msg, "Stop Loss: {}", signal.stop_loss());
    for (i, tp) in signal.take_profits().iter().enumerate() {
        let _ = writeln!(msg, "TP{}: {} ({}%)", i + 1, tp.price, tp.pct);
    }
    let _ = writeln!(
        msg,
        "Strength: {}/{} ({:.0}%)",
        signal.confirmations(),
        Signal::MAX_CONFIRMATIONS,
        signal.strength() * 100.0
    );
    let _ = write!(msg, "Time: {}", signal.timestamp().to_rfc3339());
    msg
}

pub fn email_subject(signal: &Signal) -> String {
    format!("[Signal] {} {} @ {}", signal.symbol(), signal.direction(), signal.entry_price())
}
