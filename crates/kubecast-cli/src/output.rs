//! Terminal output formatting.

use chrono::Local;
use colored::{ColoredString, Colorize};

use kubecast_core::{EventKind, Message};

/// Print one received message.
pub fn print_message(message: &Message, with_payload: bool) {
    let message_type = message.message_type();
    let name = message.payload()["metadata"]["name"]
        .as_str()
        .unwrap_or_default();

    println!(
        "{} {:<32} {}",
        Local::now().format("%H:%M:%S").to_string().dimmed(),
        event_colored(message_type.event(), &message_type.to_string()),
        name
    );

    if with_payload {
        match serde_json::to_string_pretty(message.payload()) {
            Ok(pretty) => println!("{}", pretty.dimmed()),
            Err(_) => println!("{}", "(unprintable payload)".dimmed()),
        }
    }
}

fn event_colored(event: EventKind, tag: &str) -> ColoredString {
    match event {
        EventKind::Created => tag.green(),
        EventKind::Updated => tag.yellow(),
        EventKind::Deleted => tag.red(),
    }
}
