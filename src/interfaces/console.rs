use crate::interfaces::recording::{EventSink, Recorded};
use std::io::{self, Write};

/// Prints each event as one `event=...` line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEvents;

impl ConsoleEvents {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for ConsoleEvents {
    fn record(&self, event: Recorded) {
        let mut out = io::stdout().lock();
        // A closed stdout only loses the line; the flow itself goes on.
        let _ = writeln!(out, "{event}");
    }
}
