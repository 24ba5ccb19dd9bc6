//! Thread grouping: collapses a flat chronological message list into the
//! date-separated, sender-consecutive clusters the thread view renders
//! (consecutive same-sender bursts share one avatar/timestamp). Pure
//! function, no I/O.

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::models::Message;

/// Maximum gap in minutes between two messages that still belong to one run.
pub const RUN_GAP_MINUTES: i64 = 5;

fn run_gap() -> Duration {
    Duration::minutes(RUN_GAP_MINUTES)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadGroup {
    /// Calendar-day boundary marker.
    DateSeparator { date: NaiveDate },
    /// Consecutive burst from one sender.
    Run {
        sender_id: Uuid,
        messages: Vec<Message>,
    },
}

/// Walks `messages` in chronological order. A day change flushes the
/// current run and emits a separator; a message joins the current run iff
/// it has the same sender and arrived within [`RUN_GAP_MINUTES`] of the
/// previous message. The final run is flushed at the end.
pub fn group_messages(messages: &[Message]) -> Vec<ThreadGroup> {
    let mut groups: Vec<ThreadGroup> = Vec::new();
    let mut run: Vec<Message> = Vec::new();
    let mut last_date: Option<NaiveDate> = None;

    for message in messages {
        let day = message.created_at.date_naive();

        match last_date {
            // Separators mark day changes only; the first message of the
            // list opens its run without one.
            Some(previous_day) if previous_day != day => {
                flush(&mut groups, &mut run);
                groups.push(ThreadGroup::DateSeparator { date: day });
            }
            Some(_) => {
                if let Some(previous) = run.last() {
                    let same_sender = previous.sender_id == message.sender_id;
                    let within_gap = message.created_at - previous.created_at < run_gap();
                    if !(same_sender && within_gap) {
                        flush(&mut groups, &mut run);
                    }
                }
            }
            None => {}
        }
        last_date = Some(day);

        run.push(message.clone());
    }

    flush(&mut groups, &mut run);
    groups
}

fn flush(groups: &mut Vec<ThreadGroup>, run: &mut Vec<Message>) {
    if run.is_empty() {
        return;
    }
    let messages = std::mem::take(run);
    groups.push(ThreadGroup::Run {
        sender_id: messages[0].sender_id,
        messages,
    });
}
