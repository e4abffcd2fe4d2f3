//! Session segmentation
//!
//! Groups an ordered event stream into sessions using an inactivity-gap rule.

use crate::analytics::types::{InteractionEvent, Session};
use chrono::{DateTime, Utc};

/// Split `events` into sessions.
///
/// Events must be in timestamp order (the event log guarantees this). A new
/// session starts whenever the gap from the previous event exceeds `max_gap_ms`;
/// a gap of exactly `max_gap_ms` stays in the current session. The trailing
/// session is closed at the last event's timestamp.
pub fn segment_sessions(events: &[InteractionEvent], max_gap_ms: i64) -> Vec<Session> {
    let mut sessions = Vec::new();

    let Some(first) = events.first() else {
        return sessions;
    };

    let mut start = first.timestamp;
    let mut end = first.timestamp;
    let mut count = 1usize;

    for event in &events[1..] {
        let gap_ms = (event.timestamp - end).num_milliseconds();
        if gap_ms > max_gap_ms {
            sessions.push(close_session(start, end, count));
            start = event.timestamp;
            count = 0;
        }
        end = event.timestamp;
        count += 1;
    }

    sessions.push(close_session(start, end, count));
    sessions
}

/// Mean session duration in milliseconds (0 for no sessions)
pub fn average_duration_ms(sessions: &[Session]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    let total: i64 = sessions.iter().map(|s| s.duration_ms).sum();
    total as f64 / sessions.len() as f64
}

fn close_session(start: DateTime<Utc>, end: DateTime<Utc>, event_count: usize) -> Session {
    Session {
        start_time: start,
        end_time: end,
        duration_ms: (end - start).num_milliseconds().max(0),
        event_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{EventData, InteractionType};
    use chrono::{Duration, TimeZone};

    const GAP: i64 = 300_000;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn click_at(ts: DateTime<Utc>) -> InteractionEvent {
        InteractionEvent::new(ts, InteractionType::TileClick, EventData::tile("yes"))
    }

    fn events_with_gaps(gaps_ms: &[i64]) -> Vec<InteractionEvent> {
        let mut ts = base();
        let mut events = vec![click_at(ts)];
        for gap in gaps_ms {
            ts += Duration::milliseconds(*gap);
            events.push(click_at(ts));
        }
        events
    }

    #[test]
    fn test_empty_input() {
        assert!(segment_sessions(&[], GAP).is_empty());
        assert_eq!(average_duration_ms(&[]), 0.0);
    }

    #[test]
    fn test_single_event_has_zero_duration() {
        let sessions = segment_sessions(&[click_at(base())], GAP);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_ms, 0);
        assert_eq!(sessions[0].event_count, 1);
    }

    #[test]
    fn test_ten_minute_gap_splits_twelve_events() {
        // Three groups of four events; one minute between the first two groups,
        // ten minutes before the last
        let minute = 60_000;
        let gaps = [
            10_000, 10_000, 10_000, minute, 10_000, 10_000, 10_000, 10 * minute, 10_000,
            10_000, 10_000,
        ];
        let events = events_with_gaps(&gaps);
        assert_eq!(events.len(), 12);

        let sessions = segment_sessions(&events, GAP);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].event_count, 8);
        assert_eq!(sessions[1].event_count, 4);
        assert_eq!(sessions[0].duration_ms, 6 * 10_000 + minute);
        assert_eq!(sessions[1].duration_ms, 30_000);
    }

    #[test]
    fn test_gap_equal_to_threshold_stays_in_session() {
        let events = events_with_gaps(&[GAP]);
        assert_eq!(segment_sessions(&events, GAP).len(), 1);

        let events = events_with_gaps(&[GAP + 1]);
        assert_eq!(segment_sessions(&events, GAP).len(), 2);
    }

    #[test]
    fn test_sessions_partition_input() {
        let gaps = [1_000, 400_000, 0, 2_000, 900_000, 299_999, 300_001, 5];
        let events = events_with_gaps(&gaps);
        let sessions = segment_sessions(&events, GAP);

        let total: usize = sessions.iter().map(|s| s.event_count).sum();
        assert_eq!(total, events.len());
        assert_eq!(sessions.first().unwrap().start_time, events[0].timestamp);
        assert_eq!(sessions.last().unwrap().end_time, events.last().unwrap().timestamp);

        for session in &sessions {
            assert!(session.duration_ms >= 0);
            assert!(session.start_time <= session.end_time);
        }
        for pair in sessions.windows(2) {
            assert!(pair[0].end_time < pair[1].start_time);
            assert!((pair[1].start_time - pair[0].end_time).num_milliseconds() > GAP);
        }
    }

    #[test]
    fn test_average_duration() {
        let events = events_with_gaps(&[60_000, 600_000, 120_000]);
        let sessions = segment_sessions(&events, GAP);
        assert_eq!(sessions.len(), 2);
        assert!((average_duration_ms(&sessions) - 90_000.0).abs() < f64::EPSILON);
    }
}
