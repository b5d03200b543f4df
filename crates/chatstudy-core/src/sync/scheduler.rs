//! Per-conversation debounce scheduling.
//!
//! The scheduler only tracks deadlines; it never sleeps. Callers pass the
//! current time in, which keeps it testable without real time passing.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

pub struct DebounceScheduler {
    debounce: Duration,
    pending: HashMap<String, DateTime<Utc>>,
    in_flight: HashSet<String>,
}

impl DebounceScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Arms (or re-arms) the timer for `id` to fire at `now + debounce`.
    pub fn arm_at(&mut self, id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = now + self.debounce;
        self.pending.insert(id.to_string(), deadline);
        deadline
    }

    /// Arms the timer to fire immediately.
    pub fn arm_now(&mut self, id: &str, now: DateTime<Utc>) {
        self.pending.insert(id.to_string(), now);
    }

    pub fn cancel(&mut self, id: &str) {
        self.pending.remove(id);
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    /// Removes and returns every id whose deadline has passed, marking each
    /// as in flight. Ids already in flight stay armed until they finish, so
    /// one conversation never has two saves outstanding.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<(DateTime<Utc>, String)> = self
            .pending
            .iter()
            .filter(|(id, deadline)| **deadline <= now && !self.in_flight.contains(*id))
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect();
        due.sort();

        let mut ids = Vec::with_capacity(due.len());
        for (_, id) in due {
            self.pending.remove(&id);
            self.in_flight.insert(id.clone());
            ids.push(id);
        }
        ids
    }

    /// Marks a save as finished.
    pub fn finish(&mut self, id: &str) {
        self.in_flight.remove(id);
    }

    /// Drops all timers and in-flight markers for the given ids.
    pub fn forget<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            self.pending.remove(id);
            self.in_flight.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_debounce_reschedules_later() {
        let mut scheduler = DebounceScheduler::new(Duration::milliseconds(1000));

        assert_eq!(
            scheduler.arm_at("c1", base()),
            base() + Duration::milliseconds(1000)
        );
        assert_eq!(
            scheduler.arm_at("c1", base() + Duration::milliseconds(400)),
            base() + Duration::milliseconds(1400)
        );

        assert!(scheduler.take_due(base() + Duration::milliseconds(1000)).is_empty());
        assert_eq!(
            scheduler.take_due(base() + Duration::milliseconds(1400)),
            vec!["c1".to_string()]
        );
        assert!(!scheduler.is_armed("c1"));
    }

    #[test]
    fn test_in_flight_ids_are_not_taken_twice() {
        let mut scheduler = DebounceScheduler::new(Duration::milliseconds(10));
        scheduler.arm_at("c1", base());
        assert_eq!(scheduler.take_due(base() + Duration::seconds(1)).len(), 1);

        scheduler.arm_at("c1", base() + Duration::seconds(1));
        assert!(scheduler.take_due(base() + Duration::seconds(5)).is_empty());
        assert!(scheduler.is_armed("c1"));

        scheduler.finish("c1");
        assert_eq!(scheduler.take_due(base() + Duration::seconds(5)).len(), 1);
    }

    #[test]
    fn test_independent_conversations_fire_independently() {
        let mut scheduler = DebounceScheduler::new(Duration::milliseconds(100));
        scheduler.arm_at("a", base());
        scheduler.arm_at("b", base() + Duration::milliseconds(50));

        assert_eq!(
            scheduler.take_due(base() + Duration::milliseconds(120)),
            vec!["a".to_string()]
        );
        assert_eq!(
            scheduler.take_due(base() + Duration::milliseconds(150)),
            vec!["b".to_string()]
        );
    }
}
