// src/engine/debounce.rs

use std::time::{SystemTime, UNIX_EPOCH};

/// One-second coalescing window for pipeline restarts.
///
/// Times are truncated to whole seconds; a trigger is accepted only if it
/// falls in a strictly later second than the last accepted one.
#[derive(Debug, Clone, Default)]
pub struct Debounce {
    last: Option<u64>,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, now: SystemTime) -> bool {
        let second = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        match self.last {
            Some(last) if second <= last => false,
            _ => {
                self.last = Some(second);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    #[test]
    fn first_trigger_is_accepted() {
        assert!(Debounce::new().accept(at(1_000)));
    }

    #[test]
    fn same_second_triggers_once() {
        let mut d = Debounce::new();
        assert!(d.accept(at(10_100)));
        assert!(!d.accept(at(10_900)));
    }

    #[test]
    fn straddling_a_second_boundary_triggers_twice() {
        let mut d = Debounce::new();
        assert!(d.accept(at(10_900)));
        assert!(d.accept(at(11_050)));
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let mut d = Debounce::new();
        assert!(d.accept(at(20_000)));
        assert!(!d.accept(at(19_000)));
    }
}
