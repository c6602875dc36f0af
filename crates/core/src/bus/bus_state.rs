use tokio::sync::mpsc;

use crate::cue::cue::BLANK_MEDIA;
use crate::publisher::Publisher;

/// Change notifications for one bus mirror. `set_from_cue` always emits
/// all three kinds, even when a value did not change; consumers must be
/// idempotent to redundant notification.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    Position(f64),
    Media(u32),
    Active(bool),
}

/// Runtime mirror of what the remote device believes one bus is doing.
/// Not persisted; owned by the console, sibling to the document.
pub struct BusState {
    media_index: u32,
    pos: f64,
    speed: f64,
    active: bool,
    events: Publisher<BusEvent>,
}

impl BusState {
    pub fn new() -> Self {
        Self {
            media_index: BLANK_MEDIA,
            pos: 0.0,
            speed: 0.0,
            active: false,
            events: Publisher::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BusEvent> {
        self.events.subscribe()
    }

    pub fn media_index(&self) -> u32 {
        self.media_index
    }

    pub fn pos(&self) -> f64 {
        self.pos
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Apply a fired cue's bus entry. Assigning the blank sentinel is a
    /// hard stop: position and speed reset and the bus goes inactive.
    /// Otherwise null fields leave the prior value in place and the bus
    /// becomes active.
    pub fn set_from_cue(&mut self, media_index: Option<u32>, pos: Option<f64>, speed: Option<f64>) {
        if let Some(media_index) = media_index {
            self.media_index = media_index;
        }
        if self.media_index == BLANK_MEDIA {
            self.pos = 0.0;
            self.speed = 0.0;
            self.active = false;
        } else {
            if let Some(pos) = pos {
                self.pos = pos;
            }
            if let Some(speed) = speed {
                self.speed = speed;
            }
            self.active = true;
        }
        self.events.publish(BusEvent::Position(self.pos));
        self.events.publish(BusEvent::Media(self.media_index));
        self.events.publish(BusEvent::Active(self.active));
    }

    /// Position update from telemetry or an operator scrub. Ignored
    /// while inactive: reports for a stopped bus are stale.
    pub fn set_pos(&mut self, pos: f64) {
        if !self.active {
            return;
        }
        self.pos = pos;
        self.events.publish(BusEvent::Position(pos));
    }
}

impl Default for BusState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_media_clears_the_bus() {
        let mut bus = BusState::new();
        bus.set_from_cue(Some(3), Some(40.0), Some(1.0));
        assert!(bus.active());

        bus.set_from_cue(Some(BLANK_MEDIA), Some(99.0), Some(2.0));
        assert_eq!(bus.pos(), 0.0);
        assert_eq!(bus.speed(), 0.0);
        assert!(!bus.active());
    }

    #[test]
    fn null_fields_keep_prior_values() {
        let mut bus = BusState::new();
        bus.set_from_cue(Some(2), Some(25.0), Some(1.0));
        bus.set_from_cue(None, None, Some(-0.5));

        assert_eq!(bus.media_index(), 2);
        assert_eq!(bus.pos(), 25.0);
        assert_eq!(bus.speed(), -0.5);
        assert!(bus.active());
    }

    #[test]
    fn inactive_bus_ignores_position_updates() {
        let mut bus = BusState::new();
        bus.set_pos(42.0);
        assert_eq!(bus.pos(), 0.0);
    }

    #[test]
    fn active_bus_accepts_position_updates() {
        let mut bus = BusState::new();
        bus.set_from_cue(Some(1), Some(0.0), Some(1.0));
        bus.set_pos(42.0);
        assert_eq!(bus.pos(), 42.0);
    }

    #[test]
    fn set_from_cue_always_notifies_all_three_kinds() {
        let mut bus = BusState::new();
        let mut rx = bus.subscribe();

        // Values do not change, notifications still fire.
        bus.set_from_cue(None, None, None);

        assert_eq!(rx.try_recv(), Ok(BusEvent::Position(0.0)));
        assert_eq!(rx.try_recv(), Ok(BusEvent::Media(BLANK_MEDIA)));
        assert_eq!(rx.try_recv(), Ok(BusEvent::Active(false)));
    }
}
