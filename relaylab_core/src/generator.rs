//! Synthetic message generator.

use crate::config::{NetworkProfile, Protocol};
use crate::message::{Direction, Message, MessageId, MessageStatus, PayloadSizeClass};
use relaylab_env::Entropy;
use std::time::Duration;

/// Probability that a flaky network eats a candidate message before
/// it reaches the backpressure controller.
pub const FLAKY_DROP_CHANCE: f64 = 0.30;

/// What one generator tick produced.
#[derive(Debug, Clone)]
pub enum GeneratorOutcome {
    /// The flaky network dropped the candidate; it never reaches the
    /// backpressure controller
    DroppedFlaky(Message),

    /// A live message, handed to the backpressure controller
    Produced(Message),
}

/// Produces synthetic messages at the configured rate.
pub struct MessageGenerator {
    protocol: Protocol,
    payload: PayloadSizeClass,
    next_id: u64,
    last_event_id: Option<MessageId>,
}

impl MessageGenerator {
    /// Creates a generator for the given protocol and payload class.
    pub fn new(protocol: Protocol, payload: PayloadSizeClass) -> Self {
        Self {
            protocol,
            payload,
            next_id: 0,
            last_event_id: None,
        }
    }

    /// Runs one generation tick.
    ///
    /// The caller is responsible for not ticking while the link is
    /// down; under a flaky network the candidate is dropped with
    /// [`FLAKY_DROP_CHANCE`].
    pub fn tick(
        &mut self,
        network: NetworkProfile,
        entropy: &mut dyn Entropy,
        now: Duration,
    ) -> GeneratorOutcome {
        let id = MessageId(self.next_id);
        self.next_id += 1;

        let mut message = Message::new(id, now, self.payload, self.direction_for(id));

        if network == NetworkProfile::Flaky && entropy.chance(FLAKY_DROP_CHANCE) {
            message.status = MessageStatus::Dropped;
            return GeneratorOutcome::DroppedFlaky(message);
        }

        self.last_event_id = Some(id);
        GeneratorOutcome::Produced(message)
    }

    /// The most recently produced message id (replay continuity anchor).
    pub fn last_event_id(&self) -> Option<MessageId> {
        self.last_event_id
    }

    fn direction_for(&self, id: MessageId) -> Direction {
        match self.protocol {
            Protocol::Sse => Direction::ServerToClient,
            Protocol::LongPolling => Direction::ClientToServer,
            Protocol::WebSocket => {
                if id.0 % 2 == 0 {
                    Direction::ServerToClient
                } else {
                    Direction::ClientToServer
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaylab_env::SeededEntropy;

    fn tick_n(
        generator: &mut MessageGenerator,
        network: NetworkProfile,
        entropy: &mut SeededEntropy,
        n: usize,
    ) -> Vec<GeneratorOutcome> {
        (0..n)
            .map(|i| generator.tick(network, entropy, Duration::from_millis(100 * i as u64)))
            .collect()
    }

    #[test]
    fn test_stable_network_never_drops() {
        let mut generator = MessageGenerator::new(Protocol::WebSocket, PayloadSizeClass::Small);
        let mut entropy = SeededEntropy::new(1);

        for outcome in tick_n(&mut generator, NetworkProfile::Stable, &mut entropy, 200) {
            assert!(matches!(outcome, GeneratorOutcome::Produced(_)));
        }
        assert_eq!(generator.last_event_id(), Some(MessageId(199)));
    }

    #[test]
    fn test_flaky_drop_fraction_near_configured_chance() {
        let mut generator = MessageGenerator::new(Protocol::WebSocket, PayloadSizeClass::Small);
        let mut entropy = SeededEntropy::new(42);

        let dropped = tick_n(&mut generator, NetworkProfile::Flaky, &mut entropy, 1000)
            .iter()
            .filter(|o| matches!(o, GeneratorOutcome::DroppedFlaky(_)))
            .count();

        // 0.30 +/- 5 percentage points at this sample size
        assert!((250..=350).contains(&dropped), "dropped={dropped}");
    }

    #[test]
    fn test_flaky_drop_does_not_advance_last_event_id() {
        let mut generator = MessageGenerator::new(Protocol::Sse, PayloadSizeClass::Small);
        let mut entropy = SeededEntropy::new(42);

        let mut last_produced = None;
        for outcome in tick_n(&mut generator, NetworkProfile::Flaky, &mut entropy, 100) {
            if let GeneratorOutcome::Produced(m) = outcome {
                last_produced = Some(m.id);
            }
        }
        assert_eq!(generator.last_event_id(), last_produced);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut generator = MessageGenerator::new(Protocol::WebSocket, PayloadSizeClass::Medium);
        let mut entropy = SeededEntropy::new(7);

        let mut prev = None;
        for outcome in tick_n(&mut generator, NetworkProfile::Flaky, &mut entropy, 50) {
            let id = match outcome {
                GeneratorOutcome::Produced(m) | GeneratorOutcome::DroppedFlaky(m) => m.id,
            };
            if let Some(p) = prev {
                assert!(id > p);
            }
            prev = Some(id);
        }
    }

    #[test]
    fn test_direction_follows_protocol() {
        let mut entropy = SeededEntropy::new(1);

        let mut sse = MessageGenerator::new(Protocol::Sse, PayloadSizeClass::Small);
        for outcome in tick_n(&mut sse, NetworkProfile::Stable, &mut entropy, 10) {
            let GeneratorOutcome::Produced(m) = outcome else {
                unreachable!()
            };
            assert_eq!(m.direction, Direction::ServerToClient);
        }

        let mut ws = MessageGenerator::new(Protocol::WebSocket, PayloadSizeClass::Small);
        let directions: Vec<Direction> = tick_n(&mut ws, NetworkProfile::Stable, &mut entropy, 4)
            .into_iter()
            .map(|o| match o {
                GeneratorOutcome::Produced(m) => m.direction,
                GeneratorOutcome::DroppedFlaky(_) => unreachable!(),
            })
            .collect();
        assert_eq!(
            directions,
            vec![
                Direction::ServerToClient,
                Direction::ClientToServer,
                Direction::ServerToClient,
                Direction::ClientToServer,
            ]
        );
    }
}
