// Lock-free channel for transport notifications

use crate::messaging::events::TransportEvent;
use ringbuf::{HeapRb, traits::Split};

pub type EventProducer = ringbuf::HeapProd<TransportEvent>;
pub type EventConsumer = ringbuf::HeapCons<TransportEvent>;

pub fn create_event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let rb = HeapRb::<TransportEvent>::new(capacity.max(1));
    rb.split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (mut tx, mut rx) = create_event_channel(4);
        for i in 0..3 {
            let event = TransportEvent::Loop { time: i as f64 };
            assert!(ringbuf::traits::Producer::try_push(&mut tx, event).is_ok());
        }
        let mut times = Vec::new();
        while let Some(event) = ringbuf::traits::Consumer::try_pop(&mut rx) {
            times.push(event.time());
        }
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_full_channel_rejects() {
        let (mut tx, _rx) = create_event_channel(1);
        let event = TransportEvent::Stop { time: 0.0 };
        assert!(ringbuf::traits::Producer::try_push(&mut tx, event).is_ok());
        assert!(ringbuf::traits::Producer::try_push(&mut tx, event).is_err());
    }
}
