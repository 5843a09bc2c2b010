use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-fingerprint in-flight guard. Concurrent identical previews queue on
/// one async mutex so only the first pays for the model call; a cancelled
/// holder releases the slot when its guard drops.
#[derive(Default)]
pub struct SingleFlight {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SingleFlight {
    pub fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the registry entry once no other preview holds it.
    pub fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            // One reference in the map, one held by the caller.
            if Arc::strong_count(slot) <= 2 {
                slots.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_keys_share_one_slot() {
        let flight = SingleFlight::default();
        let a = flight.slot("fp");
        let b = flight.slot("fp");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(flight.len(), 1);
    }

    #[tokio::test]
    async fn release_clears_the_slot_when_unused() {
        let flight = SingleFlight::default();
        let slot = flight.slot("fp");
        {
            let _guard = slot.lock().await;
        }
        flight.release("fp");
        drop(slot);
        // A second release after the holder dropped removes the entry.
        flight.release("fp");
        assert_eq!(flight.len(), 0);
    }

    #[tokio::test]
    async fn second_caller_waits_for_the_first() {
        let flight = Arc::new(SingleFlight::default());
        let slot = flight.slot("fp");
        let guard = slot.lock().await;

        let flight_two = flight.clone();
        let waiter = tokio::spawn(async move {
            let slot = flight_two.slot("fp");
            let _guard = slot.lock().await;
            true
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        assert!(waiter.await.unwrap());
    }
}
