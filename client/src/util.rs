use itertools::Itertools;
use proto::prelude::{NTMessage, NTTextMessage};
use std::time::{Duration, Instant};

/// Most control messages packed into one TEXT frame
pub static MAX_BATCHING_SIZE: usize = 5;

pub fn batch_messages(messages: Vec<NTTextMessage>, batch_size: usize) -> Vec<NTMessage> {
    messages
        .into_iter()
        .chunks(batch_size)
        .into_iter()
        .map(|batch| NTMessage::Text(batch.collect()))
        .collect()
}

/// Microseconds elapsed between `epoch` and `now`
pub fn micros_since(epoch: Instant, now: Instant) -> u64 {
    let elapsed: Duration = now.saturating_duration_since(epoch);
    elapsed.as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::batch_messages;
    use proto::prelude::{MessageBody, NTMessage, Unsubscribe};

    #[test]
    fn test_batches() {
        let messages = (0..7)
            .map(|subuid| Unsubscribe { subuid }.into_message().unwrap())
            .collect::<Vec<_>>();

        let batches = batch_messages(messages, 5);
        assert_eq!(batches.len(), 2);
        match &batches[1] {
            NTMessage::Text(batch) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
