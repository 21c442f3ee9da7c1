//! Projection of ledger event logs onto processor inputs.

use ethers::types::U256;
use halo2curves_axiom::bn256::Fr;
use maci_common::{fr_from_bytes, EncryptedMessage, PubKey, StateLeaf, MESSAGE_DATA_LEN};
use tracing::debug;

use crate::{
    error::{CoordinatorError, LedgerError},
    ledger::{Ledger, MessagePublishedEvent, PollAddresses, SignUpEvent},
};

/// Sign-ups ordered by state index.
pub async fn fetch_signups<L: Ledger + ?Sized>(
    ledger: &L,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<StateLeaf>, CoordinatorError> {
    let events = ledger.sign_up_events(from_block, to_block).await?;
    debug!(count = events.len(), from_block, to_block, "fetched sign-ups");
    signups_from_events(events)
}

/// Published messages ordered by message index.
pub async fn fetch_messages<L: Ledger + ?Sized>(
    ledger: &L,
    poll: &PollAddresses,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<EncryptedMessage>, CoordinatorError> {
    let events = ledger.message_events(poll, from_block, to_block).await?;
    debug!(
        poll_id = poll.poll_id,
        count = events.len(),
        from_block,
        to_block,
        "fetched messages"
    );
    messages_from_events(events)
}

/// Leaves are placed by position, so the state indices must run 1..=N
/// without gaps. A `start_block` past the first sign-up breaks that.
pub fn signups_from_events(
    mut events: Vec<SignUpEvent>,
) -> Result<Vec<StateLeaf>, CoordinatorError> {
    events.sort_by_key(|event| event.state_index);
    events
        .iter()
        .enumerate()
        .map(|(position, event)| {
            let expected = U256::from(position as u64 + 1);
            if event.state_index != expected {
                return Err(LedgerError::Decode(format!(
                    "sign-up with state index {} found where {expected} was expected",
                    event.state_index
                ))
                .into());
            }
            let pub_key = PubKey::new(to_fr(event.pub_key_x)?, to_fr(event.pub_key_y)?);
            Ok(StateLeaf::new(
                pub_key,
                to_u128("voiceCreditBalance", event.voice_credit_balance)?,
                to_u64("timestamp", event.timestamp)?,
            ))
        })
        .collect()
}

pub fn messages_from_events(
    mut events: Vec<MessagePublishedEvent>,
) -> Result<Vec<EncryptedMessage>, CoordinatorError> {
    events.sort_by_key(|event| event.message_index);
    events
        .iter()
        .map(|event| {
            let mut data = [Fr::from(0u64); MESSAGE_DATA_LEN];
            for (slot, word) in data.iter_mut().zip(event.enc_message) {
                *slot = to_fr(word)?;
            }
            let enc_pub_key = PubKey::new(to_fr(event.enc_pub_key_x)?, to_fr(event.enc_pub_key_y)?);
            Ok(EncryptedMessage::new(
                data,
                enc_pub_key,
                to_u64("messageIndex", event.message_index)?,
            ))
        })
        .collect()
}

/// Canonical field element; values at or above the modulus are rejected.
pub fn to_fr(word: U256) -> Result<Fr, CoordinatorError> {
    let mut bytes = [0u8; 32];
    word.to_little_endian(&mut bytes);
    Ok(fr_from_bytes(&bytes)?)
}

pub fn from_fr(value: &Fr) -> U256 {
    U256::from_little_endian(&maci_common::fr_to_bytes(value))
}

fn to_u64(what: &str, word: U256) -> Result<u64, CoordinatorError> {
    if word > U256::from(u64::MAX) {
        return Err(LedgerError::Decode(format!("{what} {word} does not fit in u64")).into());
    }
    Ok(word.as_u64())
}

fn to_u128(what: &str, word: U256) -> Result<u128, CoordinatorError> {
    if word > U256::from(u128::MAX) {
        return Err(LedgerError::Decode(format!("{what} {word} does not fit in u128")).into());
    }
    Ok(word.as_u128())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maci_test_fixtures::PollFixture;

    fn signup_event(index: u64, leaf: &StateLeaf) -> SignUpEvent {
        SignUpEvent {
            state_index: U256::from(index),
            pub_key_x: from_fr(&leaf.pub_key.x()),
            pub_key_y: from_fr(&leaf.pub_key.y()),
            voice_credit_balance: U256::from(leaf.voice_credit_balance),
            timestamp: U256::from(leaf.timestamp),
        }
    }

    fn message_event(message: &EncryptedMessage) -> MessagePublishedEvent {
        let mut enc_message = [U256::zero(); 10];
        for (word, value) in enc_message.iter_mut().zip(message.data.iter()) {
            *word = from_fr(value);
        }
        MessagePublishedEvent {
            message_index: U256::from(message.message_index),
            enc_message,
            enc_pub_key_x: from_fr(&message.enc_pub_key.x()),
            enc_pub_key_y: from_fr(&message.enc_pub_key.y()),
        }
    }

    #[test]
    fn orders_signups_by_state_index() {
        let poll = PollFixture::new(3);
        let leaves = poll.signups();
        let events = vec![
            signup_event(3, &leaves[2]),
            signup_event(1, &leaves[0]),
            signup_event(2, &leaves[1]),
        ];
        assert_eq!(signups_from_events(events).unwrap(), leaves);
    }

    #[test]
    fn rejects_sign_up_gaps() {
        let poll = PollFixture::new(3);
        let leaves = poll.signups();

        let missing_first = vec![signup_event(2, &leaves[1]), signup_event(3, &leaves[2])];
        assert!(matches!(
            signups_from_events(missing_first),
            Err(CoordinatorError::Ledger(LedgerError::Decode(_)))
        ));

        let hole = vec![signup_event(1, &leaves[0]), signup_event(3, &leaves[2])];
        assert!(matches!(
            signups_from_events(hole),
            Err(CoordinatorError::Ledger(LedgerError::Decode(_)))
        ));

        let duplicate = vec![signup_event(1, &leaves[0]), signup_event(1, &leaves[1])];
        assert!(signups_from_events(duplicate).is_err());
    }

    #[test]
    fn orders_messages_by_message_index() {
        let mut poll = PollFixture::new(2);
        poll.vote(1, 0, 1, 1).unwrap();
        poll.vote(2, 1, 2, 1).unwrap();
        poll.vote(1, 2, 3, 2).unwrap();
        let mut events: Vec<_> = poll.messages().iter().map(message_event).collect();
        events.reverse();
        let messages = messages_from_events(events).unwrap();
        assert_eq!(messages, poll.messages().to_vec());
    }

    #[test]
    fn rejects_values_outside_the_field() {
        assert!(to_fr(U256::MAX).is_err());
        let leaf = PollFixture::new(1).signups()[0];
        let mut event = signup_event(1, &leaf);
        event.voice_credit_balance = U256::MAX;
        assert!(matches!(
            signups_from_events(vec![event]),
            Err(CoordinatorError::Ledger(LedgerError::Decode(_)))
        ));
    }

    #[test]
    fn field_words_round_trip() {
        let value = Fr::from(123_456_789u64);
        assert_eq!(to_fr(from_fr(&value)).unwrap(), value);
        assert_eq!(from_fr(&value), U256::from(123_456_789u64));
    }
}
