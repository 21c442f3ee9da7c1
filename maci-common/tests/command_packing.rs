use maci_common::{PackedCommand, PACKED_FIELD_BITS};
use proptest::prelude::*;

const MAX: u64 = (1 << PACKED_FIELD_BITS) - 1;

proptest! {
    #[test]
    fn unpack_inverts_pack(
        nonce in 0..=MAX,
        state_index in 0..=MAX,
        vote_option_index in 0..=MAX,
        new_vote_weight in 0..=MAX,
        poll_id in 0..=MAX,
    ) {
        let command = PackedCommand { nonce, state_index, vote_option_index, new_vote_weight, poll_id };
        prop_assert_eq!(PackedCommand::unpack(&command.pack()), command);
    }

    #[test]
    fn oversized_fields_are_masked(nonce in (MAX + 1)..u64::MAX) {
        let packed = PackedCommand { nonce, ..Default::default() }.pack();
        let unpacked = PackedCommand::unpack(&packed);
        prop_assert_eq!(unpacked.nonce, nonce & MAX);
        prop_assert_eq!(unpacked.state_index, 0);
    }
}
