use halo2curves_axiom::bn256::Fr;
use maci_state::{MessageOutcome, MessageProcessor, ProcessParams, QuinTree};
use maci_test_fixtures::PollFixture;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn proofs_verify_after_any_write_sequence(
        writes in prop::collection::vec((0u64..25, 1u64..1_000), 1..20),
        probe in 0u64..25,
    ) {
        let mut tree = QuinTree::new(2, Fr::from(0u64));
        for (index, value) in &writes {
            tree.insert(*index, Fr::from(*value)).unwrap();
            let proof = tree.proof(*index).unwrap();
            prop_assert!(proof.verify(Fr::from(*value), tree.root()));
        }
        let leaf = tree.leaf(probe);
        prop_assert!(tree.proof(probe).unwrap().verify(leaf, tree.root()));

        let dense: Vec<Fr> = (0..tree.len()).map(|i| tree.leaf(i)).collect();
        prop_assert_eq!(QuinTree::compute_root(2, Fr::from(0u64), &dense).unwrap(), tree.root());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn balance_moves_by_difference_of_squares(old in 0u64..8, new in 0u64..8) {
        let mut poll = PollFixture::with_credits(1, 64);
        // Processed newest first: nonce 1 sets `old`, nonce 2 replaces it with `new`.
        poll.vote(1, 0, new, 2).unwrap();
        poll.vote(1, 0, old, 1).unwrap();

        let params = ProcessParams {
            state_tree_depth: 1,
            message_tree_depth: 1,
            vote_option_tree_depth: 1,
            max_vote_options: 2,
            batch_size: 2,
        };
        let mut processor = MessageProcessor::new(
            params,
            poll.coordinator.clone(),
            &poll.signups(),
            poll.messages(),
        ).unwrap();
        let batches = processor.process_all().unwrap();
        prop_assert!(batches[0].entries.iter().all(|e| e.outcome == MessageOutcome::Applied));

        let expected = 64 - u128::from(old * old) + u128::from(old * old) - u128::from(new * new);
        prop_assert_eq!(processor.state_leaves()[1].voice_credit_balance, expected);
    }
}
