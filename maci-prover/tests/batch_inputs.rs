use async_trait::async_trait;
use halo2curves_axiom::{bn256::Fr, ff::Field};
use maci_common::{fr_from_decimal, fr_to_decimal};
use maci_prover::{
    chain_process_inputs, chain_tally_inputs, compute_public_input_hash, process_packed_vals,
    prove_checked, Circuit, GeneratedProof, Groth16Proof, ProcessContext, ProofGenerator,
    ProverError, TallyCommitmentMode, TallyContext,
};
use maci_state::{compute_tally, sb_commitment, MessageProcessor, ProcessParams, TallySalts};
use maci_test_fixtures::PollFixture;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn params() -> ProcessParams {
    ProcessParams {
        state_tree_depth: 2,
        message_tree_depth: 2,
        vote_option_tree_depth: 1,
        max_vote_options: 3,
        batch_size: 2,
    }
}

/// Three messages from two voters, split over two batches.
fn three_message_poll() -> PollFixture {
    let mut poll = PollFixture::new(2);
    poll.vote(1, 0, 3, 1).unwrap();
    poll.vote(2, 1, 2, 1).unwrap();
    poll.vote(1, 2, 1, 2).unwrap();
    poll
}

#[test]
fn process_salts_chain_across_batches() {
    let poll = three_message_poll();
    let params = params();
    let mut processor =
        MessageProcessor::new(params, poll.coordinator.clone(), &poll.signups(), poll.messages())
            .unwrap();
    let batches = processor.process_all().unwrap();
    assert_eq!(batches.len(), 2);

    let ctx = ProcessContext {
        coordinator: &poll.coordinator,
        params: &params,
        num_signups: processor.num_signups(),
        num_messages: processor.num_messages(),
        poll_end_timestamp: 1_800_000_000,
    };
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let (inputs, final_salt) = chain_process_inputs(&batches, &ctx, &mut rng).unwrap();

    assert_eq!(inputs[0].input.current_state_commitment_salt, "0");
    assert_eq!(
        inputs[1].input.current_state_commitment_salt,
        inputs[0].input.new_state_commitment_salt
    );
    assert_eq!(
        inputs[1].current_state_commitment,
        inputs[0].new_state_commitment
    );
    assert_eq!(
        fr_to_decimal(&final_salt),
        inputs[1].input.new_state_commitment_salt
    );

    let last = batches.last().unwrap();
    assert_eq!(
        inputs[1].new_state_commitment,
        sb_commitment(last.post_roots.state, last.post_roots.ballot, final_salt)
    );
    assert_eq!(last.post_roots.state, processor.roots().state);

    for (input, batch) in inputs.iter().zip(&batches) {
        assert_eq!(input.input.messages.len(), params.batch_size);
        assert_eq!(input.input.state_leaves.len(), params.batch_size);
        assert_eq!(
            input.input.input_state_root,
            fr_to_decimal(&batch.pre_roots.state)
        );
        assert_eq!(
            input.input.output_ballot_root,
            fr_to_decimal(&batch.post_roots.ballot)
        );
        let expected = compute_public_input_hash(&[
            process_packed_vals(
                params.max_vote_options,
                processor.num_signups(),
                batch.batch_start_index,
                batch.batch_end_index,
            ),
            poll.coordinator.public.hash(),
            batch.pre_roots.message,
            input.current_state_commitment,
            input.new_state_commitment,
            Fr::from(1_800_000_000u64),
        ]);
        assert_eq!(input.input_hash, expected);
        assert_eq!(input.input.input_hash, fr_to_decimal(&expected));
    }
}

#[test]
fn process_input_serializes_with_circuit_signal_names() {
    let poll = three_message_poll();
    let params = params();
    let mut processor =
        MessageProcessor::new(params, poll.coordinator.clone(), &poll.signups(), poll.messages())
            .unwrap();
    let batches = processor.process_all().unwrap();
    let ctx = ProcessContext {
        coordinator: &poll.coordinator,
        params: &params,
        num_signups: processor.num_signups(),
        num_messages: processor.num_messages(),
        poll_end_timestamp: 0,
    };
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let (inputs, _) = chain_process_inputs(&batches, &ctx, &mut rng).unwrap();
    let value = serde_json::to_value(&inputs[0].input).unwrap();

    for key in [
        "inputHash",
        "packedVals",
        "coordPubKeyHash",
        "msgPathElements",
        "currentVoteWeightsPathIndices",
        "encPubKeys",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["messages"][0].as_array().unwrap().len(), 10);
    assert_eq!(value["stateLeaves"][0].as_array().unwrap().len(), 4);
}

#[test]
fn tally_commitments_chain_and_zeroed_mode_blanks_inputs() {
    let poll = three_message_poll();
    let params = params();
    let mut processor =
        MessageProcessor::new(params, poll.coordinator.clone(), &poll.signups(), poll.messages())
            .unwrap();
    processor.process_all().unwrap();
    // Five ballots per batch over a 25-leaf ballot tree; three signups fit
    // into the first batch only.
    let tally = compute_tally(&processor, 5).unwrap();
    let roots = processor.roots();
    let sb_salt = Fr::from(99u64);

    let derived = TallyContext {
        params: &params,
        num_signups: processor.num_signups(),
        state_root: roots.state,
        ballot_root: roots.ballot,
        sb_salt,
        mode: TallyCommitmentMode::Derived,
    };
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let (inputs, final_salts) = chain_tally_inputs(&tally, &derived, &mut rng).unwrap();
    assert_eq!(inputs.len(), tally.batches.len());
    assert_eq!(inputs[0].current_tally_commitment, Fr::ZERO);
    assert_eq!(
        inputs[0].input.sb_commitment,
        fr_to_decimal(&sb_commitment(roots.state, roots.ballot, sb_salt))
    );
    let last = inputs.last().unwrap();
    assert_eq!(
        last.new_tally_commitment,
        tally.result.commitment(params.vote_option_tree_depth, &final_salts).unwrap()
    );

    let zeroed = TallyContext {
        mode: TallyCommitmentMode::Zeroed,
        ..derived
    };
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let (blank, _) = chain_tally_inputs(&tally, &zeroed, &mut rng).unwrap();
    assert_eq!(blank[0].input.sb_commitment, "0");
    assert_eq!(blank[0].input.current_tally_commitment, "0");
    assert_eq!(blank[0].new_tally_commitment, inputs[0].new_tally_commitment);
    assert_ne!(blank[0].input_hash, inputs[0].input_hash);
    assert_eq!(blank[0].input.current_results_root_salt, fr_to_decimal(&TallySalts::default().results));
}

struct EchoProver {
    signal: String,
}

#[async_trait]
impl ProofGenerator for EchoProver {
    async fn generate(
        &self,
        _circuit: Circuit,
        _input: &serde_json::Value,
    ) -> Result<GeneratedProof, ProverError> {
        Ok(GeneratedProof {
            proof: Groth16Proof {
                pi_a: vec!["1".into(), "2".into(), "1".into()],
                pi_b: vec![vec!["3".into(), "4".into()], vec!["5".into(), "6".into()]],
                pi_c: vec!["7".into(), "8".into(), "1".into()],
                protocol: "groth16".into(),
                curve: "bn128".into(),
            },
            public_signals: vec![self.signal.clone()],
        })
    }
}

#[tokio::test]
async fn prove_checked_rejects_foreign_digest() {
    let expected = fr_from_decimal("12345").unwrap();
    let good = EchoProver {
        signal: "12345".into(),
    };
    let proof = prove_checked(&good, Circuit::ProcessMessages, &serde_json::json!({}), expected)
        .await
        .unwrap();
    assert_eq!(proof.public_signals, vec!["12345".to_string()]);

    let bad = EchoProver {
        signal: "54321".into(),
    };
    let err = prove_checked(&bad, Circuit::TallyVotes, &serde_json::json!({}), expected)
        .await
        .unwrap_err();
    assert!(matches!(err, ProverError::PublicSignalMismatch { .. }));
}
