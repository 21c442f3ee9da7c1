use anyhow::Result;
use maci_common::fr_to_decimal;
use maci_test_fixtures::single_vote_poll;
use serde_json::json;

fn main() -> Result<()> {
    let poll = single_vote_poll()?;

    let payload = json!({
        "coordinatorPubKey": poll.coordinator.public,
        "coordinatorPubKeyHash": fr_to_decimal(&poll.coordinator.public.hash()),
        "signups": poll.signups(),
        "messages": poll.messages(),
    });

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
