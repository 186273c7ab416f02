#![no_main]

//! Fuzz target for the vote ledger.
//!
//! Replays arbitrary vote sequences against the SQLite store and an in-memory
//! ledger, checking that the two agree and that no voter ever lands in both
//! sets.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use civic_connect::db::Database;
use civic_connect::models::{Location, NewIssue};
use civic_connect::vote::{VoteDirection, VoteLedger};

#[derive(Arbitrary, Debug)]
struct VoteOp {
    /// Index into a small voter pool so toggles and switches happen often
    voter: u8,
    up: bool,
}

#[derive(Arbitrary, Debug)]
struct VoteSequenceInput {
    /// Author name, may be any Unicode
    author: String,
    ops: Vec<VoteOp>,
}

fuzz_target!(|input: VoteSequenceInput| {
    if input.author.trim().is_empty() || input.ops.len() > 200 {
        return;
    }

    let db = match Database::open_in_memory() {
        Ok(d) => d,
        Err(_) => return,
    };

    let new_issue = NewIssue {
        description: "Detected a Low urgency issue: Other.".to_string(),
        category: "Other".to_string(),
        urgency: "Low".to_string(),
        location: Location { lat: 0.0, lng: 0.0 },
        image_url: "http://localhost/uploads/x.jpg".to_string(),
        author: input.author.clone(),
    };
    let id = match db.create_issue(&new_issue) {
        Ok(id) => id,
        Err(_) => return,
    };

    let mut model = VoteLedger::default();
    for op in &input.ops {
        let voter = format!("voter{}", op.voter % 8);
        let direction = if op.up {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        };

        let state = model.apply(&voter, direction);
        let issue = db
            .apply_vote(id, &voter, direction)
            .expect("vote on existing issue")
            .expect("issue exists");

        assert!(issue.votes.is_consistent());
        assert_eq!(issue.votes, model);
        assert_eq!(issue.votes.state_of(&voter), state);
        assert_eq!(issue.author, input.author);
    }
});
