mod aggregate;
mod codec;
mod config;
mod delegation;
mod plurality;
mod report;
mod stv;

pub mod builder;
pub mod manual;

use log::info;

pub use crate::aggregate::{aggregate, aggregate_weighted, BallotAggregator, EncodedBallots};
pub use crate::codec::{read_blt, write_blt, BallotCodec, BltElection, DirtyReason};
pub use crate::config::*;
pub use crate::delegation::{resolve, DelegationResolver};

// What a counting method hands over to the report.
#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) struct CountOutput {
    // In seat order.
    pub(crate) winners: Vec<AnswerId>,
    // Final value of every answer, in declaration order.
    pub(crate) final_values: Vec<VoteValue>,
    pub(crate) quota: Option<VoteValue>,
    pub(crate) rounds: Vec<RoundStats>,
    // Weight of the ballots that took part in the count.
    pub(crate) counted: u64,
}

/// Counts the aggregated ballots of a question with the given rules.
///
/// Arguments:
/// * `question` the question being counted. It is validated first.
/// * `ballots` the aggregated ballots, with answer ids in declaration order
/// * `ballots_read` the number of effective ballots read for this question.
/// Those that are not part of `ballots` are reported as dirty.
/// * `rules` the rules for STV questions. They are ignored by the other tally types.
pub fn run_tally(
    question: &Question,
    ballots: &[AggregatedBallot],
    ballots_read: u64,
    rules: &VoteRules,
) -> Result<TallyResult, VotingErrors> {
    question.validate()?;
    info!(
        "Counting question {:?} ({}), {} seats, {} distinct ballots",
        question.question,
        question.tally_type.tag(),
        question.num_seats,
        ballots.len()
    );
    let out = match question.tally_type {
        TallyType::OneChoice | TallyType::MultipleChoice => plurality::count(question, ballots),
        TallyType::Stv => stv::count(question, ballots, rules)?,
    };
    let res = report::build(question, out, ballots_read);
    info!(
        "Question {:?}: winners {:?}, {} votes, {} dirty",
        res.question, res.winners, res.total_votes, res.dirty_votes
    );
    Ok(res)
}

/// Resolves the delegations and encodes the ballots of one question.
pub fn prepare_ballots(
    raw_votes: &[RawVote],
    question: &Question,
    question_index: usize,
    as_of: Option<Timestamp>,
) -> EncodedBallots {
    let effective = resolve(raw_votes, question_index, as_of);
    let codec = BallotCodec::new(question);
    aggregate(&codec, &effective)
}

/// Runs the full pipeline for the question at `question_index`.
pub fn tally_question(
    questions: &[Question],
    raw_votes: &[RawVote],
    question_index: usize,
    as_of: Option<Timestamp>,
    rules: &VoteRules,
) -> Result<TallyResult, VotingErrors> {
    let question = questions
        .get(question_index)
        .ok_or(VotingErrors::UnknownQuestion(question_index))?;
    let prepared = prepare_ballots(raw_votes, question, question_index, as_of);
    run_tally(question, &prepared.ballots, prepared.read, rules)
}

/// Runs the full pipeline for every question, in order.
pub fn tally_election(
    questions: &[Question],
    raw_votes: &[RawVote],
    as_of: Option<Timestamp>,
    rules: &VoteRules,
) -> Result<Vec<TallyResult>, VotingErrors> {
    (0..questions.len())
        .map(|idx| tally_question(questions, raw_votes, idx, as_of, rules))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElectionBuilder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn question(tally_type: TallyType, values: &[&str], seats: u32) -> Question {
        Question {
            question: "Q".to_string(),
            tally_type,
            min: 0,
            max: if tally_type == TallyType::OneChoice {
                1
            } else {
                values.len() as u32
            },
            num_seats: seats,
            answers: values.iter().map(|v| Answer::new(v)).collect(),
        }
    }

    #[test]
    fn stv_three_candidates() {
        init();
        let mut b = ElectionBuilder::new(&[question(TallyType::Stv, &["A", "B", "C"], 1)]).unwrap();
        b.add_vote_simple("v1", &["A", "B"]).unwrap();
        b.add_vote_simple("v2", &["A", "B"]).unwrap();
        b.add_vote_simple("v3", &["B", "A"]).unwrap();
        b.add_vote_simple("v4", &["B", "A"]).unwrap();
        b.add_vote_simple("v5", &["C"]).unwrap();
        let res = b.tally(0).unwrap();
        assert_eq!(res.winners, vec!["A".to_string()]);
        assert_eq!(res.total_votes, 5);
        assert_eq!(res.dirty_votes, 0);
        assert_eq!(res.answers[0].seat_number, 1);
        assert_eq!(res.quota.unwrap().floor(), 3);
    }

    #[test]
    fn one_choice_scenario() {
        init();
        let mut b =
            ElectionBuilder::new(&[question(TallyType::OneChoice, &["A", "B"], 1)]).unwrap();
        for i in 0..3 {
            b.add_vote_simple(&format!("a{}", i), &["A"]).unwrap();
        }
        for i in 0..5 {
            b.add_vote_simple(&format!("b{}", i), &["B"]).unwrap();
        }
        let res = b.tally(0).unwrap();
        assert_eq!(res.winners, vec!["B".to_string()]);
        assert_eq!(res.total_votes, 8);
        assert_eq!(res.dirty_votes, 0);
        assert_eq!(res.answers[1].total_count, VoteValue::whole(5));
    }

    #[test]
    fn unknown_answer_is_dirty() {
        let mut b =
            ElectionBuilder::new(&[question(TallyType::OneChoice, &["A", "B"], 1)]).unwrap();
        b.add_vote_simple("v1", &["A"]).unwrap();
        b.add_vote_simple("v2", &["B"]).unwrap();
        b.add_vote_simple("v3", &["B"]).unwrap();
        let before = b.tally(0).unwrap();
        b.add_vote_simple("v4", &["Z"]).unwrap();
        let after = b.tally(0).unwrap();
        assert_eq!(after.dirty_votes, before.dirty_votes + 1);
        assert_eq!(after.total_votes, before.total_votes);
        assert_eq!(after.winners, before.winners);
    }

    #[test]
    fn deterministic_results() {
        let q = question(TallyType::Stv, &["A", "B", "C", "D"], 2);
        let mut b = ElectionBuilder::new(&[q]).unwrap();
        b.add_vote_simple("v1", &["A", "C"]).unwrap();
        b.add_vote_simple("v2", &["D", "B"]).unwrap();
        b.add_vote_simple("v3", &["C", "A", "B"]).unwrap();
        b.add_vote_simple("v4", &["B"]).unwrap();
        b.add_vote_simple("v5", &["A"]).unwrap();
        b.add_delegation("v6", "v3").unwrap();
        let first = b.tally(0).unwrap();
        for _ in 0..3 {
            assert_eq!(b.tally(0).unwrap(), first);
        }
        // Input order does not matter.
        let mut reversed = b.raw_votes().to_vec();
        reversed.reverse();
        let res =
            tally_question(b.questions(), &reversed, 0, None, &VoteRules::DEFAULT_RULES).unwrap();
        assert_eq!(res, first);
    }

    #[test]
    fn delegated_votes_are_counted() {
        let mut b =
            ElectionBuilder::new(&[question(TallyType::OneChoice, &["A", "B"], 1)]).unwrap();
        b.add_vote_simple("alice", &["A"]).unwrap();
        b.add_vote_simple("bob", &["B"]).unwrap();
        b.add_delegation("carol", "alice").unwrap();
        b.add_delegation("dave", "carol").unwrap();
        b.add_delegation("erin", "frank").unwrap();
        b.add_delegation("frank", "erin").unwrap();
        let res = b.tally(0).unwrap();
        assert_eq!(res.winners, vec!["A".to_string()]);
        assert_eq!(res.total_votes, 4);
        assert_eq!(res.dirty_votes, 2);
    }

    #[test]
    fn unknown_question_index() {
        let q = question(TallyType::OneChoice, &["A", "B"], 1);
        let res = tally_question(&[q], &[], 1, None, &VoteRules::DEFAULT_RULES);
        assert_eq!(res, Err(VotingErrors::UnknownQuestion(1)));
    }

    #[test]
    fn invalid_question_is_rejected() {
        let q = question(TallyType::Stv, &["A", "B"], 3);
        let res = run_tally(&q, &[], 0, &VoteRules::DEFAULT_RULES);
        assert!(matches!(res, Err(VotingErrors::InvalidQuestion { .. })));
    }

    #[test]
    fn blt_artifact_gives_the_same_result() {
        let q = question(TallyType::Stv, &["A", "B", "C"], 1);
        let mut b = ElectionBuilder::new(&[q.clone()]).unwrap();
        b.add_vote_simple("v1", &["A", "B"]).unwrap();
        b.add_vote_simple("v2", &["B", "A"]).unwrap();
        b.add_vote_simple("v3", &["B"]).unwrap();
        b.add_vote_simple("v4", &["C", "A"]).unwrap();
        let prepared = prepare_ballots(b.raw_votes(), &q, 0, None);
        let blt = write_blt(&q, &prepared.ballots);
        let election = read_blt(&blt).unwrap();
        assert_eq!(election.ballots, prepared.ballots);
        let direct =
            run_tally(&q, &prepared.ballots, prepared.read, &VoteRules::DEFAULT_RULES).unwrap();
        let from_file = run_tally(
            &election.to_question(),
            &election.ballots,
            election.total_weight(),
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(direct.winners, from_file.winners);
        assert_eq!(direct.rounds, from_file.rounds);
    }

    #[test]
    fn election_counts_every_question() {
        let questions = vec![
            question(TallyType::OneChoice, &["yes", "no"], 1),
            question(TallyType::MultipleChoice, &["X", "Y", "Z"], 2),
        ];
        let mut b = ElectionBuilder::new(&questions).unwrap();
        b.add_vote("v1", &[&["yes"], &["X", "Y"]]).unwrap();
        b.add_vote("v2", &[&["no"], &["Y"]]).unwrap();
        b.add_vote("v3", &[&["yes"]]).unwrap();
        let res =
            tally_election(b.questions(), b.raw_votes(), None, &VoteRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].winners, vec!["yes".to_string()]);
        assert_eq!(res[1].winners, vec!["Y".to_string(), "X".to_string()]);
        // v3 has no entry for the second question: a blank ballot.
        assert_eq!(res[1].dirty_votes, 1);
    }
}
