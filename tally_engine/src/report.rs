use log::debug;

use crate::config::*;
use crate::CountOutput;

/// Assembles the result of a question from the output of a count.
///
/// `read` is the number of effective ballots read for the question. The ones
/// that did not make it to the count are reported as dirty.
pub(crate) fn build(question: &Question, out: CountOutput, read: u64) -> TallyResult {
    let seat_of = |idx: usize| -> u32 {
        out.winners
            .iter()
            .position(|w| w.index() == idx)
            .map(|pos| pos as u32 + 1)
            .unwrap_or(0)
    };
    let answers: Vec<AnswerResult> = question
        .answers
        .iter()
        .enumerate()
        .map(|(idx, a)| {
            let seat_number = seat_of(idx);
            AnswerResult {
                value: a.value.clone(),
                elected: seat_number > 0,
                seat_number,
                total_count: out
                    .final_values
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| VoteValue::whole(0)),
            }
        })
        .collect();
    let winners: Vec<String> = out
        .winners
        .iter()
        .filter_map(|w| question.answers.get(w.index()))
        .map(|a| a.value.clone())
        .collect();
    debug!("build: question {:?}: winners {:?}", question.question, winners);
    TallyResult {
        question: question.question.clone(),
        tally_type: question.tally_type,
        num_seats: question.num_seats,
        total_votes: out.counted,
        dirty_votes: read.saturating_sub(out.counted),
        winners,
        answers,
        quota: out.quota,
        rounds: out.rounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seats_follow_winner_order() {
        let q = Question {
            question: "Q".to_string(),
            tally_type: TallyType::Stv,
            min: 0,
            max: 3,
            num_seats: 2,
            answers: vec![Answer::new("A"), Answer::new("B"), Answer::new("C")],
        };
        let out = CountOutput {
            winners: vec![AnswerId(3), AnswerId(1)],
            final_values: vec![VoteValue::whole(4), VoteValue::whole(1), VoteValue::whole(5)],
            quota: Some(VoteValue::whole(4)),
            rounds: Vec::new(),
            counted: 10,
        };
        let res = build(&q, out, 12);
        assert_eq!(res.winners, vec!["C".to_string(), "A".to_string()]);
        assert_eq!(res.dirty_votes, 2);
        assert_eq!(res.total_votes, 10);
        let seats: Vec<u32> = res.answers.iter().map(|a| a.seat_number).collect();
        assert_eq!(seats, vec![2, 0, 1]);
        assert!(!res.answers[1].elected);
        assert_eq!(res.answers[2].total_count, VoteValue::whole(5));
    }
}
