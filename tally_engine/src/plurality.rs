// Counting for ONE_CHOICE and MULTIPLE_CHOICE questions.

use log::{debug, info};

use crate::config::*;
use crate::CountOutput;

/// Each ballot adds its weight to every answer it selects. The answers with
/// the highest sums win; equal sums are ordered by declaration order.
pub(crate) fn count(question: &Question, ballots: &[AggregatedBallot]) -> CountOutput {
    let num_answers = question.answers.len();
    let seats = question.num_seats as usize;
    let mut counts: Vec<u64> = vec![0; num_answers];
    let mut counted: u64 = 0;
    for b in ballots.iter().filter(|b| !b.choices.is_empty()) {
        counted += b.weight;
        for cid in b.choices.iter() {
            if let Some(c) = counts.get_mut(cid.index()) {
                *c += b.weight;
            }
        }
    }
    debug!("plurality count: counts: {:?}", counts);

    // Answers without any vote never win.
    let mut ranking: Vec<usize> = (0..num_answers).filter(|idx| counts[*idx] > 0).collect();
    ranking.sort_by(|a, b| counts[*b].cmp(&counts[*a]).then(a.cmp(b)));
    let tie_break = ranking.len() > seats && counts[ranking[seats - 1]] == counts[ranking[seats]];
    ranking.truncate(seats);
    info!(
        "plurality count: {} ballots counted, winners {:?}, tie break: {}",
        counted, ranking, tie_break
    );

    let tally: Vec<CandidateTally> = question
        .answers
        .iter()
        .zip(counts.iter())
        .enumerate()
        .map(|(idx, (a, c))| CandidateTally {
            name: a.value.clone(),
            value: VoteValue::whole(*c),
            status: if ranking.contains(&idx) {
                CandidateStatus::Elected
            } else {
                CandidateStatus::Eliminated
            },
        })
        .collect();
    let round = RoundStats {
        round: 1,
        tally,
        exhausted: VoteValue::whole(0),
        elected: ranking
            .iter()
            .map(|idx| question.answers[*idx].value.clone())
            .collect(),
        eliminated: Vec::new(),
        tie_break,
        surplus_iterations: 0,
    };

    CountOutput {
        winners: ranking.iter().map(|idx| AnswerId((idx + 1) as u32)).collect(),
        final_values: counts.iter().map(|c| VoteValue::whole(*c)).collect(),
        quota: None,
        rounds: vec![round],
        counted,
    }
}
