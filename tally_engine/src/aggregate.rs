use log::{debug, info, warn};
use std::collections::HashMap;

use crate::codec::{BallotCodec, DirtyReason};
use crate::config::*;

/// Groups identical ballots, keyed by their ordered choices.
#[derive(Debug, Clone, Default)]
pub struct BallotAggregator {
    index: HashMap<Vec<AnswerId>, usize>,
    ballots: Vec<AggregatedBallot>,
}

impl BallotAggregator {
    pub fn new() -> BallotAggregator {
        BallotAggregator::default()
    }

    pub fn add(&mut self, choices: Vec<AnswerId>, weight: u64) {
        if weight == 0 {
            return;
        }
        match self.index.get(&choices) {
            Some(&idx) => self.ballots[idx].weight += weight,
            None => {
                self.index.insert(choices.clone(), self.ballots.len());
                self.ballots.push(AggregatedBallot { weight, choices });
            }
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.ballots.iter().map(|b| b.weight).sum()
    }

    /// The distinct ballots, sorted by choices.
    pub fn finish(self) -> Vec<AggregatedBallot> {
        let mut res = self.ballots;
        res.sort_by(|a, b| a.choices.cmp(&b.choices));
        res
    }
}

/// Merges ballots that already carry a weight.
pub fn aggregate_weighted<I>(ballots: I) -> Vec<AggregatedBallot>
where
    I: IntoIterator<Item = AggregatedBallot>,
{
    let mut agg = BallotAggregator::new();
    for b in ballots {
        agg.add(b.choices, b.weight);
    }
    agg.finish()
}

/// The ballots of a question, ready to be counted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EncodedBallots {
    pub ballots: Vec<AggregatedBallot>,
    /// Number of effective ballots read, counted or not.
    pub read: u64,
    pub dirty: Vec<(String, DirtyReason)>,
}

impl EncodedBallots {
    pub fn counted(&self) -> u64 {
        self.ballots.iter().map(|b| b.weight).sum()
    }
}

/// Encodes and groups the effective ballots of a question.
///
/// Ballots that cannot be encoded are recorded as dirty and skipped.
pub fn aggregate(codec: &BallotCodec, ballots: &[EffectiveBallot]) -> EncodedBallots {
    let mut agg = BallotAggregator::new();
    let mut dirty: Vec<(String, DirtyReason)> = Vec::new();
    for b in ballots.iter() {
        let encoded = match &b.choices {
            Some(choices) => codec.encode(choices),
            None => Err(DirtyReason::Unresolved(b.resolution.clone())),
        };
        match encoded {
            Ok(ids) => agg.add(ids, 1),
            Err(reason) => {
                warn!("aggregate: voter {:?}: dirty ballot {:?}", b.voter, reason);
                dirty.push((b.voter.clone(), reason));
            }
        }
    }
    let res = agg.finish();
    debug!("aggregate: distinct ballots: {:?}", res);
    info!(
        "aggregate: {} ballots read, {} distinct, {} dirty",
        ballots.len(),
        res.len(),
        dirty.len()
    );
    EncodedBallots {
        ballots: res,
        read: ballots.len() as u64,
        dirty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(xs: &[u32]) -> Vec<AnswerId> {
        xs.iter().map(|x| AnswerId(*x)).collect()
    }

    fn question() -> Question {
        Question {
            question: "Q".to_string(),
            tally_type: TallyType::Stv,
            min: 0,
            max: 3,
            num_seats: 1,
            answers: vec![Answer::new("A"), Answer::new("B"), Answer::new("C")],
        }
    }

    fn effective(voter: &str, choices: Option<&[&str]>) -> EffectiveBallot {
        EffectiveBallot {
            voter: voter.to_string(),
            resolution: Resolution::Direct,
            choices: choices.map(|cs| cs.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn groups_by_ordered_choices() {
        let mut agg = BallotAggregator::new();
        agg.add(ids(&[1, 2]), 1);
        agg.add(ids(&[2, 1]), 1);
        agg.add(ids(&[1, 2]), 1);
        agg.add(ids(&[3]), 0);
        assert_eq!(agg.total_weight(), 3);
        assert_eq!(
            agg.finish(),
            vec![
                AggregatedBallot {
                    weight: 2,
                    choices: ids(&[1, 2])
                },
                AggregatedBallot {
                    weight: 1,
                    choices: ids(&[2, 1])
                },
            ]
        );
    }

    #[test]
    fn aggregation_is_idempotent() {
        let groups: Vec<Vec<u32>> = vec![
            vec![1, 2],
            vec![3],
            vec![1, 2],
            vec![2],
            vec![3],
            vec![1, 2],
        ];
        let expanded: Vec<AggregatedBallot> = groups
            .iter()
            .map(|c| AggregatedBallot {
                weight: 1,
                choices: ids(c),
            })
            .collect();
        let once = aggregate_weighted(expanded.clone());
        let twice = aggregate_weighted(once.clone());
        assert_eq!(once, twice);
        // Partially grouped input gives the same result.
        let mut partial = once.clone();
        let extra = partial.remove(0);
        partial.push(AggregatedBallot {
            weight: extra.weight - 1,
            choices: extra.choices.clone(),
        });
        partial.push(AggregatedBallot {
            weight: 1,
            choices: extra.choices,
        });
        assert_eq!(aggregate_weighted(partial), once);
    }

    #[test]
    fn conservation_of_counted_ballots() {
        let codec = BallotCodec::new(&question());
        let ballots = vec![
            effective("v1", Some(&["A", "B"])),
            effective("v2", Some(&["A", "B"])),
            effective("v3", Some(&["C"])),
            effective("v4", Some(&["Z"])),
            effective("v5", None),
            effective("v6", Some(&[])),
        ];
        let res = aggregate(&codec, &ballots);
        assert_eq!(res.read, 6);
        assert_eq!(res.counted(), 3);
        assert_eq!(res.dirty.len(), 3);
        assert_eq!(res.counted() + res.dirty.len() as u64, res.read);
        assert_eq!(res.ballots.len(), 2);
    }
}
