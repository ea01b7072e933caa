use log::{debug, info};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::*;

// The outcome of following the delegations of one voter: the member whose
// direct vote is used, or the reason why there is none.
type Chase<'a> = Result<&'a str, Resolution>;

/// Computes the vote that counts for every voter of an election.
///
/// Only the latest valid record of each kind is kept for a voter, ordered by
/// cast time and then by declaration sequence. A direct vote always takes
/// precedence over a delegation.
pub struct DelegationResolver<'a> {
    direct: BTreeMap<&'a str, &'a RawVote>,
    delegate_to: BTreeMap<&'a str, &'a str>,
}

fn keep_latest<'a>(latest: &mut BTreeMap<&'a str, &'a RawVote>, v: &'a RawVote) {
    let e = latest.entry(v.voter.as_str()).or_insert(v);
    if v.order_key() > e.order_key() {
        *e = v;
    }
}

impl<'a> DelegationResolver<'a> {
    pub fn new(raw_votes: &'a [RawVote], as_of: Option<Timestamp>) -> DelegationResolver<'a> {
        let mut direct: BTreeMap<&'a str, &'a RawVote> = BTreeMap::new();
        let mut delegations: BTreeMap<&'a str, &'a RawVote> = BTreeMap::new();
        for v in raw_votes.iter().filter(|v| v.is_valid_at(as_of)) {
            match v.kind {
                RawVoteKind::Direct(_) => keep_latest(&mut direct, v),
                RawVoteKind::Delegation(_) => keep_latest(&mut delegations, v),
            }
        }
        let delegate_to = delegations
            .into_iter()
            .filter_map(|(voter, v)| match &v.kind {
                RawVoteKind::Delegation(target) => Some((voter, target.as_str())),
                RawVoteKind::Direct(_) => None,
            })
            .collect();
        DelegationResolver {
            direct,
            delegate_to,
        }
    }

    /// All the voters with a valid record, in sorted order.
    pub fn voters(&self) -> Vec<&'a str> {
        let mut res: Vec<&'a str> = self.direct.keys().cloned().collect();
        res.extend(
            self.delegate_to
                .keys()
                .filter(|v| !self.direct.contains_key(*v))
                .cloned(),
        );
        res.sort_unstable();
        res
    }

    // Follows the delegations starting at `voter`.
    // All the members visited on the way get the same outcome, which is
    // recorded in `memo` so that every member is visited once overall.
    fn chase(&self, voter: &'a str, memo: &mut HashMap<&'a str, Chase<'a>>) -> Chase<'a> {
        let mut path: Vec<&'a str> = Vec::new();
        let mut on_path: HashSet<&'a str> = HashSet::new();
        let mut current = voter;
        let outcome: Chase<'a> = loop {
            if let Some(known) = memo.get(current) {
                break known.clone();
            }
            if self.direct.contains_key(current) {
                break Ok(current);
            }
            if !on_path.insert(current) {
                debug!("chase: delegation cycle through {:?}", current);
                break Err(Resolution::Cycle);
            }
            path.push(current);
            match self.delegate_to.get(current) {
                Some(target) => {
                    current = *target;
                }
                None => {
                    debug!("chase: {:?} has no vote", current);
                    break Err(Resolution::Dangling {
                        target: current.to_string(),
                    });
                }
            }
        };
        for member in path {
            memo.insert(member, outcome.clone());
        }
        outcome
    }

    /// The effective ballots of all the voters for the question at `question_index`.
    pub fn resolve(&self, question_index: usize) -> Vec<EffectiveBallot> {
        let mut memo: HashMap<&'a str, Chase<'a>> = HashMap::new();
        let voters = self.voters();
        let mut res: Vec<EffectiveBallot> = Vec::with_capacity(voters.len());
        for voter in voters {
            let (resolution, choices) = match self.chase(voter, &mut memo) {
                Ok(terminal) => {
                    let resolution = if terminal == voter {
                        Resolution::Direct
                    } else {
                        Resolution::Delegated {
                            delegate: terminal.to_string(),
                        }
                    };
                    (resolution, Some(self.direct_choices(terminal, question_index)))
                }
                Err(resolution) => (resolution, None),
            };
            res.push(EffectiveBallot {
                voter: voter.to_string(),
                resolution,
                choices,
            });
        }
        let unresolved = res.iter().filter(|b| b.choices.is_none()).count();
        info!(
            "resolve: question {}: {} voters, {} without an effective vote",
            question_index,
            res.len(),
            unresolved
        );
        res
    }

    // A direct vote without an entry for this question is a blank ballot.
    fn direct_choices(&self, voter: &str, question_index: usize) -> Vec<String> {
        match self.direct.get(voter).map(|v| &v.kind) {
            Some(RawVoteKind::Direct(answers)) => {
                answers.get(question_index).cloned().unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

/// Resolves the effective ballots of a question.
pub fn resolve(
    raw_votes: &[RawVote],
    question_index: usize,
    as_of: Option<Timestamp>,
) -> Vec<EffectiveBallot> {
    DelegationResolver::new(raw_votes, as_of).resolve(question_index)
}
