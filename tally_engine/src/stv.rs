// Meek STV.
//
// Every candidate carries a keep factor: 1 while hopeful, 0 once eliminated,
// and the fraction of the votes it keeps once elected. A ballot gives to each
// of its choices in turn the kept fraction of what is left of its weight.
// Surpluses are transferred by lowering the keep factors of the elected
// candidates until their values settle on the quota.

use log::{debug, info, warn};
use std::ops::AddAssign;

use crate::config::*;
use crate::CountOutput;

// Upper bound on the keep factor updates within a single round.
const MAX_SURPLUS_ITERATIONS: u32 = 1000;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Default)]
struct Fixed(u128);

impl Fixed {
    const ZERO: Fixed = Fixed(0);
}

impl std::iter::Sum for Fixed {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Fixed(iter.map(|f| f.0).sum())
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        self.0 += rhs.0;
    }
}

/// Fixed point arithmetic with a given number of decimal digits.
#[derive(Debug, Clone, Copy)]
struct Arithmetic {
    digits: u32,
    unit: u128,
}

impl Arithmetic {
    fn new(digits: u32) -> Arithmetic {
        Arithmetic {
            digits,
            unit: 10u128.pow(digits),
        }
    }

    fn whole(&self, count: u64) -> Fixed {
        Fixed(count as u128 * self.unit)
    }

    fn one(&self) -> Fixed {
        Fixed(self.unit)
    }

    // Rounded down.
    fn mul(&self, a: Fixed, b: Fixed) -> Fixed {
        Fixed(a.0 * b.0 / self.unit)
    }

    // keep * num / den, rounded up and capped at 1.
    fn scale_keep(&self, keep: Fixed, num: Fixed, den: Fixed) -> Fixed {
        if den == Fixed::ZERO {
            return self.one();
        }
        let p = keep.0 * num.0;
        Fixed(((p + den.0 - 1) / den.0).min(self.unit))
    }

    // Surpluses below this amount are considered settled.
    fn tolerance(&self) -> Fixed {
        Fixed(10u128.pow(self.digits / 2))
    }

    fn value(&self, f: Fixed) -> VoteValue {
        VoteValue {
            units: f.0,
            digits: self.digits,
        }
    }
}

struct Meek<'a> {
    question: &'a Question,
    ballots: Vec<&'a AggregatedBallot>,
    rules: &'a VoteRules,
    arith: Arithmetic,
    quota: Fixed,
    status: Vec<CandidateStatus>,
    keep: Vec<Fixed>,
    // In seat order.
    elected: Vec<usize>,
    // Settled values of the previous rounds, for the weak tie break.
    history: Vec<Vec<Fixed>>,
    rounds: Vec<RoundStats>,
}

impl<'a> Meek<'a> {
    fn num_candidates(&self) -> usize {
        self.question.answers.len()
    }

    fn name(&self, cid: usize) -> &str {
        self.question.answers[cid].value.as_str()
    }

    /// Sends every ballot through the keep factors.
    /// Returns the value of each candidate and the exhausted weight.
    fn distribute(&self) -> (Vec<Fixed>, Fixed) {
        let mut values: Vec<Fixed> = vec![Fixed::ZERO; self.num_candidates()];
        let mut exhausted = Fixed::ZERO;
        for b in self.ballots.iter() {
            let mut remaining = self.arith.whole(b.weight);
            for choice in b.choices.iter() {
                let cid = choice.index();
                let status = match self.status.get(cid) {
                    Some(s) => *s,
                    None => continue,
                };
                match status {
                    CandidateStatus::Eliminated => {}
                    CandidateStatus::Hopeful => {
                        values[cid] += remaining;
                        remaining = Fixed::ZERO;
                    }
                    CandidateStatus::Elected => {
                        let share = self.arith.mul(remaining, self.keep[cid]);
                        values[cid] += share;
                        remaining = Fixed(remaining.0 - share.0);
                    }
                }
                if remaining == Fixed::ZERO {
                    break;
                }
            }
            exhausted += remaining;
        }
        (values, exhausted)
    }

    /// Updates the keep factors of the elected candidates until the
    /// surpluses are settled.
    fn settle(&mut self) -> (Vec<Fixed>, Fixed, u32) {
        let tolerance = self.arith.tolerance();
        let mut iterations: u32 = 0;
        loop {
            let (values, exhausted) = self.distribute();
            let surplus: Fixed = self
                .elected
                .iter()
                .map(|&cid| Fixed(values[cid].0.saturating_sub(self.quota.0)))
                .sum();
            if surplus <= tolerance {
                return (values, exhausted, iterations);
            }
            if iterations >= MAX_SURPLUS_ITERATIONS {
                warn!(
                    "settle: surplus {} still not settled after {} iterations",
                    self.arith.value(surplus),
                    iterations
                );
                return (values, exhausted, iterations);
            }
            let mut changed = false;
            for &cid in self.elected.iter() {
                let k = self.arith.scale_keep(self.keep[cid], self.quota, values[cid]);
                if k != self.keep[cid] {
                    self.keep[cid] = k;
                    changed = true;
                }
            }
            if !changed {
                // Fixed point of the rounded arithmetic.
                return (values, exhausted, iterations);
            }
            iterations += 1;
        }
    }

    /// Orders candidates by the strong tie break, most favoured first.
    fn strong_rank(&self, candidates: &[usize], round: u32) -> Vec<usize> {
        let mut res = candidates.to_vec();
        match self.rules.strong_tie_break {
            StrongTieBreak::UseCandidateOrder => res.sort_unstable(),
            StrongTieBreak::Alphabetic => {
                res.sort_by(|a, b| self.name(*a).cmp(self.name(*b)).then(a.cmp(b)))
            }
            StrongTieBreak::Random(seed) => {
                res.sort_by_cached_key(|cid| (candidate_digest(seed, round, self.name(*cid)), *cid))
            }
        }
        res
    }

    fn strong_loser(&self, candidates: &[usize], round: u32) -> Option<usize> {
        self.strong_rank(candidates, round).last().cloned()
    }

    /// Picks the candidate to eliminate among the tied lowest candidates.
    fn weak_loser(&self, tied: &[usize], round: u32) -> Option<usize> {
        let mut remaining = tied.to_vec();
        let past: Vec<&Vec<Fixed>> = match self.rules.weak_tie_break {
            WeakTieBreak::Backward => self.history.iter().rev().collect(),
            WeakTieBreak::Forward => self.history.iter().collect(),
            WeakTieBreak::Strong => Vec::new(),
        };
        for values in past {
            if remaining.len() <= 1 {
                break;
            }
            if let Some(min) = remaining.iter().map(|cid| values[*cid]).min() {
                remaining.retain(|cid| values[*cid] == min);
            }
        }
        debug!("weak_loser: tied {:?}, after history {:?}", tied, remaining);
        if remaining.len() == 1 {
            Some(remaining[0])
        } else {
            self.strong_loser(&remaining, round)
        }
    }

    /// Orders candidates by decreasing value, equal values by the strong tie break.
    /// Returns at most `limit` candidates, and whether equal values were found.
    fn order_by_value(
        &self,
        candidates: &[usize],
        values: &[Fixed],
        round: u32,
        limit: usize,
    ) -> (Vec<usize>, bool) {
        let mut ordered = self.strong_rank(candidates, round);
        // Stable: keeps the strong order among equal values.
        ordered.sort_by(|a, b| values[*b].cmp(&values[*a]));
        let tie = ordered.windows(2).any(|w| values[w[0]] == values[w[1]]);
        ordered.truncate(limit);
        (ordered, tie)
    }

    fn elect(&mut self, cid: usize) {
        self.status[cid] = CandidateStatus::Elected;
        self.elected.push(cid);
    }

    fn eliminate(&mut self, cid: usize) {
        self.status[cid] = CandidateStatus::Eliminated;
        self.keep[cid] = Fixed::ZERO;
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        round: u32,
        values: Vec<Fixed>,
        exhausted: Fixed,
        elected: &[usize],
        eliminated: &[usize],
        tie_break: bool,
        surplus_iterations: u32,
    ) {
        let tally = (0..self.num_candidates())
            .map(|cid| CandidateTally {
                name: self.name(cid).to_string(),
                value: self.arith.value(values[cid]),
                status: self.status[cid],
            })
            .collect();
        let stats = RoundStats {
            round,
            tally,
            exhausted: self.arith.value(exhausted),
            elected: elected.iter().map(|c| self.name(*c).to_string()).collect(),
            eliminated: eliminated.iter().map(|c| self.name(*c).to_string()).collect(),
            tie_break,
            surplus_iterations,
        };
        info!(
            "Round {}: elected {:?} eliminated {:?} exhausted {} tie break: {}",
            round, stats.elected, stats.eliminated, stats.exhausted, tie_break
        );
        for t in stats.tally.iter() {
            debug!("Round {}:     {} {} -> {:?}", round, t.value, t.name, t.status);
        }
        self.rounds.push(stats);
        self.history.push(values);
    }

    /// Runs the rounds until all the seats are filled or no hopeful is left to
    /// fill them. Returns the final value of every candidate.
    fn run(&mut self) -> Result<Vec<Fixed>, VotingErrors> {
        let seats = self.question.num_seats as usize;
        let num_candidates = self.num_candidates();
        let mut round: u32 = 0;
        loop {
            let (values, exhausted, iterations) = self.settle();
            let open = seats.saturating_sub(self.elected.len());
            if open == 0 {
                return Ok(values);
            }
            round += 1;
            // Every round elects or eliminates at least one candidate.
            if round as usize > num_candidates + 1 {
                return Err(VotingErrors::NoConvergence);
            }

            let hopefuls: Vec<usize> = (0..num_candidates)
                .filter(|cid| self.status[*cid] == CandidateStatus::Hopeful)
                .collect();
            let reached: Vec<usize> = hopefuls
                .iter()
                .filter(|cid| values[**cid] >= self.quota)
                .cloned()
                .collect();

            if !reached.is_empty() {
                let (chosen, tie) = self.order_by_value(&reached, &values, round, open);
                for cid in chosen.iter() {
                    self.elect(*cid);
                }
                self.record(round, values, exhausted, &chosen, &[], tie, iterations);
                continue;
            }

            if hopefuls.len() <= open {
                // Not enough candidates left to require the quota.
                let supported: Vec<usize> = hopefuls
                    .iter()
                    .filter(|cid| values[**cid] > Fixed::ZERO)
                    .cloned()
                    .collect();
                let (chosen, tie) = self.order_by_value(&supported, &values, round, open);
                for cid in chosen.iter() {
                    self.elect(*cid);
                }
                self.record(round, values.clone(), exhausted, &chosen, &[], tie, iterations);
                return Ok(values);
            }

            let min = match hopefuls.iter().map(|cid| values[*cid]).min() {
                Some(m) => m,
                None => return Ok(values),
            };
            let lowest: Vec<usize> = hopefuls
                .iter()
                .filter(|cid| values[**cid] == min)
                .cloned()
                .collect();
            let tie = lowest.len() > 1;
            let loser = if tie {
                self.weak_loser(&lowest, round)
            } else {
                lowest.first().cloned()
            };
            let loser = match loser {
                Some(l) => l,
                None => return Err(VotingErrors::NoConvergence),
            };
            self.eliminate(loser);
            self.record(round, values, exhausted, &[], &[loser], tie, iterations);
        }
    }
}

/// Generates a "random" key for a candidate. Random in this context means hard to guess in advance.
fn candidate_digest(seed: u32, round: u32, name: &str) -> String {
    let data = format!("{:08}{:08}{}", seed, round, name);
    sha256::digest(data.as_str())
}

/// Counts a question with Meek STV.
pub(crate) fn count(
    question: &Question,
    ballots: &[AggregatedBallot],
    rules: &VoteRules,
) -> Result<CountOutput, VotingErrors> {
    rules.validate()?;
    let arith = Arithmetic::new(rules.digits_precision);
    let num_candidates = question.answers.len();
    let seats = question.num_seats as u64;

    // Empty ballots do not count.
    let valid: Vec<&AggregatedBallot> = ballots.iter().filter(|b| !b.choices.is_empty()).collect();
    let counted: u64 = valid.iter().map(|b| b.weight).sum();
    let quota = arith.whole(counted / (seats + 1) + 1);
    info!(
        "stv count: {} ballots ({} distinct), {} seats, quota {}, rules {:?}",
        counted,
        valid.len(),
        seats,
        arith.value(quota),
        rules
    );

    if counted == 0 {
        return Ok(CountOutput {
            winners: Vec::new(),
            final_values: vec![arith.value(Fixed::ZERO); num_candidates],
            quota: Some(arith.value(quota)),
            rounds: Vec::new(),
            counted,
        });
    }

    let mut meek = Meek {
        question,
        ballots: valid,
        rules,
        arith,
        quota,
        status: vec![CandidateStatus::Hopeful; num_candidates],
        keep: vec![arith.one(); num_candidates],
        elected: Vec::new(),
        history: Vec::new(),
        rounds: Vec::new(),
    };
    let final_values = meek.run()?;

    Ok(CountOutput {
        winners: meek
            .elected
            .iter()
            .map(|cid| AnswerId((cid + 1) as u32))
            .collect(),
        final_values: final_values.iter().map(|f| arith.value(*f)).collect(),
        quota: Some(arith.value(quota)),
        rounds: meek.rounds,
        counted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn question(values: &[&str], seats: u32) -> Question {
        Question {
            question: "Q".to_string(),
            tally_type: TallyType::Stv,
            min: 0,
            max: values.len() as u32,
            num_seats: seats,
            answers: values.iter().map(|v| Answer::new(v)).collect(),
        }
    }

    fn ballot(weight: u64, choices: &[u32]) -> AggregatedBallot {
        AggregatedBallot {
            weight,
            choices: choices.iter().map(|c| AnswerId(*c)).collect(),
        }
    }

    fn winners(out: &CountOutput) -> Vec<u32> {
        out.winners.iter().map(|w| w.0).collect()
    }

    #[test]
    fn fixed_point_helpers() {
        let a = Arithmetic::new(3);
        assert_eq!(a.whole(2), Fixed(2000));
        assert_eq!(a.mul(Fixed(1500), Fixed(500)), Fixed(750));
        // 1 * 2 / 3 rounded up
        assert_eq!(a.scale_keep(a.one(), a.whole(2), a.whole(3)), Fixed(667));
        assert_eq!(a.scale_keep(a.one(), a.whole(4), a.whole(3)), a.one());
        assert_eq!(a.value(Fixed(667)).to_string(), "0.667");
    }

    #[test]
    fn eliminates_lowest_then_breaks_tie() {
        init();
        // A/B/C, 2x[A,B], 2x[B,A], 1x[C]: quota 3.
        let q = question(&["A", "B", "C"], 1);
        let out = count(
            &q,
            &[ballot(2, &[1, 2]), ballot(2, &[2, 1]), ballot(1, &[3])],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(out.quota.unwrap().floor(), 3);
        assert_eq!(winners(&out), vec![1]);
        assert_eq!(out.rounds[0].eliminated, vec!["C".to_string()]);
        assert!(!out.rounds[0].tie_break);
        assert_eq!(out.rounds[1].eliminated, vec!["B".to_string()]);
        assert!(out.rounds[1].tie_break);
        assert_eq!(out.rounds[2].elected, vec!["A".to_string()]);
    }

    #[test]
    fn surplus_is_transferred() {
        init();
        // quota = 9 / 3 + 1 = 4. A has 6 and passes 2 to B.
        let q = question(&["A", "B", "C"], 2);
        let out = count(
            &q,
            &[ballot(6, &[1, 2]), ballot(1, &[2]), ballot(2, &[3])],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(winners(&out), vec![1, 2]);
        assert_eq!(out.rounds[0].elected, vec!["A".to_string()]);
        // B only gets to 3 with the surplus. C goes out and B fills the last seat.
        assert_eq!(out.rounds[1].eliminated, vec!["C".to_string()]);
    }

    #[test]
    fn surplus_elects_second_candidate() {
        init();
        // quota = 10 / 3 + 1 = 4. A: 8, B: 0 -> 4 after transfer.
        let q = question(&["A", "B", "C"], 2);
        let out = count(
            &q,
            &[ballot(8, &[1, 2]), ballot(2, &[3])],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(winners(&out), vec![1, 2]);
        assert_eq!(out.rounds[1].elected, vec!["B".to_string()]);
        assert_eq!(out.final_values[1].floor(), 4);
    }

    #[test]
    fn cascading_surplus_settles() {
        init();
        let q = question(&["A", "B", "C", "D"], 3);
        let out = count(
            &q,
            &[
                ballot(30, &[1, 2, 3]),
                ballot(25, &[2, 1, 3]),
                ballot(4, &[3]),
                ballot(6, &[4]),
            ],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        // quota = 65 / 4 + 1 = 17
        assert_eq!(out.quota.unwrap().floor(), 17);
        assert_eq!(winners(&out), vec![1, 2, 3]);
        assert_eq!(out.rounds[1].elected, vec!["C".to_string()]);
        assert!(out.rounds[1].surplus_iterations > 0);
    }

    #[test]
    fn winner_count_is_bounded_by_support() {
        let q = question(&["A", "B", "C"], 2);
        let out = count(&q, &[ballot(10, &[1])], &VoteRules::DEFAULT_RULES).unwrap();
        assert_eq!(winners(&out), vec![1]);
    }

    #[test]
    fn no_ballots_no_winners() {
        let q = question(&["A", "B"], 1);
        let out = count(&q, &[ballot(3, &[])], &VoteRules::DEFAULT_RULES).unwrap();
        assert!(out.winners.is_empty());
        assert!(out.rounds.is_empty());
        assert_eq!(out.counted, 0);
    }

    #[test]
    fn all_supported_candidates_elected() {
        let q = question(&["A", "B", "C"], 3);
        let out = count(
            &q,
            &[ballot(1, &[1]), ballot(1, &[2]), ballot(1, &[3])],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(winners(&out), vec![1, 2, 3]);
        assert_eq!(out.rounds.len(), 1);
        assert!(out.rounds[0].tie_break);
    }

    #[test]
    fn elected_candidates_stay_elected() {
        let q = question(&["A", "B", "C", "D", "E"], 3);
        let out = count(
            &q,
            &[
                ballot(12, &[1, 3, 2]),
                ballot(7, &[2, 1]),
                ballot(5, &[3, 4]),
                ballot(4, &[4, 5, 3]),
                ballot(3, &[5, 2]),
            ],
            &VoteRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(out.winners.len(), 3);
        let mut seen_elected: Vec<String> = Vec::new();
        for r in out.rounds.iter() {
            for name in seen_elected.iter() {
                let t = r.tally.iter().find(|t| &t.name == name).unwrap();
                assert_eq!(t.status, CandidateStatus::Elected);
            }
            seen_elected.extend(r.elected.iter().cloned());
        }
    }

    #[test]
    fn strong_tie_break_modes() {
        let q = question(&["Bob", "Alice", "Carol"], 1);
        let ballots = [ballot(1, &[1]), ballot(1, &[2]), ballot(1, &[3])];
        let mut rules = VoteRules::DEFAULT_RULES;
        rules.weak_tie_break = WeakTieBreak::Strong;

        rules.strong_tie_break = StrongTieBreak::UseCandidateOrder;
        let out = count(&q, &ballots, &rules).unwrap();
        assert_eq!(out.rounds[0].eliminated, vec!["Carol".to_string()]);

        rules.strong_tie_break = StrongTieBreak::Alphabetic;
        let out = count(&q, &ballots, &rules).unwrap();
        assert_eq!(out.rounds[0].eliminated, vec!["Carol".to_string()]);
        // Bob and Alice tie again, Bob sorts last.
        assert_eq!(out.rounds[1].eliminated, vec!["Bob".to_string()]);
        assert_eq!(winners(&out), vec![2]);

        rules.strong_tie_break = StrongTieBreak::Random(42);
        let first = count(&q, &ballots, &rules).unwrap();
        let second = count(&q, &ballots, &rules).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.winners.len(), 1);
    }

    #[test]
    fn weak_tie_break_looks_at_history() {
        // Round 1: A=5 B=3 C=2 D=1, D goes out and its ballot moves to C.
        // Round 2: B and C tie at 3, C had less in round 1.
        let q = question(&["A", "B", "C", "D"], 1);
        let ballots = [
            ballot(5, &[1]),
            ballot(3, &[2]),
            ballot(2, &[3]),
            ballot(1, &[4, 3]),
        ];
        let out = count(&q, &ballots, &VoteRules::DEFAULT_RULES).unwrap();
        assert_eq!(out.rounds[0].eliminated, vec!["D".to_string()]);
        assert!(out.rounds[1].tie_break);
        assert_eq!(out.rounds[1].eliminated, vec!["C".to_string()]);

        // Same count with C declared before B.
        let q = question(&["A", "C", "B", "D"], 1);
        let ballots = [
            ballot(5, &[1]),
            ballot(3, &[3]),
            ballot(2, &[2]),
            ballot(1, &[4, 2]),
        ];
        let out = count(&q, &ballots, &VoteRules::DEFAULT_RULES).unwrap();
        assert_eq!(out.rounds[1].eliminated, vec!["C".to_string()]);
        let mut rules = VoteRules::DEFAULT_RULES;
        rules.weak_tie_break = WeakTieBreak::Strong;
        let out = count(&q, &ballots, &rules).unwrap();
        assert_eq!(out.rounds[1].eliminated, vec!["B".to_string()]);
    }

    #[test]
    fn rejects_invalid_precision() {
        let q = question(&["A", "B"], 1);
        let mut rules = VoteRules::DEFAULT_RULES;
        rules.digits_precision = 0;
        assert!(count(&q, &[ballot(1, &[1])], &rules).is_err());
    }
}
