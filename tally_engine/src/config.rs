// ********* Input data structures ***********

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;

/// The counting method attached to a question.
///
/// The set of methods is closed: adding one means extending every `match`
/// on this enumeration.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TallyType {
    /// Plurality: every voter selects one answer.
    OneChoice,
    /// Every voter selects up to `max` answers, each selection counts once.
    MultipleChoice,
    /// Ranked ballots counted with Meek STV.
    Stv,
}

impl TallyType {
    /// Parses the tag used by the election authoring layer.
    pub fn from_tag(tag: &str) -> Option<TallyType> {
        match tag {
            "ONE_CHOICE" => Some(TallyType::OneChoice),
            "MULTIPLE_CHOICE" => Some(TallyType::MultipleChoice),
            "STV" | "MEEK-STV" | "BASE-STV" => Some(TallyType::Stv),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TallyType::OneChoice => "ONE_CHOICE",
            TallyType::MultipleChoice => "MULTIPLE_CHOICE",
            TallyType::Stv => "STV",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Answer {
    pub value: String,
    pub url: String,
    pub details: String,
}

impl Answer {
    pub fn new(value: &str) -> Answer {
        Answer {
            value: value.to_string(),
            url: String::new(),
            details: String::new(),
        }
    }
}

/// A question of an election, as authored before voting starts.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Question {
    pub question: String,
    pub tally_type: TallyType,
    pub min: u32,
    pub max: u32,
    pub num_seats: u32,
    pub answers: Vec<Answer>,
}

pub const MIN_ANSWERS: usize = 2;
pub const MAX_ANSWERS: usize = 100;
pub const MAX_FIELD_LENGTH: usize = 500;

impl Question {
    /// Checks the authoring rules of a question.
    ///
    /// The tally functions assume a question that passed this check.
    pub fn validate(&self) -> Result<(), VotingErrors> {
        let invalid = |reason: String| {
            Err(VotingErrors::InvalidQuestion {
                question: self.question.clone(),
                reason,
            })
        };
        if self.answers.len() < MIN_ANSWERS || self.answers.len() > MAX_ANSWERS {
            return invalid(format!(
                "expected between {} and {} answers, found {}",
                MIN_ANSWERS,
                MAX_ANSWERS,
                self.answers.len()
            ));
        }
        if self.num_seats < 1 || self.num_seats as usize > self.answers.len() {
            return invalid(format!("invalid number of seats {}", self.num_seats));
        }
        if self.max < 1 || self.min > self.max {
            return invalid(format!("invalid selection bounds {}..{}", self.min, self.max));
        }
        if self.tally_type == TallyType::OneChoice && self.max != 1 {
            return invalid("a one choice question accepts exactly one selection".to_string());
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for a in self.answers.iter() {
            let normalized = a.value.trim();
            if normalized.is_empty() || normalized != a.value || a.value.contains('\n') {
                return invalid(format!("answer value {:?} is not normalized", a.value));
            }
            if [&a.value, &a.url, &a.details]
                .iter()
                .any(|s| s.chars().count() > MAX_FIELD_LENGTH)
            {
                return invalid(format!("answer {:?} has a field that is too long", a.value));
            }
            if !seen.insert(a.value.as_str()) {
                return invalid(format!("duplicated answer value {:?}", a.value));
            }
        }
        Ok(())
    }
}

/// Seconds since the epoch. Only the ordering matters to the engine.
pub type Timestamp = u64;

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RawVoteKind {
    /// The selected answer values, one list per question of the election.
    Direct(Vec<Vec<String>>),
    /// The identity of the delegate.
    Delegation(String),
}

/// A vote record as stored by the voting layer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawVote {
    pub voter: String,
    pub kind: RawVoteKind,
    pub cast_at: Timestamp,
    /// Declaration order, used when two records share a timestamp.
    pub sequence: u64,
    pub invalidated_at: Option<Timestamp>,
}

impl RawVote {
    /// Whether this record counts when tallying at the given cut-off.
    ///
    /// Without a cut-off, any invalidation removes the record.
    pub fn is_valid_at(&self, as_of: Option<Timestamp>) -> bool {
        match as_of {
            None => self.invalidated_at.is_none(),
            Some(t) => self.cast_at <= t && self.invalidated_at.map_or(true, |inv| inv > t),
        }
    }

    pub(crate) fn order_key(&self) -> (Timestamp, u64) {
        (self.cast_at, self.sequence)
    }

    /// Checks the record as it would be checked when cast.
    pub fn validate(&self) -> Result<(), VotingErrors> {
        let invalid = |reason: &str| {
            Err(VotingErrors::InvalidVote {
                voter: self.voter.clone(),
                reason: reason.to_string(),
            })
        };
        if self.voter.trim().is_empty() {
            return invalid("empty voter identity");
        }
        if let RawVoteKind::Delegation(delegate) = &self.kind {
            if delegate.trim().is_empty() {
                return invalid("empty delegate identity");
            }
            if *delegate == self.voter {
                return invalid("a voter cannot delegate to themselves");
            }
        }
        if let Some(inv) = self.invalidated_at {
            if inv < self.cast_at {
                return invalid("invalidated before being cast");
            }
        }
        Ok(())
    }
}

/// How the vote of a voter was obtained.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Resolution {
    Direct,
    /// Copied from the direct vote of the final delegate of the chain.
    Delegated { delegate: String },
    /// The chain reached a member without any vote.
    Dangling { target: String },
    /// The chain went through the same member twice.
    Cycle,
}

/// The ballot that is actually counted for a voter.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EffectiveBallot {
    pub voter: String,
    pub resolution: Resolution,
    /// None when the resolution failed.
    pub choices: Option<Vec<String>>,
}

/// 1-based identifier of an answer within its question.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct AnswerId(pub u32);

impl AnswerId {
    // Position in the answer list. Id 0 maps out of range.
    pub(crate) fn index(&self) -> usize {
        (self.0 as usize).wrapping_sub(1)
    }
}

/// A group of identical ballots.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct AggregatedBallot {
    pub weight: u64,
    pub choices: Vec<AnswerId>,
}

// ******** Output data structures *********

/// A vote count in fixed point notation with `digits` decimal digits.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct VoteValue {
    pub units: u128,
    pub digits: u32,
}

impl VoteValue {
    pub fn whole(count: u64) -> VoteValue {
        VoteValue {
            units: count as u128,
            digits: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// The integer part of the count.
    pub fn floor(&self) -> u128 {
        self.units / 10u128.pow(self.digits)
    }
}

impl Display for VoteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.digits == 0 {
            return write!(f, "{}", self.units);
        }
        let scale = 10u128.pow(self.digits);
        write!(
            f,
            "{}.{:0width$}",
            self.units / scale,
            self.units % scale,
            width = self.digits as usize
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum CandidateStatus {
    Hopeful,
    Elected,
    Eliminated,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateTally {
    pub name: String,
    pub value: VoteValue,
    pub status: CandidateStatus,
}

/// Statistics for one round
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundStats {
    pub round: u32,
    /// Values at the start of the round, statuses at its end, in answer order.
    pub tally: Vec<CandidateTally>,
    pub exhausted: VoteValue,
    pub elected: Vec<String>,
    pub eliminated: Vec<String>,
    /// Whether a tie had to be broken to decide this round.
    pub tie_break: bool,
    /// Number of keep factor updates needed to settle the surpluses.
    pub surplus_iterations: u32,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AnswerResult {
    pub value: String,
    pub elected: bool,
    /// 0 when not elected.
    pub seat_number: u32,
    pub total_count: VoteValue,
}

/// The outcome of counting one question.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyResult {
    pub question: String,
    pub tally_type: TallyType,
    pub num_seats: u32,
    pub total_votes: u64,
    pub dirty_votes: u64,
    /// Ordered by seat number.
    pub winners: Vec<String>,
    pub answers: Vec<AnswerResult>,
    pub quota: Option<VoteValue>,
    pub rounds: Vec<RoundStats>,
}

/// Errors that prevent the algorithm from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VotingErrors {
    InvalidQuestion { question: String, reason: String },
    InvalidRules(String),
    UnknownQuestion(usize),
    InvalidVote { voter: String, reason: String },
    MalformedBallotFile { line: usize, reason: String },
    NoConvergence,
}

impl Error for VotingErrors {}

impl Display for VotingErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingErrors::InvalidQuestion { question, reason } => {
                write!(f, "invalid question {:?}: {}", question, reason)
            }
            VotingErrors::InvalidRules(reason) => write!(f, "invalid tally rules: {}", reason),
            VotingErrors::UnknownQuestion(idx) => write!(f, "no question with index {}", idx),
            VotingErrors::InvalidVote { voter, reason } => {
                write!(f, "invalid vote from {:?}: {}", voter, reason)
            }
            VotingErrors::MalformedBallotFile { line, reason } => {
                write!(f, "malformed ballot file at line {}: {}", line, reason)
            }
            VotingErrors::NoConvergence => write!(f, "the count did not terminate"),
        }
    }
}

// ********* Configuration **********

// The STV options follow the names used by OpenSTV.

/// The counting algorithm for STV questions. Only Meek is supported.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum StvMethod {
    Meek,
}

/// Breaks ties using a total order that does not depend on the count.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum StrongTieBreak {
    /// Earlier declared answers are elected first and eliminated last.
    UseCandidateOrder,
    /// Same as `UseCandidateOrder` with the answers sorted by value.
    Alphabetic,
    // Uses a cryptographic hash on the seed, the round and the candidate names.
    Random(u32),
}

/// Breaks ties between the lowest candidates when eliminating.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum WeakTieBreak {
    /// Looks at the counts of the previous rounds, most recent first.
    Backward,
    /// Looks at the counts of the previous rounds, first round first.
    Forward,
    /// Goes straight to the strong tie break.
    Strong,
}

pub const DEFAULT_DIGITS_PRECISION: u32 = 6;
pub const MAX_DIGITS_PRECISION: u32 = 9;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteRules {
    pub method: StvMethod,
    pub strong_tie_break: StrongTieBreak,
    pub weak_tie_break: WeakTieBreak,
    pub digits_precision: u32,
}

impl VoteRules {
    pub const DEFAULT_RULES: VoteRules = VoteRules {
        method: StvMethod::Meek,
        strong_tie_break: StrongTieBreak::UseCandidateOrder,
        weak_tie_break: WeakTieBreak::Backward,
        digits_precision: DEFAULT_DIGITS_PRECISION,
    };

    pub fn validate(&self) -> Result<(), VotingErrors> {
        if self.digits_precision < 1 || self.digits_precision > MAX_DIGITS_PRECISION {
            return Err(VotingErrors::InvalidRules(format!(
                "digits_precision must be between 1 and {}, got {}",
                MAX_DIGITS_PRECISION, self.digits_precision
            )));
        }
        Ok(())
    }
}

impl Default for VoteRules {
    fn default() -> Self {
        VoteRules::DEFAULT_RULES
    }
}
