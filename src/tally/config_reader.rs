use crate::tally::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub value: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub question: String,
    pub tally_type: String,
    pub min: u32,
    pub max: u32,
    pub num_seats: u32,
    pub answers: Vec<AnswerConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: String,
    /// For each question, the selected answer values in order.
    pub answers: Vec<Vec<String>>,
    #[serde(rename = "castAt")]
    pub cast_at: u64,
    pub sequence: Option<u64>,
    #[serde(rename = "invalidatedAt")]
    pub invalidated_at: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub voter: String,
    pub delegate: String,
    #[serde(rename = "castAt")]
    pub cast_at: u64,
    pub sequence: Option<u64>,
    #[serde(rename = "invalidatedAt")]
    pub invalidated_at: Option<u64>,
}

/// The options for the STV questions, with the names used by OpenSTV.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct TallyOptions {
    pub method: Option<String>,
    pub strong_tie_break_method: Option<String>,
    pub weak_tie_break_method: Option<String>,
    pub digits_precision: Option<JSValue>,
    pub random_seed: Option<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSnapshot {
    pub name: String,
    #[serde(rename = "votingEndsAt")]
    pub voting_ends_at: Option<u64>,
    pub questions: Vec<QuestionConfig>,
    #[serde(default)]
    pub votes: Vec<VoteRecord>,
    #[serde(default)]
    pub delegations: Vec<DelegationRecord>,
    pub tally: Option<TallyOptions>,
}

/// A snapshot checked and converted for the engine.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Election {
    pub name: String,
    pub questions: Vec<Question>,
    pub raw_votes: Vec<RawVote>,
    pub as_of: Option<Timestamp>,
}

pub fn read_election(path: &str) -> CliResult<ElectionSnapshot> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let snapshot: ElectionSnapshot =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!(
        "read_election: {:?}: {} questions, {} votes, {} delegations",
        snapshot.name,
        snapshot.questions.len(),
        snapshot.votes.len(),
        snapshot.delegations.len()
    );
    Ok(snapshot)
}

pub fn read_tally_options(path: &str) -> CliResult<TallyOptions> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let options: TallyOptions =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_tally_options: {:?}", options);
    Ok(options)
}

pub fn read_summary(path: &str) -> CliResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_js_int(x: &Option<JSValue>) -> Option<u32> {
    match x {
        Some(JSValue::Number(n)) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
        Some(JSValue::String(s)) => s.parse::<u32>().ok(),
        _ => None,
    }
}

pub fn validate_rules(options: &TallyOptions) -> CliResult<VoteRules> {
    let method = match options.method.as_deref() {
        None | Some("MeekSTV") | Some("meek") => StvMethod::Meek,
        Some(x) => {
            whatever!("Cannot use method {:?}: only MeekSTV is implemented", x)
        }
    };
    let strong_tie_break = match options.strong_tie_break_method.as_deref() {
        None | Some("default") | Some("index") => StrongTieBreak::UseCandidateOrder,
        Some("alpha") => StrongTieBreak::Alphabetic,
        Some("random") => match options.random_seed {
            None => StrongTieBreak::Random(0),
            Some(_) => match read_js_int(&options.random_seed) {
                Some(seed) => StrongTieBreak::Random(seed),
                None => {
                    whatever!("Cannot read random_seed {:?}", options.random_seed)
                }
            },
        },
        Some(x) => {
            whatever!("Cannot use strong tie break method {:?}", x)
        }
    };
    let weak_tie_break = match options.weak_tie_break_method.as_deref() {
        None | Some("default") | Some("backward") => WeakTieBreak::Backward,
        Some("forward") => WeakTieBreak::Forward,
        Some("strong") => WeakTieBreak::Strong,
        Some(x) => {
            whatever!("Cannot use weak tie break method {:?}", x)
        }
    };
    let digits_precision = match &options.digits_precision {
        None => DEFAULT_DIGITS_PRECISION,
        Some(JSValue::String(s)) if s == "default" => DEFAULT_DIGITS_PRECISION,
        x => match read_js_int(x) {
            Some(d) => d,
            None => {
                whatever!("Cannot read digits_precision {:?}", x)
            }
        },
    };
    let rules = VoteRules {
        method,
        strong_tie_break,
        weak_tie_break,
        digits_precision,
    };
    rules.validate().context(InvalidRulesSnafu {})?;
    Ok(rules)
}

/// Checks the snapshot and converts it for the engine.
///
/// Records without a sequence get their position in the file: the votes
/// first, then the delegations.
pub fn validate_election(snapshot: &ElectionSnapshot) -> Result<Election, VotingErrors> {
    let mut questions: Vec<Question> = Vec::new();
    for qc in snapshot.questions.iter() {
        let tally_type =
            TallyType::from_tag(&qc.tally_type).ok_or_else(|| VotingErrors::InvalidQuestion {
                question: qc.question.clone(),
                reason: format!("unknown tally type {:?}", qc.tally_type),
            })?;
        let q = Question {
            question: qc.question.clone(),
            tally_type,
            min: qc.min,
            max: qc.max,
            num_seats: qc.num_seats,
            answers: qc
                .answers
                .iter()
                .map(|a| Answer {
                    value: a.value.clone(),
                    url: a.url.clone(),
                    details: a.details.clone(),
                })
                .collect(),
        };
        q.validate()?;
        questions.push(q);
    }

    let mut raw_votes: Vec<RawVote> = Vec::new();
    for (pos, v) in snapshot.votes.iter().enumerate() {
        if v.answers.len() > questions.len() {
            return Err(VotingErrors::InvalidVote {
                voter: v.voter.clone(),
                reason: format!(
                    "{} answer lists for {} questions",
                    v.answers.len(),
                    questions.len()
                ),
            });
        }
        raw_votes.push(RawVote {
            voter: v.voter.clone(),
            kind: RawVoteKind::Direct(v.answers.clone()),
            cast_at: v.cast_at,
            sequence: v.sequence.unwrap_or(pos as u64),
            invalidated_at: v.invalidated_at,
        });
    }
    let offset = snapshot.votes.len();
    for (pos, d) in snapshot.delegations.iter().enumerate() {
        raw_votes.push(RawVote {
            voter: d.voter.clone(),
            kind: RawVoteKind::Delegation(d.delegate.clone()),
            cast_at: d.cast_at,
            sequence: d.sequence.unwrap_or((offset + pos) as u64),
            invalidated_at: d.invalidated_at,
        });
    }
    for v in raw_votes.iter() {
        v.validate()?;
    }

    Ok(Election {
        name: snapshot.name.clone(),
        questions,
        raw_votes,
        as_of: snapshot.voting_ends_at,
    })
}
