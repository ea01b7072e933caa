// Answer identifiers and the BLT ballot exchange format.

use log::debug;
use std::collections::{HashMap, HashSet};

use crate::config::*;

/// Why a ballot was read but not counted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum DirtyReason {
    /// The delegation chain of the voter did not end in a direct vote.
    Unresolved(Resolution),
    Blank,
    UnknownAnswer(String),
    DuplicateAnswer(String),
    TooFewChoices(usize),
    TooManyChoices(usize),
}

/// Maps the answer values of one question to 1-based ids, in declaration order.
#[derive(Debug, Clone)]
pub struct BallotCodec {
    answers: Vec<String>,
    ids: HashMap<String, AnswerId>,
    min_choices: usize,
    max_choices: usize,
}

impl BallotCodec {
    pub fn new(question: &Question) -> BallotCodec {
        let answers: Vec<String> = question.answers.iter().map(|a| a.value.clone()).collect();
        let ids = answers
            .iter()
            .enumerate()
            .map(|(idx, value)| (value.clone(), AnswerId((idx + 1) as u32)))
            .collect();
        BallotCodec {
            answers,
            ids,
            min_choices: question.min as usize,
            max_choices: question.max as usize,
        }
    }

    pub fn answer_to_id(&self, value: &str) -> Option<AnswerId> {
        self.ids.get(value).cloned()
    }

    pub fn id_to_answer(&self, id: AnswerId) -> Option<&str> {
        if id.0 == 0 {
            return None;
        }
        self.answers.get(id.index()).map(|s| s.as_str())
    }

    pub fn num_answers(&self) -> usize {
        self.answers.len()
    }

    /// Converts the selected values of a ballot to answer ids, keeping the order.
    pub fn encode(&self, choices: &[String]) -> Result<Vec<AnswerId>, DirtyReason> {
        if choices.is_empty() {
            return Err(DirtyReason::Blank);
        }
        if choices.len() < self.min_choices {
            return Err(DirtyReason::TooFewChoices(choices.len()));
        }
        if choices.len() > self.max_choices {
            return Err(DirtyReason::TooManyChoices(choices.len()));
        }
        let mut seen: HashSet<AnswerId> = HashSet::new();
        let mut res: Vec<AnswerId> = Vec::with_capacity(choices.len());
        for c in choices.iter() {
            let id = self
                .answer_to_id(c)
                .ok_or_else(|| DirtyReason::UnknownAnswer(c.clone()))?;
            if !seen.insert(id) {
                return Err(DirtyReason::DuplicateAnswer(c.clone()));
            }
            res.push(id);
        }
        Ok(res)
    }
}

/// The content of a BLT file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BltElection {
    pub num_seats: u32,
    pub ballots: Vec<AggregatedBallot>,
    pub candidates: Vec<String>,
    pub title: String,
}

impl BltElection {
    /// A ranked question over the candidates of the file.
    pub fn to_question(&self) -> Question {
        Question {
            question: self.title.clone(),
            tally_type: TallyType::Stv,
            min: 0,
            max: self.candidates.len() as u32,
            num_seats: self.num_seats,
            answers: self.candidates.iter().map(|c| Answer::new(c)).collect(),
        }
    }

    /// The number of ballots described by the file.
    pub fn total_weight(&self) -> u64 {
        self.ballots.iter().map(|b| b.weight).sum()
    }
}

fn quoted(s: &str) -> String {
    let clean: String = s.chars().filter(|c| !matches!(c, '"' | '\n' | '\r')).collect();
    format!("\"{}\"", clean)
}

/// Writes the ballots of a question in the BLT format.
///
/// ```text
/// 3 1
/// 2 1 2 0
/// 1 3 0
/// 0
/// "A"
/// "B"
/// "C"
/// "Who?"
/// ```
pub fn write_blt(question: &Question, ballots: &[AggregatedBallot]) -> String {
    let mut out = format!("{} {}\n", question.answers.len(), question.num_seats);
    for b in ballots.iter() {
        out.push_str(&b.weight.to_string());
        for id in b.choices.iter() {
            out.push(' ');
            out.push_str(&id.0.to_string());
        }
        out.push_str(" 0\n");
    }
    out.push_str("0\n");
    for a in question.answers.iter() {
        out.push_str(&quoted(&a.value));
        out.push('\n');
    }
    out.push_str(&quoted(&question.question));
    out.push('\n');
    out
}

fn malformed<T>(line: usize, reason: &str) -> Result<T, VotingErrors> {
    Err(VotingErrors::MalformedBallotFile {
        line,
        reason: reason.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(token: &str, lineno: usize) -> Result<T, VotingErrors> {
    match token.parse::<T>() {
        Ok(x) => Ok(x),
        Err(_) => malformed(lineno, &format!("expected a number, found {:?}", token)),
    }
}

fn unquote(line: &str, lineno: usize) -> Result<String, VotingErrors> {
    let l = line.trim();
    if l.len() >= 2 && l.starts_with('"') && l.ends_with('"') {
        Ok(l[1..l.len() - 1].to_string())
    } else {
        malformed(lineno, "expected a quoted string")
    }
}

/// Reads a BLT file.
pub fn read_blt(content: &str) -> Result<BltElection, VotingErrors> {
    // Blank lines are not significant.
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(idx, l)| (idx + 1, l))
        .filter(|(_, l)| !l.trim().is_empty());

    let (lineno, header) = match lines.next() {
        Some(x) => x,
        None => return malformed(0, "empty file"),
    };
    let header_tokens: Vec<&str> = header.split_whitespace().collect();
    if header_tokens.len() != 2 {
        return malformed(lineno, "expected '<candidates> <seats>'");
    }
    let num_candidates: usize = parse_number(header_tokens[0], lineno)?;
    let num_seats: u32 = parse_number(header_tokens[1], lineno)?;
    if !(MIN_ANSWERS..=MAX_ANSWERS).contains(&num_candidates) {
        return malformed(
            lineno,
            &format!(
                "the number of candidates must be between {} and {}",
                MIN_ANSWERS, MAX_ANSWERS
            ),
        );
    }
    if num_seats < 1 || num_seats as usize > num_candidates {
        return malformed(lineno, "invalid number of seats");
    }

    let mut ballots: Vec<AggregatedBallot> = Vec::new();
    loop {
        let (lineno, line) = match lines.next() {
            Some(x) => x,
            None => return malformed(0, "missing end of ballots marker"),
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let weight: u64 = parse_number(tokens[0], lineno)?;
        if weight == 0 {
            if tokens.len() != 1 {
                return malformed(lineno, "unexpected content after the end of ballots marker");
            }
            break;
        }
        match tokens.last() {
            Some(&"0") if tokens.len() >= 2 => {}
            _ => return malformed(lineno, "ballot is not terminated by 0"),
        }
        let mut choices: Vec<AnswerId> = Vec::with_capacity(tokens.len() - 2);
        let mut seen: HashSet<u32> = HashSet::new();
        for t in tokens[1..tokens.len() - 1].iter() {
            let id: u32 = parse_number(t, lineno)?;
            if id == 0 || id as usize > num_candidates {
                return malformed(lineno, &format!("unknown candidate id {}", id));
            }
            if !seen.insert(id) {
                return malformed(lineno, &format!("candidate id {} is repeated", id));
            }
            choices.push(AnswerId(id));
        }
        ballots.push(AggregatedBallot { weight, choices });
    }

    let mut candidates: Vec<String> = Vec::with_capacity(num_candidates);
    for _ in 0..num_candidates {
        let (lineno, line) = match lines.next() {
            Some(x) => x,
            None => return malformed(0, "missing candidate names"),
        };
        candidates.push(unquote(line, lineno)?);
    }
    let title = match lines.next() {
        Some((lineno, line)) => unquote(line, lineno)?,
        None => return malformed(0, "missing title"),
    };
    if let Some((lineno, _)) = lines.next() {
        return malformed(lineno, "unexpected content after the title");
    }
    debug!(
        "read_blt: {} candidates, {} seats, {} ballot lines",
        num_candidates,
        num_seats,
        ballots.len()
    );
    Ok(BltElection {
        num_seats,
        ballots,
        candidates,
        title,
    })
}
