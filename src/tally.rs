use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use tally_engine::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::tally::config_reader::*;

pub mod config_reader;
pub mod io_blt;
pub mod io_common;

#[derive(Debug, Snafu)]
pub enum TallyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error producing the JSON summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Invalid election in {path}: {source}"))]
    InvalidElection { source: VotingErrors, path: String },
    #[snafu(display("Invalid tally options: {source}"))]
    InvalidRules { source: VotingErrors },
    #[snafu(display("Malformed ballot file {path}: {source}"))]
    MalformedBallots { source: VotingErrors, path: String },
    #[snafu(display("Counting question {index} failed: {source}"))]
    Counting { source: VotingErrors, index: usize },
    #[snafu(display(
        "Another tally is in progress: lock file {path} exists. \
         If no tally is running, delete it and run again"
    ))]
    TallyInProgress { path: String },
    #[snafu(display("No input file given"))]
    MissingInput {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, TallyError>;

fn rounds_to_json(rounds: &[RoundStats]) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for round_stat in rounds.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for t in round_stat.tally.iter() {
            tally.insert(t.name.clone(), json!(t.value.to_string()));
        }
        let js = json!({
            "round": round_stat.round,
            "tally": tally,
            "exhausted": round_stat.exhausted.to_string(),
            "elected": round_stat.elected,
            "eliminated": round_stat.eliminated,
            "tieBreak": round_stat.tie_break,
            "surplusIterations": round_stat.surplus_iterations,
        });
        l.push(js);
    }
    l
}

fn result_to_json(res: &TallyResult) -> JSValue {
    let answers: Vec<JSValue> = res
        .answers
        .iter()
        .map(|a| {
            json!({
                "value": a.value,
                "elected": a.elected,
                "seat_number": a.seat_number,
                "total_count": a.total_count.to_string(),
            })
        })
        .collect();
    let mut js = json!({
        "question": res.question,
        "tally_type": res.tally_type.tag(),
        "num_seats": res.num_seats,
        "total_votes": res.total_votes,
        "dirty_votes": res.dirty_votes,
        "winners": res.winners,
        "answers": answers,
    });
    if res.tally_type == TallyType::Stv {
        js["quota"] = json!(res.quota.map(|q| q.to_string()));
        js["rounds"] = json!(rounds_to_json(&res.rounds));
    }
    js
}

fn count_question(
    election: &Election,
    index: usize,
    rules: &VoteRules,
    ballots_dir: Option<&Path>,
) -> CliResult<TallyResult> {
    let question = &election.questions[index];
    let prepared = prepare_ballots(&election.raw_votes, question, index, election.as_of);
    for (voter, reason) in prepared.dirty.iter() {
        debug!("count_question: {}: dirty ballot of {:?}: {:?}", index, voter, reason);
    }
    let res = match (question.tally_type, ballots_dir) {
        (TallyType::Stv, Some(dir)) => {
            // The count goes through the ballot file, which is kept for audit.
            let path = io_blt::write_question_blt(
                dir,
                &election.name,
                index,
                question,
                &prepared.ballots,
            )?;
            let blt = io_blt::read_blt_file(&path)?;
            if blt.total_weight() != prepared.counted() {
                whatever!(
                    "Ballot file {:?} holds {} ballots, expected {}",
                    path,
                    blt.total_weight(),
                    prepared.counted()
                )
            }
            run_tally(question, &blt.ballots, prepared.read, rules)
        }
        _ => run_tally(question, &prepared.ballots, prepared.read, rules),
    };
    res.context(CountingSnafu { index })
}

/// Counts the questions of an election snapshot.
pub fn run_snapshot(
    snapshot: &ElectionSnapshot,
    path: &str,
    options: &TallyOptions,
    question: Option<usize>,
    ballots_dir: Option<&Path>,
) -> CliResult<JSValue> {
    let election = validate_election(snapshot).context(InvalidElectionSnafu { path })?;
    let rules = validate_rules(options)?;
    info!(
        "Election {:?}: {} questions, {} records, rules: {:?}",
        election.name,
        election.questions.len(),
        election.raw_votes.len(),
        rules
    );

    let indexes: Vec<usize> = match question {
        Some(idx) => {
            if idx >= election.questions.len() {
                whatever!(
                    "Question {} does not exist, the election has {} questions",
                    idx,
                    election.questions.len()
                )
            }
            vec![idx]
        }
        None => (0..election.questions.len()).collect(),
    };

    // Held until all the questions are counted.
    let _lock = match ballots_dir {
        Some(dir) => Some(io_blt::RunLock::acquire(dir)?),
        None => None,
    };

    let mut results: Vec<JSValue> = Vec::new();
    for idx in indexes {
        let res = count_question(&election, idx, &rules, ballots_dir)?;
        results.push(result_to_json(&res));
    }
    Ok(json!({ "election": election.name, "results": results }))
}

/// Counts a question stored in a BLT file.
pub fn run_blt(path: &str, options: &TallyOptions) -> CliResult<JSValue> {
    let rules = validate_rules(options)?;
    let blt = io_blt::read_blt_file(Path::new(path))?;
    let question = blt.to_question();
    let res = run_tally(&question, &blt.ballots, blt.total_weight(), &rules)
        .context(CountingSnafu { index: 0_usize })?;
    Ok(json!({ "election": blt.title, "results": [result_to_json(&res)] }))
}

fn check_reference(pretty_js_stats: &str, reference_path: &str) -> CliResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference string");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        whatever!("Difference detected between calculated summary and reference summary")
    }
    info!("Summary matches the reference {}", reference_path);
    Ok(())
}

pub fn run_election(args: &Args) -> CliResult<()> {
    let input = args.input.clone().context(MissingInputSnafu {})?;
    let options: Option<TallyOptions> = match &args.config {
        Some(p) => Some(read_tally_options(p)?),
        None => None,
    };
    let ballots_dir: Option<PathBuf> = args.ballots_dir.as_ref().map(PathBuf::from);

    let summary = match args.input_type.as_deref().unwrap_or("json") {
        "json" => {
            let snapshot = read_election(&input)?;
            let options = options
                .or_else(|| snapshot.tally.clone())
                .unwrap_or_default();
            run_snapshot(
                &snapshot,
                &input,
                &options,
                args.question,
                ballots_dir.as_deref(),
            )?
        }
        "blt" => run_blt(&input, &options.unwrap_or_default())?,
        x => {
            whatever!("Unknown input type {:?}, expected json or blt", x)
        }
    };

    let pretty_js_stats = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu {})?;
    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(out_path) => {
            fs::write(out_path, &pretty_js_stats).context(WritingFileSnafu { path: out_path })?;
            info!("Summary written to {}", out_path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(&pretty_js_stats, reference_path)?;
    }
    Ok(())
}
