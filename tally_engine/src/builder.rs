pub use crate::config::*;

/// A builder for assembling the snapshot of an election.
///
/// Records are stamped with the current time of the builder, which only
/// moves when set with [`ElectionBuilder::at`], and with an increasing
/// declaration sequence. A later record of a voter replaces an earlier one.
///
/// ```
/// pub use tally_engine::builder::ElectionBuilder;
/// pub use tally_engine::{Answer, Question, TallyType};
/// # use tally_engine::VotingErrors;
///
/// let question = Question {
///     question: "Who?".to_string(),
///     tally_type: TallyType::Stv,
///     min: 0,
///     max: 2,
///     num_seats: 1,
///     answers: vec![Answer::new("Anna"), Answer::new("Bob")],
/// };
/// let mut builder = ElectionBuilder::new(&[question])?;
///
/// builder.add_vote_simple("v1", &["Anna", "Bob"])?;
/// builder.add_delegation("v2", "v1")?;
/// let result = builder.tally(0)?;
/// assert_eq!(result.winners, vec!["Anna".to_string()]);
///
/// # Ok::<(), VotingErrors>(())
/// ```
#[derive(Debug, Clone)]
pub struct ElectionBuilder {
    questions: Vec<Question>,
    votes: Vec<RawVote>,
    rules: VoteRules,
    now: Timestamp,
    next_sequence: u64,
}

impl ElectionBuilder {
    pub fn new(questions: &[Question]) -> Result<ElectionBuilder, VotingErrors> {
        for q in questions.iter() {
            q.validate()?;
        }
        Ok(ElectionBuilder {
            questions: questions.to_vec(),
            votes: Vec::new(),
            rules: VoteRules::DEFAULT_RULES,
            now: 0,
            next_sequence: 0,
        })
    }

    /// Sets the rules used by [`ElectionBuilder::tally`].
    pub fn rules(self, rules: &VoteRules) -> Result<ElectionBuilder, VotingErrors> {
        rules.validate()?;
        Ok(ElectionBuilder {
            rules: rules.clone(),
            ..self
        })
    }

    /// Moves the clock of the builder. It cannot go backwards.
    pub fn at(&mut self, now: Timestamp) -> Result<(), VotingErrors> {
        if now < self.now {
            return Err(VotingErrors::InvalidRules(format!(
                "time cannot go back from {} to {}",
                self.now, now
            )));
        }
        self.now = now;
        Ok(())
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn raw_votes(&self) -> &[RawVote] {
        &self.votes
    }

    /// Adds a direct vote.
    ///
    /// answers: for each question of the election, the selected answer values in order.
    /// Answers are not checked here: unknown values make a dirty ballot when counting.
    pub fn add_vote(&mut self, voter: &str, answers: &[&[&str]]) -> Result<(), VotingErrors> {
        let kind = RawVoteKind::Direct(
            answers
                .iter()
                .map(|choices| choices.iter().map(|c| c.to_string()).collect())
                .collect(),
        );
        self.push(voter, kind)
    }

    /// Adds a direct vote for an election with a single question.
    pub fn add_vote_simple(&mut self, voter: &str, choices: &[&str]) -> Result<(), VotingErrors> {
        self.add_vote(voter, &[choices])
    }

    pub fn add_delegation(&mut self, voter: &str, delegate: &str) -> Result<(), VotingErrors> {
        self.push(voter, RawVoteKind::Delegation(delegate.to_string()))
    }

    /// Invalidates all the current records of a voter.
    ///
    /// Returns the number of records invalidated.
    pub fn invalidate(&mut self, voter: &str) -> usize {
        let now = self.now;
        let mut count = 0;
        for v in self
            .votes
            .iter_mut()
            .filter(|v| v.voter == voter && v.invalidated_at.is_none())
        {
            v.invalidated_at = Some(now);
            count += 1;
        }
        count
    }

    /// Adds a record as provided, without stamping it.
    pub fn add_raw_vote(&mut self, vote: RawVote) -> Result<(), VotingErrors> {
        vote.validate()?;
        self.next_sequence = self.next_sequence.max(vote.sequence + 1);
        self.votes.push(vote);
        Ok(())
    }

    /// Counts the question at `question_index` with all the current records.
    pub fn tally(&self, question_index: usize) -> Result<TallyResult, VotingErrors> {
        crate::tally_question(&self.questions, &self.votes, question_index, None, &self.rules)
    }

    fn push(&mut self, voter: &str, kind: RawVoteKind) -> Result<(), VotingErrors> {
        let vote = RawVote {
            voter: voter.to_string(),
            kind,
            cast_at: self.now,
            sequence: self.next_sequence,
            invalidated_at: None,
        };
        vote.validate()?;
        self.next_sequence += 1;
        self.votes.push(vote);
        Ok(())
    }
}
