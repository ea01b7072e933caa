use crate::tally::io_common::{artifact_file_name, simplify_file_name};
use crate::tally::*;

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};

pub const LOCK_FILE_NAME: &str = "tally.lock";

/// Marks a tally run in progress in a ballot directory.
///
/// The lock file is removed when the value is dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> CliResult<RunLock> {
        let dir_s = dir.display().to_string();
        fs::create_dir_all(dir).context(WritingFileSnafu { path: dir_s })?;
        let path = dir.join(LOCK_FILE_NAME);
        let path_s = path.display().to_string();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                writeln!(f, "{}", std::process::id()).context(WritingFileSnafu {
                    path: path_s.clone(),
                })?;
                debug!("RunLock: acquired {}", path_s);
                Ok(RunLock { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                TallyInProgressSnafu { path: path_s }.fail()
            }
            Err(e) => Err(e).context(WritingFileSnafu { path: path_s }),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("RunLock: could not remove {:?}: {}", self.path, e);
        }
    }
}

/// A ballot file being written.
///
/// The content goes to a partial file which only takes the final name on
/// `commit`. The partial file is removed if the artifact is dropped before.
#[derive(Debug)]
pub struct BallotArtifact {
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl BallotArtifact {
    pub fn new(dir: &Path, file_name: &str) -> BallotArtifact {
        BallotArtifact {
            partial: dir.join(format!("{}.partial", file_name)),
            target: dir.join(file_name),
            committed: false,
        }
    }

    pub fn write(&self, contents: &str) -> CliResult<()> {
        let path = self.partial.display().to_string();
        let mut f = File::create(&self.partial).context(WritingFileSnafu { path: path.clone() })?;
        f.write_all(contents.as_bytes())
            .context(WritingFileSnafu { path: path.clone() })?;
        f.sync_all().context(WritingFileSnafu { path })?;
        Ok(())
    }

    pub fn commit(mut self) -> CliResult<PathBuf> {
        fs::rename(&self.partial, &self.target).context(WritingFileSnafu {
            path: self.target.display().to_string(),
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for BallotArtifact {
    fn drop(&mut self) {
        if !self.committed && self.partial.exists() {
            debug!("BallotArtifact: removing {:?}", self.partial);
            if let Err(e) = fs::remove_file(&self.partial) {
                warn!("BallotArtifact: could not remove {:?}: {}", self.partial, e);
            }
        }
    }
}

/// Writes the ballots of a question in the BLT format.
/// Returns the path of the file.
pub fn write_question_blt(
    dir: &Path,
    election_name: &str,
    question_index: usize,
    question: &Question,
    ballots: &[AggregatedBallot],
) -> CliResult<PathBuf> {
    let artifact = BallotArtifact::new(dir, &artifact_file_name(election_name, question_index));
    artifact.write(&write_blt(question, ballots))?;
    let path = artifact.commit()?;
    info!(
        "write_question_blt: question {}: {} ballots written to {}",
        question_index,
        ballots.len(),
        simplify_file_name(&path)
    );
    Ok(path)
}

pub fn read_blt_file(path: &Path) -> CliResult<BltElection> {
    let path_s = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path_s.clone(),
    })?;
    let election = read_blt(&contents).context(MalformedBallotsSnafu { path: path_s })?;
    debug!(
        "read_blt_file: {}: {} candidates, {} distinct ballots",
        simplify_file_name(path),
        election.candidates.len(),
        election.ballots.len()
    );
    Ok(election)
}
