use clap::Parser;

/// This is a vote tallying program for agoras: delegation, plurality and Meek STV.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the options for the STV questions. It takes precedence over
    /// the `tally` section of the election snapshot.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the outcome of an election in JSON format. If provided, agoratally will
    /// check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the election will be written in JSON format to the given
    /// location. It is printed on the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The election snapshot, or a BLT ballot file with --input-type blt.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default json) The type of the input: json or blt. See documentation for the formats.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (number, optional) Only count the question at this index (starting at 0).
    #[clap(short, long, value_parser)]
    pub question: Option<usize>,

    /// (directory, optional) If specified, the ballots of each STV question are written there in the BLT
    /// format and counted from that file. Only one tally can run at a time in a given directory.
    #[clap(long, value_parser)]
    pub ballots_dir: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
