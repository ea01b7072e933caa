use std::path::Path;

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// The name of the ballot file of a question.
///
/// Only ASCII letters, digits, `-` and `_` are kept from the election name.
pub fn artifact_file_name(election_name: &str, question_index: usize) -> String {
    let mut stem: String = election_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        stem = "election".to_string();
    }
    format!("{}_q{}.blt", stem, question_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(artifact_file_name("Board 2024/25", 0), "Board_2024_25_q0.blt");
        assert_eq!(artifact_file_name("  ", 3), "election_q3.blt");
        assert_eq!(
            simplify_file_name(Path::new("/tmp/ballots/x_q1.blt")),
            "x_q1.blt"
        );
    }
}
