use crate::{ErrorCode, ErrorContext, QueryLensError};

impl From<std::io::Error> for QueryLensError {
    fn from(err: std::io::Error) -> Self {
        QueryLensError::new(ErrorCode::InternalPanic, err.to_string())
    }
}

impl From<serde_json::Error> for QueryLensError {
    fn from(err: serde_json::Error) -> Self {
        QueryLensError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_yaml::Error> for QueryLensError {
    fn from(err: serde_yaml::Error) -> Self {
        QueryLensError::new(ErrorCode::InvalidQueryDefinition, err.to_string()).with_context(
            ErrorContext::Config {
                file_path: None,
                field: err.location().map(|l| format!("line {}", l.line())),
            },
        )
    }
}

/// Levenshtein-based suggestion for misspelled identifiers (e.g. record categories).
pub fn find_closest_match(target: &str, options: &[String]) -> Option<String> {
    let mut best_match: Option<&str> = None;
    let mut min_distance = usize::MAX;

    for option in options {
        let distance = levenshtein(target, option);
        if distance < min_distance && distance <= 3 {
            min_distance = distance;
            best_match = Some(option.as_str());
        }
    }

    best_match.map(|s| s.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
