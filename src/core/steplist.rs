//! Steplist range-expression parsing
//!
//! A steplist selects which step positions execute in a run. The grammar is a
//! comma-separated list of tokens, each a single non-negative integer or an
//! inclusive span `A-B`, e.g. `1-2,4,6`.

use crate::core::error::PipelineError;

/// Parse a steplist expression into a sorted, deduplicated set of step
/// positions.
///
/// The empty string is a distinct case meaning "all steps" (`0..step_count`),
/// matching the interactive prompt's `[all]` default. A whitespace-only or
/// otherwise unparseable expression is malformed and yields
/// [`PipelineError::MalformedSelection`] naming the offending token.
///
/// A span with `A > B` contributes no indices.
pub fn parse_steplist(input: &str, step_count: usize) -> Result<Vec<usize>, PipelineError> {
    let input = input.strip_suffix('\n').unwrap_or(input);
    let input = input.strip_suffix('\r').unwrap_or(input);

    if input.is_empty() {
        return Ok((0..step_count).collect());
    }

    let mut steplist = Vec::new();
    for token in input.split(',') {
        match token.split_once('-') {
            Some((start, stop)) => {
                // an empty span (start > stop) simply adds nothing
                let (start, stop) = parse_span(token, start, stop)?;
                steplist.extend(start..=stop);
            }
            None => {
                let idx: usize = token.trim().parse().map_err(|_| malformed(token))?;
                steplist.push(idx);
            }
        }
    }

    steplist.sort_unstable();
    steplist.dedup();
    Ok(steplist)
}

fn parse_span(token: &str, start: &str, stop: &str) -> Result<(usize, usize), PipelineError> {
    let start: usize = start.trim().parse().map_err(|_| malformed(token))?;
    let stop: usize = stop.trim().parse().map_err(|_| malformed(token))?;
    Ok((start, stop))
}

fn malformed(token: &str) -> PipelineError {
    PipelineError::MalformedSelection {
        token: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_spans_and_singles() {
        let list = parse_steplist("1-2,4,6", 10).unwrap();
        assert_eq!(list, vec![1, 2, 4, 6]);
    }

    #[test]
    fn test_empty_means_all() {
        let list = parse_steplist("", 4).unwrap();
        assert_eq!(list, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        // stdin lines arrive with their newline attached
        let list = parse_steplist("0,2\n", 4).unwrap();
        assert_eq!(list, vec![0, 2]);

        let list = parse_steplist("\n", 3).unwrap();
        assert_eq!(list, vec![0, 1, 2]);
    }

    #[test]
    fn test_malformed_span_names_token() {
        let err = parse_steplist("x-2", 10).unwrap_err();
        match err {
            PipelineError::MalformedSelection { token } => assert_eq!(token, "x-2"),
            other => panic!("expected MalformedSelection, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_single_token() {
        let err = parse_steplist("1,two,3", 10).unwrap_err();
        match err {
            PipelineError::MalformedSelection { token } => assert_eq!(token, "two"),
            other => panic!("expected MalformedSelection, got {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_only_is_malformed() {
        assert!(parse_steplist("   ", 5).is_err());
    }

    #[test]
    fn test_duplicates_and_overlaps_are_deduplicated() {
        let list = parse_steplist("1,1,0-2,2", 10).unwrap();
        assert_eq!(list, vec![0, 1, 2]);
    }

    #[test]
    fn test_reversed_span_contributes_nothing() {
        let list = parse_steplist("5-2,0", 10).unwrap();
        assert_eq!(list, vec![0]);
    }

    #[test]
    fn test_output_is_sorted() {
        let list = parse_steplist("6,4,1-2", 10).unwrap();
        assert_eq!(list, vec![1, 2, 4, 6]);
    }
}
