//! Anonymized peer ranking (Stage 2).
//!
//! Stage-1 answers are shown to rankers as "Response A", "Response B", … so that no model
//! can favour a provider by name. Each ranker ends its critique with a `FINAL RANKING:`
//! section; [`parse_ranking_from_text`] turns that into an ordered list of labels and
//! [`calculate_aggregate_rankings`] averages the positions per model.

use crate::llmcouncil::orchestrator::{AggregateRanking, RankingEntry, ResultStatus, Stage1Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const FINAL_RANKING_HEADER: &str = "FINAL RANKING:";

lazy_static! {
    static ref NUMBERED_LABEL_RE: Regex =
        Regex::new(r"(?m)^\s*\d+[.)]\s*\**\s*(Response [A-Z]+)\b")
            .expect("NUMBERED_LABEL_RE regex should compile");
    static ref LABEL_RE: Regex =
        Regex::new(r"\bResponse [A-Z]+\b").expect("LABEL_RE regex should compile");
}

/// A Stage-1 answer under its anonymous label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledResponse {
    /// e.g. `"Response A"`
    pub label: String,
    pub model: String,
    pub response: String,
}

/// Letters for the `index`-th label: A…Z, then AA, AB, …
pub fn label_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Label every rankable Stage-1 answer, in council order. Failed answers and empty texts
/// are left out.
pub fn assign_labels(results: &[Stage1Result]) -> Vec<LabeledResponse> {
    results
        .iter()
        .filter(|r| r.status != ResultStatus::Failed && !r.response.trim().is_empty())
        .enumerate()
        .map(|(idx, r)| LabeledResponse {
            label: format!("Response {}", label_letters(idx)),
            model: r.model.clone(),
            response: r.response.clone(),
        })
        .collect()
}

/// `label -> model` for de-anonymizing rankings on the client side.
pub fn label_to_model(labeled: &[LabeledResponse]) -> BTreeMap<String, String> {
    labeled
        .iter()
        .map(|l| (l.label.clone(), l.model.clone()))
        .collect()
}

/// The prompt every ranking model receives.
pub fn build_ranking_prompt(query: &str, labeled: &[LabeledResponse]) -> String {
    let responses_text = labeled
        .iter()
        .map(|l| format!("{}:\n{}", l.label, l.response))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are evaluating different responses to the following question:

Question: {query}

Here are the responses from different models (anonymized):

{responses_text}

Your task:
1. First, evaluate each response individually. For each response, explain what it does well and what it does poorly.
2. Then, at the very end of your response, provide a final ranking.

IMPORTANT: Your final ranking MUST be formatted EXACTLY as follows:
- Start with the line \"{FINAL_RANKING_HEADER}\" (all caps, with colon)
- Then list the responses from best to worst as a numbered list
- Each line should be: number, period, space, then ONLY the response label (e.g., \"1. Response A\")
- Do not add any other text or explanations in the ranking section

Example of the correct format for your ENTIRE response:

Response A provides good detail on X but misses Y...
Response B is accurate but lacks depth on Z...
Response C offers the most comprehensive answer...

{FINAL_RANKING_HEADER}
1. Response C
2. Response A
3. Response B

Now provide your evaluation and ranking:"
    )
}

/// Ordered labels from a ranker's output.
///
/// Looks at the text after the last `FINAL RANKING:` header, preferring numbered lines
/// (`1. Response C`); without numbered lines every `Response X` mention counts, in order.
/// Without a header the whole text is scanned. Repeated labels keep their first position.
pub fn parse_ranking_from_text(text: &str) -> Vec<String> {
    let section = match text.rfind(FINAL_RANKING_HEADER) {
        Some(pos) => &text[pos + FINAL_RANKING_HEADER.len()..],
        None => text,
    };

    let numbered: Vec<String> = NUMBERED_LABEL_RE
        .captures_iter(section)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let labels = if numbered.is_empty() {
        LABEL_RE
            .find_iter(section)
            .map(|m| m.as_str().to_string())
            .collect()
    } else {
        numbered
    };

    let mut seen = HashSet::new();
    labels.into_iter().filter(|l| seen.insert(l.clone())).collect()
}

/// Average position per model over every parsed ranking, best first.
///
/// Labels that map to no model are ignored. Ties are broken by model name so the output is
/// deterministic.
pub fn calculate_aggregate_rankings(
    rankings: &[RankingEntry],
    label_to_model: &BTreeMap<String, String>,
) -> Vec<AggregateRanking> {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for entry in rankings {
        let known = entry
            .parsed_ranking
            .iter()
            .filter_map(|label| label_to_model.get(label));
        for (idx, model) in known.enumerate() {
            positions.entry(model.as_str()).or_default().push(idx + 1);
        }
    }

    let mut aggregate: Vec<AggregateRanking> = positions
        .into_iter()
        .map(|(model, ranks)| {
            let average = ranks.iter().sum::<usize>() as f64 / ranks.len() as f64;
            AggregateRanking {
                model: model.to_string(),
                average_rank: (average * 100.0).round() / 100.0,
                rankings_count: ranks.len(),
            }
        })
        .collect();

    aggregate.sort_by(|a, b| {
        a.average_rank
            .partial_cmp(&b.average_rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.model.cmp(&b.model))
    });
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(model: &str, parsed: &[&str]) -> RankingEntry {
        RankingEntry {
            model: model.to_string(),
            ranking: String::new(),
            parsed_ranking: parsed.iter().map(|s| s.to_string()).collect(),
            status: ResultStatus::Success,
            error: None,
        }
    }

    #[test]
    fn labels_continue_past_z() {
        assert_eq!(label_letters(0), "A");
        assert_eq!(label_letters(25), "Z");
        assert_eq!(label_letters(26), "AA");
        assert_eq!(label_letters(27), "AB");
        assert_eq!(label_letters(701), "ZZ");
        assert_eq!(label_letters(702), "AAA");
    }

    #[test]
    fn failed_answers_are_not_labeled() {
        let results = vec![
            Stage1Result::success("m/a", "first"),
            Stage1Result::failed("m/b", "HTTP 500"),
            Stage1Result::success("m/c", "third"),
        ];
        let labeled = assign_labels(&results);
        assert_eq!(labeled.len(), 2);
        assert_eq!(labeled[0].label, "Response A");
        assert_eq!(labeled[1].label, "Response B");
        assert_eq!(labeled[1].model, "m/c");
    }

    #[test]
    fn parses_numbered_final_ranking() {
        let text = "Response A is thorough. Response B is short.\n\nFINAL RANKING:\n1. Response B\n2. Response A\n3. Response C";
        assert_eq!(
            parse_ranking_from_text(text),
            vec!["Response B", "Response A", "Response C"]
        );
    }

    #[test]
    fn falls_back_to_mentions_after_header() {
        let text = "Critique...\nFINAL RANKING: Response C, then Response A, then Response C again";
        assert_eq!(parse_ranking_from_text(text), vec!["Response C", "Response A"]);
    }

    #[test]
    fn no_labels_means_empty_ranking() {
        assert!(parse_ranking_from_text("I refuse to rank these.").is_empty());
    }

    #[test]
    fn prompt_lists_labeled_responses() {
        let labeled = vec![LabeledResponse {
            label: "Response A".into(),
            model: "m/a".into(),
            response: "Paris".into(),
        }];
        let prompt = build_ranking_prompt("Capital of France?", &labeled);
        assert!(prompt.contains("Question: Capital of France?"));
        assert!(prompt.contains("Response A:\nParis"));
        assert!(!prompt.contains("m/a"));
    }

    #[test]
    fn aggregates_average_positions() {
        let map: BTreeMap<String, String> = [
            ("Response A".to_string(), "m/a".to_string()),
            ("Response B".to_string(), "m/b".to_string()),
            ("Response C".to_string(), "m/c".to_string()),
        ]
        .into_iter()
        .collect();
        let rankings = vec![
            entry("r1", &["Response B", "Response A", "Response C"]),
            entry("r2", &["Response A", "Response B", "Response C"]),
            entry("r3", &["Response B", "Response Z", "Response C", "Response A"]),
            entry("r4", &[]),
        ];

        let aggregate = calculate_aggregate_rankings(&rankings, &map);
        assert_eq!(aggregate[0].model, "m/b");
        assert_eq!(aggregate[0].average_rank, 1.33);
        assert_eq!(aggregate[0].rankings_count, 3);
        assert_eq!(aggregate[1].model, "m/a");
        assert_eq!(aggregate[1].average_rank, 2.0);
        assert_eq!(aggregate[2].model, "m/c");
        assert_eq!(aggregate[2].average_rank, 2.67);
    }
}
