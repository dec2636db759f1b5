use crate::normalize::Normalizer;
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};

const MAX_DIFF_LINES: usize = 200;
const MAX_COUNT_LINES: usize = 20;

pub type LineCounts = BTreeMap<String, usize>;

/// How actual output is matched against an expected candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Normalized text must be identical.
    Exact,
    /// Same lines with the same multiplicities, in any order.
    Multiset,
}

/// An expected output, normalized once and reused across repeated runs.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub text: String,
    pub counts: LineCounts,
}

impl Candidate {
    pub fn new(name: impl Into<String>, raw: &str, normalizer: &Normalizer) -> Self {
        let text = normalizer.apply(raw);
        let counts = line_counts(&text);
        Self {
            name: name.into(),
            text,
            counts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Matched { candidate: String },
    Mismatched { closest: String, detail: String },
}

/// Compares normalized `actual` output against every candidate.
///
/// `actual_label` names the actual side in unified diff headers. With no
/// candidates the result is a mismatch with an empty closest name.
pub fn compare(mode: Mode, actual: &str, candidates: &[Candidate], actual_label: &str) -> Verdict {
    match mode {
        Mode::Exact => compare_exact(actual, candidates, actual_label),
        Mode::Multiset => compare_multiset(actual, candidates),
    }
}

fn compare_exact(actual: &str, candidates: &[Candidate], actual_label: &str) -> Verdict {
    let mut best: Option<(&str, String)> = None;
    for candidate in candidates {
        if candidate.text == actual {
            return Verdict::Matched {
                candidate: candidate.name.clone(),
            };
        }
        let diff = unified_diff(&candidate.text, actual, &candidate.name, actual_label);
        if best.as_ref().map_or(true, |(_, d)| diff.len() < d.len()) {
            best = Some((candidate.name.as_str(), diff));
        }
    }
    let (closest, detail) = best.unwrap_or_default();
    Verdict::Mismatched {
        closest: closest.to_string(),
        detail,
    }
}

fn compare_multiset(actual: &str, candidates: &[Candidate]) -> Verdict {
    let actual = line_counts(actual);
    let mut best: Option<(&Candidate, usize)> = None;
    for candidate in candidates {
        if candidate.counts == actual {
            return Verdict::Matched {
                candidate: candidate.name.clone(),
            };
        }
        let score = mismatch_score(&candidate.counts, &actual);
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((candidate, score));
        }
    }
    match best {
        Some((candidate, _)) => Verdict::Mismatched {
            closest: candidate.name.clone(),
            detail: summarize_count_diff(&candidate.counts, &actual),
        },
        None => Verdict::Mismatched {
            closest: String::new(),
            detail: String::new(),
        },
    }
}

pub fn line_counts(text: &str) -> LineCounts {
    let mut counts = LineCounts::new();
    for line in text.lines() {
        *counts.entry(line.to_string()).or_default() += 1;
    }
    counts
}

/// Sum of absolute count differences over every line seen on either side.
pub fn mismatch_score(expected: &LineCounts, actual: &LineCounts) -> usize {
    union_keys(expected, actual)
        .into_iter()
        .map(|line| count(expected, line).abs_diff(count(actual, line)))
        .sum()
}

pub fn summarize_count_diff(expected: &LineCounts, actual: &LineCounts) -> String {
    let mut diffs: Vec<(usize, &str, usize, usize)> = union_keys(expected, actual)
        .into_iter()
        .filter_map(|line| {
            let (e, a) = (count(expected, line), count(actual, line));
            (e != a).then(|| (e.abs_diff(a), line, e, a))
        })
        .collect();
    diffs.sort_by(|x, y| y.0.cmp(&x.0).then_with(|| y.1.cmp(x.1)));

    let mut lines: Vec<String> = diffs
        .iter()
        .take(MAX_COUNT_LINES)
        .map(|(_, line, e, a)| format!("    expected {e}, got {a}: {line:?}"))
        .collect();
    if diffs.len() > MAX_COUNT_LINES {
        lines.push(format!(
            "    ... {} more differing lines ...",
            diffs.len() - MAX_COUNT_LINES
        ));
    }
    lines.join("\n")
}

pub fn unified_diff(expected: &str, actual: &str, from: &str, to: &str) -> String {
    let diff = TextDiff::from_lines(expected, actual)
        .unified_diff()
        .missing_newline_hint(false)
        .header(from, to)
        .to_string();
    let lines: Vec<&str> = diff.split_inclusive('\n').collect();
    if lines.len() <= MAX_DIFF_LINES {
        return diff;
    }
    let mut out: String = lines[..MAX_DIFF_LINES].concat();
    out.push_str(&format!(
        "... diff truncated ({} more lines) ...\n",
        lines.len() - MAX_DIFF_LINES
    ));
    out
}

fn union_keys<'a>(expected: &'a LineCounts, actual: &'a LineCounts) -> BTreeSet<&'a str> {
    expected
        .keys()
        .chain(actual.keys())
        .map(String::as_str)
        .collect()
}

fn count(counts: &LineCounts, line: &str) -> usize {
    counts.get(line).copied().unwrap_or(0)
}
