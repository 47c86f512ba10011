//! Synonym-aware concept overlap between the analyzer's extracted concepts
//! and the concepts a student mentions in a transcribed viva answer.
//!
//! Both sides are lowercased, stemmed by a small suffix rule set and mapped
//! through a fixed synonym table before a plain Jaccard index is computed.
//! The table is a versioned artifact: persisted overlap scores carry
//! [`SYNONYMS_VERSION`] so historical records stay interpretable when the
//! table grows.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

pub const SYNONYMS_VERSION: u32 = 1;

/// Synonym groups. The first entry of each group is the canonical
/// representative and matches the concept names the analyzer emits.
pub const SYNONYM_GROUPS: &[&[&str]] = &[
    &["loop", "loops", "looping", "iteration", "iterate", "iterating", "for", "while"],
    &["hash_map", "hashmap", "dictionary", "dict", "map", "mapping", "lookup_table", "key_value"],
    &["recursion", "recursive", "recurse", "self_call", "calls_itself"],
    &["base_case", "terminating_condition", "stopping_condition", "stop_condition", "termination", "base_condition"],
    &["array", "arrays", "list", "lists", "elements", "sequence"],
    &["set", "sets", "unique", "distinct", "deduplicate"],
    &["stack", "lifo", "push", "pop"],
    &["queue", "fifo", "enqueue", "dequeue", "deque"],
    &["tree", "trees", "binary_tree", "bst", "subtree"],
    &["graph", "graphs", "vertex", "vertices", "adjacency"],
    &["linked_list", "node", "head_node", "next_pointer"],
    &["sorting", "sort", "sorted", "ordering", "arrange"],
    &["searching", "search", "find", "lookup", "locate"],
    &["binary_search", "half_interval", "midpoint", "bisect"],
    &["dynamic_programming", "dp", "memoization", "memoize", "memo", "tabulation", "subproblem"],
    &["divide_and_conquer", "divide", "conquer", "merge", "split", "halving"],
    &["two_pointer", "two_pointers", "left_pointer", "right_pointer", "converge"],
    &["sliding_window", "window", "window_size"],
    &["greedy", "locally_optimal", "best_choice"],
    &["brute_force", "naive", "exhaustive", "nested_loops"],
    &["time_complexity", "big_o", "complexity", "runtime", "efficiency"],
    &["space_complexity", "memory_usage", "extra_space"],
    &["functions", "function", "method", "subroutine", "def", "procedure"],
    &["conditionals", "conditional", "if", "else", "branch", "branching"],
    &["variables", "variable", "assignment", "assign"],
    &["string", "strings", "text", "substring", "characters"],
    &["index", "indices", "indexes", "position", "offset"],
    &["invariant", "property", "maintained"],
    &["edge_case", "boundary", "corner_case", "empty_input", "special_case"],
    &["return_value", "return", "returns", "returning", "output"],
    &["parameter", "parameters", "argument", "arguments", "input"],
    &["accumulator", "accumulate", "running_total", "sum", "total"],
    &["counter", "count", "increment", "decrement"],
    &["infinite_loop", "no_termination", "never_ends", "endless"],
    &["off_by_one", "boundary_error", "one_too_many"],
    &["call_stack", "stack_frame", "stack_overflow"],
    &["comparison", "compare", "comparing", "less_than", "greater_than"],
];

/// Strip `-ing`, `-ed` and plural `-s` from one lowercase token.
fn stem(token: &str) -> String {
    let t = token.to_lowercase();
    if t.len() > 5 {
        if let Some(base) = t.strip_suffix("ing") {
            return base.to_string();
        }
    }
    if t.len() > 4 {
        if let Some(base) = t.strip_suffix("ed") {
            return base.to_string();
        }
    }
    if t.len() > 3 && !t.ends_with("ss") {
        if let Some(base) = t.strip_suffix('s') {
            return base.to_string();
        }
    }
    t
}

/// Canonicalize a possibly multi-word concept: split on separators, stem
/// each part, rejoin with `_`. `"Calls itself"` and `"calls_itself"`
/// normalize identically.
fn canonical_token(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| stem(p))
        .collect::<Vec<_>>()
        .join("_")
}

fn group_index() -> &'static HashMap<String, usize> {
    static INDEX: OnceLock<HashMap<String, usize>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for (i, group) in SYNONYM_GROUPS.iter().enumerate() {
            for entry in group.iter() {
                index.insert(canonical_token(entry), i);
            }
        }
        index
    })
}

/// Expand a concept set: every token collapses to its synonym group's
/// canonical representative; tokens outside the table keep their
/// canonicalized form so they still participate in the Jaccard union.
pub fn expand<'a, I>(tokens: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let index = group_index();
    tokens
        .into_iter()
        .map(canonical_token)
        .filter(|t| !t.is_empty())
        .map(|t| match index.get(&t) {
            Some(&g) => SYNONYM_GROUPS[g][0].to_string(),
            None => t,
        })
        .collect()
}

/// Jaccard overlap of two concept sets after synonym expansion.
/// Returns 0 when either side is empty.
pub fn overlap_score<'a, A, B>(a: A, b: B) -> f64
where
    A: IntoIterator<Item = &'a str>,
    B: IntoIterator<Item = &'a str>,
{
    let ea = expand(a);
    let eb = expand(b);
    if ea.is_empty() || eb.is_empty() {
        return 0.0;
    }
    let intersection = ea.intersection(&eb).count() as f64;
    let union = ea.union(&eb).count() as f64;
    intersection / union
}

/// Extract the concept keywords a transcript mentions: every unigram and
/// adjacent bigram that resolves to a synonym group. Unknown words are
/// dropped — free-flowing speech would otherwise drown the Jaccard union.
pub fn transcript_concepts(text: &str) -> Vec<String> {
    let index = group_index();
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| stem(w))
        .collect();

    let mut found: HashSet<String> = HashSet::new();
    for window in words.windows(2) {
        let bigram = format!("{}_{}", window[0], window[1]);
        if let Some(&g) = index.get(&bigram) {
            found.insert(SYNONYM_GROUPS[g][0].to_string());
        }
    }
    for word in &words {
        if let Some(&g) = index.get(word) {
            found.insert(SYNONYM_GROUPS[g][0].to_string());
        }
    }

    let mut out: Vec<String> = found.into_iter().collect();
    out.sort();
    out
}
