//! Structural code analyzer: parses a submission into an AST, walks it and
//! distills an algorithm-pattern fingerprint, per-function profiles, issue
//! flags and curriculum concepts.
//!
//! Pure and deterministic: identical input always yields an identical
//! result, and student logic errors never surface as `Err` — only an
//! unsupported language does. Language backends plug in behind
//! [`CodeAnalyzer::analyze`]; each backend reduces its AST to the shared
//! [`SourceFacts`] and the classification below is language-independent.

pub mod python;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmPattern {
    Iterative,
    Recursive,
    DivideAndConquer,
    DynamicProgramming,
    Greedy,
    BruteForce,
    TwoPointer,
    SlidingWindow,
    Unknown,
}

impl AlgorithmPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iterative => "iterative",
            Self::Recursive => "recursive",
            Self::DivideAndConquer => "divide_and_conquer",
            Self::DynamicProgramming => "dynamic_programming",
            Self::Greedy => "greedy",
            Self::BruteForce => "brute_force",
            Self::TwoPointer => "two_pointer",
            Self::SlidingWindow => "sliding_window",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeIssue {
    MissingBaseCase,
    InfiniteLoopSuspect,
    UnreachableCode,
    UnusedVariable,
    ShadowedName,
    MissingReturn,
    OffByOneSuspect,
    MagicNumber,
    DeepNesting,
    BroadExcept,
    UndefinedName,
    MutationInIterator,
}

impl CodeIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingBaseCase => "missing_base_case",
            Self::InfiniteLoopSuspect => "infinite_loop_suspect",
            Self::UnreachableCode => "unreachable_code",
            Self::UnusedVariable => "unused_variable",
            Self::ShadowedName => "shadowed_name",
            Self::MissingReturn => "missing_return",
            Self::OffByOneSuspect => "off_by_one_suspect",
            Self::MagicNumber => "magic_number",
            Self::DeepNesting => "deep_nesting",
            Self::BroadExcept => "broad_except",
            Self::UndefinedName => "undefined_name",
            Self::MutationInIterator => "mutation_in_iterator",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProfile {
    pub name: String,
    pub params: Vec<String>,
    pub has_return: bool,
    pub is_recursive: bool,
    pub has_base_case: bool,
    pub calls: Vec<String>,
    pub cyclomatic_complexity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeMetrics {
    pub functions: u32,
    pub loops: u32,
    pub conditionals: u32,
    pub variables: u32,
    pub complexity: u32,
    pub has_recursion: bool,
    pub nesting_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAnalysisResult {
    pub is_valid: bool,
    pub syntax_errors: Vec<String>,
    pub algorithm_pattern: AlgorithmPattern,
    pub function_profiles: Vec<FunctionProfile>,
    pub metrics: CodeMetrics,
    pub issues: Vec<CodeIssue>,
    pub extracted_concepts: Vec<String>,
    /// Plain-English digest injected into LLM prompts.
    pub summary: String,
}

impl CodeAnalysisResult {
    /// Neutral result for unparseable code: every field present, nothing
    /// inferred.
    pub fn invalid(syntax_errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            syntax_errors,
            algorithm_pattern: AlgorithmPattern::Unknown,
            function_profiles: Vec::new(),
            metrics: CodeMetrics::default(),
            issues: Vec::new(),
            extracted_concepts: Vec::new(),
            summary: "Code does not parse".to_string(),
        }
    }

    /// The concept a submission most strongly evidences, used when the
    /// caller did not name one.
    pub fn primary_concept(&self) -> Option<&str> {
        self.extracted_concepts.first().map(|s| s.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Language-independent structural facts a backend visitor distills from
/// its AST. Everything downstream (pattern, concepts, metrics) derives
/// from this.
#[derive(Debug, Default)]
pub struct SourceFacts {
    pub functions: Vec<FunctionProfile>,
    pub loops: u32,
    pub conditionals: u32,
    pub bool_connectives: u32,
    pub nesting_depth: u32,
    pub variables: BTreeSet<String>,
    pub imported: BTreeSet<String>,
    pub max_self_calls: u32,
    pub uses_list: bool,
    pub uses_dict: bool,
    pub uses_set: bool,
    pub calls_sort: bool,
    pub issues: BTreeSet<CodeIssue>,
}

impl SourceFacts {
    pub fn has_recursion(&self) -> bool {
        self.functions.iter().any(|f| f.is_recursive)
    }

    fn has_any_var(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.variables.contains(*n))
    }

    fn has_var_containing(&self, fragments: &[&str]) -> bool {
        self.variables
            .iter()
            .any(|v| fragments.iter().any(|f| v.contains(f)))
    }
}

#[derive(Debug, Default, Clone)]
pub struct CodeAnalyzer;

impl CodeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, code: &str, language: &str) -> Result<CodeAnalysisResult, AnalyzerError> {
        match language.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(python::analyze(code)),
            other => Err(AnalyzerError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Turn collected facts into the final result. Shared by every language
/// backend.
pub(crate) fn assemble(facts: SourceFacts) -> CodeAnalysisResult {
    let pattern = detect_pattern(&facts);
    let concepts = extract_concepts(&facts, pattern);
    let metrics = CodeMetrics {
        functions: facts.functions.len() as u32,
        loops: facts.loops,
        conditionals: facts.conditionals,
        variables: facts.variables.len() as u32,
        complexity: 1 + facts.conditionals + facts.loops + facts.bool_connectives,
        has_recursion: facts.has_recursion(),
        nesting_depth: facts.nesting_depth,
    };
    let summary = build_summary(&facts, pattern);
    let issues: Vec<CodeIssue> = facts.issues.iter().copied().collect();

    CodeAnalysisResult {
        is_valid: true,
        syntax_errors: Vec::new(),
        algorithm_pattern: pattern,
        function_profiles: facts.functions,
        metrics,
        issues,
        extracted_concepts: concepts,
        summary,
    }
}

/// Fixed-precedence pattern classification. The recursive family is
/// refined most-specific-first, then the loop family; earlier rules win
/// ties.
fn detect_pattern(facts: &SourceFacts) -> AlgorithmPattern {
    let has_memo = facts.has_var_containing(&["memo", "cache", "dp", "table", "matrix"]);
    let has_low_high = (facts.has_any_var(&["lo", "left", "l", "low", "start"])
        && facts.has_any_var(&["hi", "right", "r", "high", "end"]))
        || facts.has_any_var(&["mid", "middle"]);
    let has_window = facts.has_var_containing(&["window"])
        || (facts.has_any_var(&["start"]) && facts.has_any_var(&["end"]) && facts.loops > 0);
    let nested = facts.nesting_depth >= 2 && facts.loops >= 2;

    if facts.has_recursion() {
        if facts.max_self_calls >= 2 && has_low_high {
            return AlgorithmPattern::DivideAndConquer;
        }
        if has_memo {
            return AlgorithmPattern::DynamicProgramming;
        }
        return AlgorithmPattern::Recursive;
    }

    if facts.loops > 0 && has_low_high && !has_window {
        return AlgorithmPattern::TwoPointer;
    }
    if facts.loops > 0 && has_window {
        return AlgorithmPattern::SlidingWindow;
    }
    if nested && has_memo {
        return AlgorithmPattern::DynamicProgramming;
    }
    if facts.calls_sort && facts.loops > 0 && !nested {
        return AlgorithmPattern::Greedy;
    }
    if nested {
        return AlgorithmPattern::BruteForce;
    }
    if facts.loops > 0 {
        return AlgorithmPattern::Iterative;
    }
    AlgorithmPattern::Unknown
}

/// Map structure to canonical curriculum concept tokens (they line up with
/// the overlap module's synonym table).
fn extract_concepts(facts: &SourceFacts, pattern: AlgorithmPattern) -> Vec<String> {
    let mut concepts: Vec<&str> = Vec::new();
    let mut push = |c: &'static str, list: &mut Vec<&str>| {
        if !list.contains(&c) {
            list.push(c);
        }
    };

    match pattern {
        AlgorithmPattern::Recursive => push("recursion", &mut concepts),
        AlgorithmPattern::DivideAndConquer => {
            push("recursion", &mut concepts);
            push("divide_and_conquer", &mut concepts);
        }
        AlgorithmPattern::DynamicProgramming => {
            push("dynamic_programming", &mut concepts);
            if facts.has_recursion() {
                push("recursion", &mut concepts);
            }
        }
        AlgorithmPattern::TwoPointer => {
            push("two_pointer", &mut concepts);
            push("array", &mut concepts);
        }
        AlgorithmPattern::SlidingWindow => {
            push("sliding_window", &mut concepts);
            push("array", &mut concepts);
        }
        AlgorithmPattern::Greedy => {
            push("greedy", &mut concepts);
            push("sorting", &mut concepts);
        }
        AlgorithmPattern::BruteForce => {
            push("brute_force", &mut concepts);
            push("time_complexity", &mut concepts);
        }
        AlgorithmPattern::Iterative | AlgorithmPattern::Unknown => {}
    }

    if facts.loops > 0 {
        push("loop", &mut concepts);
    }
    if !facts.functions.is_empty() {
        push("functions", &mut concepts);
    }
    if facts.conditionals > 0 {
        push("conditionals", &mut concepts);
    }
    if facts.uses_list {
        push("array", &mut concepts);
    }
    if facts.uses_dict {
        push("hash_map", &mut concepts);
    }
    if facts.uses_set {
        push("set", &mut concepts);
    }

    // Identifier hints: function and variable names carry intent.
    let names: Vec<String> = facts
        .functions
        .iter()
        .map(|f| f.name.to_lowercase())
        .chain(facts.variables.iter().map(|v| v.to_lowercase()))
        .collect();
    for name in &names {
        if name.contains("binary_search") || name.contains("bisect") {
            push("binary_search", &mut concepts);
        } else if name.contains("sort") {
            push("sorting", &mut concepts);
        }
        if name.contains("search") || name.contains("find") {
            push("searching", &mut concepts);
        }
        if name.contains("stack") {
            push("stack", &mut concepts);
        }
        if name.contains("queue") || name.contains("deque") {
            push("queue", &mut concepts);
        }
        if name.contains("tree") || name.contains("root") || name == "node" {
            push("tree", &mut concepts);
        }
    }

    if facts.issues.contains(&CodeIssue::MissingBaseCase) {
        push("base_case", &mut concepts);
    }

    concepts.into_iter().map(|s| s.to_string()).collect()
}

fn build_summary(facts: &SourceFacts, pattern: AlgorithmPattern) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !facts.functions.is_empty() {
        let names: Vec<&str> = facts.functions.iter().map(|f| f.name.as_str()).collect();
        parts.push(format!(
            "defines {} function(s): {}",
            names.len(),
            names.join(", ")
        ));
    }
    parts.push(format!(
        "uses a {} approach",
        pattern.as_str().replace('_', " ")
    ));
    if facts.loops > 0 {
        parts.push(format!("{} loop(s)", facts.loops));
    }
    if !facts.issues.is_empty() {
        let names: Vec<&str> = facts.issues.iter().map(|i| i.as_str()).collect();
        parts.push(format!("potential issues: {}", names.join(", ")));
    }
    if facts.nesting_depth >= 2 && facts.loops >= 2 {
        parts.push("nested loops detected".to_string());
    }
    format!("Student's code {}.", parts.join("; "))
}
