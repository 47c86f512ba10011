//! Prompt templates and deterministic fallbacks for hint generation.
//!
//! The LLM is style, not truth: every prompt is parameterized from the
//! analyzer's output, and every level has a hand-written fallback derived
//! from the detected issues so the tutor keeps working with the LLM down.
//! Levels 1–3 must never contain literal solution code; the fence filter
//! below enforces that after generation.

use crate::analyzer::{AlgorithmPattern, CodeAnalysisResult, CodeIssue};

use super::HintPath;

pub fn hint_system_prompt(path: HintPath, level: u8) -> String {
    let base = "You are a Socratic programming tutor. You are given a structural \
                analysis of the student's code. Always reference specific elements \
                from their code (function names, parameters, detected issues); \
                never give generic advice. ";

    let path_addon = match path {
        HintPath::Gentle => {
            "The student is frustrated. Be warm and encouraging, and break the \
             problem into a smaller first step. "
        }
        HintPath::Socratic => "",
        HintPath::Challenge => {
            "The student is comfortable. Push harder: ask about complexity, edge \
             cases or alternative approaches. "
        }
    };

    let level_addon = match level {
        1 => "Ask ONE concise guiding question. Do not name an algorithm, do not \
              give the answer, and do not show any code.",
        2 => "Identify the category of the missing idea (for example: a \
              termination condition, an accumulator). Do not show code.",
        3 => "Give a shape-of-solution sketch in words with blanks for the \
              student to fill. Do not show runnable code and never use fenced \
              code blocks.",
        _ => "Be explicit: point at the exact flaw and the minimal correction, \
              but leave the final edit to the student.",
    };

    format!("{base}{path_addon}{level_addon}")
}

pub fn hint_user_prompt(
    problem_description: &str,
    code: &str,
    analysis: &CodeAnalysisResult,
    previous_hint: Option<&str>,
) -> String {
    let issues = if analysis.issues.is_empty() {
        "none detected".to_string()
    } else {
        analysis
            .issues
            .iter()
            .map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut prompt = format!(
        "PROBLEM:\n{problem_description}\n\n\
         STUDENT'S CODE:\n{code}\n\n\
         STRUCTURAL ANALYSIS:\n\
         - approach: {}\n\
         - summary: {}\n\
         - detected issues: {issues}\n",
        analysis.algorithm_pattern.as_str(),
        analysis.summary,
    );

    if let Some(previous) = previous_hint {
        prompt.push_str(&format!(
            "\nPREVIOUS HINT (do not repeat it, go one step further):\n{previous}\n"
        ));
    }

    prompt.push_str("\nThe student appears to be stuck. Produce the next hint.");
    prompt
}

/// Appended to the system prompt on the single retry after a hint leaked
/// code.
pub const STRICT_RETRY_ADDON: &str =
    " IMPORTANT: your previous answer contained a code block, which is not \
     allowed at this hint level. Answer again in plain prose only, with no \
     code, no backticks and no fenced blocks.";

pub fn contains_code_fence(text: &str) -> bool {
    text.contains("```")
}

/// Deterministic hint used when the LLM is unavailable or keeps violating
/// the no-code policy. Derived from the highest-priority detected issue.
pub fn fallback_hint(level: u8, analysis: &CodeAnalysisResult) -> String {
    let issue = analysis.issues.first().copied();
    match issue {
        Some(CodeIssue::MissingBaseCase) => match level {
            1 => "What should your function return in the simplest case?".to_string(),
            2 => "Consider the termination condition of your recursion: when should the \
                  function stop calling itself?"
                .to_string(),
            3 => "Shape of the fix: first check for the smallest input and return a \
                  concrete value, otherwise combine the recursive result. Which of \
                  those two parts is missing from your function?"
                .to_string(),
            _ => "Your recursive function never stops. Add a condition at the very top \
                  that returns a fixed value for the smallest input, before any \
                  recursive call."
                .to_string(),
        },
        Some(CodeIssue::InfiniteLoopSuspect) => match level {
            1 => "What makes your loop condition eventually become false?".to_string(),
            2 => "Think about loop progress: something in the condition has to change on \
                  every pass."
                .to_string(),
            3 => "Sketch: before the loop set up your counter, inside the loop do the \
                  work and then move the counter forward. Which step is your loop \
                  missing?"
                .to_string(),
            _ => "Your loop body never changes the variables its condition tests, so it \
                  cannot terminate. Update the loop variable inside the body."
                .to_string(),
        },
        Some(CodeIssue::MissingReturn) => match level {
            1 => "What should your function hand back to its caller?".to_string(),
            2 => "A function that computes something needs to return its result, not \
                  just build it."
                .to_string(),
            3 => "Sketch: compute the result into a variable, then make the last line of \
                  the function return that variable. Where does your result end up now?"
                .to_string(),
            _ => "Your function computes a value but never returns it. Add a return \
                  statement with the result as the final line."
                .to_string(),
        },
        Some(CodeIssue::OffByOneSuspect) => match level {
            1 => "What happens on the very last index your loop touches?".to_string(),
            2 => "Check your boundary: inclusive and exclusive ranges differ by exactly \
                  one element."
                .to_string(),
            3 => "Walk the loop with a two-element input and write down every index it \
                  visits. Which visit is one too many or one too few?"
                .to_string(),
            _ => "Your comparison against the length is inclusive, so the loop runs one \
                  step past the last valid index. Tighten the bound by one."
                .to_string(),
        },
        Some(CodeIssue::MutationInIterator) => match level {
            1 => "What happens to your loop when the collection it walks over changes \
                  underneath it?"
                .to_string(),
            2 => "Modifying a collection while iterating over it skips or repeats \
                  elements; consider collecting changes first."
                .to_string(),
            3 => "Sketch: build a second collection of the elements you want to keep \
                  while looping, then replace the original afterwards. Where does your \
                  code mutate the original mid-loop?"
                .to_string(),
            _ => "You remove elements from the same list you are iterating over, which \
                  skips the element after every removal. Iterate over a copy or build a \
                  new list instead."
                .to_string(),
        },
        Some(CodeIssue::UndefinedName) => match level {
            1 => "Does every name you read in the function get a value first?".to_string(),
            2 => "One of the names you use is never defined anywhere the function can \
                  see it."
                .to_string(),
            3 => "List every variable the function reads and, next to each, where it is \
                  assigned. One entry has no assignment; that is your bug."
                .to_string(),
            _ => "You reference a name that is never assigned or imported. Define it \
                  before first use or fix the spelling."
                .to_string(),
        },
        _ => generic_hint(level, analysis.algorithm_pattern),
    }
}

fn generic_hint(level: u8, pattern: AlgorithmPattern) -> String {
    match level {
        1 => "Walk through your code with the smallest input you can think of. Where \
              does its behavior first surprise you?"
            .to_string(),
        2 => match pattern {
            AlgorithmPattern::Recursive | AlgorithmPattern::DivideAndConquer => {
                "Check the two halves of any recursive solution: the case that stops and \
                 the case that shrinks the problem."
                    .to_string()
            }
            AlgorithmPattern::Iterative | AlgorithmPattern::BruteForce => {
                "Check what your loop maintains between passes: what must be true before, \
                 during and after it runs?"
                    .to_string()
            }
            _ => "Identify the one quantity your solution must keep track of, then check \
                  every place it changes."
                .to_string(),
        },
        3 => "Sketch your plan in plain words first: the setup, the repeated step and \
              the final answer. Compare the sketch line by line with your code; the \
              mismatch is the bug."
            .to_string(),
        _ => "Re-check the step your tests fail on and correct it directly; your overall \
              structure is sound."
            .to_string(),
    }
}
