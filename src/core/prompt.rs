use std::io::{BufRead, Write};

/// Asks the user a question and returns the trimmed answer.
///
/// `None` means the user gave no answer (empty line or closed input).
pub trait Prompter {
    fn ask(&mut self, question: &str) -> Option<String>;
}

/// Prompter reading answers from stdin
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, question: &str) -> Option<String> {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", question);
        let _ = stdout.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let answer = line.trim();
                (!answer.is_empty()).then(|| answer.to_string())
            }
        }
    }
}

/// Result of asking the user to pick among numbered options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Picked(usize),
    Skipped,
    Invalid(String),
}

/// Show `options` numbered from 1 and ask for one of them.
pub fn choose_one(prompter: &mut dyn Prompter, title: &str, options: &[String]) -> Choice {
    let mut question = format!("{}\n", title);
    for (i, option) in options.iter().enumerate() {
        question.push_str(&format!("  [{}] {}\n", i + 1, option));
    }
    question.push_str("> ");

    match prompter.ask(&question) {
        None => Choice::Skipped,
        Some(answer) => match parse_index(&answer, options.len()) {
            Some(index) => Choice::Picked(index),
            None => Choice::Invalid(answer),
        },
    }
}

/// Ask for a comma-separated list of 1-based indices into `count` options.
///
/// Returns `Ok(vec![])` when the user skips, `Err(answer)` on malformed input.
pub fn choose_many(
    prompter: &mut dyn Prompter,
    question: &str,
    count: usize,
) -> std::result::Result<Vec<usize>, String> {
    let answer = match prompter.ask(question) {
        Some(answer) => answer,
        None => return Ok(Vec::new()),
    };

    let mut picked = Vec::new();
    for part in answer.split(',') {
        let index = parse_index(part, count).ok_or_else(|| answer.clone())?;
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    Ok(picked)
}

/// Yes/no question defaulting to no.
pub fn confirm(prompter: &mut dyn Prompter, question: &str) -> bool {
    matches!(
        prompter.ask(question).map(|a| a.to_lowercase()).as_deref(),
        Some("y") | Some("yes")
    )
}

/// Confirmation that only accepts the exact `literal`.
pub fn confirm_exact(prompter: &mut dyn Prompter, question: &str, literal: &str) -> bool {
    prompter.ask(question).as_deref() == Some(literal)
}

fn parse_index(answer: &str, count: usize) -> Option<usize> {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=count).contains(n))
        .map(|n| n - 1)
}

/// Prompter replaying canned answers, recording every question it was asked
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: std::collections::VecDeque<Option<String>>,
    pub questions: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(|a| a.map(Into::into)).collect(),
            questions: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str) -> Option<String> {
        self.questions.push(question.to_string());
        self.answers.pop_front().flatten()
    }
}
