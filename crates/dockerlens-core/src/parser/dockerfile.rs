use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single normalized Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Upper-cased keyword (FROM, RUN, USER, ...).
    pub keyword: String,
    /// Everything after the keyword, untouched.
    pub value: String,
    /// The original source line, trimmed.
    pub raw: String,
}

impl Instruction {
    /// `"FROM python:3.12-slim"` style rendering, used to synthesize layers.
    pub fn command(&self) -> String {
        format!("{} {}", self.keyword, self.value)
    }
}

/// Parse raw Dockerfile text into an ordered instruction list.
///
/// This is a deliberate best-effort, line-oriented parser: comments and blank
/// lines are skipped, and lines that do not look like `KEYWORD args`
/// (continuation lines, malformed syntax) are dropped without error. It does
/// not implement the full Dockerfile grammar: no `\` continuation joining,
/// no heredocs.
pub fn parse(content: &str) -> Vec<Instruction> {
    // Unwrap is fine: the pattern is a compile-time constant.
    let re = Regex::new(r"(?i)^([A-Z]+)\s+(.*)$").unwrap();

    let mut instructions = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            instructions.push(Instruction {
                keyword: caps[1].to_uppercase(),
                value: caps[2].to_string(),
                raw: line.to_string(),
            });
        }
    }
    instructions
}

/// Base image of the build: the value of the last `FROM` seen, first token
/// only (stage aliases like `AS builder` are stripped). `"unknown"` when the
/// text has no `FROM` at all.
pub fn base_image(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .rev()
        .find(|i| i.keyword == "FROM")
        .and_then(|i| i.value.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

/// All `FROM` stage expressions, in file order.
pub fn stages(instructions: &[Instruction]) -> Vec<String> {
    instructions
        .iter()
        .filter(|i| i.keyword == "FROM")
        .map(|i| i.value.clone())
        .collect()
}

/// Effective user of the final image: the last `USER` instruction wins.
/// Root unless that value is outside {"", "0", "root"} (case-insensitive).
pub fn effective_user(instructions: &[Instruction]) -> (String, bool) {
    for instr in instructions.iter().rev() {
        if instr.keyword == "USER" {
            let user = instr.value.trim().to_string();
            let runs_as_root = matches!(user.to_lowercase().as_str(), "" | "0" | "root");
            return (user, runs_as_root);
        }
    }
    ("root".to_string(), true)
}
