//! Prompt assembly under a character budget.
//!
//! The prompt is an instruction intro, as much recent history as fits, and an
//! outro that repeats the user's last utterance and opens the assistant's
//! turn. History is taken newest first; the first line that does not fit ends
//! the walk, except that the newest line is cut to its tail rather than
//! dropped.

use std::sync::Arc;

use crate::dialog::DialogEvent;

/// Everything needed to frame one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiPrompt {
    pub assistant_name: String,
    pub assistant_desc: String,
    pub user_name: String,
    pub last_user_input: String,
    pub available_tools: Vec<String>,
}

impl AiPrompt {
    pub fn intro(&self) -> String {
        let mut intro = format!(
            "### Instruction\n\
             A never-ending dialog between a curious human user, called {user} and a helpful assistant called {assistant}.\n\
             \n\
             {assistant} is {desc}\n\
             \n\
             Complete {assistant}'s next line in the two-way dialog, purely and only from {assistant}'s perspective.\n",
            user = self.user_name,
            assistant = self.assistant_name,
            desc = self.assistant_desc,
        );
        if !self.available_tools.is_empty() {
            intro.push_str(&format!(
                "{} may use these tools: {}.\n",
                self.assistant_name,
                self.available_tools.join(", ")
            ));
        }
        intro
    }

    pub fn outro(&self) -> String {
        format!(
            "\n{user}: {last}\n\n### Response\n{assistant}: ",
            user = self.user_name,
            last = self.last_user_input,
            assistant = self.assistant_name,
        )
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    let skip = char_len(s).saturating_sub(n);
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// Choose transcript lines, oldest first, so that `used` plus each line and
/// its separator stays within `max_chars`.
pub fn fit_history(lines: &[String], mut used: usize, max_chars: usize) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();

    for line in lines.iter().rev() {
        let len = char_len(line);
        if used + len + 1 <= max_chars {
            kept.push(line.clone());
            used += len + 1;
            continue;
        }
        if kept.is_empty() {
            let remaining = max_chars.saturating_sub(used + 1);
            // A zero-length tail would only add an empty line past the budget, so omit it.
            if remaining > 0 {
                kept.push(tail_chars(line, remaining).to_string());
            }
        }
        break;
    }

    kept.reverse();
    kept
}

/// Render the full prompt for `history` within `max_chars`.
pub fn build_prompt(prompt: &AiPrompt, history: &[Arc<DialogEvent>], max_chars: usize) -> String {
    let intro = prompt.intro();
    let outro = prompt.outro();
    let baseline = char_len(&intro) + char_len(&outro) + 2;

    let lines: Vec<String> = history.iter().map(|e| e.format_line()).collect();
    let kept = fit_history(&lines, baseline, max_chars);

    let mut parts = Vec::with_capacity(kept.len() + 2);
    parts.push(intro);
    parts.extend(kept);
    parts.push(outro);
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{ParticipantKind, ParticipantRef, TypedTextEvent};

    fn prompt() -> AiPrompt {
        AiPrompt {
            assistant_name: "Jenny".into(),
            assistant_desc: "helpful.".into(),
            user_name: "User".into(),
            last_user_input: "What is two plus two?".into(),
            available_tools: Vec::new(),
        }
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_everything_fits_with_large_budget() {
        let history = lines(&["User: hi", "Jenny: hello", "User: how are you"]);
        assert_eq!(fit_history(&history, 100, 10_000), history);
    }

    #[test]
    fn test_oldest_lines_are_dropped_first() {
        // Each line costs 9 chars plus a separator.
        let history = lines(&["User: one", "User: two", "User: six"]);
        assert_eq!(fit_history(&history, 0, 20), lines(&["User: two", "User: six"]));
        assert_eq!(fit_history(&history, 0, 19), lines(&["User: six"]));
    }

    #[test]
    fn test_walk_stops_at_first_line_that_does_not_fit() {
        let history = lines(&["a", "a very long line that cannot fit", "b"]);
        assert_eq!(fit_history(&history, 0, 10), lines(&["b"]));
    }

    #[test]
    fn test_oversized_newest_line_is_cut_to_its_tail() {
        let history = lines(&["User: older", "User: 0123456789"]);
        let kept = fit_history(&history, 10, 16);
        assert_eq!(kept, lines(&["56789"]));
        assert!(history[1].ends_with(&kept[0]));
    }

    #[test]
    fn test_newest_line_omitted_when_framing_fills_budget() {
        let history = lines(&["User: hello", "Jenny: hi"]);
        assert!(fit_history(&history, 50, 50).is_empty());
        assert!(fit_history(&history, 49, 50).is_empty());
        assert!(fit_history(&history, 80, 50).is_empty());
        assert_eq!(fit_history(&history, 48, 50), ["i"]);
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail_chars("naïve café", 4), "café");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(tail_chars("ab", 0), "");
    }

    #[test]
    fn test_build_prompt_layout() {
        let user = ParticipantRef::new("User", ParticipantKind::User);
        let jenny = ParticipantRef::new("Jenny", ParticipantKind::Assistant);
        let history: Vec<Arc<DialogEvent>> = vec![
            Arc::new(DialogEvent::from(TypedTextEvent::new(jenny, "Hi, can I help?"))),
            Arc::new(DialogEvent::from(TypedTextEvent::new(user, "Yes"))),
        ];

        let p = prompt();
        let text = build_prompt(&p, &history, 10_000);

        assert!(text.starts_with("### Instruction\n"));
        assert!(text.contains("Jenny is helpful.\n"));
        assert!(text.contains("\nJenny: Hi, can I help?\nUser: Yes\n"));
        assert!(text.ends_with("User: What is two plus two?\n\n### Response\nJenny: "));
    }

    #[test]
    fn test_build_prompt_never_exceeds_budget_when_history_is_cut() {
        let user = ParticipantRef::new("User", ParticipantKind::User);
        let history: Vec<Arc<DialogEvent>> = (0..50)
            .map(|i| Arc::new(DialogEvent::from(TypedTextEvent::new(user.clone(), format!("message number {i}")))))
            .collect();

        let p = prompt();
        let baseline = p.intro().chars().count() + p.outro().chars().count() + 2;
        let budget = baseline + 100;
        let text = build_prompt(&p, &history, budget);

        assert!(text.chars().count() <= budget);
        assert!(text.contains("User: message number 49\n"));
        assert!(!text.contains("User: message number 0\n"));
    }

    #[test]
    fn test_tools_are_listed() {
        let mut p = prompt();
        p.available_tools = vec!["clock".into(), "weather".into()];
        assert!(p.intro().contains("Jenny may use these tools: clock, weather."));
    }
}
