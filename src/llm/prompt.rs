//! Prompt and script text for the interviewer

use std::fmt::Write as _;

use crate::session::Turn;

/// Prompt for one interviewer reply
#[must_use]
pub fn interviewer_prompt(
    persona_name: &str,
    topic: &str,
    max_sentences: usize,
    recent: &[Turn],
    utterance: &str,
) -> String {
    let mut prompt = format!(
        "You are a friendly technical interviewer named {persona_name}. \
         The user has chosen to practice: '{topic}'. \
         Keep your answers concise (maximum {max_sentences} sentences) so they work well for voice. \
         Do not use markdown or lists. \
         If the user says 'ready', start with a question about the topic."
    );

    if !recent.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&format_transcript(recent));
    }

    let _ = write!(prompt, "\n\nUser says: {utterance}");
    prompt
}

/// Prompt for the end-of-session feedback report
#[must_use]
pub fn feedback_prompt(topic: &str, history: &[Turn]) -> String {
    format!(
        "You are a senior technical interviewer. Based on the following interview transcript \
         on '{topic}', provide a brief feedback report. Include:\n\
         1. A score out of 10, written as N/10.\n\
         2. One strength.\n\
         3. One area for improvement.\n\
         Keep it strictly under 4 sentences and do not use markdown.\n\n\
         TRANSCRIPT:\n{}",
        format_transcript(history)
    )
}

/// Spoken confirmation after a topic change
#[must_use]
pub fn welcome_text(topic: &str) -> String {
    format!("Great. I am ready to interview you on {topic}. Say ready when you are.")
}

/// Spoken greeting that opens a console interview
#[must_use]
pub fn intro_text(persona_name: &str, topic: &str) -> String {
    format!("Hello! I am {persona_name}. I'm ready to interview you on {topic}. Are you ready?")
}

/// Spoken wrapper around a feedback report
#[must_use]
pub fn feedback_speech(report: &str) -> String {
    format!("Here is your feedback. {report}")
}

/// One line per turn, `User:` / `AI:` prefixed
#[must_use]
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Speaker;

    #[test]
    fn test_interviewer_prompt_injects_context() {
        let recent = vec![
            Turn::new(Speaker::User, "ready"),
            Turn::new(Speaker::Assistant, "What is a JOIN?"),
        ];
        let prompt = interviewer_prompt("CodeCoach", "SQL", 2, &recent, "It combines tables");

        assert!(prompt.contains("named CodeCoach"));
        assert!(prompt.contains("'SQL'"));
        assert!(prompt.contains("maximum 2 sentences"));
        assert!(prompt.contains("User: ready\nAI: What is a JOIN?"));
        assert!(prompt.ends_with("User says: It combines tables"));
    }

    #[test]
    fn test_prompt_without_history_has_no_transcript_block() {
        let prompt = interviewer_prompt("CodeCoach", "SQL", 2, &[], "ready");
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn test_welcome_references_topic() {
        assert_eq!(
            welcome_text("Graph Algorithms"),
            "Great. I am ready to interview you on Graph Algorithms. Say ready when you are."
        );
    }
}
