//! System-prompt assembly and reminder injection (SPEC_FULL §4.2).
//!
//! Grounded in the teacher's `ContextPackBuilder`: a deterministic, pure
//! function from already-known inputs to an assembled prefix, with a
//! machine-readable report of what went in. The teacher assembles a prefix
//! of workspace files, a skills index and user facts for a single-agent
//! product surface; this core narrows that down to the shape SPEC_FULL
//! actually wants — core identity, configured system prompt, then
//! reminders — and drops the workspace-file/skills-index machinery
//! entirely rather than leaving it half-adapted.

use agentcore_domain::config::AgentConfig;
use agentcore_domain::message::Message;

/// A short system-role note a host wants injected into the prompt prefix,
/// such as the current date or working directory.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub text: String,
    /// When false, only injected on the first turn of a conversation —
    /// mirrors the teacher's bootstrap/normal session-mode split, so a
    /// host can say "today's date is ..." once instead of every turn.
    pub render_always: bool,
}

impl Reminder {
    pub fn always(text: impl Into<String>) -> Self {
        Self { text: text.into(), render_always: true }
    }

    pub fn first_turn_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), render_always: false }
    }
}

/// What the caller knows about the turn being assembled.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTurnHint {
    pub is_first_turn: bool,
}

/// Report of what a [`ContextBuilder::build`] call produced, useful for a
/// host that wants to show why a given prefix looks the way it does.
#[derive(Debug, Clone, Default)]
pub struct ContextReport {
    pub system_message_count: usize,
    pub reminders_included: usize,
    pub reminders_skipped: usize,
}

/// Deterministic, I/O-free assembler of the message prefix prepended to
/// conversation history before every LLM call.
pub struct ContextBuilder {
    core_identity: String,
    reminders: Vec<Reminder>,
}

impl ContextBuilder {
    pub fn new(core_identity: impl Into<String>) -> Self {
        Self { core_identity: core_identity.into(), reminders: Vec::new() }
    }

    pub fn with_reminder(mut self, reminder: Reminder) -> Self {
        self.reminders.push(reminder);
        self
    }

    pub fn with_reminders(mut self, reminders: impl IntoIterator<Item = Reminder>) -> Self {
        self.reminders.extend(reminders);
        self
    }

    /// Build the prefix: core-identity system message, then the agent's
    /// configured system prompt (if non-empty), then reminders in
    /// declaration order, filtered by `hint.is_first_turn`.
    pub fn build(&self, agent_config: &AgentConfig, hint: CurrentTurnHint) -> (Vec<Message>, ContextReport) {
        let mut prefix = vec![Message::system(&self.core_identity)];

        if !agent_config.system_prompt.is_empty() {
            prefix.push(Message::system(&agent_config.system_prompt));
        }

        let mut included = 0;
        let mut skipped = 0;
        for reminder in &self.reminders {
            if reminder.render_always || hint.is_first_turn {
                prefix.push(Message::system(&reminder.text));
                included += 1;
            } else {
                skipped += 1;
            }
        }

        let report = ContextReport {
            system_message_count: prefix.len(),
            reminders_included: included,
            reminders_skipped: skipped,
        };
        (prefix, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prompt(prompt: &str) -> AgentConfig {
        AgentConfig { system_prompt: prompt.into(), ..AgentConfig::default() }
    }

    #[test]
    fn order_is_identity_then_prompt_then_reminders() {
        let builder = ContextBuilder::new("you are an agent")
            .with_reminder(Reminder::always("be concise"));
        let (prefix, _) = builder.build(&config_with_prompt("act as a helper"), CurrentTurnHint { is_first_turn: true });

        assert_eq!(prefix.len(), 3);
        assert_eq!(prefix[0].content.as_text(), "you are an agent");
        assert_eq!(prefix[1].content.as_text(), "act as a helper");
        assert_eq!(prefix[2].content.as_text(), "be concise");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let builder = ContextBuilder::new("you are an agent");
        let (prefix, _) = builder.build(&AgentConfig::default(), CurrentTurnHint::default());
        assert_eq!(prefix.len(), 1);
    }

    #[test]
    fn first_turn_only_reminder_is_dropped_on_later_turns() {
        let builder = ContextBuilder::new("identity")
            .with_reminder(Reminder::first_turn_only("today's date is 2026-08-01"))
            .with_reminder(Reminder::always("stay in character"));

        let (prefix, report) = builder.build(&AgentConfig::default(), CurrentTurnHint { is_first_turn: false });
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix[1].content.as_text(), "stay in character");
        assert_eq!(report.reminders_included, 1);
        assert_eq!(report.reminders_skipped, 1);
    }

    #[test]
    fn first_turn_only_reminder_is_included_on_first_turn() {
        let builder = ContextBuilder::new("identity")
            .with_reminder(Reminder::first_turn_only("welcome note"));
        let (prefix, report) = builder.build(&AgentConfig::default(), CurrentTurnHint { is_first_turn: true });
        assert_eq!(prefix.len(), 2);
        assert_eq!(report.reminders_included, 1);
        assert_eq!(report.reminders_skipped, 0);
    }

    #[test]
    fn all_prefix_messages_are_system_role() {
        let builder = ContextBuilder::new("identity").with_reminder(Reminder::always("note"));
        let (prefix, _) = builder.build(&config_with_prompt("prompt"), CurrentTurnHint { is_first_turn: true });
        assert!(prefix.iter().all(|m| m.role == agentcore_domain::message::Role::System));
    }
}
