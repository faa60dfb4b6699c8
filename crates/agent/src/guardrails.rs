#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputChannel {
    Text,
    Voice,
}

impl InputChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    RunQuote { channel: InputChannel, confirmed: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    RequireConfirmation { reason_code: &'static str },
}

/// Decides which inputs must be read back to the user before the rater runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub confirm_voice_requests: bool,
    pub confirm_text_requests: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { confirm_voice_requests: true, confirm_text_requests: false }
    }
}

impl GuardrailPolicy {
    pub fn requires_confirmation(&self, channel: InputChannel) -> bool {
        match channel {
            InputChannel::Voice => self.confirm_voice_requests,
            InputChannel::Text => self.confirm_text_requests,
        }
    }

    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::RunQuote { confirmed: true, .. } => GuardrailDecision::Allow,
            GuardrailIntent::RunQuote { channel, .. } if self.requires_confirmation(*channel) => {
                GuardrailDecision::RequireConfirmation {
                    reason_code: match channel {
                        InputChannel::Voice => "voice_transcript_unconfirmed",
                        InputChannel::Text => "text_request_unconfirmed",
                    },
                }
            }
            GuardrailIntent::RunQuote { .. } => GuardrailDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, InputChannel};

    #[test]
    fn unconfirmed_voice_request_requires_confirmation() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&GuardrailIntent::RunQuote {
            channel: InputChannel::Voice,
            confirmed: false,
        });
        assert_eq!(
            decision,
            GuardrailDecision::RequireConfirmation { reason_code: "voice_transcript_unconfirmed" }
        );
    }

    #[test]
    fn confirmed_voice_request_is_allowed() {
        let policy = GuardrailPolicy::default();
        let decision = policy
            .evaluate(&GuardrailIntent::RunQuote { channel: InputChannel::Voice, confirmed: true });
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn text_request_runs_without_confirmation_by_default() {
        let policy = GuardrailPolicy::default();
        assert!(!policy.requires_confirmation(InputChannel::Text));
        let decision = policy
            .evaluate(&GuardrailIntent::RunQuote { channel: InputChannel::Text, confirmed: false });
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn text_gate_can_be_enabled() {
        let policy = GuardrailPolicy { confirm_text_requests: true, ..GuardrailPolicy::default() };
        let decision = policy
            .evaluate(&GuardrailIntent::RunQuote { channel: InputChannel::Text, confirmed: false });
        assert!(matches!(decision, GuardrailDecision::RequireConfirmation { .. }));
    }
}
