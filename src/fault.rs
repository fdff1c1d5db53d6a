/// Abnormal conditions recognised by either execution context.
///
/// None of these is fatal. Each one is resolved where it is detected and, on
/// the consumer side, surfaced as a transient notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    TransientJoinFailure,
    ExhaustedRetries,
    MailboxFull,
    InvalidDecodedEvent,
    PublishFailure,
    RadioInitFailure,
}

impl Fault {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientJoinFailure => "transient_join_failure",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::MailboxFull => "mailbox_full",
            Self::InvalidDecodedEvent => "invalid_decoded_event",
            Self::PublishFailure => "publish_failure",
            Self::RadioInitFailure => "radio_init_failure",
        }
    }

    /// Short text the consumer shows for the faults it detects itself.
    /// Producer-side faults only reach the display as link statuses.
    pub const fn notice(self) -> Option<&'static str> {
        match self {
            Self::MailboxFull => Some("Mailbox full. Dropped."),
            Self::InvalidDecodedEvent => Some("Invalid status."),
            Self::PublishFailure => Some("PING ACK FAILED"),
            Self::TransientJoinFailure | Self::ExhaustedRetries | Self::RadioInitFailure => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Fault; 6] = [
        Fault::TransientJoinFailure,
        Fault::ExhaustedRetries,
        Fault::MailboxFull,
        Fault::InvalidDecodedEvent,
        Fault::PublishFailure,
        Fault::RadioInitFailure,
    ];

    #[test]
    fn labels_are_unique_and_notices_fit_a_panel_row() {
        for (i, fault) in ALL.iter().enumerate() {
            if let Some(notice) = fault.notice() {
                assert!(notice.len() <= 22, "{}", fault.as_str());
            }
            for other in &ALL[i + 1..] {
                assert_ne!(fault.as_str(), other.as_str());
            }
        }
    }

    #[test]
    fn only_consumer_faults_carry_a_notice() {
        let shown: usize = ALL.iter().filter(|fault| fault.notice().is_some()).count();
        assert_eq!(shown, 3);
        assert_eq!(Fault::ExhaustedRetries.notice(), None);
        assert_eq!(Fault::PublishFailure.notice(), Some("PING ACK FAILED"));
    }
}
