//! Recipient address parsing and participant types.

mod parser;
mod participant;

pub use parser::{EmailAddress, InvalidAddress, Mailbox, is_valid_email, parse_mailboxes, parse_multiple_emails};
pub use participant::{Participant, ParticipantType, Sender};
