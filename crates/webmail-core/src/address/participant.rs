//! Message participants.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::parser::{EmailAddress, InvalidAddress, Mailbox};

/// Role of a participant on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantType {
    /// Author.
    From,
    /// Primary recipient.
    To,
    /// Carbon copy.
    Cc,
    /// Blind carbon copy.
    Bcc,
    /// Reply-to address.
    ReplyTo,
    /// Actual sender when sending on behalf of someone else.
    Sender,
    /// Read receipt notification address.
    ReadReceipt,
}

impl ParticipantType {
    /// Parses the server's single-letter type code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "f" => Some(Self::From),
            "t" => Some(Self::To),
            "c" => Some(Self::Cc),
            "b" => Some(Self::Bcc),
            "r" => Some(Self::ReplyTo),
            "s" => Some(Self::Sender),
            "n" => Some(Self::ReadReceipt),
            _ => None,
        }
    }

    /// Server type code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::From => "f",
            Self::To => "t",
            Self::Cc => "c",
            Self::Bcc => "b",
            Self::ReplyTo => "r",
            Self::Sender => "s",
            Self::ReadReceipt => "n",
        }
    }
}

/// An email address attached to a message in a given role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Validated address.
    pub address: EmailAddress,
    /// Short display name.
    pub name: Option<String>,
    /// Full personal name.
    pub full_name: Option<String>,
    /// Role on the message.
    pub kind: ParticipantType,
}

impl Participant {
    /// Creates a participant with no names.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the address is not valid.
    pub fn new(kind: ParticipantType, address: impl AsRef<str>) -> Result<Self, InvalidAddress> {
        Ok(Self {
            address: EmailAddress::new(address)?,
            name: None,
            full_name: None,
            kind,
        })
    }

    /// Sets the full personal name.
    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    /// Creates a participant from a parsed mailbox.
    #[must_use]
    pub fn from_mailbox(kind: ParticipantType, mailbox: Mailbox) -> Self {
        Self {
            address: mailbox.address,
            name: None,
            full_name: mailbox.name,
            kind,
        }
    }

    /// Builds a participant from server data.
    ///
    /// Unknown type codes and invalid addresses are rejected here so that loose
    /// server data never reaches editor state.
    #[must_use]
    pub fn from_wire(
        code: &str,
        address: &str,
        full_name: Option<String>,
        name: Option<String>,
    ) -> Option<Self> {
        let Some(kind) = ParticipantType::from_code(code) else {
            warn!(code, "Dropping participant with unknown type");
            return None;
        };

        match EmailAddress::new(address) {
            Ok(address) => Some(Self {
                address,
                name,
                full_name,
                kind,
            }),
            Err(e) => {
                warn!(error = %e, "Dropping participant with invalid address");
                None
            }
        }
    }

    /// Same participant in another role.
    #[must_use]
    pub fn with_kind(mut self, kind: ParticipantType) -> Self {
        self.kind = kind;
        self
    }

    /// Display string (`Name <address>` or just the address).
    #[must_use]
    pub fn display(&self) -> String {
        match self.full_name.as_deref().or(self.name.as_deref()) {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.address),
            _ => self.address.to_string(),
        }
    }
}

/// Who a message is sent as.
///
/// A closed set of the shapes the composer supports: sending as oneself, or
/// sending on behalf of another identity (delegated send).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// Sending as the account owner or one of its identities.
    Own(Participant),
    /// `sender` sends a message that appears to come `from` someone else.
    OnBehalfOf {
        /// Account actually sending.
        sender: Participant,
        /// Identity the message is from.
        from: Participant,
    },
}

impl Sender {
    /// Participants to put on the message, with roles normalized.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        match self {
            Self::Own(from) => vec![from.clone().with_kind(ParticipantType::From)],
            Self::OnBehalfOf { sender, from } => vec![
                from.clone().with_kind(ParticipantType::From),
                sender.clone().with_kind(ParticipantType::Sender),
            ],
        }
    }

    /// Address the message appears to come from.
    #[must_use]
    pub const fn from_address(&self) -> &EmailAddress {
        match self {
            Self::Own(from) | Self::OnBehalfOf { from, .. } => &from.address,
        }
    }
}
