//! Header dispatch and participant extraction.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

lazy_static! {
    static ref RE_IP_ADDRESS: Regex = Regex::new(r"\d+\.\d+\.\d+\.\d+").unwrap();
    static ref RE_HEADER_TOKEN: Regex = Regex::new(r"[^<,>\s]+").unwrap();
}

/// The header under which a participant appeared
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Role {
    To,
    From,
    Cc,
    Bcc,
}

impl Role {
    pub fn is_copy(&self) -> bool {
        matches!(self, Role::Cc | Role::Bcc)
    }
}

/// Headers the parser reads. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum TrackedHeader {
    From,
    To,
    Cc,
    Bcc,
    #[strum(serialize = "Received-SPF")]
    ReceivedSpf,
    Subject,
}

/// What to do with a tracked header's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderHandler {
    Participants(Role),
    IpAddress,
    Subject,
}

impl TrackedHeader {
    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }

    pub fn handler(&self) -> HeaderHandler {
        match self {
            TrackedHeader::From => HeaderHandler::Participants(Role::From),
            TrackedHeader::To => HeaderHandler::Participants(Role::To),
            TrackedHeader::Cc => HeaderHandler::Participants(Role::Cc),
            TrackedHeader::Bcc => HeaderHandler::Participants(Role::Bcc),
            TrackedHeader::ReceivedSpf => HeaderHandler::IpAddress,
            TrackedHeader::Subject => HeaderHandler::Subject,
        }
    }
}

/// One party of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub email: String,
    pub name: String,
    pub domain: String,
    pub message_id: String,
    pub role: Role,
}

pub fn domain_of(email: &str) -> String {
    email.split('@').nth(1).unwrap_or_default().to_string()
}

/// Dotted-quad addresses in the header, comma separated
pub fn extract_ip_addresses(value: &str) -> String {
    RE_IP_ADDRESS
        .find_iter(value)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pair display names with addresses in a header like
/// `Name <a@b.com>, "Other, Name" <c@d.com>, bare@e.com`.
///
/// Words before an address form its name; the name resets after each address.
/// The name keeps the original text between its first and last word.
pub fn extract_participants(value: &str, message_id: &str, role: Role) -> Vec<ParticipantRecord> {
    let mut participants = Vec::new();
    let mut name_span: Option<(usize, usize)> = None;

    for token in RE_HEADER_TOKEN.find_iter(value) {
        if token.as_str().contains('@') {
            let name = name_span
                .map(|(start, end)| clean_name(&value[start..end]))
                .unwrap_or_default();
            let email = token.as_str().replace('"', "").to_lowercase();
            participants.push(ParticipantRecord {
                domain: domain_of(&email),
                email,
                name,
                message_id: message_id.to_string(),
                role,
            });
            name_span = None;
        } else {
            name_span = match name_span {
                Some((start, _)) => Some((start, token.end())),
                None => Some((token.start(), token.end())),
            };
        }
    }

    participants
}

fn clean_name(raw: &str) -> String {
    raw.replace(['"', '<', '>'], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_header_from_name() {
        assert_eq!(TrackedHeader::from_name("From"), Some(TrackedHeader::From));
        assert_eq!(TrackedHeader::from_name("CC"), Some(TrackedHeader::Cc));
        assert_eq!(
            TrackedHeader::from_name("Received-SPF"),
            Some(TrackedHeader::ReceivedSpf)
        );
        assert_eq!(TrackedHeader::from_name("X-Mailer"), None);
        assert_eq!(
            TrackedHeader::Bcc.handler(),
            HeaderHandler::Participants(Role::Bcc)
        );
    }

    #[test]
    fn test_extract_participants_pairs_names() {
        let value = "vinyl me, please <vinyl@gmail.com>, Qxhna Titcomb <qxhna.titcomb@techstars.com>";
        let participants = extract_participants(value, "m1", Role::To);

        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].name, "vinyl me, please");
        assert_eq!(participants[0].email, "vinyl@gmail.com");
        assert_eq!(participants[0].domain, "gmail.com");
        assert_eq!(participants[1].name, "Qxhna Titcomb");
        assert_eq!(participants[1].email, "qxhna.titcomb@techstars.com");
        assert_eq!(participants[1].domain, "techstars.com");
        assert!(participants.iter().all(|p| p.role == Role::To && p.message_id == "m1"));
    }

    #[test]
    fn test_extract_participants_bare_and_quoted() {
        let value = "\"Doe, Jane\" <Jane.Doe@Example.com>, bare@host.org";
        let participants = extract_participants(value, "m2", Role::Cc);

        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].name, "Doe, Jane");
        assert_eq!(participants[0].email, "jane.doe@example.com");
        assert_eq!(participants[1].name, "");
        assert_eq!(participants[1].email, "bare@host.org");
        assert_eq!(participants[1].domain, "host.org");
    }

    #[test]
    fn test_every_token_lands_once() {
        let value = "Ann Lee <ann@a.io>, Bob <bob@b.io>, Cy Di Ed <cy@c.io>";
        let participants = extract_participants(value, "m3", Role::To);
        let names: Vec<_> = participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ann Lee", "Bob", "Cy Di Ed"]);

        let name_words: usize = names.iter().map(|n| n.split_whitespace().count()).sum();
        let non_email_tokens = RE_HEADER_TOKEN
            .find_iter(value)
            .filter(|t| !t.as_str().contains('@'))
            .count();
        assert_eq!(name_words, non_email_tokens);
    }

    #[test]
    fn test_extract_ip_addresses() {
        let value = "pass (google.com: domain of x@y.com designates 209.85.220.41 as permitted sender) client-ip=209.85.220.41;";
        assert_eq!(extract_ip_addresses(value), "209.85.220.41, 209.85.220.41");
        assert_eq!(extract_ip_addresses("none"), "");
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("cc".parse::<Role>().unwrap(), Role::Cc);
        assert_eq!(Role::Bcc.to_string(), "BCC");
        assert!(Role::Cc.is_copy());
        assert!(!Role::From.is_copy());
    }
}
