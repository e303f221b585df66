//! [`MailApi`] over the JSON SOAP transport.

use chrono::{DateTime, Utc};
use tracing::debug;
use webmail_soap::SoapClient;
use webmail_soap::wire::{
    AttachSpec, AttachedPart, Content, ConvInfo, EmailAddr, EmailInfo, MAIL_NAMESPACE, MimePart,
    MimePartInfo, MsgAction, MsgActionRequest, MsgActionResponse, MsgInfo, MsgToSend,
    SaveDraftRequest, SaveDraftResponse, SearchRequest as WireSearchRequest, SearchResponse,
    SendMsgRequest, SendMsgResponse,
};

use crate::address::Participant;
use crate::api::{
    ApiError, MailApi, OutgoingDraft, SavedDraft, SentMessage, UploadFile, UploadedAttachment,
};
use crate::config::ComposerConfig;
use crate::editor::SavedAttachment;
use crate::search::{ConversationSummary, MessageSummary, SearchRequest, SearchResults};
use crate::upload::UploadProgress;
use crate::{Error, Result};

/// Query that matches every message, used when no filter is set.
const MATCH_ALL: &str = "is:anywhere";

/// Creates a SOAP client for the configured server.
///
/// # Errors
///
/// Returns `Error::Config` if the server URL is unusable.
pub fn connect(config: &ComposerConfig) -> Result<SoapClient> {
    SoapClient::new(config.server.clone()).map_err(|e| Error::Config(e.to_string()))
}

/// Converts an outgoing draft into the server's message shape.
#[must_use]
pub fn message_to_wire(draft: &OutgoingDraft) -> MsgToSend {
    let e = draft
        .participants
        .iter()
        .map(|p| EmailAddr {
            t: p.kind.code().to_string(),
            a: p.address.to_string(),
            p: p.full_name.clone().or_else(|| p.name.clone()),
        })
        .collect();

    let mp = match &draft.html {
        Some(html) => vec![MimePart::multipart("multipart/alternative", vec![
            MimePart::leaf("text/plain", &draft.plain),
            MimePart::leaf("text/html", html),
        ])],
        None => vec![MimePart::leaf("text/plain", &draft.plain)],
    };

    let attach = AttachSpec {
        aid: (!draft.upload_ids.is_empty()).then(|| draft.upload_ids.join(",")),
        mp: draft
            .kept_attachments
            .iter()
            .map(|a| AttachedPart {
                mid: a.message_id.clone(),
                part: a.part.clone(),
            })
            .collect(),
    };

    MsgToSend {
        id: draft.draft_id.clone(),
        orig_id: draft.original_message_id.clone(),
        rt: draft.reply_type.map(|rt| rt.code().to_string()),
        f: draft.is_urgent.then(|| "!".to_string()),
        e,
        su: Content::new(&draft.subject),
        mp,
        attach: (!attach.is_empty()).then_some(attach),
    }
}

fn timestamp(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

fn participants(infos: Vec<EmailInfo>) -> Vec<Participant> {
    infos
        .into_iter()
        .filter_map(|info| Participant::from_wire(&info.t, &info.a, info.p, info.d))
        .collect()
}

fn attachments(message_id: &str, parts: &[MimePartInfo]) -> Vec<SavedAttachment> {
    parts
        .iter()
        .flat_map(MimePartInfo::attachments)
        .map(|part| SavedAttachment {
            message_id: message_id.to_string(),
            part: part.part.clone(),
            filename: part.filename.clone().unwrap_or_default(),
            content_type: part.ct.clone(),
            size: part.s.unwrap_or(0),
            is_inline: part.cd.as_deref() == Some("inline"),
            content_id: part.ci.clone(),
            upload_id: None,
        })
        .collect()
}

/// Reads the saved draft out of a `SaveDraftResponse`.
///
/// # Errors
///
/// Returns `ApiError::Protocol` if the reply holds no message.
pub fn saved_draft_from_wire(
    response: SaveDraftResponse,
) -> std::result::Result<SavedDraft, ApiError> {
    let msg = response
        .m
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Protocol("SaveDraftResponse without message".into()))?;

    Ok(SavedDraft {
        attachments: attachments(&msg.id, &msg.mp),
        conversation_id: msg.cid,
        saved_at: timestamp(msg.d),
        participants: participants(msg.e),
        draft_id: msg.id,
    })
}

fn message_summary(msg: MsgInfo) -> MessageSummary {
    MessageSummary {
        id: msg.id,
        conversation_id: msg.cid,
        subject: msg.su.unwrap_or_default(),
        fragment: msg.fr.unwrap_or_default(),
        participants: participants(msg.e),
        date: timestamp(msg.d),
        folder_id: msg.l,
        flags: msg.f.unwrap_or_default(),
    }
}

fn conversation_summary(conv: ConvInfo) -> ConversationSummary {
    ConversationSummary {
        id: conv.id,
        subject: conv.su.unwrap_or_default(),
        fragment: conv.fr.unwrap_or_default(),
        participants: participants(conv.e),
        message_count: conv.n,
        date: timestamp(conv.d),
        flags: conv.f.unwrap_or_default(),
    }
}

/// Converts a search into the server request, folding the folder id into
/// the query.
#[must_use]
pub fn search_to_wire(request: &SearchRequest) -> WireSearchRequest {
    let mut query = match &request.folder_id {
        Some(folder) => format!("inid:\"{folder}\" {}", request.query),
        None => request.query.clone(),
    };
    query = query.trim().to_string();
    if query.is_empty() {
        query = MATCH_ALL.to_string();
    }

    WireSearchRequest {
        query,
        sort_by: request.sort_by.clone(),
        limit: request.limit,
        offset: request.offset,
        types: request.types.as_str().to_string(),
    }
}

/// Converts a search reply.
#[must_use]
pub fn search_results_from_wire(response: SearchResponse) -> SearchResults {
    SearchResults {
        conversations: response.c.into_iter().map(conversation_summary).collect(),
        messages: response.m.into_iter().map(message_summary).collect(),
        more: response.more,
        offset: response.offset,
    }
}

impl MailApi for SoapClient {
    async fn save_draft(
        &self,
        draft: &OutgoingDraft,
    ) -> std::result::Result<SavedDraft, ApiError> {
        let request = SaveDraftRequest {
            m: message_to_wire(draft),
        };
        let response: SaveDraftResponse = self
            .request("SaveDraft", MAIL_NAMESPACE, &request)
            .await?;
        saved_draft_from_wire(response)
    }

    async fn send_message(
        &self,
        draft: &OutgoingDraft,
        send_uid: &str,
    ) -> std::result::Result<SentMessage, ApiError> {
        let request = SendMsgRequest {
            m: message_to_wire(draft),
            suid: Some(send_uid.to_string()),
        };
        let response: SendMsgResponse = self.request("SendMsg", MAIL_NAMESPACE, &request).await?;
        Ok(SentMessage {
            message_id: response.m.into_iter().next().map(|m| m.id),
        })
    }

    async fn delete_draft(&self, draft_id: &str) -> std::result::Result<(), ApiError> {
        let request = MsgActionRequest {
            action: MsgAction {
                op: "delete".into(),
                id: draft_id.to_string(),
            },
        };
        let response: MsgActionResponse = self
            .request("MsgAction", MAIL_NAMESPACE, &request)
            .await?;
        debug!(op = %response.action.op, id = %response.action.id, "Draft deleted");
        Ok(())
    }

    async fn upload(
        &self,
        file: UploadFile,
        progress: UploadProgress,
    ) -> std::result::Result<UploadedAttachment, ApiError> {
        // The transport reports no intermediate progress.
        progress.report(0);
        let uploaded =
            SoapClient::upload(self, &file.filename, &file.content_type, file.data).await?;
        progress.report(100);

        Ok(UploadedAttachment {
            aid: uploaded.aid,
            content_type: uploaded.content_type,
            filename: uploaded.filename,
            size: uploaded.size,
        })
    }

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<SearchResults, ApiError> {
        let wire = search_to_wire(request);
        debug!(query = %wire.query, sort = %wire.sort_by, "Searching");
        let response: SearchResponse = self.request("Search", MAIL_NAMESPACE, &wire).await?;
        Ok(search_results_from_wire(response))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::address::ParticipantType;
    use crate::editor::ReplyType;
    use crate::search::{SearchFilters, SortDirection, SortField, SortOrder, build_query};
    use serde_json::json;

    fn draft() -> OutgoingDraft {
        OutgoingDraft {
            draft_id: Some("312".into()),
            participants: vec![
                Participant::new(ParticipantType::From, "me@email.it")
                    .unwrap()
                    .with_full_name("Me"),
                Participant::new(ParticipantType::To, "luca@email.it").unwrap(),
            ],
            subject: "Lunch".into(),
            plain: "Pizza?".into(),
            html: None,
            upload_ids: vec!["a1".into(), "a2".into()],
            kept_attachments: vec![SavedAttachment {
                message_id: "257".into(),
                part: "2".into(),
                filename: "menu.pdf".into(),
                content_type: "application/pdf".into(),
                size: 1024,
                is_inline: false,
                content_id: None,
                upload_id: None,
            }],
            original_message_id: Some("257".into()),
            reply_type: Some(ReplyType::Forward),
            is_urgent: true,
        }
    }

    #[test]
    fn test_message_to_wire() {
        let value = serde_json::to_value(message_to_wire(&draft())).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "312",
                "origid": "257",
                "rt": "w",
                "f": "!",
                "e": [
                    { "t": "f", "a": "me@email.it", "p": "Me" },
                    { "t": "t", "a": "luca@email.it" }
                ],
                "su": { "_content": "Lunch" },
                "mp": [{ "ct": "text/plain", "content": { "_content": "Pizza?" } }],
                "attach": { "aid": "a1,a2", "mp": [{ "mid": "257", "part": "2" }] }
            })
        );
    }

    #[test]
    fn test_rich_text_is_alternative() {
        let mut draft = draft();
        draft.html = Some("<p>Pizza?</p>".into());
        draft.upload_ids.clear();
        draft.kept_attachments.clear();

        let wire = message_to_wire(&draft);
        assert!(wire.attach.is_none());
        assert_eq!(wire.mp[0].ct, "multipart/alternative");
        assert_eq!(wire.mp[0].mp[1].ct, "text/html");
    }

    #[test]
    fn test_saved_draft_validates_participants() {
        let response: SaveDraftResponse = serde_json::from_value(json!({
            "m": [{
                "id": "312",
                "cid": "-312",
                "d": 1_700_000_000_000_i64,
                "e": [
                    { "t": "f", "a": "me@email.it", "p": "Me" },
                    { "t": "t", "a": "not an address" },
                    { "t": "?", "a": "x@email.it" }
                ],
                "mp": [{
                    "part": "TEXT",
                    "ct": "multipart/mixed",
                    "mp": [
                        { "part": "1", "ct": "text/plain" },
                        { "part": "2", "ct": "application/pdf", "filename": "menu.pdf", "s": 1024, "cd": "attachment" }
                    ]
                }]
            }]
        }))
        .unwrap();

        let saved = saved_draft_from_wire(response).unwrap();
        assert_eq!(saved.draft_id, "312");
        assert_eq!(saved.participants.len(), 1);
        assert_eq!(saved.participants[0].kind, ParticipantType::From);
        assert!(saved.saved_at.is_some());
        assert_eq!(saved.attachments.len(), 1);
        assert_eq!(saved.attachments[0].message_id, "312");
        assert_eq!(saved.attachments[0].part, "2");

        let empty: SaveDraftResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            saved_draft_from_wire(empty),
            Err(ApiError::Protocol(_))
        ));
    }

    #[test]
    fn test_search_to_wire() {
        let built = build_query(
            &SearchFilters::default(),
            SortOrder::new(SortField::Flag, SortDirection::Desc),
        );
        let wire = search_to_wire(&SearchRequest::new(built, 25).in_folder("2"));
        assert_eq!(wire.query, "inid:\"2\" is:flagged");
        assert_eq!(wire.sort_by, "dateDesc");
        assert_eq!(wire.limit, 25);

        let built = build_query(&SearchFilters::default(), SortOrder::newest_first());
        assert_eq!(search_to_wire(&SearchRequest::new(built, 25)).query, "is:anywhere");
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let mut config = ComposerConfig::default();
        config.server.base_url = "ftp://mail.example.com".into();
        assert!(matches!(connect(&config), Err(Error::Config(_))));
    }
}
