use super::thrift::{
    MessageType, ThriftError, ThriftReader, ThriftResult, ThriftWriter, T_I32, T_LIST, T_STRING,
    T_STRUCT,
};
use crate::model::note::{NoteDraft, Resource};
use crate::sync::provider::{NoteStore, NoteStoreError, NoteStoreResult};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

const THRIFT_MIME: &str = "application/x-thrift";

const CREATE_NOTE: &str = "createNote";
const UPDATE_NOTE: &str = "updateNote";

/// Connection settings for `EvernoteNoteStore`.
#[derive(Debug, Clone)]
pub struct EvernoteOptions {
    pub token: String,
    /// Full NoteStore endpoint, e.g. `https://www.evernote.com/shard/s1/notestore`.
    pub note_store_url: String,
    pub timeout: Duration,
}

/// `NoteStore` backed by the Evernote Thrift API.
pub struct EvernoteNoteStore {
    client: Client,
    url: String,
    token: String,
    seq_id: AtomicI32,
}

impl EvernoteNoteStore {
    pub fn new(options: EvernoteOptions) -> NoteStoreResult<Self> {
        let token = options.token.trim().to_string();
        if token.is_empty() {
            return Err(NoteStoreError::Protocol(
                "missing Evernote token".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(THRIFT_MIME));
        headers.insert(ACCEPT, HeaderValue::from_static(THRIFT_MIME));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gistnote/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: options.note_store_url,
            token,
            seq_id: AtomicI32::new(0),
        })
    }

    fn call(&self, method: &str, guid: Option<&str>, draft: &NoteDraft) -> NoteStoreResult<String> {
        let started_at = Instant::now();
        let seq_id = self.seq_id.fetch_add(1, Ordering::Relaxed) + 1;
        let body = encode_note_call(method, seq_id, &self.token, guid, draft)
            .map_err(protocol_error)?;
        debug!(
            "event=note_store_call module=evernote method={} seq_id={} bytes={}",
            method,
            seq_id,
            body.len()
        );

        let response = self.client.post(&self.url).body(body).send()?;
        check_status(response.status())?;
        let bytes = response.bytes()?;

        match decode_note_reply(&bytes, method, seq_id) {
            Ok(note_ref) => {
                info!(
                    "event=note_store_call module=evernote status=ok method={} note_ref={} duration_ms={}",
                    method,
                    note_ref,
                    started_at.elapsed().as_millis()
                );
                Ok(note_ref)
            }
            Err(err) => {
                warn!(
                    "event=note_store_call module=evernote status=error method={} error={}",
                    method, err
                );
                Err(err)
            }
        }
    }
}

impl NoteStore for EvernoteNoteStore {
    fn create_note(&self, draft: &NoteDraft) -> NoteStoreResult<String> {
        self.call(CREATE_NOTE, None, draft)
    }

    fn update_note(&self, note_ref: &str, draft: &NoteDraft) -> NoteStoreResult<String> {
        self.call(UPDATE_NOTE, Some(note_ref), draft)
    }
}

fn check_status(status: StatusCode) -> NoteStoreResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(NoteStoreError::Status {
            status: status.as_u16(),
        })
    }
}

fn protocol_error(err: ThriftError) -> NoteStoreError {
    NoteStoreError::Protocol(err.to_string())
}

/// Encodes `createNote`/`updateNote(authenticationToken, note)`.
fn encode_note_call(
    method: &str,
    seq_id: i32,
    token: &str,
    guid: Option<&str>,
    draft: &NoteDraft,
) -> ThriftResult<Vec<u8>> {
    let mut w = ThriftWriter::new();
    w.message_begin(method, MessageType::Call, seq_id)?;
    w.field_begin(T_STRING, 1);
    w.string(token)?;
    w.field_begin(T_STRUCT, 2);
    write_note(&mut w, guid, draft)?;
    w.field_stop();
    Ok(w.into_bytes())
}

fn write_note(w: &mut ThriftWriter, guid: Option<&str>, draft: &NoteDraft) -> ThriftResult<()> {
    w.opt_string_field(1, guid)?;
    w.field_begin(T_STRING, 2);
    w.string(&draft.title)?;
    w.field_begin(T_STRING, 3);
    w.string(&draft.content)?;
    w.opt_string_field(11, draft.notebook_guid.as_deref())?;
    // updateNote replaces the resource list wholesale, so always send it.
    w.field_begin(T_LIST, 13);
    w.list_begin(T_STRUCT, draft.resources.len())?;
    for resource in &draft.resources {
        write_resource(w, resource)?;
    }
    w.field_stop();
    Ok(())
}

fn write_resource(w: &mut ThriftWriter, resource: &Resource) -> ThriftResult<()> {
    let size = i32::try_from(resource.body.len())
        .map_err(|_| ThriftError::TooLarge(resource.body.len()))?;
    w.field_begin(T_STRUCT, 3);
    w.field_begin(T_STRING, 1);
    w.binary(&resource.body_hash_bytes())?;
    w.field_begin(T_I32, 2);
    w.i32(size);
    w.field_begin(T_STRING, 3);
    w.binary(&resource.body)?;
    w.field_stop();
    w.field_begin(T_STRING, 4);
    w.string(&resource.mime)?;
    w.field_stop();
    Ok(())
}

/// Decodes the method result struct into the note GUID or a classified error.
fn decode_note_reply(bytes: &[u8], method: &str, seq_id: i32) -> NoteStoreResult<String> {
    let mut r = ThriftReader::new(bytes);
    let header = r.message_begin().map_err(protocol_error)?;
    if header.kind == MessageType::Exception {
        let (message, kind) = read_application_exception(&mut r).map_err(protocol_error)?;
        return Err(NoteStoreError::Protocol(format!(
            "{method} failed with application exception {kind}: {message}"
        )));
    }
    if header.kind != MessageType::Reply || header.name != method || header.seq_id != seq_id {
        return Err(NoteStoreError::Protocol(format!(
            "unexpected reply `{}` {:?} seq_id={} for {method} seq_id={seq_id}",
            header.name, header.kind, header.seq_id
        )));
    }

    let mut outcome: Option<NoteStoreResult<String>> = None;
    while let Some((field_type, id)) = r.field_begin().map_err(protocol_error)? {
        match (id, field_type) {
            (0, T_STRUCT) => {
                let guid = read_note_guid(&mut r).map_err(protocol_error)?;
                outcome = Some(guid.ok_or_else(|| {
                    NoteStoreError::Protocol(format!("{method} returned a note without guid"))
                }));
            }
            (1, T_STRUCT) => {
                let (code, parameter) = read_code_and_text(&mut r).map_err(protocol_error)?;
                outcome = Some(Err(NoteStoreError::rejected(format!(
                    "EDAMUserException {} parameter={}",
                    error_code_name(code),
                    parameter.unwrap_or_default()
                ))));
            }
            (2, T_STRUCT) => {
                let (code, message) = read_code_and_text(&mut r).map_err(protocol_error)?;
                outcome = Some(Err(NoteStoreError::System {
                    code,
                    message: format!(
                        "{} {}",
                        error_code_name(code),
                        message.unwrap_or_default()
                    )
                    .trim_end()
                    .to_string(),
                }));
            }
            (3, T_STRUCT) => {
                let (identifier, key) = read_not_found(&mut r).map_err(protocol_error)?;
                outcome = Some(Err(NoteStoreError::rejected(format!(
                    "EDAMNotFoundException identifier={} key={}",
                    identifier.unwrap_or_default(),
                    key.unwrap_or_default()
                ))));
            }
            _ => r.skip(field_type).map_err(protocol_error)?,
        }
    }

    outcome.unwrap_or_else(|| {
        Err(NoteStoreError::Protocol(format!(
            "{method} reply carried no result"
        )))
    })
}

fn read_note_guid(r: &mut ThriftReader<'_>) -> ThriftResult<Option<String>> {
    let mut guid = None;
    while let Some((field_type, id)) = r.field_begin()? {
        match (id, field_type) {
            (1, T_STRING) => guid = Some(r.string()?),
            _ => r.skip(field_type)?,
        }
    }
    Ok(guid)
}

/// Reads `{1: i32 errorCode, 2: string}` shared by user and system exceptions.
fn read_code_and_text(r: &mut ThriftReader<'_>) -> ThriftResult<(i32, Option<String>)> {
    let mut code = 0;
    let mut text = None;
    while let Some((field_type, id)) = r.field_begin()? {
        match (id, field_type) {
            (1, T_I32) => code = r.i32()?,
            (2, T_STRING) => text = Some(r.string()?),
            _ => r.skip(field_type)?,
        }
    }
    Ok((code, text))
}

fn read_not_found(r: &mut ThriftReader<'_>) -> ThriftResult<(Option<String>, Option<String>)> {
    let mut identifier = None;
    let mut key = None;
    while let Some((field_type, id)) = r.field_begin()? {
        match (id, field_type) {
            (1, T_STRING) => identifier = Some(r.string()?),
            (2, T_STRING) => key = Some(r.string()?),
            _ => r.skip(field_type)?,
        }
    }
    Ok((identifier, key))
}

fn read_application_exception(r: &mut ThriftReader<'_>) -> ThriftResult<(String, i32)> {
    let mut message = String::new();
    let mut kind = 0;
    while let Some((field_type, id)) = r.field_begin()? {
        match (id, field_type) {
            (1, T_STRING) => message = r.string()?,
            (2, T_I32) => kind = r.i32()?,
            _ => r.skip(field_type)?,
        }
    }
    Ok((message, kind))
}

fn error_code_name(code: i32) -> &'static str {
    match code {
        1 => "UNKNOWN",
        2 => "BAD_DATA_FORMAT",
        3 => "PERMISSION_DENIED",
        4 => "INTERNAL_ERROR",
        5 => "DATA_REQUIRED",
        6 => "LIMIT_REACHED",
        7 => "QUOTA_REACHED",
        8 => "INVALID_AUTH",
        9 => "AUTH_EXPIRED",
        10 => "DATA_CONFLICT",
        11 => "ENML_VALIDATION",
        12 => "SHARD_UNAVAILABLE",
        13 => "LEN_TOO_SHORT",
        14 => "LEN_TOO_LONG",
        15 => "TOO_FEW",
        16 => "TOO_MANY",
        17 => "UNSUPPORTED_OPERATION",
        18 => "TAKEN_DOWN",
        19 => "RATE_LIMIT_REACHED",
        _ => "UNRECOGNIZED",
    }
}

#[cfg(test)]
mod tests {
    use super::{check_status, decode_note_reply, encode_note_call, CREATE_NOTE, UPDATE_NOTE};
    use crate::evernote::thrift::{
        MessageType, ThriftReader, ThriftWriter, T_I32, T_LIST, T_STRING, T_STRUCT,
    };
    use crate::model::note::{NoteDraft, Resource};
    use crate::sync::provider::NoteStoreError;
    use reqwest::StatusCode;

    fn draft() -> NoteDraft {
        NoteDraft {
            title: "Pandas cheat sh".to_string(),
            content: "<en-note/>".to_string(),
            resources: vec![Resource::png(vec![1, 2, 3])],
            notebook_guid: Some("nb-1".to_string()),
        }
    }

    fn reply(method: &str, seq_id: i32, body: impl FnOnce(&mut ThriftWriter)) -> Vec<u8> {
        let mut w = ThriftWriter::new();
        w.message_begin(method, MessageType::Reply, seq_id).unwrap();
        body(&mut w);
        w.field_stop();
        w.into_bytes()
    }

    #[test]
    fn update_call_carries_guid_and_resources() {
        let bytes = encode_note_call(UPDATE_NOTE, 3, "tok", Some("note-9"), &draft()).unwrap();
        let mut r = ThriftReader::new(&bytes);
        let header = r.message_begin().unwrap();
        assert_eq!(header.name, "updateNote");
        assert_eq!(header.kind, MessageType::Call);
        assert_eq!(header.seq_id, 3);

        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 1)));
        assert_eq!(r.string().unwrap(), "tok");
        assert_eq!(r.field_begin().unwrap(), Some((T_STRUCT, 2)));

        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 1)));
        assert_eq!(r.string().unwrap(), "note-9");
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 2)));
        assert_eq!(r.string().unwrap(), "Pandas cheat sh");
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 3)));
        assert_eq!(r.string().unwrap(), "<en-note/>");
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 11)));
        assert_eq!(r.string().unwrap(), "nb-1");
        assert_eq!(r.field_begin().unwrap(), Some((T_LIST, 13)));
        assert_eq!(r.byte().unwrap(), T_STRUCT);
        assert_eq!(r.i32().unwrap(), 1);

        assert_eq!(r.field_begin().unwrap(), Some((T_STRUCT, 3)));
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 1)));
        assert_eq!(r.binary().unwrap().len(), 16);
        assert_eq!(r.field_begin().unwrap(), Some((T_I32, 2)));
        assert_eq!(r.i32().unwrap(), 3);
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 3)));
        assert_eq!(r.binary().unwrap(), &[1, 2, 3]);
        assert_eq!(r.field_begin().unwrap(), None);
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 4)));
        assert_eq!(r.string().unwrap(), "image/png");
    }

    #[test]
    fn create_call_omits_guid() {
        let bytes = encode_note_call(CREATE_NOTE, 1, "tok", None, &draft()).unwrap();
        let mut r = ThriftReader::new(&bytes);
        r.message_begin().unwrap();
        r.field_begin().unwrap();
        r.string().unwrap();
        r.field_begin().unwrap();
        assert_eq!(r.field_begin().unwrap(), Some((T_STRING, 2)));
    }

    #[test]
    fn success_reply_yields_guid() {
        let bytes = reply(CREATE_NOTE, 5, |w| {
            w.field_begin(T_STRUCT, 0);
            w.field_begin(T_I32, 7);
            w.i32(99);
            w.field_begin(T_STRING, 1);
            w.string("guid-123").unwrap();
            w.field_stop();
        });
        assert_eq!(decode_note_reply(&bytes, CREATE_NOTE, 5).unwrap(), "guid-123");
    }

    #[test]
    fn user_exception_is_rejection() {
        let bytes = reply(CREATE_NOTE, 1, |w| {
            w.field_begin(T_STRUCT, 1);
            w.field_begin(T_I32, 1);
            w.i32(11);
            w.field_begin(T_STRING, 2);
            w.string("Note.content").unwrap();
            w.field_stop();
        });
        match decode_note_reply(&bytes, CREATE_NOTE, 1).unwrap_err() {
            NoteStoreError::Rejected { reason } => {
                assert!(reason.contains("ENML_VALIDATION"));
                assert!(reason.contains("Note.content"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn not_found_exception_is_rejection() {
        let bytes = reply(UPDATE_NOTE, 2, |w| {
            w.field_begin(T_STRUCT, 3);
            w.field_begin(T_STRING, 1);
            w.string("Note.guid").unwrap();
            w.field_stop();
        });
        assert!(matches!(
            decode_note_reply(&bytes, UPDATE_NOTE, 2),
            Err(NoteStoreError::Rejected { .. })
        ));
    }

    #[test]
    fn system_exception_is_fatal() {
        let bytes = reply(CREATE_NOTE, 1, |w| {
            w.field_begin(T_STRUCT, 2);
            w.field_begin(T_I32, 1);
            w.i32(19);
            w.field_stop();
        });
        assert!(matches!(
            decode_note_reply(&bytes, CREATE_NOTE, 1),
            Err(NoteStoreError::System { code: 19, .. })
        ));
    }

    #[test]
    fn mismatched_seq_id_is_protocol_error() {
        let bytes = reply(CREATE_NOTE, 8, |_| {});
        assert!(matches!(
            decode_note_reply(&bytes, CREATE_NOTE, 1),
            Err(NoteStoreError::Protocol(_))
        ));
    }

    #[test]
    fn non_success_http_status_is_status_error() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(NoteStoreError::Status { status: 503 })
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(NoteStoreError::Status { status: 401 })
        ));
    }
}
