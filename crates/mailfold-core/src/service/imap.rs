//! [`Mailbox`] implementation over a live IMAP session.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_imap::Session;
use async_imap::error::Error as ImapError;
use async_imap::types::{Fetch, Flag as ImapFlag, Name, NameAttribute};
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use utf7_imap::{decode_utf7_imap as decode_utf7, encode_utf7_imap as encode_utf7};

use super::mailbox::{FetchedMessage, Flag, FolderEntry, Mailbox, MailboxError, Uid};
use super::stream::{self, ImapStream};
use crate::config::{ImapConfig, Security};
use crate::encoding::decode_rfc2047;

const FETCH_QUERY: &str = "(UID FLAGS ENVELOPE BODY.PEEK[])";

/// An authenticated IMAP session.
pub struct ImapMailbox {
    session: Session<ImapStream>,
    timeout: Duration,
    supports_move: bool,
}

impl fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("timeout", &self.timeout)
            .field("supports_move", &self.supports_move)
            .finish_non_exhaustive()
    }
}

impl ImapMailbox {
    /// Connects, secures the stream as configured and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Connection`] or [`MailboxError::Timeout`] if
    /// the server cannot be reached, [`MailboxError::Authentication`] if the
    /// credentials are refused.
    pub async fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let after = config.timeout;
        info!(host = %config.host, port = config.port, security = ?config.security, "Connecting");

        let stream = timeout(
            after,
            stream::connect(&config.host, config.port, config.security),
        )
        .await
        .map_err(|_| MailboxError::Timeout {
            operation: "connect",
            after,
        })??;

        let mut client = async_imap::Client::new(stream);
        // STARTTLS negotiation already consumed the greeting.
        if config.security != Security::StartTls {
            timeout(after, client.read_response())
                .await
                .map_err(|_| MailboxError::Timeout {
                    operation: "greeting",
                    after,
                })?
                .ok_or_else(|| {
                    MailboxError::Connection(
                        "server closed the connection before greeting".to_string(),
                    )
                })?
                .map_err(|e| MailboxError::Connection(e.to_string()))?;
        }

        let mut session = timeout(after, client.login(&config.username, &config.password))
            .await
            .map_err(|_| MailboxError::Timeout {
                operation: "LOGIN",
                after,
            })?
            .map_err(|(e, _)| match e {
                ImapError::No(msg) | ImapError::Bad(msg) => MailboxError::Authentication(msg),
                other => map_error(other),
            })?;

        let supports_move = bounded(after, "CAPABILITY", session.capabilities())
            .await?
            .has_str("MOVE");
        debug!(supports_move, "Logged in");

        Ok(Self {
            session,
            timeout: after,
            supports_move,
        })
    }

    async fn store(&mut self, uid: Uid, query: String) -> Result<(), MailboxError> {
        let session = &mut self.session;
        bounded(self.timeout, "STORE", async move {
            let responses = session.uid_store(uid.to_string(), query).await?;
            responses.try_collect::<Vec<Fetch>>().await
        })
        .await
        .map(drop)
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn list_folders(&mut self) -> Result<Vec<FolderEntry>, MailboxError> {
        let session = &mut self.session;
        let names = bounded(self.timeout, "LIST", async move {
            let names = session.list(Some(""), Some("*")).await?;
            names.try_collect::<Vec<Name>>().await
        })
        .await?;
        Ok(names.iter().map(folder_entry).collect())
    }

    async fn select(&mut self, folder: &str) -> Result<(), MailboxError> {
        bounded(self.timeout, "SELECT", self.session.select(wire_name(folder)))
            .await
            .map(drop)
    }

    async fn unselect(&mut self) -> Result<(), MailboxError> {
        bounded(self.timeout, "CLOSE", self.session.close()).await
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>, MailboxError> {
        let found = bounded(self.timeout, "SEARCH", self.session.uid_search(criteria)).await?;
        let mut uids: Vec<Uid> = found.into_iter().map(Uid::new).collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<FetchedMessage>, MailboxError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uid_set(uids);
        let session = &mut self.session;
        let fetches = bounded(self.timeout, "FETCH", async move {
            let fetches = session.uid_fetch(set, FETCH_QUERY).await?;
            fetches.try_collect::<Vec<Fetch>>().await
        })
        .await?;
        Ok(fetches.iter().map(fetched_message).collect())
    }

    async fn folder_exists(&mut self, path: &str) -> Result<bool, MailboxError> {
        // LIST passes the pattern through verbatim.
        let pattern = quoted(&wire_name(path));
        let session = &mut self.session;
        let names = bounded(self.timeout, "LIST", async move {
            let names = session.list(Some(""), Some(pattern.as_str())).await?;
            names.try_collect::<Vec<Name>>().await
        })
        .await?;
        Ok(names.iter().map(folder_entry).any(|entry| entry.name == path))
    }

    async fn create_folder(&mut self, path: &str) -> Result<(), MailboxError> {
        bounded(self.timeout, "CREATE", self.session.create(wire_name(path)))
            .await
            .map_err(|e| match e {
                MailboxError::Rejected(msg) if is_already_exists(&msg) => {
                    MailboxError::AlreadyExists(path.to_string())
                }
                other => other,
            })
    }

    async fn delete_folder(&mut self, path: &str) -> Result<(), MailboxError> {
        bounded(self.timeout, "DELETE", self.session.delete(wire_name(path))).await
    }

    async fn add_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError> {
        self.store(uid, format!("+FLAGS ({})", flag.as_imap())).await
    }

    async fn clear_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError> {
        self.store(uid, format!("-FLAGS ({})", flag.as_imap())).await
    }

    async fn move_messages(
        &mut self,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uid_set(uids);
        let destination = wire_name(destination);
        if self.supports_move {
            return bounded(self.timeout, "MOVE", self.session.uid_mv(&set, &destination)).await;
        }

        warn!("Server lacks MOVE, falling back to COPY and expunge");
        // UID COPY passes the mailbox name through verbatim.
        bounded(
            self.timeout,
            "COPY",
            self.session.uid_copy(&set, quoted(&destination)),
        )
        .await?;
        let session = &mut self.session;
        bounded(self.timeout, "EXPUNGE", async move {
            let stored = session
                .uid_store(&set, format!("+FLAGS.SILENT ({})", Flag::Deleted.as_imap()))
                .await?;
            stored.try_collect::<Vec<Fetch>>().await?;
            let expunged = session.uid_expunge(&set).await?;
            expunged.try_collect::<Vec<u32>>().await
        })
        .await
        .map(drop)
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        bounded(self.timeout, "LOGOUT", self.session.logout()).await
    }
}

/// Runs one protocol exchange under `after`, mapping both failure kinds.
async fn bounded<T, F>(after: Duration, operation: &'static str, fut: F) -> Result<T, MailboxError>
where
    F: Future<Output = Result<T, ImapError>>,
{
    match timeout(after, fut).await {
        Ok(result) => result.map_err(map_error),
        Err(_) => Err(MailboxError::Timeout { operation, after }),
    }
}

fn map_error(e: ImapError) -> MailboxError {
    match e {
        ImapError::Io(e) => MailboxError::Connection(e.to_string()),
        ImapError::ConnectionLost => MailboxError::Connection("connection lost".to_string()),
        ImapError::No(msg) | ImapError::Bad(msg) => MailboxError::Rejected(msg),
        ImapError::Validate(e) => MailboxError::Rejected(e.to_string()),
        other => MailboxError::Protocol(other.to_string()),
    }
}

fn is_already_exists(message: &str) -> bool {
    let upper = message.to_ascii_uppercase();
    upper.contains("ALREADYEXISTS") || upper.contains("ALREADY EXISTS")
}

/// Mailbox name as sent on the wire (modified UTF-7, RFC 3501 5.1.3).
fn wire_name(name: &str) -> String {
    encode_utf7(name.to_string())
}

/// Quoted string form of `value`, escaping `\` and `"`.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn uid_set(uids: &[Uid]) -> String {
    uids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn folder_entry(name: &Name) -> FolderEntry {
    let mut entry = FolderEntry::new(decode_utf7(name.name().to_string()), name.delimiter());
    entry.attributes = name
        .attributes()
        .iter()
        .map(|attribute| match attribute {
            NameAttribute::NoSelect => "\\Noselect".to_string(),
            NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
            NameAttribute::Extension(ext) => ext.to_string(),
            other => format!("\\{other:?}"),
        })
        .collect();
    entry
}

fn fetched_message(fetch: &Fetch) -> FetchedMessage {
    let envelope = fetch.envelope();
    let subject = envelope
        .and_then(|env| env.subject.as_deref())
        .map(lossy);
    let sender = envelope
        .and_then(|env| env.from.as_ref())
        .and_then(|from| from.first())
        .map(|addr| {
            format_sender(
                addr.name.as_deref(),
                addr.mailbox.as_deref(),
                addr.host.as_deref(),
            )
        })
        .unwrap_or_default();

    FetchedMessage {
        uid: fetch.uid.map(Uid::new),
        subject,
        sender,
        seen: fetch.flags().any(|flag| matches!(flag, ImapFlag::Seen)),
        raw: fetch.body().map(<[u8]>::to_vec),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Formats an envelope address as `Name <mailbox@host>` or `mailbox@host`.
fn format_sender(name: Option<&[u8]>, mailbox: Option<&[u8]>, host: Option<&[u8]>) -> String {
    let address = match (mailbox.map(lossy), host.map(lossy)) {
        (Some(mailbox), Some(host)) => format!("{mailbox}@{host}"),
        (Some(mailbox), None) => mailbox,
        (None, Some(host)) => host,
        (None, None) => String::new(),
    };

    let display = name
        .map(|raw| {
            let text = lossy(raw);
            decode_rfc2047(&text).unwrap_or(text)
        })
        .filter(|n| !n.trim().is_empty());

    match display {
        Some(display) if address.is_empty() => display.trim().to_string(),
        Some(display) => format!("{} <{address}>", display.trim()),
        None => address,
    }
}
