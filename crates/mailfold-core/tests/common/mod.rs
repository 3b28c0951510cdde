//! Shared fixtures: an in-memory mailbox and a scripted oracle.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mailfold_core::classify::{Oracle, OracleError};
use mailfold_core::service::{FetchedMessage, Flag, FolderEntry, Mailbox, MailboxError, Uid};

/// A message stored in a [`MemoryMailbox`] folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub uid: u32,
    pub subject: Option<String>,
    pub sender: String,
    pub seen: bool,
    pub raw: Option<Vec<u8>>,
}

/// Every call the engine made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Select(String),
    Unselect,
    Search(String),
    Fetch(Vec<u32>),
    Exists(String),
    Create(String),
    Delete(String),
    AddFlag(u32, Flag),
    ClearFlag(u32, Flag),
    Move(Vec<u32>, String),
    Logout,
}

/// Mailbox held entirely in memory.
#[derive(Debug)]
pub struct MemoryMailbox {
    pub delimiter: String,
    pub folders: BTreeMap<String, Vec<StoredMessage>>,
    pub selected: Option<String>,
    pub calls: Vec<Call>,
    /// When set, `folder_exists` always answers `false`.
    pub stale_exists: bool,
    failures: HashMap<(&'static str, String), MailboxError>,
    next_uid: u32,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        let mut folders = BTreeMap::new();
        folders.insert("INBOX".to_string(), Vec::new());
        Self {
            delimiter: "/".to_string(),
            folders,
            selected: None,
            calls: Vec::new(),
            stale_exists: false,
            failures: HashMap::new(),
            next_uid: 1,
        }
    }

    pub fn with_folder(mut self, name: &str) -> Self {
        self.folders.entry(name.to_string()).or_default();
        self
    }

    /// Stores a message and returns its UID.
    pub fn deliver(&mut self, folder: &str, subject: &str, sender: &str, body: &str, seen: bool) -> u32 {
        let uid = self.next_uid;
        self.next_uid += 1;
        let raw = format!(
            "From: {sender}\r\nSubject: {subject}\r\nContent-Type: text/plain\r\n\r\n{body}\r\n"
        );
        self.folders.entry(folder.to_string()).or_default().push(StoredMessage {
            uid,
            subject: Some(subject.to_string()),
            sender: sender.to_string(),
            seen,
            raw: Some(raw.into_bytes()),
        });
        uid
    }

    /// Makes `operation` on `target` fail. `*` matches every target.
    pub fn fail(&mut self, operation: &'static str, target: &str, error: MailboxError) {
        self.failures.insert((operation, target.to_string()), error);
    }

    pub fn messages(&self, folder: &str) -> &[StoredMessage] {
        self.folders.get(folder).map_or(&[][..], Vec::as_slice)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    fn check(&self, operation: &'static str, target: &str) -> Result<(), MailboxError> {
        for key in [(operation, target.to_string()), (operation, "*".to_string())] {
            if let Some(error) = self.failures.get(&key) {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    fn selected_mut(&mut self) -> Result<&mut Vec<StoredMessage>, MailboxError> {
        let name = self
            .selected
            .clone()
            .ok_or_else(|| MailboxError::Rejected("No mailbox selected".to_string()))?;
        self.folders
            .get_mut(&name)
            .ok_or_else(|| MailboxError::Rejected(format!("Selected folder vanished: {name}")))
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn list_folders(&mut self) -> Result<Vec<FolderEntry>, MailboxError> {
        self.calls.push(Call::List);
        self.check("list", "*")?;
        Ok(self
            .folders
            .keys()
            .map(|name| FolderEntry::new(name.clone(), Some(self.delimiter.as_str())))
            .collect())
    }

    async fn select(&mut self, folder: &str) -> Result<(), MailboxError> {
        self.calls.push(Call::Select(folder.to_string()));
        self.check("select", folder)?;
        if !self.folders.contains_key(folder) {
            return Err(MailboxError::Rejected(format!("No such folder: {folder}")));
        }
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn unselect(&mut self) -> Result<(), MailboxError> {
        self.calls.push(Call::Unselect);
        self.selected = None;
        Ok(())
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>, MailboxError> {
        self.calls.push(Call::Search(criteria.to_string()));
        self.check("search", "*")?;
        let mut uids: Vec<Uid> = self.selected_mut()?.iter().map(|m| Uid::new(m.uid)).collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<FetchedMessage>, MailboxError> {
        self.calls.push(Call::Fetch(uids.iter().map(|u| u.get()).collect()));
        self.check("fetch", "*")?;
        let folder = self.selected_mut()?;
        Ok(uids
            .iter()
            .filter_map(|uid| folder.iter().find(|m| m.uid == uid.get()))
            .map(|m| FetchedMessage {
                uid: Some(Uid::new(m.uid)),
                subject: m.subject.clone(),
                sender: m.sender.clone(),
                seen: m.seen,
                raw: m.raw.clone(),
            })
            .collect())
    }

    async fn folder_exists(&mut self, path: &str) -> Result<bool, MailboxError> {
        self.calls.push(Call::Exists(path.to_string()));
        self.check("exists", path)?;
        Ok(!self.stale_exists && self.folders.contains_key(path))
    }

    async fn create_folder(&mut self, path: &str) -> Result<(), MailboxError> {
        self.calls.push(Call::Create(path.to_string()));
        self.check("create", path)?;
        if self.folders.contains_key(path) {
            return Err(MailboxError::AlreadyExists(path.to_string()));
        }
        self.folders.insert(path.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_folder(&mut self, path: &str) -> Result<(), MailboxError> {
        self.calls.push(Call::Delete(path.to_string()));
        self.check("delete", path)?;
        self.folders
            .remove(path)
            .map(drop)
            .ok_or_else(|| MailboxError::Rejected(format!("No such folder: {path}")))
    }

    async fn add_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError> {
        self.calls.push(Call::AddFlag(uid.get(), flag));
        self.check("add_flag", "*")?;
        if flag == Flag::Seen {
            find(self.selected_mut()?, uid)?.seen = true;
        }
        Ok(())
    }

    async fn clear_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError> {
        self.calls.push(Call::ClearFlag(uid.get(), flag));
        self.check("clear_flag", "*")?;
        if flag == Flag::Seen {
            find(self.selected_mut()?, uid)?.seen = false;
        }
        Ok(())
    }

    async fn move_messages(&mut self, uids: &[Uid], destination: &str) -> Result<(), MailboxError> {
        self.calls.push(Call::Move(
            uids.iter().map(|u| u.get()).collect(),
            destination.to_string(),
        ));
        self.check("move", destination)?;
        if !self.folders.contains_key(destination) {
            return Err(MailboxError::Rejected(format!("[TRYCREATE] No such folder: {destination}")));
        }

        let source = self.selected_mut()?;
        let mut moving = Vec::new();
        source.retain(|m| {
            if uids.iter().any(|u| u.get() == m.uid) {
                moving.push(m.clone());
                false
            } else {
                true
            }
        });
        self.folders.entry(destination.to_string()).or_default().extend(moving);
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        self.calls.push(Call::Logout);
        Ok(())
    }
}

fn find(folder: &mut [StoredMessage], uid: Uid) -> Result<&mut StoredMessage, MailboxError> {
    folder
        .iter_mut()
        .find(|m| m.uid == uid.get())
        .ok_or_else(|| MailboxError::Rejected(format!("No message with UID {uid}")))
}

/// Oracle answering from a queue and recording every prompt.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    answers: Arc<Mutex<VecDeque<Result<String, OracleError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, OracleError>>,
    {
        let answers = answers
            .into_iter()
            .map(|a| a.map(ToString::to_string))
            .collect();
        Self {
            answers: Arc::new(Mutex::new(answers)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn answering(answer: &'static str) -> Self {
        Self::new([Ok(answer)])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Http("no scripted answer left".to_string())))
    }
}
