#![allow(dead_code)]

use async_trait::async_trait;
use botsentry_common::types::{BotId, MessageDirection, SuggestedStatus, UserId};
use botsentry_common::Config;
use botsentry_core::classifier::{
    parse_verdicts, ClassifierError, ClassifierInput, ContentClassifier, Verdict,
};
use botsentry_core::notify::{EmailError, EmailSender, OutboundEmail};
use botsentry_storage::models::{Bot, BotMessage};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.email.admin_recipients = vec!["security@example.com".to_string()];
    config.links.public_base_url = "https://bots.example.com".to_string();
    config.links.admin_panel_url = "https://admin.example.com/security".to_string();
    config
}

pub fn bot(name: &str, created_at: DateTime<Utc>) -> Bot {
    Bot {
        id: Uuid::new_v4(),
        name: name.to_string(),
        sender_name: name.to_string(),
        email: format!("{}@bots.example.com", name),
        registration_ip: None,
        verified: true,
        status: "normal".to_string(),
        flag_count: 0,
        owner_user_id: None,
        claimed_at: None,
        created_at,
    }
}

pub fn claimed(mut bot: Bot, owner: UserId) -> Bot {
    bot.owner_user_id = Some(owner);
    bot.claimed_at = Some(bot.created_at);
    bot
}

pub fn message(bot_id: BotId, subject: &str, body: &str, created_at: DateTime<Utc>) -> BotMessage {
    BotMessage {
        id: Uuid::new_v4(),
        bot_id,
        direction: MessageDirection::Outbound.as_str().to_string(),
        recipient: "someone@example.org".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        created_at,
    }
}

pub fn inbound(bot_id: BotId, created_at: DateTime<Utc>) -> BotMessage {
    let mut m = message(bot_id, "hello", "hi", created_at);
    m.direction = MessageDirection::Inbound.as_str().to_string();
    m
}

/// Classifier that returns canned verdicts for the ids it is asked about
#[derive(Default)]
pub struct ScriptedClassifier {
    verdicts: Mutex<Vec<Verdict>>,
    fail: Mutex<bool>,
    reply: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn flag(&self, message_id: Uuid, status: SuggestedStatus, reason: &str) {
        self.verdicts.lock().unwrap().push(Verdict {
            message_id,
            status,
            reason: reason.to_string(),
        });
    }

    pub fn fail_with_error(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Answer with raw model text, run through the real output parser
    pub fn reply_with_text(&self, text: &str) {
        *self.reply.lock().unwrap() = Some(text.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentClassifier for ScriptedClassifier {
    async fn classify(&self, inputs: &[ClassifierInput]) -> Result<Vec<Verdict>, ClassifierError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(ClassifierError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        if let Some(text) = self.reply.lock().unwrap().as_deref() {
            return parse_verdicts(text, inputs);
        }
        let ids: HashSet<Uuid> = inputs.iter().map(|i| i.id).collect();
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .iter()
            .filter(|v| ids.contains(&v.message_id))
            .cloned()
            .collect())
    }
}

/// Sender that records every email and can reject chosen addresses
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundEmail>>,
    reject: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn reject(&self, address: &str) {
        self.reject.lock().unwrap().insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutboundEmail> {
        self.sent().into_iter().filter(|e| e.to == address).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        if self.reject.lock().unwrap().contains(&email.to) {
            return Err(EmailError::Transport("550 mailbox unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}
