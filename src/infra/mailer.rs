//! Mailer that records and logs messages instead of delivering them.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::{
    application::repos::{MailError, Mailer, OutgoingMail},
    cache::lock::mutex_lock,
};

const SOURCE: &str = "infra::mailer";

#[derive(Debug, Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        mutex_lock(&self.sent, SOURCE, "sent").clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if !mail.to.contains('@') {
            return Err(MailError(format!("invalid recipient `{}`", mail.to)));
        }
        info!(to = %mail.to, subject = %mail.subject, "mail queued");
        mutex_lock(&self.sent, SOURCE, "send").push(mail);
        Ok(())
    }
}
