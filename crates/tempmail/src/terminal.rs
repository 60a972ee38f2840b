//! Line-oriented terminal presenter.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use tempmail_core::{
    Locale, MessageDetail, MessageSummary, Notice, NoticeLevel, Presenter, Text,
};
use tokio::sync::oneshot;
use tracing::debug;

/// Column width of the subject in the inbox table.
const SUBJECT_WIDTH: usize = 40;

/// Column width of the sender in the inbox table.
const FROM_WIDTH: usize = 28;

/// Presenter writing to stdout.
pub struct TerminalPresenter {
    locale: Locale,
    notice_ttl: Duration,
    download_dir: PathBuf,
    last_notice: Mutex<Option<(Notice, Instant)>>,
    /// Answer channel of a confirmation waiting for the next input line.
    pending_confirm: Mutex<Option<oneshot::Sender<bool>>>,
}

impl TerminalPresenter {
    /// Creates a presenter saving attachments into `download_dir`.
    pub fn new(locale: Locale, notice_ttl: Duration, download_dir: PathBuf) -> Self {
        Self {
            locale,
            notice_ttl,
            download_dir,
            last_notice: Mutex::new(None),
            pending_confirm: Mutex::new(None),
        }
    }

    /// Feeds an input line to a waiting confirmation.
    ///
    /// Returns false when no confirmation was waiting, so the line is a command.
    pub fn answer_pending(&self, line: &str) -> bool {
        let sender = self
            .pending_confirm
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        let Some(sender) = sender else {
            return false;
        };
        let accepted = matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
        let _ = sender.send(accepted);
        true
    }

    /// The last notice, unless it has expired.
    pub fn current_notice(&self) -> Option<Notice> {
        let last = self.last_notice.lock().ok()?;
        last.as_ref()
            .filter(|(_, shown_at)| shown_at.elapsed() < self.notice_ttl)
            .map(|(notice, _)| notice.clone())
    }

    fn text(&self, key: Text) -> &'static str {
        self.locale.text(key)
    }
}

#[async_trait]
impl Presenter for TerminalPresenter {
    fn notify(&self, notice: Notice) {
        let marker = match notice.level {
            NoticeLevel::Success => "+",
            NoticeLevel::Info => "*",
            NoticeLevel::Error => "!",
        };
        println!("[{marker}] {}", notice.text);
        if let Ok(mut last) = self.last_notice.lock() {
            *last = Some((notice, Instant::now()));
        }
    }

    fn set_loading(&self, loading: bool) {
        debug!("Loading: {}", loading);
    }

    fn show_address(&self, email: &str) {
        if email.is_empty() {
            println!("Address: -");
        } else {
            println!("Address: {email}");
        }
    }

    fn show_messages(&self, messages: &[MessageSummary]) {
        if messages.is_empty() {
            println!("{}", self.text(Text::NoMessages));
            return;
        }
        for message in messages {
            let subject = if message.subject.is_empty() {
                self.text(Text::NoSubject)
            } else {
                message.subject.as_str()
            };
            println!(
                "{:>10}  {:<FROM_WIDTH$}  {:<SUBJECT_WIDTH$}  {}",
                message.id,
                truncate(&message.from, FROM_WIDTH),
                truncate(subject, SUBJECT_WIDTH),
                format_time(message.received_at()),
            );
        }
    }

    fn show_message(&self, message: &MessageDetail) {
        let subject = if message.subject.is_empty() {
            self.text(Text::NoSubject)
        } else {
            message.subject.as_str()
        };
        println!("== {subject}");
        println!("{}: {}", self.text(Text::From), message.from);
        println!(
            "{}: {}",
            self.text(Text::Received),
            format_time(message.received_at())
        );
        println!();
        println!("{}", render_body(&message.body_html, self.text(Text::NoBody)));
        if !message.attachments.is_empty() {
            println!();
            println!("{}:", self.text(Text::Attachments));
            for attachment in &message.attachments {
                println!("  - {}", attachment.name);
            }
        }
    }

    async fn confirm(&self, prompt: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        match self.pending_confirm.lock() {
            Ok(mut pending) => *pending = Some(tx),
            Err(_) => return false,
        }
        println!("{prompt} [y/N]");
        rx.await.unwrap_or(false)
    }

    async fn save_attachment(&self, filename: &str, contents: Bytes) -> Result<(), String> {
        let path = attachment_path(&self.download_dir, filename)?;
        tokio::fs::write(&path, &contents)
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        println!("-> {}", path.display());
        Ok(())
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), String> {
        // OSC 52: the terminal emulator puts the payload on the clipboard
        let sequence = format!("\x1b]52;c;{}\x07", STANDARD.encode(text));
        let mut stdout = std::io::stdout();
        stdout
            .write_all(sequence.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| e.to_string())
    }
}

/// Destination of a downloaded attachment; only the final path component is kept.
fn attachment_path(dir: &Path, filename: &str) -> Result<PathBuf, String> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| format!("invalid file name: {filename}"))?;
    Ok(dir.join(name))
}

fn format_time(received: Option<DateTime<Utc>>) -> String {
    received.map_or_else(String::new, |at| {
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    })
}

fn render_body(html: &str, empty: &str) -> String {
    if html.trim().is_empty() {
        return empty.to_string();
    }
    htmd::convert(html).unwrap_or_else(|_| html.to_string())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
