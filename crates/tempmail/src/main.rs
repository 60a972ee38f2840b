//! `tempmail` - Terminal client for disposable email inboxes
//!
//! Reads one command per line from stdin and drives the mailbox core.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod terminal;

use std::sync::Arc;

use anyhow::Context;
use tempmail_core::{
    App, Config, Error, FileStore, HttpMailService, Locale, Notice, Presenter, Text,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terminal::TerminalPresenter;

const HELP: &str = "\
Commands:
  new                    generate a new address
  refresh                fetch the inbox
  list                   show the last fetched inbox
  search <query>         filter the inbox by id, sender or subject
  view <id>              show one message
  delete <id>            delete one message
  download <id> <file>   save an attachment to the current directory
  copy                   copy the address to the clipboard
  auto on|off            toggle auto-refresh
  interval <secs>        set the auto-refresh interval
  reset                  forget the current session
  status                 show session and auto-refresh state
  help                   show this text
  quit                   exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    New,
    Refresh,
    List,
    Search(String),
    View(String),
    Delete(String),
    Download { id: String, filename: String },
    Copy,
    Auto(bool),
    Interval(u64),
    Reset,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Empty lines yield `Ok(None)`.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(name, rest)| (name, rest.trim()));

        let command = match name.to_lowercase().as_str() {
            "" => return Ok(None),
            "new" => Self::New,
            "refresh" => Self::Refresh,
            "list" => Self::List,
            "search" => Self::Search(rest.to_string()),
            "view" => Self::View(required(rest, "view <id>")?),
            "delete" => Self::Delete(required(rest, "delete <id>")?),
            "download" => {
                let usage = "download <id> <file>";
                let (id, filename) = rest.split_once(char::is_whitespace).ok_or(usage)?;
                Self::Download {
                    id: id.to_string(),
                    filename: required(filename.trim(), usage)?,
                }
            }
            "copy" => Self::Copy,
            "auto" => match rest {
                "on" => Self::Auto(true),
                "off" => Self::Auto(false),
                _ => return Err("usage: auto on|off".to_string()),
            },
            "interval" => Self::Interval(
                rest.parse()
                    .map_err(|_| "usage: interval <secs>".to_string())?,
            ),
            "reset" => Self::Reset,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };
        Ok(Some(command))
    }
}

fn required(value: &str, usage: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(value.to_string())
    }
}

/// Locale from `TEMPMAIL_LANG`, then `LANG`.
fn locale_from_env() -> Locale {
    std::env::var("TEMPMAIL_LANG")
        .or_else(|_| std::env::var("LANG"))
        .map_or(Locale::English, |tag| Locale::from_tag(&tag))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tempmail=info,tempmail_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting tempmail");

    let locale = locale_from_env();
    let config = Config::with_locale(locale);

    let backend = FileStore::open_default().context("failed to open local storage")?;
    debug!("Using storage at {}", backend.path().display());
    let service = HttpMailService::new(&config.api_base, config.request_timeout)
        .context("failed to create HTTP client")?;
    let download_dir = std::env::current_dir().context("failed to resolve download directory")?;
    let presenter = Arc::new(TerminalPresenter::new(
        locale,
        config.notice_ttl,
        download_dir,
    ));

    let app = App::new(
        config,
        Arc::new(service),
        presenter.clone(),
        Arc::new(backend),
    );
    app.start().await.context("failed to start")?;

    run(app, presenter, locale).await
}

/// Reads commands until `quit` or end of input.
async fn run(app: App, presenter: Arc<TerminalPresenter>, locale: Locale) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        if presenter.answer_pending(&line) {
            continue;
        }
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(Command::Help)) => println!("{HELP}"),
            Ok(Some(command)) => {
                // Commands run concurrently so a slow call never blocks input
                tokio::spawn(execute(app.clone(), presenter.clone(), locale, command));
            }
            Err(usage) => println!("{usage}"),
        }
    }

    app.scheduler().stop().await;
    info!("Exiting");
    Ok(())
}

/// Runs one command. Failures were already shown by the controller.
async fn execute(app: App, presenter: Arc<TerminalPresenter>, locale: Locale, command: Command) {
    let controller = app.controller();
    let result = match command {
        Command::New => controller.gen_email().await.map(|_| ()),
        Command::Refresh => controller.refresh_mail().await.map(|_| ()),
        Command::List => {
            presenter.show_messages(&controller.messages().await);
            Ok(())
        }
        Command::Search(query) => {
            presenter.show_messages(&controller.search(&query).await);
            Ok(())
        }
        Command::View(id) => controller.view_email(&id).await.map(|_| ()),
        Command::Delete(id) => controller.delete_email(&id).await.map(|_| ()),
        Command::Download { id, filename } => {
            controller.download_attachment(&id, &filename).await
        }
        Command::Copy => controller.copy_email().await,
        Command::Auto(enabled) => app.scheduler().set_enabled(enabled).await,
        Command::Interval(secs) => app.scheduler().set_interval(secs).await,
        Command::Reset => {
            controller.reset_session().await;
            Ok(())
        }
        Command::Status => {
            print_status(&app, &presenter).await;
            Ok(())
        }
        Command::Help | Command::Quit => Ok(()),
    };

    match result {
        Err(Error::InvalidInterval(_)) => {
            presenter.notify(Notice::error(locale.text(Text::InvalidInterval)));
        }
        Err(Error::Storage(e)) => {
            presenter.notify(Notice::error(e.to_string()));
        }
        Err(e) => debug!("Command failed: {}", e),
        Ok(()) => {}
    }
}

async fn print_status(app: &App, presenter: &TerminalPresenter) {
    let controller = app.controller();
    let email = controller.current_email().await;
    let preferences = app.scheduler().preferences().await;

    println!("State: {:?}", controller.state().await);
    println!("Address: {}", if email.is_empty() { "-" } else { email.as_str() });
    println!("Messages: {}", controller.messages().await.len());
    println!(
        "Auto-refresh: {} every {}s",
        if preferences.enabled { "on" } else { "off" },
        preferences.interval_secs
    );
    if controller.has_pending_retry().await {
        println!("Retry: pending");
    }
    if let Some(notice) = presenter.current_notice() {
        println!("Last notice: {}", notice.text);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("new").unwrap(), Some(Command::New));
        assert_eq!(Command::parse("  REFRESH ").unwrap(), Some(Command::Refresh));
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            Command::parse("search your invoice").unwrap(),
            Some(Command::Search("your invoice".to_string()))
        );
        assert_eq!(
            Command::parse("view 42").unwrap(),
            Some(Command::View("42".to_string()))
        );
        assert_eq!(
            Command::parse("download 42 report final.pdf").unwrap(),
            Some(Command::Download {
                id: "42".to_string(),
                filename: "report final.pdf".to_string(),
            })
        );
        assert_eq!(Command::parse("auto on").unwrap(), Some(Command::Auto(true)));
        assert_eq!(
            Command::parse("interval 15").unwrap(),
            Some(Command::Interval(15))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("view").is_err());
        assert!(Command::parse("download 42").is_err());
        assert!(Command::parse("auto maybe").is_err());
        assert!(Command::parse("interval soon").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }

    #[test]
    fn test_zero_interval_parses() {
        // Rejected by the scheduler, not the parser
        assert_eq!(Command::parse("interval 0").unwrap(), Some(Command::Interval(0)));
    }
}
