mod uploads;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::info;
use uuid::Uuid;

use dayanisma_core::attachment::{AttachmentKind, OutgoingFile};
use dayanisma_core::config::ChatConfig;
use dayanisma_core::labels::Labels;
use dayanisma_core::service::ChatService;
use dayanisma_db::Database;

use crate::uploads::{DiskUploader, guess_mime};

type Service = ChatService<Database, DiskUploader>;

const USAGE: &str = "usage:
  dayanisma [summaries]
  dayanisma thread <conversation-id>
  dayanisma send <conversation-id> <text...>
  dayanisma send-file <conversation-id> <path> [caption...]
  dayanisma react <conversation-id> <message-id> <emoji>";

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "dayanisma=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let config = ChatConfig::from_env()?;
    let db_path = std::env::var("DAYANISMA_DB_PATH").unwrap_or_else(|_| "dayanisma.db".into());
    let upload_dir = std::env::var("DAYANISMA_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());
    let viewer: Uuid = std::env::var("DAYANISMA_VIEWER_ID")
        .context("DAYANISMA_VIEWER_ID is not set")?
        .parse()
        .context("DAYANISMA_VIEWER_ID is not a valid id")?;

    let mut labels = Labels::for_locale(config.locale);
    if let Ok(path) = std::env::var("DAYANISMA_LABELS_PATH") {
        let json = std::fs::read_to_string(&path).with_context(|| format!("reading labels from {path}"))?;
        labels = labels.with_overrides_json(&json)?;
    }

    // Init database
    let db = Database::open(&PathBuf::from(&db_path))?;
    let service = ChatService::new(db, DiskUploader::new(upload_dir), config).with_labels(labels);
    info!(viewer = %viewer, "console ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("summaries") => summaries(&service, viewer),
        Some("thread") => thread(&service, viewer, id_arg(&args, 1)?),
        Some("send") => send_text(&service, viewer, id_arg(&args, 1)?, &args[2..]),
        Some("send-file") => {
            let Some(path) = args.get(2) else {
                bail!(USAGE);
            };
            send_file(&service, viewer, id_arg(&args, 1)?, Path::new(path), &args[3..])
        }
        Some("react") => {
            let Some(emoji) = args.get(3) else {
                bail!(USAGE);
            };
            react(&service, viewer, id_arg(&args, 1)?, id_arg(&args, 2)?, emoji)
        }
        Some(_) => bail!(USAGE),
    }
}

fn id_arg(args: &[String], index: usize) -> anyhow::Result<Uuid> {
    let Some(raw) = args.get(index) else {
        bail!(USAGE);
    };
    raw.parse().with_context(|| format!("'{raw}' is not a valid id"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn summaries(service: &Service, viewer: Uuid) -> anyhow::Result<()> {
    for summary in service.summaries(viewer, service.store())? {
        print_json(&summary)?;
    }
    Ok(())
}

/// Print the thread and mark it read, as opening it on screen would.
fn thread(service: &Service, viewer: Uuid, conversation_id: Uuid) -> anyhow::Result<()> {
    let mut timeline = service.load_timeline(conversation_id)?;
    for item in service.render_thread(&timeline, viewer, service.store()) {
        print_json(&item)?;
    }
    service.mark_read(&mut timeline, viewer)?;
    Ok(())
}

fn send_text(service: &Service, viewer: Uuid, conversation_id: Uuid, words: &[String]) -> anyhow::Result<()> {
    let mut timeline = service.load_timeline(conversation_id)?;
    let mut composer = service.composer(conversation_id);
    composer.set_text(words.join(" "));

    match service.send_draft(&mut composer, viewer, &mut timeline, service.store())? {
        Some(message) => print_json(&message),
        None => bail!("nothing to send"),
    }
}

fn send_file(
    service: &Service,
    viewer: Uuid,
    conversation_id: Uuid,
    path: &Path,
    caption: &[String],
) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;

    let mut timeline = service.load_timeline(conversation_id)?;
    let mut composer = service.composer(conversation_id);
    composer.attach(OutgoingFile::with_bytes(name, guess_mime(path), bytes), AttachmentKind::File)?;
    composer.set_text(caption.join(" "));

    match service.send_draft(&mut composer, viewer, &mut timeline, service.store())? {
        Some(message) => print_json(&message),
        None => bail!("nothing to send"),
    }
}

fn react(service: &Service, viewer: Uuid, conversation_id: Uuid, message_id: Uuid, emoji: &str) -> anyhow::Result<()> {
    let mut timeline = service.load_timeline(conversation_id)?;
    let change = service.toggle_reaction(&mut timeline, message_id, viewer, emoji)?;
    info!(message = %message_id, ?change, "reaction toggled");
    print_json(&timeline.reactions(message_id, viewer))
}
