use super::*;

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};

pub(super) fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open queue {}", path.display()))?;

    let mut data = String::new();
    if needs_leading_newline(&mut file)? {
        data.push('\n');
    }
    data.push_str(line);
    data.push('\n');

    file.write_all(data.as_bytes())
        .with_context(|| format!("append queue {}", path.display()))?;
    file.flush().context("flush queue")?;
    file.sync_all().context("sync queue")?;
    Ok(())
}

// True when the file has content that does not end in a newline.
fn needs_leading_newline(file: &mut fs::File) -> Result<bool> {
    let len = file.metadata().context("stat queue")?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1)).context("seek queue")?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).context("read queue tail")?;
    Ok(last[0] != b'\n')
}

pub(super) fn read_queue(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read queue {}", path.display()))?;
    Ok(Some(contents))
}

/// Renders the queue contents for a chat message, keeping the newest lines
/// when the whole file does not fit.
pub(super) fn queue_summary(contents: Option<&str>) -> String {
    let Some(contents) = contents else {
        return "📄 Queue file not found.".to_string();
    };
    let lines: Vec<&str> = contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return "📄 Queue is empty.".to_string();
    }

    let header = format!("📄 Items in queue ({}):", lines.len());
    let mut budget = MAX_MESSAGE_UNITS.saturating_sub(utf16_len(&header) + 64);
    let mut shown = Vec::new();
    for line in lines.iter().rev() {
        let cost = utf16_len(line) + 1;
        if cost > budget {
            break;
        }
        budget -= cost;
        shown.push(*line);
    }
    shown.reverse();

    let mut text = header;
    let hidden = lines.len() - shown.len();
    if hidden > 0 {
        text.push_str(&format!("\n… {} earlier items not shown", hidden));
    }
    for line in shown {
        text.push('\n');
        text.push_str(line);
    }
    text
}

pub(super) fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

pub(super) async fn append_or_queue(
    state: &std::sync::Arc<AppState>,
    op: PendingAppend,
) -> Result<AppendOutcome> {
    match apply_append(state, &op).await {
        Ok(()) => Ok(AppendOutcome::Appended),
        Err(err) => {
            error!("write failed: {:#}", err);
            queue_pending(state, op).await?;
            Ok(AppendOutcome::Queued)
        }
    }
}

pub(super) async fn apply_append(state: &std::sync::Arc<AppState>, op: &PendingAppend) -> Result<()> {
    let _guard = state.write_lock.lock().await;
    with_retries(|| append_line(&op.queue_path, &op.line)).await
}

async fn queue_pending(state: &std::sync::Arc<AppState>, op: PendingAppend) -> Result<()> {
    let mut pending = state.pending.lock().await;
    pending.push(op);
    save_pending(&state.pending_path, &pending)
}

pub(super) async fn with_retries<F, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for attempt in 0..3 {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
        if attempt < 2 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("retry failed")))
}

pub(super) fn load_pending(path: &Path) -> Result<Vec<PendingAppend>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("read pending {}", path.display()))?;
    let pending = serde_json::from_str(&data).context("parse pending")?;
    Ok(pending)
}

pub(super) fn save_pending(path: &Path, pending: &[PendingAppend]) -> Result<()> {
    let data = serde_json::to_vec_pretty(pending).context("serialize pending")?;
    atomic_write(path, &data)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(data).context("write temp file")?;
    tmp.flush().context("flush temp file")?;
    tmp.as_file_mut().sync_all().context("sync temp file")?;
    tmp.persist(path)
        .map_err(|e| anyhow!("persist temp file: {}", e))?;
    Ok(())
}

pub(super) fn start_retry_loop(state: std::sync::Arc<AppState>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(err) = process_pending(state.clone()).await {
                error!("pending processing failed: {:#}", err);
            }
        }
    });
}

pub(super) async fn process_pending(state: std::sync::Arc<AppState>) -> Result<()> {
    let pending = {
        let mut queue = state.pending.lock().await;
        std::mem::take(&mut *queue)
    };

    if pending.is_empty() {
        return Ok(());
    }

    let mut remaining = Vec::new();
    for op in pending {
        match apply_append(&state, &op).await {
            Ok(()) => info!("pending append written for user {}: {}", op.user_id, op.line),
            Err(err) => {
                error!("pending append failed: {:#}", err);
                remaining.push(op);
            }
        }
    }

    let mut queue = state.pending.lock().await;
    if !queue.is_empty() {
        remaining.extend(queue.drain(..));
    }
    *queue = remaining;
    save_pending(&state.pending_path, &queue)
}

pub(super) fn activity_line(
    user_id: u64,
    user_name: &str,
    action: &str,
    at: chrono::DateTime<chrono::Local>,
) -> String {
    format!(
        "{} user {} ({}) {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        user_id,
        user_name,
        action
    )
}

pub(super) fn record_activity(config: &Config, user: &User, action: &str) {
    let Some(path) = config.activity_log_path.as_deref() else {
        return;
    };
    let line = activity_line(user.id.0, &user.full_name(), action, chrono::Local::now());
    if let Err(err) = append_line(path, &line) {
        error!("activity log failed: {:#}", err);
    }
}
