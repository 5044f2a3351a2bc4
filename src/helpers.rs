use super::*;

pub(super) const HELP_TEXT: &str = "Browse video folders and add files to the shared queue.\n\
/start - pick a folder to browse\n\
/search <keyword> - find videos in every folder\n\
/list - show the queue\n\
Tap a file to append its path to the queue.";

pub(super) fn load_config(path: &Path) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let config = parse_config(&contents, is_json)?;
    Ok(config)
}

pub(super) fn parse_config(contents: &str, is_json: bool) -> Result<Config> {
    let config: Config = if is_json {
        serde_json::from_str(contents).context("parse config")?
    } else {
        toml::from_str(contents).context("parse config")?
    };
    if config.folders().is_empty() {
        return Err(anyhow!("video_folders must list at least one folder"));
    }
    if config.video_extensions.is_empty() {
        return Err(anyhow!("video_extensions must not be empty"));
    }
    Ok(config)
}

pub(super) fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.trim_start_matches('/');
    Some(cmd.split('@').next().unwrap_or(cmd))
}

/// Everything after the command word, with whitespace runs collapsed.
pub(super) fn command_args(text: &str) -> String {
    text.split_whitespace()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(super) fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}

pub(super) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

/// Returns the seconds left to wait when the call is throttled. Accepted calls
/// record `now_ms` as the new last-use time.
pub(super) fn check_rate_limit(
    limits: &mut HashMap<(u64, &'static str), u64>,
    user_id: u64,
    command: &'static str,
    now_ms: u64,
    limit_secs: u64,
) -> Option<u64> {
    let window_ms = limit_secs.saturating_mul(1000);
    if let Some(last) = limits.get(&(user_id, command)) {
        let elapsed = now_ms.saturating_sub(*last);
        if elapsed < window_ms {
            let remaining_ms = window_ms - elapsed;
            return Some((remaining_ms + 999) / 1000);
        }
    }
    limits.insert((user_id, command), now_ms);
    None
}

pub(super) fn format_wait(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

pub(super) fn parse_callback(data: &str) -> Option<CallbackAction> {
    let mut parts = data.split(':');
    let prefix = parts.next()?;
    let session_id = parts.next()?.to_string();
    match prefix {
        "dir" => {
            let index = parts.next()?.parse().ok()?;
            Some(CallbackAction::Folder { session_id, index })
        }
        "bs" => {
            let action = match parts.next()? {
                "file" => BrowseAction::File(parts.next()?.parse().ok()?),
                "page" => BrowseAction::Page(parts.next()?.parse().ok()?),
                "sort" => BrowseAction::Sort(SortMode::from_key(parts.next()?)?),
                "refresh" => BrowseAction::Refresh,
                "clear" => BrowseAction::Clear,
                "folders" => BrowseAction::Folders,
                "noop" => BrowseAction::Noop,
                _ => return None,
            };
            Some(CallbackAction::Browse { session_id, action })
        }
        _ => None,
    }
}

pub(super) fn render_folder_picker(
    session_id: &str,
    folders: &[PathBuf],
) -> (String, InlineKeyboardMarkup) {
    let rows = folders
        .iter()
        .enumerate()
        .map(|(i, folder)| {
            vec![InlineKeyboardButton::callback(
                format!("📁 {}", folder_label(folder)),
                format!("dir:{}:{}", session_id, i),
            )]
        })
        .collect::<Vec<_>>();
    (
        "📂 Select a folder to browse:".to_string(),
        InlineKeyboardMarkup::new(rows),
    )
}

pub(super) fn render_browse_view(
    session: &BrowseSession,
    config: &Config,
) -> (String, InlineKeyboardMarkup) {
    let per_page = config.page_size();
    let total = total_pages(session.files.len(), per_page);
    let page = clamp_page(session.page, session.files.len(), per_page);
    let (start, end) = page_bounds(page, session.files.len(), per_page);
    let sid = &session.id;

    let mut text = format!("🎮 Files (Page {}/{})", page + 1, total);
    if let Some(folder) = session.folder.and_then(|i| config.folders().get(i)) {
        text.push_str(&format!("\n📁 Folder: {}", folder_label(folder)));
    }
    if let Some(keyword) = &session.search {
        text.push_str(&format!("\n🔍 Searching: '{}'", keyword));
    }
    if session.files.is_empty() {
        text.push_str("\nNo video files found.");
    }

    let mut rows = Vec::new();
    for (index, file) in session.files[start..end].iter().enumerate() {
        rows.push(vec![InlineKeyboardButton::callback(
            file.button_label(),
            format!("bs:{}:file:{}", sid, start + index),
        )]);
    }

    rows.push(
        SortMode::ALL
            .iter()
            .map(|mode| {
                let label = if *mode == session.sort {
                    format!("✅ {}", mode.label())
                } else {
                    mode.label().to_string()
                };
                InlineKeyboardButton::callback(label, format!("bs:{}:sort:{}", sid, mode.key()))
            })
            .collect(),
    );

    if session.search.is_some() {
        rows.push(vec![InlineKeyboardButton::callback(
            "❌ Clear Search",
            format!("bs:{}:clear", sid),
        )]);
    }

    if total > 1 {
        rows.push(
            page_window(page, total)
                .map(|p| {
                    if p == page {
                        InlineKeyboardButton::callback(
                            format!("· {} ·", p + 1),
                            format!("bs:{}:noop", sid),
                        )
                    } else {
                        InlineKeyboardButton::callback(
                            format!("{}", p + 1),
                            format!("bs:{}:page:{}", sid, p),
                        )
                    }
                })
                .collect(),
        );
    }

    let mut nav = Vec::new();
    if page > 0 {
        nav.push(InlineKeyboardButton::callback(
            "⬅️ Prev",
            format!("bs:{}:page:{}", sid, page - 1),
        ));
    }
    if page + 1 < total {
        nav.push(InlineKeyboardButton::callback(
            "Next ⏭️",
            format!("bs:{}:page:{}", sid, page + 1),
        ));
    }
    nav.push(InlineKeyboardButton::callback(
        "🔁 Refresh",
        format!("bs:{}:refresh", sid),
    ));
    if config.folders().len() > 1 {
        nav.push(InlineKeyboardButton::callback(
            "📂 Folders",
            format!("bs:{}:folders", sid),
        ));
    }
    rows.push(nav);

    (text, InlineKeyboardMarkup::new(rows))
}

/// Edits a message in place, treating "message is not modified" as success.
pub(super) async fn edit_view(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
    kb: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let request = bot.edit_message_text(chat_id, message_id, text);
    let result = match kb {
        Some(kb) => request.reply_markup(kb).await,
        None => request.await,
    };
    match result {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn send_error(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    bot.send_message(chat_id, text).await?;
    Ok(())
}
