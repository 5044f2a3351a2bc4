use super::*;

pub(super) async fn handle_message(bot: Bot, msg: Message, state: std::sync::Arc<AppState>) -> Result<()> {
    let user = match msg.from() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    if !state.config.is_allowed(user.id.0) {
        return Ok(());
    }

    let text = match msg.text() {
        Some(text) => text.to_string(),
        None => return Ok(()),
    };

    match parse_command(&text) {
        Some("start") => {
            if rate_limited(&bot, &msg, &state, &user, "start").await? {
                return Ok(());
            }
            handle_start_command(&bot, &msg, &state, &user).await?;
        }
        Some("search") => {
            let keyword = command_args(&text).to_lowercase();
            if keyword.is_empty() {
                bot.send_message(msg.chat.id, "❌ Usage: /search keyword").await?;
                return Ok(());
            }
            if rate_limited(&bot, &msg, &state, &user, "search").await? {
                return Ok(());
            }
            handle_search_command(&bot, &msg, &state, &user, keyword).await?;
        }
        Some("list") => {
            record_activity(&state.config, &user, "used /list");
            handle_list_command(&bot, &msg, &state).await?;
        }
        Some("help") => {
            record_activity(&state.config, &user, "used /help");
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Send /start to browse or /help for commands.")
                .await?;
        }
    }

    Ok(())
}

async fn rate_limited(
    bot: &Bot,
    msg: &Message,
    state: &std::sync::Arc<AppState>,
    user: &User,
    command: &'static str,
) -> Result<bool> {
    let wait = {
        let mut limits = state.rate_limits.lock().await;
        check_rate_limit(
            &mut limits,
            user.id.0,
            command,
            now_ms(),
            state.config.rate_limit_seconds,
        )
    };
    let Some(wait) = wait else {
        return Ok(false);
    };
    warn!("user {} throttled on /{} ({}s left)", user.id.0, command, wait);
    bot.send_message(
        msg.chat.id,
        format!("⏳ You can use /{} again in {}.", command, format_wait(wait)),
    )
    .await?;
    Ok(true)
}

async fn handle_start_command(
    bot: &Bot,
    msg: &Message,
    state: &std::sync::Arc<AppState>,
    user: &User,
) -> Result<()> {
    info!("user {} ({}) used /start", user.id.0, user.full_name());
    record_activity(&state.config, user, "used /start");

    let mut session = BrowseSession::new();
    let folders = state.config.folders();

    let (text, kb) = if folders.len() == 1 {
        session.reset_to_folder(0);
        match list_videos(&folders[0], &state.config.video_extensions) {
            Ok(files) => {
                session.load_files(files, state.config.page_size());
                render_browse_view(&session, &state.config)
            }
            Err(err) => {
                error!("list folder failed: {:#}", err);
                send_error(
                    bot,
                    msg.chat.id,
                    &format!("⚠️ Could not read folder {}.", folder_label(&folders[0])),
                )
                .await?;
                return Ok(());
            }
        }
    } else {
        render_folder_picker(&session.id, folders)
    };

    state.sessions.lock().await.insert(user.id.0, session);
    bot.send_message(msg.chat.id, text).reply_markup(kb).await?;
    Ok(())
}

async fn handle_search_command(
    bot: &Bot,
    msg: &Message,
    state: &std::sync::Arc<AppState>,
    user: &User,
    keyword: String,
) -> Result<()> {
    info!("user {} ({}) searched '{}'", user.id.0, user.full_name(), keyword);
    record_activity(&state.config, user, &format!("searched '{}'", keyword));

    let matches = search_videos(state.config.folders(), &state.config.video_extensions, &keyword);
    if matches.is_empty() {
        bot.send_message(msg.chat.id, "🔍 No matching files found.").await?;
        return Ok(());
    }

    let mut session = {
        let sessions = state.sessions.lock().await;
        BrowseSession::for_search(keyword, sessions.get(&user.id.0))
    };
    session.load_files(matches, state.config.page_size());

    let (text, kb) = render_browse_view(&session, &state.config);
    state.sessions.lock().await.insert(user.id.0, session);
    bot.send_message(msg.chat.id, text).reply_markup(kb).await?;
    Ok(())
}

async fn handle_list_command(
    bot: &Bot,
    msg: &Message,
    state: &std::sync::Arc<AppState>,
) -> Result<()> {
    let text = match read_queue(&state.config.queue_path) {
        Ok(contents) => queue_summary(contents.as_deref()),
        Err(err) => {
            error!("read queue failed: {:#}", err);
            "⚠️ Could not read the queue file.".to_string()
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
