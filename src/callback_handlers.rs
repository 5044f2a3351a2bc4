use super::*;

pub(super) async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: std::sync::Arc<AppState>,
) -> Result<()> {
    if !state.config.is_allowed(q.from.id.0) {
        return Ok(());
    }

    let Some(message) = q.message.clone() else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let Some(action) = q.data.as_deref().and_then(parse_callback) else {
        bot.answer_callback_query(q.id).text(EXPIRED_TEXT).await?;
        return Ok(());
    };

    let session_id = match &action {
        CallbackAction::Folder { session_id, .. } | CallbackAction::Browse { session_id, .. } => {
            session_id.clone()
        }
    };
    let Some(mut session) = take_session(&state, q.from.id.0, &session_id).await else {
        bot.answer_callback_query(q.id).text(EXPIRED_TEXT).await?;
        return Ok(());
    };

    let chat_id = message.chat.id;
    let outcome = match action {
        CallbackAction::Folder { index, .. } => {
            handle_folder_callback(&bot, chat_id, message.id, &state, &mut session, index).await
        }
        CallbackAction::Browse { action, .. } => {
            handle_browse_callback(&bot, &q.from, chat_id, message.id, &state, &mut session, action)
                .await
        }
    };

    state.sessions.lock().await.insert(q.from.id.0, session);

    // Answer before propagating so the client's spinner always stops.
    let answer = match callback_toast(&outcome) {
        Some(text) => bot.answer_callback_query(q.id).text(text).await,
        None => bot.answer_callback_query(q.id).await,
    };
    outcome?;
    answer?;
    Ok(())
}

pub(super) fn callback_toast(outcome: &Result<Option<String>>) -> Option<String> {
    match outcome {
        Ok(toast) => toast.clone(),
        Err(_) => Some(FAILED_TEXT.to_string()),
    }
}

// Removes the user's session if the callback belongs to it; stale keyboards leave it in place.
pub(super) async fn take_session(
    state: &std::sync::Arc<AppState>,
    user_id: u64,
    session_id: &str,
) -> Option<BrowseSession> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions.remove(&user_id)?;
    if session.id != session_id {
        sessions.insert(user_id, session);
        return None;
    }
    Some(session)
}

/// Returns an optional toast for the callback answer.
async fn handle_folder_callback(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &std::sync::Arc<AppState>,
    session: &mut BrowseSession,
    index: usize,
) -> Result<Option<String>> {
    let Some(folder) = state.config.folders().get(index) else {
        return Ok(Some(EXPIRED_TEXT.to_string()));
    };

    let files = match list_videos(folder, &state.config.video_extensions) {
        Ok(files) => files,
        Err(err) => {
            error!("list folder failed: {:#}", err);
            send_error(
                bot,
                chat_id,
                &format!("⚠️ Could not read folder {}.", folder_label(folder)),
            )
            .await?;
            return Ok(None);
        }
    };

    session.reset_to_folder(index);
    session.load_files(files, state.config.page_size());
    let (text, kb) = render_browse_view(session, &state.config);
    edit_view(bot, chat_id, message_id, text, Some(kb)).await?;
    Ok(None)
}

async fn handle_browse_callback(
    bot: &Bot,
    user: &User,
    chat_id: ChatId,
    message_id: MessageId,
    state: &std::sync::Arc<AppState>,
    session: &mut BrowseSession,
    action: BrowseAction,
) -> Result<Option<String>> {
    let per_page = state.config.page_size();
    match action {
        BrowseAction::File(index) => {
            let Some(file) = session.files.get(index).cloned() else {
                return Ok(Some(EXPIRED_TEXT.to_string()));
            };
            append_selected_file(bot, user, chat_id, message_id, state, &file).await?;
            return Ok(None);
        }
        BrowseAction::Page(page) => session.go_to_page(page, per_page),
        BrowseAction::Sort(mode) => {
            session.set_sort(mode);
            session.go_to_page(session.page, per_page);
        }
        BrowseAction::Refresh => {
            match session.source() {
                ListSource::Search(keyword) => {
                    let files = search_videos(
                        state.config.folders(),
                        &state.config.video_extensions,
                        &keyword,
                    );
                    session.load_files(files, per_page);
                }
                ListSource::Folder(index) => {
                    let Some(folder) = state.config.folders().get(index) else {
                        return Ok(Some(EXPIRED_TEXT.to_string()));
                    };
                    match list_videos(folder, &state.config.video_extensions) {
                        Ok(files) => session.load_files(files, per_page),
                        Err(err) => {
                            error!("refresh folder failed: {:#}", err);
                            return Ok(Some(format!(
                                "⚠️ Could not read folder {}.",
                                folder_label(folder)
                            )));
                        }
                    }
                }
                ListSource::Picker => {
                    return show_folder_picker(bot, chat_id, message_id, state, session).await;
                }
            }
        }
        BrowseAction::Clear => match session.clear_target() {
            Some(index) => {
                let Some(folder) = state.config.folders().get(index) else {
                    return show_folder_picker(bot, chat_id, message_id, state, session).await;
                };
                let files = match list_videos(folder, &state.config.video_extensions) {
                    Ok(files) => files,
                    Err(err) => {
                        error!("list folder failed: {:#}", err);
                        return show_folder_picker(bot, chat_id, message_id, state, session).await;
                    }
                };
                session.reset_to_folder(index);
                session.load_files(files, per_page);
            }
            None => return show_folder_picker(bot, chat_id, message_id, state, session).await,
        },
        BrowseAction::Folders => {
            return show_folder_picker(bot, chat_id, message_id, state, session).await;
        }
        BrowseAction::Noop => return Ok(None),
    }

    let (text, kb) = render_browse_view(session, &state.config);
    edit_view(bot, chat_id, message_id, text, Some(kb)).await?;
    Ok(None)
}

async fn show_folder_picker(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &std::sync::Arc<AppState>,
    session: &mut BrowseSession,
) -> Result<Option<String>> {
    session.reset_to_picker();
    let (text, kb) = render_folder_picker(&session.id, state.config.folders());
    edit_view(bot, chat_id, message_id, text, Some(kb)).await?;
    Ok(None)
}

async fn append_selected_file(
    bot: &Bot,
    user: &User,
    chat_id: ChatId,
    message_id: MessageId,
    state: &std::sync::Arc<AppState>,
    file: &VideoFile,
) -> Result<()> {
    let op = PendingAppend {
        queue_path: state.config.queue_path.clone(),
        line: file.queue_line(),
        user_id: user.id.0,
    };

    match append_or_queue(state, op).await? {
        AppendOutcome::Appended => {
            info!("user {} ({}) appended {}", user.id.0, user.full_name(), file.path.display());
            record_activity(&state.config, user, &format!("appended {}", file.queue_line()));
            edit_view(
                bot,
                chat_id,
                message_id,
                format!("✅ Appended:\n{}", file.name),
                None,
            )
            .await?;
            match read_queue(&state.config.queue_path) {
                Ok(contents) => {
                    bot.send_message(chat_id, queue_summary(contents.as_deref()))
                        .await?;
                }
                Err(err) => error!("read queue after append failed: {:#}", err),
            }
        }
        AppendOutcome::Queued => {
            send_error(bot, chat_id, "⚠️ Write failed; queued for retry.").await?;
        }
    }
    Ok(())
}
