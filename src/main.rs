use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId, User};
use teloxide::{ApiError, RequestError};
use tokio::sync::Mutex;
use uuid::Uuid;

mod callback_handlers;
mod helpers;
mod library;
mod message_handlers;
mod queue;

use callback_handlers::handle_callback;
use helpers::*;
use library::*;
use message_handlers::handle_message;
use queue::*;

const DEFAULT_RATE_LIMIT_SECS: u64 = 5;
const DEFAULT_FILES_PER_PAGE: usize = 75;
const MAX_FILES_PER_PAGE: usize = 90;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;
// Telegram counts message length in UTF-16 code units.
const MAX_MESSAGE_UNITS: usize = 4000;
const EXPIRED_TEXT: &str = "This list has expired. Send /start again.";
const FAILED_TEXT: &str = "⚠️ Something went wrong. Try again.";

#[derive(Debug, Deserialize, Clone)]
struct Config {
    #[serde(alias = "BOT_TOKEN")]
    token: String,
    #[serde(alias = "VIDEO_FOLDER")]
    video_folders: FolderList,
    #[serde(alias = "NOTEPAD_FILE")]
    queue_path: PathBuf,
    #[serde(alias = "TIME_LIMIT", default = "default_rate_limit")]
    rate_limit_seconds: u64,
    #[serde(default = "default_files_per_page")]
    files_per_page: usize,
    #[serde(default = "default_video_extensions")]
    video_extensions: Vec<String>,
    #[serde(default)]
    allowed_user_ids: Vec<u64>,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    retry_interval_seconds: Option<u64>,
    activity_log_path: Option<PathBuf>,
}

/// Accepts either a single folder or a list of folders.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum FolderList {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl FolderList {
    fn paths(&self) -> &[PathBuf] {
        match self {
            FolderList::One(path) => std::slice::from_ref(path),
            FolderList::Many(paths) => paths,
        }
    }
}

impl Config {
    fn folders(&self) -> &[PathBuf] {
        self.video_folders.paths()
    }

    fn page_size(&self) -> usize {
        self.files_per_page.clamp(1, MAX_FILES_PER_PAGE)
    }

    fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}

fn default_rate_limit() -> u64 {
    DEFAULT_RATE_LIMIT_SECS
}

fn default_files_per_page() -> usize {
    DEFAULT_FILES_PER_PAGE
}

fn default_video_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "mkv".to_string()]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,
}

#[derive(Clone, Debug)]
struct VideoFile {
    name: String,
    path: PathBuf,
    folder: PathBuf,
    modified: Option<SystemTime>,
}

impl VideoFile {
    fn folder_label(&self) -> String {
        folder_label(&self.folder)
    }

    fn button_label(&self) -> String {
        format!("{} ({})", self.name, self.folder_label())
    }

    fn queue_line(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortMode {
    Az,
    Za,
    Newest,
    Oldest,
    Shuffle,
}

impl SortMode {
    const ALL: [SortMode; 5] = [
        SortMode::Az,
        SortMode::Za,
        SortMode::Newest,
        SortMode::Oldest,
        SortMode::Shuffle,
    ];

    fn key(self) -> &'static str {
        match self {
            SortMode::Az => "az",
            SortMode::Za => "za",
            SortMode::Newest => "new",
            SortMode::Oldest => "old",
            SortMode::Shuffle => "shuffle",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        SortMode::ALL.into_iter().find(|mode| mode.key() == key)
    }

    fn label(self) -> &'static str {
        match self {
            SortMode::Az => "🔼 A-Z",
            SortMode::Za => "🔽 Z-A",
            SortMode::Newest => "🆕 Newest",
            SortMode::Oldest => "📁 Oldest",
            SortMode::Shuffle => "🎲 Shuffle",
        }
    }
}

#[derive(Clone, Debug)]
struct BrowseSession {
    id: String,
    folder: Option<usize>,
    /// Folder to return to when a search is cleared.
    return_folder: Option<usize>,
    search: Option<String>,
    files: Vec<VideoFile>,
    sort: SortMode,
    page: usize,
}

impl BrowseSession {
    fn new() -> Self {
        BrowseSession {
            id: short_id(),
            folder: None,
            return_folder: None,
            search: None,
            files: Vec::new(),
            sort: SortMode::Az,
            page: 0,
        }
    }

    /// Replaces the file list, applying the current sort and clamping the page.
    fn load_files(&mut self, mut files: Vec<VideoFile>, per_page: usize) {
        sort_files(&mut files, self.sort);
        self.files = files;
        self.go_to_page(self.page, per_page);
    }

    fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
        sort_files(&mut self.files, sort);
    }

    fn go_to_page(&mut self, page: usize, per_page: usize) {
        self.page = clamp_page(page, self.files.len(), per_page);
    }

    fn reset_to_folder(&mut self, folder: usize) {
        self.folder = Some(folder);
        self.return_folder = None;
        self.search = None;
        self.sort = SortMode::Az;
        self.page = 0;
    }

    /// Starts a search session, remembering the folder the user was browsing.
    fn for_search(keyword: String, previous: Option<&BrowseSession>) -> Self {
        let mut session = BrowseSession::new();
        session.return_folder = previous.and_then(|prev| prev.folder.or(prev.return_folder));
        session.search = Some(keyword);
        session
    }

    fn source(&self) -> ListSource {
        match (&self.search, self.folder) {
            (Some(keyword), _) => ListSource::Search(keyword.clone()),
            (None, Some(folder)) => ListSource::Folder(folder),
            (None, None) => ListSource::Picker,
        }
    }

    /// Folder that "Clear Search" returns to; `None` means the folder picker.
    fn clear_target(&self) -> Option<usize> {
        self.return_folder.or(self.folder)
    }

    fn reset_to_picker(&mut self) {
        self.folder = None;
        self.return_folder = None;
        self.search = None;
        self.files.clear();
        self.sort = SortMode::Az;
        self.page = 0;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ListSource {
    Search(String),
    Folder(usize),
    Picker,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum CallbackAction {
    Folder { session_id: String, index: usize },
    Browse { session_id: String, action: BrowseAction },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BrowseAction {
    File(usize),
    Page(usize),
    Sort(SortMode),
    Refresh,
    Clear,
    Folders,
    Noop,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct PendingAppend {
    queue_path: PathBuf,
    line: String,
    user_id: u64,
}

struct AppState {
    config: Config,
    write_lock: Mutex<()>,
    sessions: Mutex<HashMap<u64, BrowseSession>>,
    rate_limits: Mutex<HashMap<(u64, &'static str), u64>>,
    pending: Mutex<Vec<PendingAppend>>,
    pending_path: PathBuf,
}

#[derive(Debug)]
enum AppendOutcome {
    Appended,
    Queued,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    fs::create_dir_all(&config.data_dir).context("create data_dir")?;

    let pending_path = config.data_dir.join("pending.json");
    let pending = load_pending(&pending_path)?;
    if !pending.is_empty() {
        info!("loaded {} pending appends", pending.len());
    }

    let state = AppState {
        config: config.clone(),
        write_lock: Mutex::new(()),
        sessions: Mutex::new(HashMap::new()),
        rate_limits: Mutex::new(HashMap::new()),
        pending: Mutex::new(pending),
        pending_path,
    };

    let state = std::sync::Arc::new(state);

    let retry_secs = config
        .retry_interval_seconds
        .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);
    start_retry_loop(state.clone(), retry_secs);

    info!(
        "serving {} folder(s), queue file {}",
        config.folders().len(),
        config.queue_path.display()
    );

    let bot = Bot::new(config.token.clone());

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
