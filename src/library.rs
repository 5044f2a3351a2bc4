use super::*;

use std::cmp::Ordering;

pub(super) fn list_videos(folder: &Path, extensions: &[String]) -> Result<Vec<VideoFile>> {
    let mut files = Vec::new();
    let entries =
        fs::read_dir(folder).with_context(|| format!("read dir {}", folder.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry {}", folder.display()))?;
        let path = entry.path();
        // Follows symlinks so linked videos show up too.
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("skip {}: {}", path.display(), err);
                continue;
            }
        };
        if !metadata.is_file() || !has_video_extension(&path, extensions) {
            continue;
        }
        // Queue lines must name the real file, so paths that are not UTF-8 are skipped.
        let (Some(name), Some(_)) = (entry.file_name().to_str().map(str::to_string), path.to_str())
        else {
            warn!("skip non-UTF-8 path {}", path.display());
            continue;
        };
        if name.contains('\n') || name.contains('\r') {
            continue;
        }
        files.push(VideoFile {
            name,
            path,
            folder: folder.to_path_buf(),
            modified: metadata.modified().ok(),
        });
    }
    Ok(files)
}

pub(super) fn search_videos(
    folders: &[PathBuf],
    extensions: &[String],
    keyword: &str,
) -> Vec<VideoFile> {
    let needle = keyword.to_lowercase();
    let mut matches = Vec::new();
    for folder in folders {
        match list_videos(folder, extensions) {
            Ok(files) => matches.extend(
                files
                    .into_iter()
                    .filter(|file| file.name.to_lowercase().contains(&needle)),
            ),
            Err(err) => warn!("search skipped folder: {:#}", err),
        }
    }
    matches
}

pub(super) fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

pub(super) fn sort_files(files: &mut [VideoFile], mode: SortMode) {
    match mode {
        SortMode::Az => files.sort_by(compare_names),
        SortMode::Za => files.sort_by(|a, b| compare_names(b, a)),
        SortMode::Newest => files.sort_by(|a, b| modified_key(b).cmp(&modified_key(a))),
        SortMode::Oldest => files.sort_by(|a, b| modified_key(a).cmp(&modified_key(b))),
        SortMode::Shuffle => {
            let mut rng = rand::thread_rng();
            files.shuffle(&mut rng);
        }
    }
}

fn compare_names(a: &VideoFile, b: &VideoFile) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

fn modified_key(file: &VideoFile) -> SystemTime {
    file.modified.unwrap_or(UNIX_EPOCH)
}

pub(super) fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

pub(super) fn total_pages(len: usize, per_page: usize) -> usize {
    let per_page = per_page.max(1);
    ((len + per_page - 1) / per_page).max(1)
}

pub(super) fn clamp_page(page: usize, len: usize, per_page: usize) -> usize {
    page.min(total_pages(len, per_page) - 1)
}

pub(super) fn page_bounds(page: usize, len: usize, per_page: usize) -> (usize, usize) {
    let start = page.saturating_mul(per_page.max(1)).min(len);
    let end = (start + per_page.max(1)).min(len);
    (start, end)
}

/// Page numbers shown as buttons: two before the current page and two after.
pub(super) fn page_window(page: usize, total: usize) -> std::ops::Range<usize> {
    page.saturating_sub(2)..total.min(page + 3)
}
