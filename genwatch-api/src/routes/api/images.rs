use crate::{
    routes::{error_response, handle_result_as_json, IMAGES_ROUTE},
    Error, SharedAppState,
};
use genwatch_core::images::{ClearImagesResponse, ImageListEntry};

use axum::{extract::State, response::Response, routing, Router};
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

pub fn router() -> Router<SharedAppState> {
    Router::new().route("/", routing::get(list_images).delete(clear_images))
}

/// Recovers the prompt from a `<prompt>_<timestamp>_<n>.<ext>` file name.
fn prompt_from_file_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let mut prompt = stem;
    for _ in 0..2 {
        match prompt.rsplit_once('_') {
            Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
                prompt = head
            }
            _ => break,
        }
    }
    prompt.replace('_', " ")
}

fn is_image(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

async fn read_images(dir: &Path, extensions: &[String]) -> io::Result<Vec<ImageListEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_image(&path, extensions) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        let name = entry.file_name().to_string_lossy().into_owned();
        images.push(ImageListEntry {
            prompt: prompt_from_file_name(&name),
            path: format!("{IMAGES_ROUTE}/{name}"),
            name,
            created_at,
        });
    }

    images.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(images)
}

async fn remove_images(dir: &Path, extensions: &[String]) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut deleted = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_image(&path, extensions) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(deleted)
}

async fn list_images(State(state): State<SharedAppState>) -> Response {
    let dir = &state.config.output_dir;
    let extensions = &state.notifier.settings().image_extensions;
    handle_result_as_json(
        read_images(dir, extensions)
            .await
            .map_err(|e| Error::OutputDirFailed(dir.clone(), e)),
    )
}

async fn clear_images(State(state): State<SharedAppState>) -> Response {
    let dir = state.config.output_dir.clone();
    // holding the reservation keeps a new job from starting mid-clear
    let _reservation = match state.jobs.reserve(dir.clone()) {
        Ok(reservation) => reservation,
        Err(e) => return error_response(e),
    };

    let extensions = &state.notifier.settings().image_extensions;
    let result = remove_images(&dir, extensions)
        .await
        .map(|deleted| {
            log::info!("deleted {deleted} image(s) from `{}`", dir.display());
            ClearImagesResponse { deleted }
        })
        .map_err(|e| Error::OutputDirFailed(dir.clone(), e));
    handle_result_as_json(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> Vec<String> {
        vec!["png".to_string()]
    }

    #[test]
    fn prompt_is_recovered_from_the_file_name() {
        assert_eq!(
            prompt_from_file_name("A_painting_of_a_beach_1700000000000_2.png"),
            "A painting of a beach"
        );
        assert_eq!(prompt_from_file_name("sunset_3.png"), "sunset");
        assert_eq!(prompt_from_file_name("just_words.png"), "just words");
    }

    #[tokio::test]
    async fn lists_and_clears_only_images() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("beach_1700000000000_1.png"), b"png").unwrap();
        std::fs::write(tmp.path().join("forest_1700000000001_1.PNG"), b"png").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"text").unwrap();

        let images = read_images(tmp.path(), &png()).await.unwrap();
        let mut names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["beach_1700000000000_1.png", "forest_1700000000001_1.PNG"]
        );
        assert!(images
            .iter()
            .all(|i| i.path == format!("/generated_images/{}", i.name)));

        assert_eq!(remove_images(tmp.path(), &png()).await.unwrap(), 2);
        assert!(tmp.path().join("notes.txt").exists());
        assert!(read_images(tmp.path(), &png()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_has_no_images() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        assert!(read_images(&missing, &png()).await.unwrap().is_empty());
        assert_eq!(remove_images(&missing, &png()).await.unwrap(), 0);
    }
}
