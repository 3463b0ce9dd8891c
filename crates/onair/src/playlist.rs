use std::time::Duration;

use futures::StreamExt;
use url::Url;

use crate::{
    load_error::{ErrorKind, LoadError},
    source::StreamRequest,
    util::http::HttpClient,
};

/// Playlists are a few lines of text. Anything larger is not a playlist.
pub const MAX_PLAYLIST_BYTES: usize = 64 * 1024;

/// Station links that point at a playlist rather than at the stream itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Pls,
    M3u,
}

pub fn playlist_kind(url: &Url) -> Option<PlaylistKind> {
    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".pls") {
        Some(PlaylistKind::Pls)
    } else if path.ends_with(".m3u") {
        Some(PlaylistKind::M3u)
    } else {
        None
    }
}

/// Extracts the stream URLs of a playlist, in playlist order.
///
/// Relative entries are resolved against `base`. Entries that are not
/// http(s) URLs are skipped. A playlist without any usable entry is a parse
/// error.
pub fn parse_playlist(kind: PlaylistKind, base: &Url, text: &str) -> Result<Vec<Url>, LoadError> {
    let entries: Vec<&str> = match kind {
        PlaylistKind::Pls => {
            let mut files: Vec<(u32, &str)> = text
                .lines()
                .filter_map(|line| {
                    let (key, value) = line.trim().split_once('=')?;
                    let key = key.trim().to_ascii_lowercase();
                    let number = key.strip_prefix("file")?.parse().ok()?;
                    Some((number, value.trim()))
                })
                .collect();
            files.sort_by_key(|(number, _)| *number);
            files.into_iter().map(|(_, value)| value).collect()
        }
        PlaylistKind::M3u => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect(),
    };

    let urls: Vec<Url> = entries
        .into_iter()
        .filter_map(|entry| match base.join(entry) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                tracing::warn!("Skipping non-HTTP playlist entry {url}");
                None
            }
            Err(e) => {
                tracing::warn!("Skipping invalid playlist entry {entry:?}: {e}");
                None
            }
        })
        .collect();

    if urls.is_empty() {
        return Err(LoadError::parse(format!(
            "No stream found in {kind:?} playlist {base}"
        )));
    }
    Ok(urls)
}

/// Resolves a playlist link to a request for its first stream.
///
/// Requests that are not playlists are returned unchanged. Failures are
/// reported as load errors of the playlist fetch: a 4xx/5xx status here is a
/// plain response code error, and a body over [`MAX_PLAYLIST_BYTES`] is a
/// parse error. Waiting for headers and for each body chunk is bounded by the
/// client's read timeout.
pub async fn resolve(client: &HttpClient, request: &StreamRequest) -> Result<StreamRequest, LoadError> {
    let Some(kind) = playlist_kind(request.url()) else {
        return Ok(request.clone());
    };

    tracing::info!("Fetching {kind:?} playlist {}", request.url());
    let read_timeout = client.read_timeout();
    let mut builder = client.get(request.url().clone());
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let response = tokio::time::timeout(read_timeout, builder.send())
        .await
        .map_err(|_| timed_out(request, read_timeout))?
        .map_err(|e| LoadError::from_std(&e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::response_code(status.as_u16()));
    }
    if response
        .content_length()
        .is_some_and(|len| len > MAX_PLAYLIST_BYTES as u64)
    {
        return Err(too_large(request));
    }

    let base = response.url().clone();
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    loop {
        let chunk = match tokio::time::timeout(read_timeout, chunks.next()).await {
            Err(_) => return Err(timed_out(request, read_timeout)),
            Ok(None) => break,
            Ok(Some(chunk)) => chunk.map_err(|e| LoadError::from_std(&e))?,
        };
        if body.len() + chunk.len() > MAX_PLAYLIST_BYTES {
            return Err(too_large(request));
        }
        body.extend_from_slice(&chunk);
    }

    let text = String::from_utf8_lossy(&body);
    let urls = parse_playlist(kind, &base, &text)?;
    tracing::debug!("Playlist {} lists {} streams", request.url(), urls.len());

    Ok(request.with_url(urls[0].clone()))
}

fn timed_out(request: &StreamRequest, read_timeout: Duration) -> LoadError {
    LoadError::new(
        ErrorKind::Timeout,
        format!("Playlist {} sent nothing for {read_timeout:?}", request.url()),
    )
}

fn too_large(request: &StreamRequest) -> LoadError {
    LoadError::parse(format!(
        "Playlist {} is larger than {MAX_PLAYLIST_BYTES} bytes",
        request.url()
    ))
}
