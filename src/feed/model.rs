use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use url::Url;

/// Maximum length for the title portion of a generated filename
const MAX_TITLE_LENGTH: usize = 100;

/// A subscribed feed source.
///
/// The key is the URL the feed was requested from and stays stable
/// across re-fetches; descriptive fields are refreshed each time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub key: Url,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<Url>,
    pub last_build_date: Option<DateTime<FixedOffset>>,
    pub copyright: Option<String>,
}

/// The media file attached to an episode or entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: Url,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// One media item belonging to a feed.
///
/// The enclosure URL is the episode's identity within its feed. The
/// fetcher creates episodes unplayed with zero progress; playback state
/// is mutated by the surrounding player/UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub feed_key: Url,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<Url>,
    pub enclosure: Enclosure,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub copyright: Option<String>,
    pub played: bool,
    pub progress_ms: u64,
}

impl Episode {
    /// Mark the episode as played. The stored progress is retained so a
    /// replay can resume from the last known position.
    pub fn mark_played(&mut self) {
        self.played = true;
    }

    /// Mark the episode as unplayed
    pub fn mark_unplayed(&mut self) {
        self.played = false;
    }

    /// Record playback progress in milliseconds
    pub fn set_progress(&mut self, progress_ms: u64) {
        self.progress_ms = progress_ms;
    }

    /// Playback progress in seconds
    pub fn progress_seconds(&self) -> f64 {
        self.progress_ms as f64 / 1000.0
    }

    /// Generate a download filename for this episode.
    ///
    /// Format: "YYYY-MM-DD-sanitized-title.ext" or
    /// "undated-sanitized-title.ext" when no publish date is known.
    pub fn download_filename(&self) -> String {
        let date_prefix = self
            .pub_date
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());

        format!(
            "{}-{}.{}",
            date_prefix,
            sanitize_title(&self.title),
            self.media_extension()
        )
    }

    /// The media file extension for this episode's enclosure.
    ///
    /// Taken from the URL path when it carries a known audio extension,
    /// then from the MIME type, defaulting to "mp3".
    pub fn media_extension(&self) -> String {
        if let Some(ext) = self
            .enclosure
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|filename| filename.rsplit('.').next())
            .filter(|ext| is_known_audio_extension(ext))
        {
            return ext.to_lowercase();
        }

        if let Some(ref mime) = self.enclosure.mime_type
            && let Some(ext) = mime_to_extension(mime)
        {
            return ext.to_string();
        }

        "mp3".to_string()
    }
}

/// Sanitize a feed title for use in a filename.
///
/// Feed titles routinely contain HTML entities, so the title is decoded
/// before sanitizing and separator collapsing.
fn sanitize_title(title: &str) -> String {
    let decoded = html_escape::decode_html_entities(title);
    let sanitized = sanitize_filename::sanitize(decoded.as_ref());

    let mut collapsed = String::with_capacity(sanitized.len());
    let mut last_was_separator = true;
    for c in sanitized.chars() {
        if c == '-' || c.is_whitespace() {
            if !last_was_separator {
                collapsed.push('-');
                last_was_separator = true;
            }
        } else {
            collapsed.push(c);
            last_was_separator = false;
        }
    }

    let trimmed = collapsed.trim_end_matches('-');
    if trimmed.is_empty() {
        return "untitled".to_string();
    }

    if trimmed.len() > MAX_TITLE_LENGTH {
        let truncated: String = trimmed.chars().take(MAX_TITLE_LENGTH).collect();
        truncated.trim_end_matches('-').to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_known_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
