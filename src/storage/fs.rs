//! Helpers for the audio files owned by the cache

use std::path::{Path, PathBuf};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "ogg", "opus", "aac", "flac", "wav"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Best-effort check that a cached path still points to a playable file.
///
/// This does NOT decode audio, but rules out:
/// - missing paths
/// - directories / special files
/// - wrong extensions
/// - empty files
pub fn is_valid_audio_path(path: &Path) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    meta.is_file() && is_audio_file(path) && meta.len() > 0
}

/// Turns arbitrary text into something usable as a file name.
pub fn safe_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();

    if cleaned.is_empty() {
        "track".to_string()
    } else {
        cleaned.chars().take(150).collect()
    }
}

/// `<dir>/<artist> - <title>.mp3`
pub fn track_file_path(dir: &Path, artist: &str, title: &str) -> PathBuf {
    dir.join(format!("{}.mp3", safe_file_stem(&format!("{artist} - {title}"))))
}

/// Moves a file, falling back to copy + delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn valid_audio_path_checks() {
        let tmp = TempDir::new().unwrap();
        let song = tmp.path().join("song.mp3");
        let empty = tmp.path().join("empty.mp3");
        let notes = tmp.path().join("notes.txt");

        fs::write(&song, b"aaa").unwrap();
        fs::write(&empty, b"").unwrap();
        fs::write(&notes, b"ccc").unwrap();

        assert!(is_valid_audio_path(&song));
        assert!(!is_valid_audio_path(&empty));
        assert!(!is_valid_audio_path(&notes));
        assert!(!is_valid_audio_path(&tmp.path().join("missing.mp3")));
        assert!(!is_valid_audio_path(tmp.path()));
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(safe_file_stem("AC/DC - T.N.T."), "AC_DC - T.N.T");
        assert_eq!(safe_file_stem("  what?  "), "what_");
        assert_eq!(safe_file_stem("..."), "track");
        assert_eq!(safe_file_stem(""), "track");
    }

    #[test]
    fn track_file_path_joins_artist_and_title() {
        let path = track_file_path(Path::new("/mp3"), "Artist", "Song");
        assert_eq!(path, PathBuf::from("/mp3/Artist - Song.mp3"));
    }

    #[test]
    fn move_file_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("a.mp3");
        let to = tmp.path().join("nested").join("b.mp3");
        fs::write(&from, b"x").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"x");
    }
}
