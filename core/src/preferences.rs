//! Display preferences (language, theme).
//!
//! Preferences are handed to the application at start-up and shared through a
//! [`PreferencesStore`]. Components read the current value or subscribe to
//! changes instead of reading local storage directly. The store can persist
//! to a small JSON file so the choice survives a restart.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Errors from loading or saving preferences
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// Reading or writing the preferences file failed
    #[error("Preferences I/O failed for {}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The preferences file is not valid JSON for [`Preferences`]
    #[error("Preferences file {} is malformed: {source}", .path.display())]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Interface language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    En,
    /// French
    Fr,
    /// German
    De,
    /// Spanish
    Es,
    /// Arabic
    Ar,
}

impl Language {
    /// Whether the language is written right to left
    #[must_use]
    pub const fn is_rtl(self) -> bool {
        matches!(self, Self::Ar)
    }
}

/// Colour scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light scheme
    Light,
    /// Dark scheme
    Dark,
    /// Follow the operating system
    #[default]
    System,
}

/// Session display preferences
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Selected language
    pub language: Language,
    /// Selected theme
    pub theme: ThemeMode,
}

/// Shared holder of the current [`Preferences`]
#[derive(Debug)]
pub struct PreferencesStore {
    tx: watch::Sender<Preferences>,
    path: Option<PathBuf>,
    /// Serializes updates so the file and the channel agree
    writer: Mutex<()>,
}

impl PreferencesStore {
    /// In-memory store seeded with `initial`
    #[must_use]
    pub fn new(initial: Preferences) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            path: None,
            writer: Mutex::new(()),
        }
    }

    /// Store backed by a JSON file; a missing file yields defaults
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();
        let initial = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| PreferencesError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No preferences file, using defaults");
                Preferences::default()
            }
            Err(source) => return Err(PreferencesError::Io { path, source }),
        };

        let (tx, _rx) = watch::channel(initial);
        Ok(Self {
            tx,
            path: Some(path),
            writer: Mutex::new(()),
        })
    }

    /// Current preferences
    #[must_use]
    pub fn current(&self) -> Preferences {
        *self.tx.borrow()
    }

    /// Receiver notified on every change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Change the language
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::Io`] if persisting fails.
    pub fn set_language(&self, language: Language) -> Result<(), PreferencesError> {
        self.update(|prefs| prefs.language = language)
    }

    /// Change the theme
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::Io`] if persisting fails.
    pub fn set_theme(&self, theme: ThemeMode) -> Result<(), PreferencesError> {
        self.update(|prefs| prefs.theme = theme)
    }

    /// Apply `change`; subscribers are only notified if something changed
    ///
    /// The change is saved before it is published, so subscribers never see
    /// a value the file does not hold.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::Io`] if persisting fails; the current value
    /// is left unchanged in that case.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<(), PreferencesError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let before = self.current();
        let mut next = before;
        change(&mut next);
        if next == before {
            return Ok(());
        }

        self.persist(&next)?;
        self.tx.send_replace(next);
        info!(language = ?next.language, theme = ?next.theme, "Preferences changed");
        Ok(())
    }

    fn persist(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Serializing two unit enums cannot fail
        let raw = serde_json::to_string_pretty(prefs).unwrap_or_default();
        std::fs::write(path, raw).map_err(|source| PreferencesError::Io {
            path: path.clone(),
            source,
        })
    }
}
