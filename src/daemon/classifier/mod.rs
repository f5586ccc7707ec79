//! Maps an application identity to a [Category]. The pure matching rules live in
//! [rules::ClassificationRules], [Classifier] adds persistence on top of them.

pub mod rules;

use std::{fmt::Display, time::SystemTime};

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    daemon::storage::{documents::JsonDocument, entities::CategoryConfigEntity},
    utils::dir::APPLICATION_DIR_NAME,
    window_api::AppIdentity,
};

use rules::ClassificationRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Entertainment,
    Neutral,
    Unclassified,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Productive => write!(f, "productive"),
            Category::Entertainment => write!(f, "entertainment"),
            Category::Neutral => write!(f, "neutral"),
            Category::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// The user-editable keyword lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeywordList {
    Productivity,
    Entertainment,
    Neutral,
}

impl Display for KeywordList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeywordList::Productivity => write!(f, "productivity"),
            KeywordList::Entertainment => write!(f, "entertainment"),
            KeywordList::Neutral => write!(f, "neutral"),
        }
    }
}

/// Shells, desktop components and the application itself. Never blocked.
const BUILTIN_WHITELIST: &[&str] = &[
    "explorer.exe",
    "cmd.exe",
    "powershell.exe",
    "windowsterminal.exe",
    "lockapp.exe",
    "searchhost.exe",
    "shellexperiencehost.exe",
    "textinputhost.exe",
    "gnome-shell",
    "plasmashell",
    "kwin_x11",
    "kwin_wayland",
    "xfwm4",
    "compiz",
];

/// Identifiers treated as neutral no matter what the keyword lists say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Built-in entries, the running executable and `extra` entries from settings.
    pub fn new(extra: &[String]) -> Self {
        let own_executable = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|v| v.to_string_lossy().into_owned()));

        Self::from_entries(
            BUILTIN_WHITELIST
                .iter()
                .copied()
                .chain(std::iter::once(APPLICATION_DIR_NAME))
                .chain(own_executable.as_deref())
                .chain(extra.iter().map(|v| v.as_str())),
        )
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        let mut result: Vec<String> = vec![];
        for entry in entries.into_iter().map(|v| v.trim().to_lowercase()) {
            if !entry.is_empty() && !result.contains(&entry) {
                result.push(entry);
            }
        }
        Self { entries: result }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// [ClassificationRules] backed by `categories.json`. Every change is written back right
/// away and external edits are picked up through [Classifier::reload_if_changed].
pub struct Classifier {
    rules: ClassificationRules,
    document: JsonDocument<CategoryConfigEntity>,
    loaded_at: Option<SystemTime>,
}

impl Classifier {
    pub async fn load(
        document: JsonDocument<CategoryConfigEntity>,
        whitelist: Whitelist,
    ) -> Result<Self> {
        let entity = document
            .load()
            .await
            .inspect_err(|e| error!("Failed to load category config {e:?}"))?;
        let loaded_at = document.modified().await;
        Ok(Self {
            rules: ClassificationRules::from_entity(&entity, whitelist),
            document,
            loaded_at,
        })
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    pub fn classify(&self, identity: &AppIdentity) -> Category {
        self.rules.classify(identity)
    }

    pub async fn add(&mut self, list: KeywordList, identifier: &str) -> Result<bool> {
        let changed = self.rules.add(list, identifier)?;
        if changed {
            info!("Added '{identifier}' to {list} apps");
            self.persist().await?;
        }
        Ok(changed)
    }

    pub async fn remove(&mut self, list: KeywordList, identifier: &str) -> Result<bool> {
        let changed = self.rules.remove(list, identifier);
        if changed {
            info!("Removed '{identifier}' from {list} apps");
            self.persist().await?;
        }
        Ok(changed)
    }

    /// Re-reads `categories.json` when its modification time moved since the last load or
    /// save. Returns whether the rules changed.
    pub async fn reload_if_changed(&mut self) -> Result<bool> {
        let modified = self.document.modified().await;
        if modified.is_none() || modified == self.loaded_at {
            return Ok(false);
        }

        let entity = self.document.load().await?;
        self.loaded_at = self.document.modified().await;
        let rules = ClassificationRules::from_entity(&entity, self.rules.whitelist().clone());
        if rules == self.rules {
            return Ok(false);
        }
        debug!("Category config changed on disk, reloading");
        self.rules = rules;
        Ok(true)
    }

    async fn persist(&mut self) -> Result<()> {
        self.document
            .save(&self.rules.to_entity())
            .await
            .inspect_err(|e| error!("Failed to save category config {e:?}"))?;
        self.loaded_at = self.document.modified().await;
        Ok(())
    }
}
