use anyhow::{bail, Result};

use crate::{daemon::storage::entities::CategoryConfigEntity, window_api::AppIdentity};

use super::{Category, KeywordList, Whitelist};

/// Keyword lists plus the whitelist. Matching is a case-insensitive substring test against
/// process name, window title and executable path, so "netflix" also catches a browser tab
/// titled "Netflix - House of Cards". Productivity apps sharing a substring with an
/// entertainment keyword get classified as entertainment, which is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    productivity: Vec<String>,
    entertainment: Vec<String>,
    neutral: Vec<String>,
    whitelist: Whitelist,
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn matches_any(keywords: &[String], fields: &[String; 3]) -> bool {
    keywords
        .iter()
        .any(|keyword| fields.iter().any(|field| field.contains(keyword.as_str())))
}

fn normalized_list(values: &[String]) -> Vec<String> {
    let mut result = Vec::with_capacity(values.len());
    for value in values.iter().map(|v| normalize(v)) {
        if !value.is_empty() && !result.contains(&value) {
            result.push(value);
        }
    }
    result
}

impl ClassificationRules {
    pub fn new(whitelist: Whitelist) -> Self {
        Self {
            productivity: vec![],
            entertainment: vec![],
            neutral: vec![],
            whitelist,
        }
    }

    pub fn from_entity(entity: &CategoryConfigEntity, whitelist: Whitelist) -> Self {
        Self {
            productivity: normalized_list(&entity.productivity_app),
            entertainment: normalized_list(&entity.entertainment_app),
            neutral: normalized_list(&entity.neutral_app),
            whitelist,
        }
    }

    pub fn to_entity(&self) -> CategoryConfigEntity {
        CategoryConfigEntity {
            productivity_app: self.productivity.clone(),
            entertainment_app: self.entertainment.clone(),
            neutral_app: self.neutral.clone(),
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn keywords(&self, list: KeywordList) -> &[String] {
        match list {
            KeywordList::Productivity => &self.productivity,
            KeywordList::Entertainment => &self.entertainment,
            KeywordList::Neutral => &self.neutral,
        }
    }

    fn keywords_mut(&mut self, list: KeywordList) -> &mut Vec<String> {
        match list {
            KeywordList::Productivity => &mut self.productivity,
            KeywordList::Entertainment => &mut self.entertainment,
            KeywordList::Neutral => &mut self.neutral,
        }
    }

    /// Whitelist first, then entertainment, productivity and user-defined neutral keywords.
    pub fn classify(&self, identity: &AppIdentity) -> Category {
        let fields = [
            identity.process_name.to_lowercase(),
            identity.window_title.to_lowercase(),
            identity.executable_path.to_lowercase(),
        ];

        if matches_any(self.whitelist.entries(), &fields) {
            Category::Neutral
        } else if matches_any(&self.entertainment, &fields) {
            Category::Entertainment
        } else if matches_any(&self.productivity, &fields) {
            Category::Productive
        } else if matches_any(&self.neutral, &fields) {
            Category::Neutral
        } else {
            Category::Unclassified
        }
    }

    /// Returns whether the list changed. Adding an existing keyword is a no-op.
    pub fn add(&mut self, list: KeywordList, identifier: &str) -> Result<bool> {
        let identifier = normalize(identifier);
        if identifier.is_empty() {
            bail!("Keyword can't be empty");
        }
        let keywords = self.keywords_mut(list);
        if keywords.contains(&identifier) {
            return Ok(false);
        }
        keywords.push(identifier);
        Ok(true)
    }

    /// Returns whether the list changed.
    pub fn remove(&mut self, list: KeywordList, identifier: &str) -> bool {
        let identifier = normalize(identifier);
        let keywords = self.keywords_mut(list);
        let before = keywords.len();
        keywords.retain(|v| *v != identifier);
        before != keywords.len()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::{
        daemon::{
            classifier::{Category, KeywordList, Whitelist},
            storage::entities::CategoryConfigEntity,
        },
        window_api::{testing::identity, AppIdentity},
    };

    use super::ClassificationRules;

    fn rules(
        productivity: &[&str],
        entertainment: &[&str],
        whitelist: &[&str],
    ) -> ClassificationRules {
        ClassificationRules::from_entity(
            &CategoryConfigEntity {
                productivity_app: productivity.iter().map(|v| v.to_string()).collect(),
                entertainment_app: entertainment.iter().map(|v| v.to_string()).collect(),
                neutral_app: vec![],
            },
            Whitelist::from_entries(whitelist.iter().copied()),
        )
    }

    #[test]
    fn test_whitelist_wins_over_every_list() {
        let rules = rules(&["explorer"], &["explorer"], &["explorer.exe"]);
        assert_eq!(
            rules.classify(&identity("explorer.exe", "Steam")),
            Category::Neutral
        );
    }

    #[test]
    fn test_whitelist_matches_any_field() {
        let rules = rules(&[], &["steam"], &["backtowork"]);
        let from_path = AppIdentity {
            executable_path: "C:\\Tools\\BackToWork\\steam-helper.exe".into(),
            ..identity("steam-helper.exe", "Store")
        };
        assert_eq!(rules.classify(&from_path), Category::Neutral);
        assert_eq!(
            rules.classify(&identity("firefox", "backtowork docs")),
            Category::Neutral
        );
    }

    #[test]
    fn test_entertainment_wins_over_productivity() {
        let rules = rules(&["code"], &["code"], &[]);
        assert_eq!(
            rules.classify(&identity("Code.exe", "main.rs")),
            Category::Entertainment
        );
    }

    #[test]
    fn test_substring_case_insensitive_matching() {
        let rules = rules(&["code"], &["netflix", "steam"], &[]);
        assert_eq!(
            rules.classify(&identity("firefox", "Netflix - House of Cards")),
            Category::Entertainment
        );
        assert_eq!(
            rules.classify(&identity("Code.exe", "lib.rs")),
            Category::Productive
        );
        assert_eq!(
            rules.classify(&identity("steam.exe", "Library")),
            Category::Entertainment
        );
        assert_eq!(
            rules.classify(&identity("gimp", "untitled")),
            Category::Unclassified
        );
    }

    #[test]
    fn test_user_neutral_keywords_come_last() -> Result<()> {
        let mut rules = rules(&["slack"], &[], &[]);
        rules.add(KeywordList::Neutral, "slack")?;
        rules.add(KeywordList::Neutral, "spotify")?;
        assert_eq!(
            rules.classify(&identity("slack", "general")),
            Category::Productive
        );
        assert_eq!(
            rules.classify(&identity("spotify", "Daily Mix")),
            Category::Neutral
        );
        Ok(())
    }

    #[test]
    fn test_add_is_idempotent_and_lowercases() -> Result<()> {
        let mut rules = rules(&[], &[], &[]);
        assert!(rules.add(KeywordList::Entertainment, "Steam")?);
        assert!(!rules.add(KeywordList::Entertainment, "steam")?);
        assert!(!rules.add(KeywordList::Entertainment, "  STEAM ")?);
        assert_eq!(rules.keywords(KeywordList::Entertainment), ["steam"]);
        Ok(())
    }

    #[test]
    fn test_add_rejects_empty_keywords() {
        let mut rules = rules(&[], &[], &[]);
        assert!(rules.add(KeywordList::Productivity, "   ").is_err());
    }

    #[test]
    fn test_remove() {
        let mut rules = rules(&["code", "jira"], &[], &[]);
        assert!(rules.remove(KeywordList::Productivity, "JIRA"));
        assert!(!rules.remove(KeywordList::Productivity, "jira"));
        assert_eq!(rules.keywords(KeywordList::Productivity), ["code"]);
    }

    #[test]
    fn test_loading_normalizes_duplicates() {
        let rules = rules(&["Code", "code", ""], &[], &[]);
        assert_eq!(rules.keywords(KeywordList::Productivity), ["code"]);
        assert_eq!(rules.to_entity().productivity_app, vec!["code".to_string()]);
    }
}
