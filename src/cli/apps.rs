use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::{
    daemon::{
        classifier::{Classifier, KeywordList, Whitelist},
        storage::documents::DataFiles,
    },
    window_api::AppIdentity,
};

use super::output::print_keywords;

#[derive(Debug, Subcommand)]
pub enum AppsCommand {
    #[command(about = "List keywords of every category and the whitelist")]
    List {},
    #[command(about = "Add a keyword. Matches process names, window titles and paths")]
    Add { list: KeywordList, keyword: String },
    #[command(about = "Remove a keyword")]
    Remove { list: KeywordList, keyword: String },
}

#[derive(Debug, Parser)]
pub struct ClassifyCommand {
    #[arg(help = "Process name, e.g. firefox or Code.exe")]
    name: String,
    #[arg(long, default_value = "", help = "Window title")]
    title: String,
    #[arg(long, default_value = "", help = "Path to the executable")]
    path: String,
}

async fn load_classifier(files: &DataFiles) -> Result<Classifier> {
    let settings = files.settings().load().await?;
    Classifier::load(
        files.categories(),
        Whitelist::new(&settings.extra_whitelist),
    )
    .await
}

/// Keyword edits go straight to `categories.json`. A running daemon notices the new
/// modification time on its next tick.
pub async fn process_apps_command(files: &DataFiles, command: AppsCommand) -> Result<()> {
    let mut classifier = load_classifier(files).await?;
    match command {
        AppsCommand::List {} => print_keywords(classifier.rules()),
        AppsCommand::Add { list, keyword } => {
            if classifier.add(list, &keyword).await? {
                println!("Added '{keyword}' to {list}");
            } else {
                println!("'{keyword}' is already in {list}");
            }
        }
        AppsCommand::Remove { list, keyword } => {
            if classifier.remove(list, &keyword).await? {
                println!("Removed '{keyword}' from {list}");
            } else {
                println!("'{keyword}' is not in {list}");
            }
        }
    }
    Ok(())
}

pub async fn process_classify_command(
    files: &DataFiles,
    ClassifyCommand { name, title, path }: ClassifyCommand,
) -> Result<()> {
    let classifier = load_classifier(files).await?;
    let identity = AppIdentity {
        process_name: Arc::from(name),
        window_title: Arc::from(title),
        executable_path: Arc::from(path),
        pid: 0,
    };
    println!("{}", classifier.classify(&identity));
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        daemon::{
            classifier::{Category, KeywordList},
            storage::documents::DataFiles,
        },
        window_api::testing::identity,
    };

    use super::{load_classifier, process_apps_command, AppsCommand};

    #[tokio::test]
    async fn test_added_keyword_is_used_for_classification() -> Result<()> {
        let dir = tempdir()?;
        let files = DataFiles::new(dir.path().to_path_buf())?;

        process_apps_command(
            &files,
            AppsCommand::Add {
                list: KeywordList::Entertainment,
                keyword: "YouTube".into(),
            },
        )
        .await?;

        let classifier = load_classifier(&files).await?;
        assert_eq!(
            classifier.rules().keywords(KeywordList::Entertainment),
            ["youtube".to_string()]
        );
        assert_eq!(
            classifier.classify(&identity("firefox", "Cats - YouTube")),
            Category::Entertainment
        );
        Ok(())
    }
}
