use anyhow::Result;
use clap::Subcommand;

use crate::daemon::{
    blocking::BlockLevel,
    settings::Difficulty,
    storage::documents::DataFiles,
};

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    #[command(about = "Print current settings")]
    Show {},
    #[command(about = "Change how points are earned and spent")]
    Difficulty { level: Difficulty },
    #[command(about = "Change what happens to entertainment apps at zero points")]
    BlockLevel { level: BlockLevel },
}

pub async fn process_settings_command(files: &DataFiles, command: SettingsCommand) -> Result<()> {
    let document = files.settings();
    let mut settings = document.load().await?;
    match command {
        SettingsCommand::Show {} => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        SettingsCommand::Difficulty { level } => settings.difficulty_level = level,
        SettingsCommand::BlockLevel { level } => settings.block_level = level,
    }
    document.save(&settings).await?;
    println!("Saved. Restart the daemon with `backtowork init` to apply");
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::daemon::{
        blocking::BlockLevel, settings::Difficulty, storage::documents::DataFiles,
    };

    use super::{process_settings_command, SettingsCommand};

    #[tokio::test]
    async fn test_changes_are_saved() -> Result<()> {
        let dir = tempdir()?;
        let files = DataFiles::new(dir.path().to_path_buf())?;

        process_settings_command(
            &files,
            SettingsCommand::Difficulty {
                level: Difficulty::Chill,
            },
        )
        .await?;
        process_settings_command(
            &files,
            SettingsCommand::BlockLevel {
                level: BlockLevel::Terminate,
            },
        )
        .await?;

        let settings = files.settings().load().await?;
        assert_eq!(settings.difficulty_level, Difficulty::Chill);
        assert_eq!(settings.block_level, BlockLevel::Terminate);
        assert_eq!(settings.time_interval, 300);
        Ok(())
    }
}
