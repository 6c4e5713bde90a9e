use super::{Quiz, QuizMetadata};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reads quiz definitions from `*.toml` files in one directory. Files are
/// read on every call, so edits show up without a restart.
#[derive(Clone)]
pub struct QuizLoader {
    dir: PathBuf,
}

impl QuizLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Metadata of every enabled quiz. Files that fail to parse are skipped.
    pub async fn list_quizzes(&self) -> Result<Vec<QuizMetadata>> {
        Ok(self
            .enabled_quizzes()
            .await?
            .into_iter()
            .map(|quiz| quiz.meta)
            .collect())
    }

    pub async fn find_quiz(&self, slug: &str) -> Result<Option<Quiz>> {
        Ok(self
            .enabled_quizzes()
            .await?
            .into_iter()
            .find(|quiz| quiz.meta.slug == slug))
    }

    async fn enabled_quizzes(&self) -> Result<Vec<Quiz>> {
        let mut quizzes = vec![];
        for path in read_quiz_paths(&self.dir).await? {
            match load(&path).await {
                Ok(quiz) if quiz.meta.enabled => quizzes.push(quiz),
                Ok(quiz) => debug!("skip disabled quiz: {}", quiz),
                Err(e) => warn!("skip malformed quiz {}: {}", path.display(), e),
            }
        }
        Ok(quizzes)
    }
}

/// `*.toml` files directly under `dir`, sorted by name. A missing directory
/// holds no quizzes.
async fn read_quiz_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && path.extension().map_or(false, |ext| ext == "toml")
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn load(path: &Path) -> Result<Quiz> {
    let content = fs::read_to_string(path).await?;
    content.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiz_file(slug: &str, enabled: bool) -> String {
        format!(
            r#"
[meta]
name = "Quiz {slug}"
description = "About {slug}."
author = "Ada"
slug = "{slug}"
question_type = "slider"
enabled = {enabled}

[[question]]
key = "q1"
prompt = "First?"
"#
        )
    }

    fn write(dir: &TempDir, file: &str, content: &str) {
        std::fs::write(dir.path().join(file), content).unwrap();
    }

    #[tokio::test]
    async fn lists_enabled_quizzes_only() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.toml", &quiz_file("alpha", true));
        write(&dir, "b.toml", &quiz_file("beta", false));
        write(&dir, "c.toml", "not = [valid");
        write(&dir, "notes.txt", &quiz_file("gamma", true));

        let loader = QuizLoader::new(dir.path());
        let slugs: Vec<_> = loader
            .list_quizzes()
            .await
            .unwrap()
            .into_iter()
            .map(|meta| meta.slug)
            .collect();

        assert_eq!(slugs, vec!["alpha"]);
    }

    #[tokio::test]
    async fn finds_quiz_by_slug() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.toml", &quiz_file("alpha", true));
        write(&dir, "b.toml", &quiz_file("beta", false));

        let loader = QuizLoader::new(dir.path());

        let quiz = loader.find_quiz("alpha").await.unwrap().unwrap();
        assert_eq!(quiz.question_keys().collect::<Vec<_>>(), vec!["q1"]);
        assert!(loader.find_quiz("beta").await.unwrap().is_none());
        assert!(loader.find_quiz("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_or_missing_dir_has_no_quizzes() {
        let dir = TempDir::new().unwrap();
        assert!(QuizLoader::new(dir.path())
            .list_quizzes()
            .await
            .unwrap()
            .is_empty());
        assert!(QuizLoader::new(dir.path().join("absent"))
            .list_quizzes()
            .await
            .unwrap()
            .is_empty());
    }
}
