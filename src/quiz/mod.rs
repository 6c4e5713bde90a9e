pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "slider")]
    Slider,
    #[serde(rename = "mc")]
    MultipleChoice,
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionType::Slider => write!(f, "SLIDER"),
            QuestionType::MultipleChoice => write!(f, "MC"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizMetadata {
    pub name: String,
    pub description: String,
    pub author: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
    pub slug: String,
    pub question_type: QuestionType,
    #[serde(default = "default_enabled", skip_serializing)]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    /// Answer key the submission stores this question under.
    pub key: String,
    pub prompt: String,
    /// Slider end labels.
    #[serde(default)]
    pub low: Option<String>,
    #[serde(default)]
    pub high: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
    pub meta: QuizMetadata,
    #[serde(default, rename = "question")]
    pub questions: Vec<Question>,
}

impl Display for Quiz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {{ slug: {}, name: {}, questions: {} }}",
            self.meta.question_type,
            self.meta.slug,
            self.meta.name,
            self.questions.len()
        )
    }
}

impl FromStr for Quiz {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl Quiz {
    /// Question keys in the order the quiz file lists them.
    pub fn question_keys(&self) -> impl Iterator<Item = &str> {
        self.questions.iter().map(|q| q.key.as_str())
    }
}
