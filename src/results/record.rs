use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

pub const NAME_KEY: &str = "name";
pub const TIME_KEY: &str = "time";

/// A single answer as submitted. Sliders post numbers, free-form fields post
/// text; nothing else is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Number(Number),
    Text(String),
}

impl Answer {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Answer::Number(n) => n.as_f64(),
            Answer::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Answer::Number(_) => None,
            Answer::Text(s) => Some(s),
        }
    }
}

impl From<f64> for Answer {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Answer::Number)
            .unwrap_or_else(|| Answer::Text(value.to_string()))
    }
}

impl From<i32> for Answer {
    fn from(value: i32) -> Self {
        Answer::Number(value.into())
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Answer::Text(value.to_string())
    }
}

/// One respondent's submission. Keys keep the order they were submitted in,
/// which is also the order comparisons walk them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerRecord {
    answers: IndexMap<String, Answer>,
}

impl AnswerRecord {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, key: &str, answer: impl Into<Answer>) -> Self {
        self.answers.insert(key.to_string(), answer.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Answer> {
        self.answers.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY).and_then(Answer::as_str)
    }

    pub fn time(&self) -> Option<&str> {
        self.get(TIME_KEY).and_then(Answer::as_str)
    }

    /// Numeric answers in insertion order. Reserved keys never count as
    /// answers even if a client managed to store a number under them.
    pub fn numeric_answers(&self) -> impl Iterator<Item = (&str, f64)> {
        self.answers
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .filter_map(|(k, v)| v.as_f64().map(|x| (k.as_str(), x)))
    }

    /// Copy of the submission as it should be persisted: any client supplied
    /// `time` is dropped and replaced by the server's timestamp.
    pub fn stamped(&self, time: String) -> Self {
        let mut answers: IndexMap<String, Answer> = self
            .answers
            .iter()
            .filter(|(k, _)| k.as_str() != TIME_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        answers.insert(TIME_KEY.to_string(), Answer::Text(time));
        Self { answers }
    }
}

fn is_reserved(key: &str) -> bool {
    key == NAME_KEY || key == TIME_KEY
}
