use super::matching::{pearson_similarity, Similarity};
use super::record::{Answer, AnswerRecord};
use super::storage::RecordStore;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DetailMode {
    /// Names and submission time only.
    #[default]
    Summary,
    /// Full contents of both submissions.
    Expanded,
}

impl DetailMode {
    pub fn from_expanded(expanded: bool) -> Self {
        if expanded {
            DetailMode::Expanded
        } else {
            DetailMode::Summary
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Participant {
    Name(String),
    Record(AnswerRecord),
}

impl Participant {
    fn from_record(record: AnswerRecord, mode: DetailMode) -> Self {
        match mode {
            DetailMode::Summary => Participant::Name(record.name().unwrap_or_default().to_string()),
            DetailMode::Expanded => Participant::Record(record),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ComparisonResult {
    pub similarity: Similarity,
    pub subject: Participant,
    pub other_id: u64,
    pub other: Participant,
    /// Only set in summary mode.
    pub other_time: Option<String>,
}

pub struct ComparisonEngine<S> {
    store: Arc<S>,
}

impl<S: RecordStore> ComparisonEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when either submission does not exist.
    pub async fn compare_two(
        &self,
        quiz: &str,
        subject_id: u64,
        other_id: u64,
        mode: DetailMode,
    ) -> Result<Option<ComparisonResult>> {
        let Some(subject) = self.store.fetch(quiz, subject_id).await? else {
            return Ok(None);
        };
        let Some(other) = self.store.fetch(quiz, other_id).await? else {
            return Ok(None);
        };

        Ok(Some(compare_records(&subject, other_id, other, mode)))
    }

    /// Compares the subject with every stored submission to the quiz, itself
    /// included, most similar first. Ties keep ascending id order and
    /// undefined similarities sink to the bottom.
    ///
    /// `Ok(None)` when the subject does not exist.
    pub async fn compare_all(
        &self,
        quiz: &str,
        subject_id: u64,
        mode: DetailMode,
    ) -> Result<Option<Vec<ComparisonResult>>> {
        let Some(subject) = self.store.fetch(quiz, subject_id).await? else {
            return Ok(None);
        };
        let n = self.store.count(quiz).await?.unwrap_or(0);

        let mut results = Vec::with_capacity(n as usize);
        for other_id in 0..n {
            match self.store.fetch(quiz, other_id).await? {
                Some(other) => results.push(compare_records(&subject, other_id, other, mode)),
                None => warn!("quiz: {}, record {} of {} missing, skipped", quiz, other_id, n),
            }
        }
        // stable, so equal scores stay in id order
        results.sort_by(|a, b| b.similarity.cmp(&a.similarity));

        Ok(Some(results))
    }
}

fn compare_records(
    subject: &AnswerRecord,
    other_id: u64,
    other: AnswerRecord,
    mode: DetailMode,
) -> ComparisonResult {
    let pairs = paired_answers(subject, &other);
    let similarity = pearson_similarity(&pairs);
    debug!(
        "other_id: {}, paired answers: {}, similarity: {}",
        other_id,
        pairs.len(),
        similarity
    );

    let other_time = match mode {
        DetailMode::Summary => other.time().map(str::to_string),
        DetailMode::Expanded => None,
    };
    ComparisonResult {
        similarity,
        subject: Participant::from_record(subject.clone(), mode),
        other_id,
        other: Participant::from_record(other, mode),
        other_time,
    }
}

/// Co-indexed answers for every numeric key of `subject`, in the subject's key
/// order. Keys the other submission lacks, or answered with text, are dropped
/// from both sides.
fn paired_answers(subject: &AnswerRecord, other: &AnswerRecord) -> Vec<(f64, f64)> {
    subject
        .numeric_answers()
        .filter_map(|(key, x)| other.get(key).and_then(Answer::as_f64).map(|y| (x, y)))
        .collect()
}
