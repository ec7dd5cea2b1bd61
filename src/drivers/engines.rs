// file: src/drivers/engines.rs
// description: in-process analysis engines available to local stages
// reference: https://docs.rs/regex

use crate::error::{PipelineError, Result};
use crate::models::{Annotation, Document, Stage};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

lazy_static! {
    // Terminal punctuation followed by whitespace or end of text, or a blank line.
    static ref SENTENCE_BOUNDARY: Regex = Regex::new(r"[.!?]+(?:\s+|$)|\n\s*\n")
        .expect("SENTENCE_BOUNDARY regex is valid");
}

const TOPIC_PREFIX: &str = "topic.";

pub trait LocalEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Rejects stage configurations the engine cannot run with.
    fn validate(&self, _stage: &Stage) -> Result<()> {
        Ok(())
    }

    fn analyze(&self, document: &Document, stage: &Stage) -> Result<Vec<Annotation>>;
}

pub fn engine_for(name: &str) -> Option<Arc<dyn LocalEngine>> {
    match name {
        "sentence_splitter" => Some(Arc::new(SentenceSplitter)),
        "token_counter" => Some(Arc::new(TokenCounter)),
        "keyword_topics" => Some(Arc::new(KeywordTopics)),
        _ => None,
    }
}

pub fn available_engines() -> &'static [&'static str] {
    &["sentence_splitter", "token_counter", "keyword_topics"]
}

pub struct SentenceSplitter;

impl SentenceSplitter {
    /// Byte ranges of the trimmed sentences in `text`.
    pub fn split(text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = 0;

        for m in SENTENCE_BOUNDARY.find_iter(text) {
            let terminator = text[m.start()..m.end()].trim_end().len();
            push_trimmed(text, start, m.start() + terminator, &mut spans);
            start = m.end();
        }
        push_trimmed(text, start, text.len(), &mut spans);

        spans
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    if start >= end {
        return;
    }
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = slice.len() - slice.trim_start().len();
    spans.push((start + lead, start + lead + trimmed.len()));
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

impl LocalEngine for SentenceSplitter {
    fn name(&self) -> &str {
        "sentence_splitter"
    }

    fn analyze(&self, document: &Document, stage: &Stage) -> Result<Vec<Annotation>> {
        let text = document.text();

        Ok(Self::split(text)
            .into_iter()
            .enumerate()
            .map(|(index, (begin, end))| {
                Annotation::new(
                    &stage.name,
                    "sentence",
                    json!({ "index": index, "text": &text[begin..end] }),
                )
                .spanning(char_offset(text, begin), char_offset(text, end))
            })
            .collect())
    }
}

pub struct TokenCounter;

impl LocalEngine for TokenCounter {
    fn name(&self) -> &str {
        "token_counter"
    }

    fn analyze(&self, document: &Document, stage: &Stage) -> Result<Vec<Annotation>> {
        let text = document.text();
        let words = text.split_whitespace().count();
        let characters = text.chars().count();

        Ok(vec![
            Annotation::new(
                &stage.name,
                "token_count",
                json!({ "words": words, "characters": characters }),
            )
            .spanning(0, characters),
        ])
    }
}

/// Keyword rules come from stage parameters: `topic.<label> = "kw1, kw2"`.
pub struct KeywordTopics;

impl KeywordTopics {
    fn rules(stage: &Stage) -> Vec<(&str, Vec<String>)> {
        stage
            .parameters
            .iter()
            .filter_map(|(key, value)| {
                let label = key.strip_prefix(TOPIC_PREFIX)?;
                let keywords: Vec<String> = value
                    .split(',')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                Some((label, keywords))
            })
            .collect()
    }
}

impl LocalEngine for KeywordTopics {
    fn name(&self) -> &str {
        "keyword_topics"
    }

    fn validate(&self, stage: &Stage) -> Result<()> {
        let rules = Self::rules(stage);
        if rules.is_empty() || rules.iter().any(|(_, keywords)| keywords.is_empty()) {
            return Err(PipelineError::Config(format!(
                "stage {} needs at least one non-empty `{}<label>` parameter",
                stage.name, TOPIC_PREFIX
            )));
        }
        Ok(())
    }

    fn analyze(&self, document: &Document, stage: &Stage) -> Result<Vec<Annotation>> {
        let haystack = document.text().to_lowercase();

        Ok(Self::rules(stage)
            .into_iter()
            .filter_map(|(label, keywords)| {
                let matched: Vec<String> = keywords
                    .into_iter()
                    .filter(|k| haystack.contains(k.as_str()))
                    .collect();
                if matched.is_empty() {
                    None
                } else {
                    Some(Annotation::new(
                        &stage.name,
                        "topic",
                        json!({ "topic": label, "keywords": matched }),
                    ))
                }
            })
            .collect())
    }
}
