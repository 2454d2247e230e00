//! Optional free-text classification of message bodies.
//!
//! The engine never requires a classifier. When one is attached, each
//! SMS with content is offered to it; a failure on one message is
//! counted and the rest continue.

use crate::{
    error::AnalysisResult,
    record::{InteractionRecord, RecordKind},
    types::{EntityId, RecordId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Benign,
    Financial,
    Threat,
    Drugs,
    Fraud,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentLabel {
    pub category: ContentCategory,
    pub flagged: bool,
    pub reason: Option<String>,
}

impl ContentLabel {
    pub fn benign() -> Self {
        Self {
            category: ContentCategory::Benign,
            flagged: false,
            reason: None,
        }
    }
}

/// A text classification capability. Implementations may call out to an
/// external service; errors surface as `AnalysisError::Classifier`.
pub trait ContentClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, text: &str) -> AnalysisResult<ContentLabel>;
}

/// Case-insensitive keyword matching. First matching category wins, in
/// lexicon order.
pub struct KeywordClassifier {
    lexicon: Vec<(ContentCategory, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new(lexicon: Vec<(ContentCategory, Vec<String>)>) -> Self {
        let lexicon = lexicon
            .into_iter()
            .map(|(category, words)| (category, words.into_iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        Self { lexicon }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(vec![
            (ContentCategory::Threat, Self::words(&["kill", "bomb", "weapon", "ransom", "hostage"])),
            (ContentCategory::Drugs, Self::words(&["yaba", "heroin", "cocaine", "phensedyl", "ganja"])),
            (ContentCategory::Fraud, Self::words(&["otp", "pin code", "lottery", "prize", "verification code"])),
            (ContentCategory::Financial, Self::words(&["bkash", "nagad", "rocket", "cash out", "send money"])),
        ])
    }
}

impl ContentClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn classify(&self, text: &str) -> AnalysisResult<ContentLabel> {
        let lowered = text.to_lowercase();
        for (category, words) in &self.lexicon {
            if let Some(hit) = words.iter().find(|w| lowered.contains(w.as_str())) {
                return Ok(ContentLabel {
                    category: *category,
                    flagged: *category != ContentCategory::Benign,
                    reason: Some(format!("matched \"{hit}\"")),
                });
            }
        }
        Ok(ContentLabel::benign())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedMessage {
    pub record_id: RecordId,
    pub sender: EntityId,
    pub recipient: EntityId,
    pub timestamp: String,
    pub label: ContentLabel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub flagged: Vec<FlaggedMessage>,
    pub classified: usize,
    pub skipped_without_content: usize,
    pub failed: usize,
    /// False when no classifier was attached; every other field is then empty.
    pub capability_available: bool,
}

pub fn classify_messages<'a, I>(records: I, classifier: Option<&dyn ContentClassifier>) -> ClassificationOutcome
where
    I: IntoIterator<Item = &'a InteractionRecord>,
{
    let Some(classifier) = classifier else {
        return ClassificationOutcome::default();
    };
    let mut outcome = ClassificationOutcome {
        capability_available: true,
        ..Default::default()
    };

    for record in records.into_iter().filter(|r| r.kind == RecordKind::Sms) {
        let Some(text) = record.content.as_deref().filter(|t| !t.trim().is_empty()) else {
            outcome.skipped_without_content += 1;
            continue;
        };
        match classifier.classify(text) {
            Ok(label) => {
                outcome.classified += 1;
                if label.flagged {
                    let (sender, recipient) = record.oriented().unwrap_or((record.party_a.as_str(), ""));
                    outcome.flagged.push(FlaggedMessage {
                        record_id: record.id.clone(),
                        sender: sender.to_string(),
                        recipient: recipient.to_string(),
                        timestamp: record.timestamp.clone(),
                        label,
                    });
                }
            }
            Err(e) => {
                outcome.failed += 1;
                log::debug!("classifier {} failed on {}: {e}", classifier.name(), record.id);
            }
        }
    }

    if outcome.failed > 0 {
        log::warn!(
            "classifier {} failed on {} of {} messages",
            classifier.name(),
            outcome.failed,
            outcome.failed + outcome.classified
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AnalysisError, record::Direction};

    struct Offline;

    impl ContentClassifier for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn classify(&self, _text: &str) -> AnalysisResult<ContentLabel> {
            Err(AnalysisError::Classifier {
                reason: "service unreachable".into(),
            })
        }
    }

    fn messages() -> Vec<InteractionRecord> {
        vec![
            InteractionRecord::sms("s1", "2024-01-01 10:00:00", "A", "B", Direction::Outgoing)
                .with_content("Your OTP is 4411, do not share"),
            InteractionRecord::sms("s2", "2024-01-01 10:05:00", "A", "C", Direction::Incoming)
                .with_content("see you at lunch"),
            InteractionRecord::sms("s3", "2024-01-01 10:06:00", "A", "C", Direction::Incoming),
        ]
    }

    #[test]
    fn keyword_classifier_flags_fraud_bait() {
        let records = messages();
        let classifier = KeywordClassifier::default();
        let outcome = classify_messages(&records, Some(&classifier));
        assert!(outcome.capability_available);
        assert_eq!(outcome.classified, 2);
        assert_eq!(outcome.skipped_without_content, 1);
        assert_eq!(outcome.flagged.len(), 1);
        assert_eq!(outcome.flagged[0].label.category, ContentCategory::Fraud);
        assert_eq!(outcome.flagged[0].sender, "A");
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let records = messages();
        let outcome = classify_messages(&records, Some(&Offline));
        assert_eq!(outcome.failed, 2);
        assert!(outcome.flagged.is_empty());
    }

    #[test]
    fn absent_capability_yields_empty_outcome() {
        let records = messages();
        let outcome = classify_messages(&records, None);
        assert!(!outcome.capability_available);
        assert_eq!(outcome, ClassificationOutcome::default());
    }
}
