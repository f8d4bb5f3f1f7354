//! Rule-based NLU: trigger-phrase matching with Levenshtein scoring,
//! argument-region extraction, and per-type parameter extraction.
//!
//! Matching happens over normalised text (lowercased, trimmed). Parameter
//! extraction searches only the argument region (the transcript with the
//! matched trigger stripped), so short utterances like "change color to red"
//! yield "red" rather than the whole phrase.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{NluEngine, NluResult};
use crate::command::{CommandDescriptor, ParamDescriptor, ParamType};

const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Score a trigger at least this high when it appears verbatim inside the
/// transcript.
const CONTAINMENT_SCORE: f32 = 0.8;

/// Minimum word-overlap fraction for the fuzzy trigger-window search.
const WINDOW_MATCH_FRACTION: f32 = 0.5;

/// Deterministic intent matcher and parameter extractor.
pub struct RuleBasedNluEngine {
    min_confidence: f32,
}

impl Default for RuleBasedNluEngine {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl RuleBasedNluEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_confidence(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    pub fn set_min_confidence(&mut self, min_confidence: f32) {
        self.min_confidence = min_confidence;
    }
}

impl NluEngine for RuleBasedNluEngine {
    fn process(&self, transcript: &str, schemas: &[CommandDescriptor]) -> NluResult {
        if transcript.trim().is_empty() {
            return NluResult::failure("Empty transcript");
        }
        if schemas.is_empty() {
            return NluResult::failure("No command schemas provided");
        }

        let normalized = normalize(transcript);

        let Some(intent) = match_intent(&normalized, schemas) else {
            return NluResult::failure("No matching command found (confidence too low)");
        };
        if intent.score < self.min_confidence {
            return NluResult::failure("No matching command found (confidence too low)");
        }

        let descriptor = &schemas[intent.schema_index];
        let region = argument_region(&normalized, &intent.matched_phrase);
        debug!(
            command = %descriptor.name,
            score = intent.score,
            region = %region,
            "intent matched"
        );

        let extracted_params = extract_params(&region, descriptor);

        NluResult {
            success: true,
            command_name: descriptor.name.clone(),
            confidence: intent.score,
            extracted_params,
            error_message: String::new(),
        }
    }

    fn name(&self) -> &'static str {
        "rule_based"
    }
}

struct IntentMatch {
    schema_index: usize,
    score: f32,
    /// Normalised phrase that produced the best score; used to locate the
    /// argument region.
    matched_phrase: String,
}

/// Best (score, descriptor, phrase) across all triggers and command names.
/// Ties resolve to the first seen.
fn match_intent(normalized_transcript: &str, schemas: &[CommandDescriptor]) -> Option<IntentMatch> {
    let mut best: Option<IntentMatch> = None;

    let mut consider = |schema_index: usize, score: f32, phrase: &str| {
        let better = match best {
            Some(ref current) => score > current.score,
            None => true,
        };
        if better {
            best = Some(IntentMatch {
                schema_index,
                score,
                matched_phrase: phrase.to_string(),
            });
        }
    };

    for (index, descriptor) in schemas.iter().enumerate() {
        for trigger in &descriptor.trigger_phrases {
            let trigger_norm = normalize(trigger);
            if trigger_norm.is_empty() {
                continue;
            }
            let mut score = levenshtein_similarity(normalized_transcript, &trigger_norm);
            if normalized_transcript.contains(&trigger_norm) {
                score = score.max(CONTAINMENT_SCORE);
            }
            consider(index, score, &trigger_norm);
        }

        // The command name itself, with underscores as spaces, is an
        // implicit trigger.
        let name_phrase = normalize(&descriptor.name).replace('_', " ");
        if !name_phrase.is_empty() {
            let score = levenshtein_similarity(normalized_transcript, &name_phrase);
            consider(index, score, &name_phrase);
        }
    }

    best
}

/// The transcript after the matched trigger. Falls back to a fuzzy
/// word-window search, then to the whole transcript.
fn argument_region(normalized_transcript: &str, matched_phrase: &str) -> String {
    if let Some(pos) = normalized_transcript.find(matched_phrase) {
        return normalized_transcript[pos + matched_phrase.len()..]
            .trim_start()
            .to_string();
    }

    let words: Vec<&str> = normalized_transcript.split_whitespace().collect();
    let trigger_words: Vec<&str> = matched_phrase.split_whitespace().collect();
    if trigger_words.is_empty() || words.len() < trigger_words.len() {
        return normalized_transcript.to_string();
    }

    let mut best_fraction = 0.0f32;
    let mut best_end = 0usize;
    for start in 0..=(words.len() - trigger_words.len()) {
        let matches = trigger_words
            .iter()
            .enumerate()
            .filter(|(offset, tw)| words[start + offset] == **tw)
            .count();
        let fraction = matches as f32 / trigger_words.len() as f32;
        if fraction > best_fraction {
            best_fraction = fraction;
            best_end = start + trigger_words.len();
        }
    }

    if best_fraction >= WINDOW_MATCH_FRACTION {
        return words[best_end..].join(" ");
    }
    normalized_transcript.to_string()
}

fn extract_params(region: &str, descriptor: &CommandDescriptor) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for param in &descriptor.parameters {
        let value = extract_param_value(region, param);
        if !value.is_empty() {
            params.insert(param.name.clone(), value);
        }
    }
    params
}

fn extract_param_value(region: &str, param: &ParamDescriptor) -> String {
    match param.param_type {
        ParamType::Integer => extract_number(region, &param.name, integer_regex()),
        ParamType::Double => extract_number(region, &param.name, double_regex()),
        ParamType::Bool => extract_bool(region),
        ParamType::Enum => extract_enum(region, &param.enum_values),
        ParamType::String => extract_string(region, &param.name),
    }
}

/// Numeric extraction shared by Integer and Double: a single occurrence wins
/// outright; multiple occurrences resolve to the one closest to the
/// parameter's keyword, or the first when the keyword is absent.
fn extract_number(region: &str, param_name: &str, pattern: &Regex) -> String {
    let occurrences: Vec<(usize, &str)> = pattern
        .find_iter(region)
        .map(|m| (m.start(), m.as_str()))
        .collect();

    match occurrences.as_slice() {
        [] => String::new(),
        [(_, only)] => (*only).to_string(),
        many => {
            let keyword = keyword_for(param_name);
            match region.find(&keyword) {
                None => many[0].1.to_string(),
                Some(keyword_pos) => {
                    let (_, closest) = many
                        .iter()
                        .min_by_key(|(pos, _)| pos.abs_diff(keyword_pos))
                        .expect("non-empty occurrence list");
                    (*closest).to_string()
                }
            }
        }
    }
}

const TRUE_WORDS: [&str; 4] = ["yes", "true", "enable", "on"];
const FALSE_WORDS: [&str; 4] = ["no", "false", "disable", "off"];

fn extract_bool(region: &str) -> String {
    if TRUE_WORDS.iter().any(|word| region.contains(word)) {
        return "true".to_string();
    }
    if FALSE_WORDS.iter().any(|word| region.contains(word)) {
        return "false".to_string();
    }
    String::new()
}

fn extract_enum(region: &str, enum_values: &[String]) -> String {
    for value in enum_values {
        if region.contains(&value.to_lowercase()) {
            return value.clone();
        }
    }
    String::new()
}

const PREPOSITIONS: [&str; 5] = ["to", "at", "near", "called", "named"];

/// String extraction: words after the parameter keyword, else words after a
/// preposition, else the whole region. Trailing punctuation is stripped.
fn extract_string(region: &str, param_name: &str) -> String {
    let keyword = keyword_for(param_name);
    if let Some(pos) = region.find(&keyword) {
        let after = &region[pos + keyword.len()..];
        let value = take_words(after, 3);
        if !value.is_empty() {
            return strip_trailing_punctuation(&value);
        }
    }

    for preposition in PREPOSITIONS {
        if let Some(pos) = region.find(preposition) {
            let after = &region[pos + preposition.len()..];
            let value = take_words(after, 4);
            if !value.is_empty() {
                return strip_trailing_punctuation(&value);
            }
        }
    }

    strip_trailing_punctuation(region)
}

/// Parameter name rendered as transcript keyword: underscores as spaces.
fn keyword_for(param_name: &str) -> String {
    param_name.to_lowercase().replace('_', " ")
}

fn take_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_trailing_punctuation(text: &str) -> String {
    text.trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim()
        .to_string()
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\b").expect("integer regex should compile"))
}

fn double_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\.?\d*\b").expect("double regex should compile"))
}

/// Levenshtein similarity: `1 − distance / max(|a|, |b|)` over characters.
pub fn levenshtein_similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Single-row dynamic programming over edit distance.
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    let distance = previous[b.len()];
    let max_len = a.len().max(b.len());
    1.0 - distance as f32 / max_len as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ParamDescriptor;

    fn zoom_schema() -> CommandDescriptor {
        CommandDescriptor::new("zoom_to")
            .with_triggers(["zoom to", "zoom level"])
            .with_parameter(
                ParamDescriptor::new("level", ParamType::Integer)
                    .required()
                    .with_range(1.0, 20.0),
            )
    }

    #[test]
    fn similarity_is_one_for_identical_strings() {
        assert_eq!(levenshtein_similarity("show help", "show help"), 1.0);
    }

    #[test]
    fn similarity_is_zero_against_empty() {
        assert_eq!(levenshtein_similarity("abc", ""), 0.0);
        assert_eq!(levenshtein_similarity("", "abc"), 0.0);
        assert_eq!(levenshtein_similarity("", ""), 1.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [("kitten", "sitting"), ("zoom to", "zoom two"), ("a", "ab")];
        for (a, b) in pairs {
            assert_eq!(
                levenshtein_similarity(a, b),
                levenshtein_similarity(b, a),
                "{a} vs {b}"
            );
        }
    }

    #[test]
    fn contained_trigger_scores_at_least_point_eight() {
        let engine = RuleBasedNluEngine::new();
        let schemas = [CommandDescriptor::new("show_help")
            .with_triggers(["show help", "help", "what can i say"])];

        let result = engine.process("please show help now", &schemas);
        assert!(result.success);
        assert_eq!(result.command_name, "show_help");
        assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
    }

    #[test]
    fn command_name_with_underscores_matches_as_phrase() {
        let engine = RuleBasedNluEngine::new();
        let schemas = [CommandDescriptor::new("show_help")];

        let result = engine.process("show help", &schemas);
        assert!(result.success);
        assert_eq!(result.command_name, "show_help");
    }

    #[test]
    fn empty_transcript_is_rejected() {
        let engine = RuleBasedNluEngine::new();
        let result = engine.process("   ", &[zoom_schema()]);
        assert!(!result.success);
        assert!(result.error_message.contains("Empty"));
    }

    #[test]
    fn empty_schema_list_is_rejected() {
        let engine = RuleBasedNluEngine::new();
        let result = engine.process("zoom to 5", &[]);
        assert!(!result.success);
        assert!(result.error_message.contains("schemas"));
    }

    #[test]
    fn gibberish_reports_low_confidence() {
        let engine = RuleBasedNluEngine::new();
        let result = engine.process("random gibberish", &[zoom_schema()]);
        assert!(!result.success);
        assert!(result.error_message.contains("confidence too low"));
    }

    #[test]
    fn integer_extracted_from_argument_region() {
        let engine = RuleBasedNluEngine::new();
        let result = engine.process("zoom to 15", &[zoom_schema()]);
        assert!(result.success);
        assert_eq!(result.extracted_params["level"], "15");
    }

    #[test]
    fn missing_integer_leaves_params_empty() {
        let engine = RuleBasedNluEngine::new();
        let result = engine.process("zoom to", &[zoom_schema()]);
        assert!(result.success, "intent should still match");
        assert!(result.extracted_params.is_empty());
    }

    #[test]
    fn multiple_integers_resolve_by_keyword_proximity() {
        let schema = CommandDescriptor::new("move_to")
            .with_triggers(["move to"])
            .with_parameter(ParamDescriptor::new("x", ParamType::Integer).required())
            .with_parameter(ParamDescriptor::new("y", ParamType::Integer).required());
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("move to x 100 y 200", &[schema]);
        assert!(result.success);
        assert_eq!(result.extracted_params["x"], "100");
        assert_eq!(result.extracted_params["y"], "200");
    }

    #[test]
    fn double_uses_keyword_proximity_as_well() {
        let schema = CommandDescriptor::new("set_view")
            .with_triggers(["set view"])
            .with_parameter(ParamDescriptor::new("lat", ParamType::Double).required())
            .with_parameter(ParamDescriptor::new("lon", ParamType::Double).required());
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("set view lat 45.5 lon 120.25", &[schema]);
        assert!(result.success);
        assert_eq!(result.extracted_params["lat"], "45.5");
        assert_eq!(result.extracted_params["lon"], "120.25");
    }

    #[test]
    fn bool_keywords_map_to_literals() {
        let schema = CommandDescriptor::new("set_labels")
            .with_triggers(["set labels"])
            .with_parameter(ParamDescriptor::new("visible", ParamType::Bool).required());
        let engine = RuleBasedNluEngine::new();

        let on = engine.process("set labels on", &[schema.clone()]);
        assert_eq!(on.extracted_params["visible"], "true");

        let off = engine.process("set labels off", &[schema]);
        assert_eq!(off.extracted_params["visible"], "false");
    }

    #[test]
    fn enum_matches_first_listed_value_present() {
        let schema = CommandDescriptor::new("change_mode")
            .with_triggers(["change mode"])
            .with_parameter(
                ParamDescriptor::new("mode", ParamType::Enum)
                    .required()
                    .with_enum_values(["day", "night", "auto"]),
            );
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("change mode to night please", &[schema]);
        assert_eq!(result.extracted_params["mode"], "night");
    }

    #[test]
    fn string_param_strips_trailing_punctuation() {
        let schema = CommandDescriptor::new("change_color")
            .with_triggers(["change color to", "set color to"])
            .with_parameter(ParamDescriptor::new("color", ParamType::String).required());
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("change color to green.", &[schema]);
        assert!(result.success);
        assert_eq!(result.extracted_params["color"], "green");
    }

    #[test]
    fn string_param_found_after_its_keyword() {
        let schema = CommandDescriptor::new("create_placemark")
            .with_triggers(["create placemark"])
            .with_parameter(ParamDescriptor::new("name", ParamType::String).required());
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("create placemark named base camp alpha", &[schema]);
        // "name" matches inside "named" and takes the following words.
        assert!(result.success);
        assert!(result.extracted_params["name"].contains("base camp"));
    }

    #[test]
    fn argument_region_prefers_suffix_after_trigger() {
        assert_eq!(argument_region("zoom to 15", "zoom to"), "15");
        assert_eq!(
            argument_region("change color to green.", "change color to"),
            "green."
        );
    }

    #[test]
    fn argument_region_falls_back_to_word_window() {
        // Trigger words partially match; window overlap is 1/2 = 0.5.
        let region = argument_region("zoom in 15", "zoom to");
        assert_eq!(region, "15");
    }

    #[test]
    fn argument_region_keeps_full_transcript_when_no_overlap() {
        let region = argument_region("set brightness high", "zoom to");
        assert_eq!(region, "set brightness high");
    }

    #[test]
    fn ties_resolve_to_first_registered_command() {
        let first = CommandDescriptor::new("first").with_triggers(["do it"]);
        let second = CommandDescriptor::new("second").with_triggers(["do it"]);
        let engine = RuleBasedNluEngine::new();

        let result = engine.process("do it", &[first, second]);
        assert_eq!(result.command_name, "first");
    }
}
