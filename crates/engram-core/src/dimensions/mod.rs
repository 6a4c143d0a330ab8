//! DimensionExtractor — rule-derived cognitive scalars (spec §4.2)
//!
//! Sixteen scalars in four groups, each clamped to `[0, 1]`: emotional×4,
//! temporal×3, contextual×6, social×3. Pure pattern matching, no model
//! inference — this is what makes the fused cognitive vector cheap to
//! recompute and easy to reason about for content-type decay profiles.

use std::sync::OnceLock;

use regex::Regex;

/// The sixteen raw scalars, grouped as the spec names them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    /// frustration, satisfaction, curiosity, stress
    pub emotional: [f32; 4],
    /// urgency, deadline_proximity, time_reference_density
    pub temporal: [f32; 3],
    /// code_fence_density, imperative_mood_density, documentation_markers,
    /// error_markers, configuration_markers, collaboration_markers
    pub contextual: [f32; 6],
    /// collaboration_references, support_help_markers, interaction_markers
    pub social: [f32; 3],
}

impl Dimensions {
    pub fn zero() -> Self {
        Self {
            emotional: [0.0; 4],
            temporal: [0.0; 3],
            contextual: [0.0; 6],
            social: [0.0; 3],
        }
    }

    pub fn to_array(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        out[0..4].copy_from_slice(&self.emotional);
        out[4..7].copy_from_slice(&self.temporal);
        out[7..13].copy_from_slice(&self.contextual);
        out[13..16].copy_from_slice(&self.social);
        out
    }

    pub fn from_array(a: [f32; 16]) -> Self {
        Self {
            emotional: [a[0], a[1], a[2], a[3]],
            temporal: [a[4], a[5], a[6]],
            contextual: [a[7], a[8], a[9], a[10], a[11], a[12]],
            social: [a[13], a[14], a[15]],
        }
    }
}

pub trait DimensionExtractor: Send + Sync {
    /// `extract("")` returns [`Dimensions::zero`] — never an error (spec §4.2
    /// failure mode, unlike `EmbeddingProvider`).
    fn extract(&self, text: &str) -> Dimensions;
}

struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    fn new(patterns: &[&str]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("static pattern is valid regex"))
                .collect(),
        }
    }

    fn match_count(&self, lower_text: &str) -> usize {
        self.patterns
            .iter()
            .map(|r| r.find_iter(lower_text).count())
            .sum()
    }
}

fn saturate(matches: usize, weight: f32, token_count: usize) -> f32 {
    if token_count == 0 {
        return 0.0;
    }
    ((matches as f32 * weight) / token_count as f32).min(1.0)
}

struct Lexicons {
    frustration: PatternSet,
    satisfaction: PatternSet,
    curiosity: PatternSet,
    stress: PatternSet,
    urgency: PatternSet,
    deadline: PatternSet,
    time_reference: PatternSet,
    imperative: PatternSet,
    documentation: PatternSet,
    error: PatternSet,
    configuration: PatternSet,
    collaboration: PatternSet,
    support: PatternSet,
    interaction: PatternSet,
    code_fence: Regex,
    inline_code: Regex,
}

fn lexicons() -> &'static Lexicons {
    static LEXICONS: OnceLock<Lexicons> = OnceLock::new();
    LEXICONS.get_or_init(|| Lexicons {
        frustration: PatternSet::new(&[
            r"\bfrustrat\w*", r"\bannoy\w*", r"\bugh\b", r"\bstuck\b", r"\bbroken\b",
            r"\bfail(s|ed|ing)?\b", r"\bdamn\b", r"\bwhy (isn't|doesn't|won't)\b",
        ]),
        satisfaction: PatternSet::new(&[
            r"\bgreat\b", r"\bnice\b", r"\bworks?\b", r"\bfixed\b", r"\bresolved\b",
            r"\bperfect\b", r"\bthanks?\b", r"\bawesome\b", r"\bsuccess\w*",
        ]),
        curiosity: PatternSet::new(&[
            r"\bwhy\b", r"\bhow (does|do|can|could)\b", r"\bwonder\w*", r"\bcurious\b",
            r"\bwhat if\b", r"\bexplore\w*", r"\binvestigat\w*",
        ]),
        stress: PatternSet::new(&[
            r"\burgent\w*", r"\bpressure\b", r"\bdeadline\b", r"\bcritical\b",
            r"\boverwhelm\w*", r"\bpanick?\w*", r"\bemergency\b",
        ]),
        urgency: PatternSet::new(&[
            r"\bnow\b", r"\basap\b", r"\bimmediately\b", r"\burgent\w*", r"\bright away\b",
            r"\bcannot wait\b", r"\bblock(ing|ed|er)\b",
        ]),
        deadline: PatternSet::new(&[
            r"\bby (today|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
            r"\bdue\b", r"\bdeadline\b", r"\d{4}-\d{2}-\d{2}", r"\bend of (day|week|sprint)\b",
        ]),
        time_reference: PatternSet::new(&[
            r"\byesterday\b", r"\btoday\b", r"\btomorrow\b", r"\blast (week|month|year)\b",
            r"\bnext (week|month|year)\b", r"\bsince\b", r"\bafter\b", r"\bbefore\b",
        ]),
        imperative: PatternSet::new(&[
            r"^\s*(run|add|remove|fix|update|create|delete|install|configure|set|use|check|ensure|implement|refactor)\b",
            r"\bplease (run|add|remove|fix|update|create)\b",
        ]),
        documentation: PatternSet::new(&[
            r"\bsee (also|docs?)\b", r"\bnote:\b", r"\breadme\b", r"\bdocumentation\b",
            r"\bexample:\b", r"\boverview\b",
        ]),
        error: PatternSet::new(&[
            r"\berror\b", r"\bexception\b", r"\bpanic\b", r"\btraceback\b", r"\bstack trace\b",
            r"\bfailed to\b", r"\bcrash\w*",
        ]),
        configuration: PatternSet::new(&[
            r"\bconfig\w*", r"\benv(ironment)? var\w*", r"\bsetting\w*", r"\.toml\b", r"\.ya?ml\b",
            r"\bflag\b", r"\boption\b",
        ]),
        collaboration: PatternSet::new(&[
            r"\bwe\b", r"\bteam\b", r"\btogether\b", r"\breview\w*", r"\bpair\w*",
            r"\bdiscuss\w*",
        ]),
        support: PatternSet::new(&[
            r"\bhelp\b", r"\bassist\w*", r"\bsupport\b", r"\bcan you\b", r"\bcould you\b",
        ]),
        interaction: PatternSet::new(&[
            r"@\w+", r"\breply\b", r"\brespond\w*", r"\bask\w*", r"\banswer\w*",
        ]),
        code_fence: Regex::new(r"```[\s\S]*?```").unwrap(),
        inline_code: Regex::new(r"`[^`\n]+`").unwrap(),
    })
}

/// Default extractor: pattern tables over lowercased text plus simple
/// structural measures (code fraction) over the raw text.
pub struct RuleBasedDimensionExtractor;

impl RuleBasedDimensionExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuleBasedDimensionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionExtractor for RuleBasedDimensionExtractor {
    fn extract(&self, text: &str) -> Dimensions {
        if text.trim().is_empty() {
            return Dimensions::zero();
        }

        let lower = text.to_lowercase();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let token_count = tokens.len().max(1);
        let lex = lexicons();

        let emotional = [
            saturate(lex.frustration.match_count(&lower), 3.0, token_count),
            saturate(lex.satisfaction.match_count(&lower), 3.0, token_count),
            saturate(lex.curiosity.match_count(&lower), 3.0, token_count),
            saturate(lex.stress.match_count(&lower), 3.0, token_count),
        ];

        let temporal = [
            saturate(lex.urgency.match_count(&lower), 3.0, token_count),
            saturate(lex.deadline.match_count(&lower), 3.0, token_count),
            saturate(lex.time_reference.match_count(&lower), 2.0, token_count),
        ];

        let code_chars: usize = lex
            .code_fence
            .find_iter(text)
            .map(|m| m.len())
            .sum::<usize>()
            + lex.inline_code.find_iter(text).map(|m| m.len()).sum::<usize>();
        let code_fraction = (code_chars as f32 / text.len().max(1) as f32).min(1.0);

        let contextual = [
            code_fraction,
            saturate(lex.imperative.match_count(&lower), 4.0, token_count),
            saturate(lex.documentation.match_count(&lower), 3.0, token_count),
            saturate(lex.error.match_count(&lower), 3.0, token_count),
            saturate(lex.configuration.match_count(&lower), 3.0, token_count),
            saturate(lex.collaboration.match_count(&lower), 2.0, token_count),
        ];

        let social = [
            saturate(lex.collaboration.match_count(&lower), 3.0, token_count),
            saturate(lex.support.match_count(&lower), 3.0, token_count),
            saturate(lex.interaction.match_count(&lower), 3.0, token_count),
        ];

        Dimensions {
            emotional,
            temporal,
            contextual,
            social,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_zero_vector() {
        let extractor = RuleBasedDimensionExtractor::new();
        assert_eq!(extractor.extract(""), Dimensions::zero());
        assert_eq!(extractor.extract("   "), Dimensions::zero());
    }

    #[test]
    fn all_scalars_stay_within_unit_range() {
        let extractor = RuleBasedDimensionExtractor::new();
        let d = extractor.extract(
            "URGENT: this is broken and failing, please help ASAP! @alice can you review? ```fn x() {}```",
        );
        for v in d.to_array() {
            assert!((0.0..=1.0).contains(&v), "value {v} out of range");
        }
    }

    #[test]
    fn frustration_outscores_satisfaction_on_negative_text() {
        let extractor = RuleBasedDimensionExtractor::new();
        let d = extractor.extract("this is so frustrating, it keeps failing and broken");
        assert!(d.emotional[0] > d.emotional[1]);
    }

    #[test]
    fn code_heavy_text_has_high_code_fraction() {
        let extractor = RuleBasedDimensionExtractor::new();
        let d = extractor.extract("```rust\nfn main() { println!(\"hi\"); }\n```");
        assert!(d.contextual[0] > 0.5);
    }

    #[test]
    fn array_round_trips_through_dimensions() {
        let d = Dimensions {
            emotional: [0.1, 0.2, 0.3, 0.4],
            temporal: [0.5, 0.6, 0.7],
            contextual: [0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            social: [0.7, 0.8, 0.9],
        };
        assert_eq!(Dimensions::from_array(d.to_array()), d);
    }
}
